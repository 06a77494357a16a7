use std::fmt;

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::error::{ComposeError, ExecError};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    LeftToRight,
    RightToLeft,
}

/// Scalar-multiplication strategy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Algorithm {
    /// Binary double-and-add. With `always` the addition runs for every bit
    /// and the result is selected by the bit.
    DoubleAndAdd { direction: Direction, always: bool },
    /// Montgomery ladder.
    Ladder,
    /// Left-to-right fixed windows of `width` bits over a table of `2^width` multiples.
    FixedWindow { width: u8 },
    /// Width-w NAF with odd multiples and their negations.
    SignedWindow { width: u8 },
}

impl Algorithm {
    /// Whether the step sequence executed is independent of the scalar.
    pub fn is_constant_time(&self) -> bool {
        match self {
            Algorithm::DoubleAndAdd { always, .. } => *always,
            Algorithm::Ladder | Algorithm::FixedWindow { .. } => true,
            Algorithm::SignedWindow { .. } => false,
        }
    }

    pub fn validate(&self) -> Result<(), ComposeError> {
        let reason = match *self {
            Algorithm::FixedWindow { width } if !(1..=8).contains(&width) => {
                format!("window width {width} is outside 1..=8")
            }
            Algorithm::SignedWindow { width } if !(2..=8).contains(&width) => {
                format!("window width {width} is outside 2..=8")
            }
            _ => return Ok(()),
        };
        Err(ComposeError::InvalidAlgorithm {
            algorithm: *self,
            reason,
        })
    }

    /// Digit layout the algorithm consumes for scalars of `bit_length` bits.
    pub fn layout(&self, bit_length: u32) -> DigitLayout {
        let recoding = match *self {
            Algorithm::DoubleAndAdd {
                direction: Direction::RightToLeft,
                ..
            } => Recoding::BinaryLsbFirst,
            Algorithm::DoubleAndAdd { .. } | Algorithm::Ladder => Recoding::BinaryMsbFirst,
            Algorithm::FixedWindow { width } => Recoding::Radix { width },
            Algorithm::SignedWindow { width } => Recoding::Naf { width },
        };
        DigitLayout::new(recoding, bit_length)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::DoubleAndAdd { direction, always } => {
                let direction = match direction {
                    Direction::LeftToRight => "ltr",
                    Direction::RightToLeft => "rtl",
                };
                let suffix = if *always { ", always" } else { "" };
                write!(f, "double-and-add({direction}{suffix})")
            }
            Algorithm::Ladder => f.write_str("ladder"),
            Algorithm::FixedWindow { width } => write!(f, "fixed-window({width})"),
            Algorithm::SignedWindow { width } => write!(f, "wnaf({width})"),
        }
    }
}

/// How a scalar is split into digits. Digits are listed in the order the
/// plan consumes them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recoding {
    /// Bits, most significant first.
    BinaryMsbFirst,
    /// Bits, least significant first.
    BinaryLsbFirst,
    /// Radix-2^width digits, most significant first.
    Radix { width: u8 },
    /// Width-w non-adjacent form, most significant first.
    Naf { width: u8 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DigitLayout {
    pub recoding: Recoding,
    pub bit_length: u32,
    /// Number of digits; leading zero digits are kept.
    pub count: u32,
}

impl DigitLayout {
    pub fn new(recoding: Recoding, bit_length: u32) -> Self {
        let count = if bit_length == 0 {
            0
        } else {
            match recoding {
                Recoding::BinaryMsbFirst | Recoding::BinaryLsbFirst => bit_length,
                Recoding::Radix { width } => bit_length.div_ceil(width as u32),
                Recoding::Naf { .. } => bit_length + 1,
            }
        };
        Self {
            recoding,
            bit_length,
            count,
        }
    }

    /// Every digit value the recoding can produce, ascending.
    pub fn alphabet(&self) -> Vec<i64> {
        match self.recoding {
            Recoding::BinaryMsbFirst | Recoding::BinaryLsbFirst => vec![0, 1],
            Recoding::Radix { width } => (0..1i64 << width).collect(),
            Recoding::Naf { width } => {
                let bound = (1i64 << (width - 1)) - 1;
                (-bound..=bound).filter(|d| *d == 0 || d % 2 != 0).collect()
            }
        }
    }

    /// Splits `scalar` into digits.
    pub fn recode(&self, scalar: &BigUint) -> Result<Vec<i64>, ExecError> {
        if scalar.bits() > self.bit_length as u64 {
            return Err(ExecError::InvalidScalar {
                bits: scalar.bits(),
                bit_length: self.bit_length,
            });
        }

        let count = self.count as u64;
        let digits = match self.recoding {
            Recoding::BinaryMsbFirst => (0..count).rev().map(|i| scalar.bit(i) as i64).collect(),
            Recoding::BinaryLsbFirst => (0..count).map(|i| scalar.bit(i) as i64).collect(),
            Recoding::Radix { width } => {
                let width = width as u64;
                (0..count)
                    .rev()
                    .map(|window| {
                        (0..width).fold(0i64, |acc, b| {
                            acc | ((scalar.bit(window * width + b) as i64) << b)
                        })
                    })
                    .collect()
            }
            Recoding::Naf { width } => {
                let mut digits = naf(scalar, width);
                digits.resize(self.count as usize, 0);
                digits.reverse();
                digits
            }
        };
        Ok(digits)
    }

    /// The integer a digit vector denotes.
    pub fn value(&self, digits: &[i64]) -> BigInt {
        let weight = |position: usize| -> usize {
            match self.recoding {
                Recoding::BinaryLsbFirst => position,
                Recoding::BinaryMsbFirst | Recoding::Naf { .. } => digits.len() - 1 - position,
                Recoding::Radix { width } => (digits.len() - 1 - position) * width as usize,
            }
        };
        digits
            .iter()
            .enumerate()
            .fold(BigInt::zero(), |acc, (position, digit)| {
                acc + (BigInt::from(*digit) << weight(position))
            })
    }
}

/// Textbook width-w NAF, least significant digit first.
fn naf(scalar: &BigUint, width: u8) -> Vec<i64> {
    let modulus = 1u64 << width;
    let half = modulus >> 1;
    let mut k = scalar.clone();
    let mut digits = Vec::with_capacity(scalar.bits() as usize + 1);

    while !k.is_zero() {
        if k.bit(0) {
            let low = k.iter_u64_digits().next().unwrap_or(0) & (modulus - 1);
            let digit = if low >= half {
                low as i64 - modulus as i64
            } else {
                low as i64
            };
            if digit > 0 {
                k -= digit as u64;
            } else {
                k += digit.unsigned_abs();
            }
            digits.push(digit);
        } else {
            digits.push(0);
        }
        k >>= 1;
    }
    digits
}
