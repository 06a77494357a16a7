//! Leakage models: what a device leaks about each intermediate value.

use std::fmt;

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

/// Maps an intermediate value to one or more samples ("lanes").
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LeakageFunction {
    #[default]
    HammingWeight,
    Identity,
    Bit { index: u32 },
    /// Bits `lo..hi` read as an integer.
    Slice { lo: u32, hi: u32 },
    /// Hamming weight of every `limb_bits`-wide limb, least significant limb
    /// first. One lane per limb of the modulus.
    LimbHammingWeights { limb_bits: u32 },
}

impl LeakageFunction {
    pub fn validate(&self) -> Result<(), SimulationError> {
        let reason = match *self {
            LeakageFunction::Slice { lo, hi } if hi <= lo => "empty bit range",
            LeakageFunction::Slice { lo, hi } if hi - lo > 64 => "bit range wider than 64 bits",
            LeakageFunction::LimbHammingWeights { limb_bits } if limb_bits == 0 || limb_bits > 64 => {
                "limb width must be between 1 and 64 bits"
            }
            _ => return Ok(()),
        };
        Err(SimulationError::InvalidLeakage {
            function: self.to_string(),
            reason: reason.to_string(),
        })
    }

    /// Samples produced per value for a field with `modulus_bits`-bit elements.
    pub fn lanes(&self, modulus_bits: u64) -> usize {
        match *self {
            LeakageFunction::LimbHammingWeights { limb_bits } => {
                modulus_bits.div_ceil(limb_bits as u64).max(1) as usize
            }
            _ => 1,
        }
    }

    /// Appends the noise-free leakage of `value` to `out`.
    pub fn leak(&self, value: &BigUint, modulus_bits: u64, out: &mut Vec<f64>) {
        match *self {
            LeakageFunction::HammingWeight => out.push(value.count_ones() as f64),
            LeakageFunction::Identity => out.push(value.to_f64().unwrap_or(f64::INFINITY)),
            LeakageFunction::Bit { index } => out.push(if value.bit(index as u64) { 1.0 } else { 0.0 }),
            LeakageFunction::Slice { lo, hi } => {
                let mask = (BigUint::one() << (hi - lo)) - 1u32;
                let bits = (value >> lo) & mask;
                out.push(bits.to_u64().unwrap_or(u64::MAX) as f64);
            }
            LeakageFunction::LimbHammingWeights { limb_bits } => {
                let mask = (BigUint::one() << limb_bits) - 1u32;
                for limb in 0..self.lanes(modulus_bits) {
                    let bits = (value >> (limb as u64 * limb_bits as u64)) & &mask;
                    out.push(bits.count_ones() as f64);
                }
            }
        }
    }
}

impl fmt::Display for LeakageFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeakageFunction::HammingWeight => write!(f, "hamming-weight"),
            LeakageFunction::Identity => write!(f, "identity"),
            LeakageFunction::Bit { index } => write!(f, "bit({index})"),
            LeakageFunction::Slice { lo, hi } => write!(f, "slice({lo}..{hi})"),
            LeakageFunction::LimbHammingWeights { limb_bits } => write!(f, "limb-hw({limb_bits})"),
        }
    }
}

/// Additive measurement noise.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Noise {
    #[default]
    None,
    Gaussian { sigma: f64 },
}

impl Noise {
    /// The noise distribution; `None` when no noise is added.
    pub fn distribution(&self) -> Result<Option<Normal<f64>>, SimulationError> {
        match *self {
            Noise::None => Ok(None),
            Noise::Gaussian { sigma } if sigma == 0.0 => Ok(None),
            Noise::Gaussian { sigma } if sigma > 0.0 => Normal::new(0.0, sigma)
                .map(Some)
                .map_err(|_| SimulationError::InvalidNoise { sigma }),
            Noise::Gaussian { sigma } => Err(SimulationError::InvalidNoise { sigma }),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeakageModel {
    pub function: LeakageFunction,
    pub noise: Noise,
}

impl LeakageModel {
    pub fn new(function: LeakageFunction, noise: Noise) -> Result<Self, SimulationError> {
        let model = Self { function, noise };
        model.validate()?;
        Ok(model)
    }

    pub fn noiseless(function: LeakageFunction) -> Self {
        Self {
            function,
            noise: Noise::None,
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        self.function.validate()?;
        self.noise.distribution().map(|_| ())
    }
}

/// Leaks values through a model, drawing noise from `rng`.
pub(crate) struct Leaker<'r, R: ?Sized> {
    function: LeakageFunction,
    noise: Option<Normal<f64>>,
    modulus_bits: u64,
    rng: &'r mut R,
    scratch: Vec<f64>,
}

impl<'r, R: Rng + ?Sized> Leaker<'r, R> {
    pub(crate) fn new(model: &LeakageModel, modulus_bits: u64, rng: &'r mut R) -> Result<Self, SimulationError> {
        model.function.validate()?;
        Ok(Self {
            function: model.function,
            noise: model.noise.distribution()?,
            modulus_bits,
            rng,
            scratch: Vec::new(),
        })
    }

    /// Leaks `value`, yielding one noisy sample per lane.
    pub(crate) fn leak(&mut self, value: &BigUint, mut emit: impl FnMut(u32, f64)) {
        self.scratch.clear();
        self.function.leak(value, self.modulus_bits, &mut self.scratch);
        for (lane, sample) in self.scratch.iter().enumerate() {
            let noise = match &self.noise {
                Some(normal) => normal.sample(&mut *self.rng),
                None => 0.0,
            };
            emit(lane as u32, sample + noise);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leak(function: LeakageFunction, value: u64, bits: u64) -> Vec<f64> {
        let mut out = Vec::new();
        function.leak(&BigUint::from(value), bits, &mut out);
        out
    }

    #[test]
    fn test_leakage_functions() {
        assert_eq!(leak(LeakageFunction::HammingWeight, 0b1011, 8), vec![3.0]);
        assert_eq!(leak(LeakageFunction::Identity, 300, 16), vec![300.0]);
        assert_eq!(leak(LeakageFunction::Bit { index: 1 }, 0b10, 8), vec![1.0]);
        assert_eq!(leak(LeakageFunction::Bit { index: 0 }, 0b10, 8), vec![0.0]);
        assert_eq!(leak(LeakageFunction::Slice { lo: 4, hi: 8 }, 0xa5, 8), vec![10.0]);
    }

    #[test]
    fn test_limb_weights_cover_the_modulus() {
        let function = LeakageFunction::LimbHammingWeights { limb_bits: 8 };
        assert_eq!(function.lanes(20), 3);
        // leading limbs of small values still produce samples
        assert_eq!(leak(function, 0x0f_ff, 20), vec![8.0, 4.0, 0.0]);
    }

    #[test]
    fn test_invalid_models() {
        assert!(LeakageFunction::Slice { lo: 3, hi: 3 }.validate().is_err());
        assert!(LeakageFunction::Slice { lo: 0, hi: 65 }.validate().is_err());
        assert!(LeakageFunction::LimbHammingWeights { limb_bits: 0 }.validate().is_err());
        assert_eq!(
            LeakageModel::new(LeakageFunction::HammingWeight, Noise::Gaussian { sigma: -1.0 }),
            Err(SimulationError::InvalidNoise { sigma: -1.0 })
        );
        assert!(Noise::Gaussian { sigma: 0.0 }.distribution().unwrap().is_none());
    }
}
