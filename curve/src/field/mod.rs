//! Prime field elements and arithmetic backends.

mod backend;
mod montgomery;

pub use backend::{BigUintField, FieldBackend};
pub use montgomery::{biguint_from_limbs, limbs_from_biguint, Limbs, MontgomeryField};

use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Element of the prime field given by `modulus`.
///
/// Mixing elements of different moduli is a programming error and panics.
#[derive(Clone, Serialize, Deserialize)]
pub struct Mod {
    value: BigUint,
    modulus: Arc<BigUint>,
}

impl Mod {
    /// Reduces `value` into the field.
    pub fn new(value: impl Into<BigUint>, modulus: Arc<BigUint>) -> Self {
        let value = value.into() % &*modulus;
        Self { value, modulus }
    }

    pub fn from_u64(value: u64, modulus: &Arc<BigUint>) -> Self {
        Self::new(value, modulus.clone())
    }

    /// Maps a signed integer into the field, e.g. `-3` to `p - 3`.
    pub fn from_i64(value: i64, modulus: &Arc<BigUint>) -> Self {
        let magnitude = Self::from_u64(value.unsigned_abs(), modulus);
        if value < 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    pub fn zero(modulus: &Arc<BigUint>) -> Self {
        Self {
            value: BigUint::zero(),
            modulus: modulus.clone(),
        }
    }

    pub fn one(modulus: &Arc<BigUint>) -> Self {
        Self::new(1u32, modulus.clone())
    }

    /// Uniform element, sampled with 64 bits of slack to make the bias negligible.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, modulus: &Arc<BigUint>) -> Self {
        let len = (modulus.bits() as usize + 64).div_ceil(8);
        let mut bytes = vec![0u8; len];
        rng.fill(bytes.as_mut_slice());
        Self::new(BigUint::from_bytes_le(&bytes), modulus.clone())
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub fn modulus(&self) -> &Arc<BigUint> {
        &self.modulus
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_one(&self) -> bool {
        self.value.is_one()
    }

    pub fn square(&self) -> Self {
        self * self
    }

    pub fn pow(&self, exponent: &BigUint) -> Self {
        Self {
            value: self.value.modpow(exponent, &self.modulus),
            modulus: self.modulus.clone(),
        }
    }

    /// Multiplicative inverse by Fermat exponentiation; the inverse of zero is zero.
    pub fn inverse(&self) -> Self {
        if self.is_zero() {
            return self.clone();
        }
        self.pow(&(&*self.modulus - 2u32))
    }

    /// Legendre symbol: 0, 1 or -1.
    pub fn legendre(&self) -> i8 {
        if self.is_zero() {
            return 0;
        }
        let exponent = (&*self.modulus - 1u32) >> 1u32;
        if self.pow(&exponent).is_one() {
            1
        } else {
            -1
        }
    }

    pub fn is_square(&self) -> bool {
        self.legendre() >= 0
    }

    /// Square root by Tonelli-Shanks, `None` for non-residues.
    pub fn sqrt(&self) -> Option<Self> {
        if self.is_zero() || self.modulus.as_ref() == &BigUint::from(2u32) {
            return Some(self.clone());
        }
        if !self.is_square() {
            return None;
        }

        let p_minus_one = &*self.modulus - 1u32;
        let s = p_minus_one.trailing_zeros().unwrap_or(0);
        let q = &p_minus_one >> s;

        let mut z = Self::from_u64(2, &self.modulus);
        while z.is_square() {
            z = &z + &Self::one(&self.modulus);
        }

        let mut m = s;
        let mut c = z.pow(&q);
        let mut t = self.pow(&q);
        let mut r = self.pow(&((&q + 1u32) >> 1u32));

        while !t.is_one() {
            let mut i = 0u64;
            let mut probe = t.clone();
            while !probe.is_one() {
                probe = probe.square();
                i += 1;
            }
            let b = c.pow(&(BigUint::one() << (m - i - 1)));
            m = i;
            c = b.square();
            t = &t * &c;
            r = &r * &b;
        }

        Some(r)
    }

    fn assert_same_field(&self, other: &Self) {
        assert!(
            Arc::ptr_eq(&self.modulus, &other.modulus) || self.modulus == other.modulus,
            "field elements of different moduli: 0x{:x} and 0x{:x}",
            self.modulus.as_ref(),
            other.modulus.as_ref()
        );
    }

    fn with_value(&self, value: BigUint) -> Self {
        Self {
            value,
            modulus: self.modulus.clone(),
        }
    }
}

impl PartialEq for Mod {
    fn eq(&self, other: &Self) -> bool {
        self.assert_same_field(other);
        self.value == other.value
    }
}

impl Eq for Mod {}

impl Hash for Mod {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<'a> Add<&'a Mod> for &'a Mod {
    type Output = Mod;

    fn add(self, rhs: &'a Mod) -> Mod {
        self.assert_same_field(rhs);
        let sum = &self.value + &rhs.value;
        if sum >= *self.modulus {
            self.with_value(sum - &*self.modulus)
        } else {
            self.with_value(sum)
        }
    }
}

impl<'a> Sub<&'a Mod> for &'a Mod {
    type Output = Mod;

    fn sub(self, rhs: &'a Mod) -> Mod {
        self.assert_same_field(rhs);
        if self.value >= rhs.value {
            self.with_value(&self.value - &rhs.value)
        } else {
            self.with_value(&*self.modulus - &rhs.value + &self.value)
        }
    }
}

impl<'a> Mul<&'a Mod> for &'a Mod {
    type Output = Mod;

    fn mul(self, rhs: &'a Mod) -> Mod {
        self.assert_same_field(rhs);
        self.with_value((&self.value * &rhs.value) % &*self.modulus)
    }
}

impl<'a> Div<&'a Mod> for &'a Mod {
    type Output = Mod;

    fn div(self, rhs: &'a Mod) -> Mod {
        self * &rhs.inverse()
    }
}

impl Neg for &Mod {
    type Output = Mod;

    fn neg(self) -> Mod {
        if self.is_zero() {
            self.clone()
        } else {
            self.with_value(&*self.modulus - &self.value)
        }
    }
}

impl Add for Mod {
    type Output = Mod;

    fn add(self, rhs: Mod) -> Mod {
        &self + &rhs
    }
}

impl Sub for Mod {
    type Output = Mod;

    fn sub(self, rhs: Mod) -> Mod {
        &self - &rhs
    }
}

impl Mul for Mod {
    type Output = Mod;

    fn mul(self, rhs: Mod) -> Mod {
        &self * &rhs
    }
}

impl Div for Mod {
    type Output = Mod;

    fn div(self, rhs: Mod) -> Mod {
        &self / &rhs
    }
}

impl Neg for Mod {
    type Output = Mod;

    fn neg(self) -> Mod {
        -&self
    }
}

impl Display for Mod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.value)
    }
}

impl Debug for Mod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Mod({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn modulus(value: u64) -> Arc<BigUint> {
        Arc::new(BigUint::from(value))
    }

    fn p256() -> Arc<BigUint> {
        let hex = b"ffffffff00000001000000000000000000000000ffffffffffffffffffffffff";
        Arc::new(BigUint::parse_bytes(hex, 16).unwrap())
    }

    #[test]
    fn test_basic_arithmetic() {
        let p = modulus(101);
        let a = Mod::from_u64(60, &p);
        let b = Mod::from_u64(50, &p);
        assert_eq!(&a + &b, Mod::from_u64(9, &p));
        assert_eq!(&b - &a, Mod::from_u64(91, &p));
        assert_eq!(&a * &b, Mod::from_u64(3000 % 101, &p));
        assert_eq!(-&a, Mod::from_u64(41, &p));
        assert_eq!(Mod::from_i64(-3, &p), Mod::from_u64(98, &p));
    }

    #[test]
    fn test_inverse() {
        let p = p256();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            let a = Mod::random(&mut rng, &p);
            if !a.is_zero() {
                assert!((&a * &a.inverse()).is_one());
                assert_eq!(&(&a / &a), &Mod::one(&p));
            }
        }
        assert!(Mod::zero(&p).inverse().is_zero());
    }

    #[test]
    fn test_sqrt() {
        // 97 = 3 * 2^5 + 1 exercises the Tonelli-Shanks loop
        for p in [modulus(97), modulus(101), modulus(103), p256()] {
            let mut rng = StdRng::seed_from_u64(42);
            for _ in 0..20 {
                let a = Mod::random(&mut rng, &p);
                let square = a.square();
                let root = square.sqrt().unwrap();
                assert_eq!(root.square(), square);
            }
        }
    }

    #[test]
    fn test_non_residue_has_no_root() {
        let p = modulus(103);
        let non_residues: Vec<u64> = (1..103)
            .filter(|v| Mod::from_u64(*v, &p).legendre() == -1)
            .collect();
        assert_eq!(non_residues.len(), 51);
        for v in non_residues {
            assert!(Mod::from_u64(v, &p).sqrt().is_none());
        }
    }

    #[test]
    fn test_random_in_range() {
        let p = modulus(13);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            assert!(Mod::random(&mut rng, &p).value() < &BigUint::from(13u32));
        }
    }

    #[test]
    #[should_panic(expected = "different moduli: 0x65 and 0x67")]
    fn test_mixed_moduli_panic() {
        let a = Mod::from_u64(1, &modulus(101));
        let b = Mod::from_u64(1, &modulus(103));
        let _ = &a + &b;
    }
}
