use std::fmt::Debug;
use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::Zero;

use super::Mod;

/// Arithmetic over a prime field, independent of element representation.
///
/// Every backend must agree on canonical results: converting the outcome of
/// any operation back with [`FieldBackend::to_biguint`] yields the same
/// integer for all implementations. The inverse of zero is zero.
pub trait FieldBackend: Send + Sync + Debug {
    type Elem: Clone + PartialEq + Debug + Send + Sync;

    fn name(&self) -> &'static str;

    fn modulus(&self) -> &Arc<BigUint>;

    fn from_biguint(&self, value: &BigUint) -> Self::Elem;

    fn to_biguint(&self, elem: &Self::Elem) -> BigUint;

    fn add(&self, a: &Self::Elem, b: &Self::Elem) -> Self::Elem;

    fn sub(&self, a: &Self::Elem, b: &Self::Elem) -> Self::Elem;

    fn mul(&self, a: &Self::Elem, b: &Self::Elem) -> Self::Elem;

    fn neg(&self, a: &Self::Elem) -> Self::Elem;

    fn square(&self, a: &Self::Elem) -> Self::Elem;

    fn inv(&self, a: &Self::Elem) -> Self::Elem;

    fn is_zero(&self, a: &Self::Elem) -> bool;

    fn from_u64(&self, value: u64) -> Self::Elem {
        self.from_biguint(&BigUint::from(value))
    }

    /// Imports a [`Mod`]; panics when the moduli differ.
    fn from_mod(&self, value: &Mod) -> Self::Elem {
        assert_eq!(
            value.modulus().as_ref(),
            self.modulus().as_ref(),
            "field element modulus does not match backend"
        );
        self.from_biguint(value.value())
    }

    fn to_mod(&self, elem: &Self::Elem) -> Mod {
        Mod::new(self.to_biguint(elem), self.modulus().clone())
    }
}

/// Reference backend on arbitrary-precision integers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BigUintField {
    modulus: Arc<BigUint>,
}

impl BigUintField {
    pub const NAME: &'static str = "biguint";

    pub fn new(modulus: Arc<BigUint>) -> Self {
        Self { modulus }
    }
}

impl FieldBackend for BigUintField {
    type Elem = BigUint;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn modulus(&self) -> &Arc<BigUint> {
        &self.modulus
    }

    fn from_biguint(&self, value: &BigUint) -> BigUint {
        value % &*self.modulus
    }

    fn to_biguint(&self, elem: &BigUint) -> BigUint {
        elem.clone()
    }

    fn add(&self, a: &BigUint, b: &BigUint) -> BigUint {
        let sum = a + b;
        if sum >= *self.modulus {
            sum - &*self.modulus
        } else {
            sum
        }
    }

    fn sub(&self, a: &BigUint, b: &BigUint) -> BigUint {
        if a >= b {
            a - b
        } else {
            &*self.modulus - b + a
        }
    }

    fn mul(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a * b) % &*self.modulus
    }

    fn neg(&self, a: &BigUint) -> BigUint {
        if a.is_zero() {
            BigUint::zero()
        } else {
            &*self.modulus - a
        }
    }

    fn square(&self, a: &BigUint) -> BigUint {
        (a * a) % &*self.modulus
    }

    fn inv(&self, a: &BigUint) -> BigUint {
        if a.is_zero() {
            return BigUint::zero();
        }
        let exponent = &*self.modulus - 2u32;
        a.modpow(&exponent, &self.modulus)
    }

    fn is_zero(&self, a: &BigUint) -> bool {
        a.is_zero()
    }
}
