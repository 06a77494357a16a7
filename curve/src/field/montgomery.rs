//! Montgomery arithmetic over four 64-bit limbs for moduli chosen at runtime.
//!
//! Elements are `[u64; 4]` in little-endian order and hold `value * R mod p`
//! with `R = 2^256`. Any odd modulus `3 <= p < 2^256` is accepted.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use num_bigint::BigUint;

use super::backend::FieldBackend;
use crate::error::FieldError;

/// Little-endian 256-bit limbs.
pub type Limbs = [u64; 4];

const ZERO: Limbs = [0, 0, 0, 0];

/// Montgomery-form field over a runtime modulus.
#[derive(Clone, PartialEq, Eq)]
pub struct MontgomeryField {
    modulus: Arc<BigUint>,
    limbs: Limbs,
    // R mod p, i.e. one in Montgomery form
    r: Limbs,
    // R^2 mod p, for conversion into Montgomery form
    r2: Limbs,
    // -p^{-1} mod 2^64
    mu: u64,
    // p - 2, the Fermat inversion exponent
    exponent: Limbs,
}

impl MontgomeryField {
    /// Name reported in errors and logs.
    pub const NAME: &'static str = "montgomery";

    pub fn new(modulus: Arc<BigUint>) -> Result<Self, FieldError> {
        let bits = modulus.bits();
        if bits < 2 || bits > 256 || !modulus.bit(0) {
            return Err(FieldError::UnsupportedModulus {
                backend: Self::NAME,
                bits,
            });
        }

        let one = BigUint::from(1u32);
        let limbs = limbs_from_biguint(&modulus);
        let r = limbs_from_biguint(&((&one << 256u32) % &*modulus));
        let r2 = limbs_from_biguint(&((&one << 512u32) % &*modulus));
        let exponent = limbs_from_biguint(&(&*modulus - 2u32));

        Ok(Self {
            mu: montgomery_mu(limbs[0]),
            modulus,
            limbs,
            r,
            r2,
            exponent,
        })
    }

    /// The modulus as limbs.
    pub fn modulus_limbs(&self) -> &Limbs {
        &self.limbs
    }

    pub fn one(&self) -> Limbs {
        self.r
    }

    /// Converts canonical limbs (< p) into Montgomery form.
    #[inline]
    pub fn to_montgomery(&self, canonical: &Limbs) -> Limbs {
        montgomery_mul(canonical, &self.r2, &self.limbs, self.mu)
    }

    /// Converts Montgomery limbs back into canonical form.
    #[inline]
    pub fn from_montgomery(&self, limbs: &Limbs) -> Limbs {
        montgomery_mul(limbs, &[1, 0, 0, 0], &self.limbs, self.mu)
    }

    #[inline]
    pub fn add_limbs(&self, a: &Limbs, b: &Limbs) -> Limbs {
        add_mod(a, b, &self.limbs)
    }

    #[inline]
    pub fn sub_limbs(&self, a: &Limbs, b: &Limbs) -> Limbs {
        sub_mod(a, b, &self.limbs)
    }

    #[inline]
    pub fn neg_limbs(&self, a: &Limbs) -> Limbs {
        if *a == ZERO {
            return ZERO;
        }
        sub_mod(&self.limbs, a, &self.limbs)
    }

    #[inline]
    pub fn mul_limbs(&self, a: &Limbs, b: &Limbs) -> Limbs {
        montgomery_mul(a, b, &self.limbs, self.mu)
    }

    /// Inverse via Fermat's little theorem; zero maps to zero.
    pub fn inv_limbs(&self, a: &Limbs) -> Limbs {
        self.pow_vartime(a, &self.exponent)
    }

    fn pow_vartime(&self, base: &Limbs, exp: &Limbs) -> Limbs {
        if *base == ZERO {
            return ZERO;
        }

        let mut result = self.r;
        let mut base = *base;

        // Process bits from least significant to most significant
        for &limb in exp.iter() {
            let mut remaining = limb;
            for _ in 0..64 {
                if remaining & 1 == 1 {
                    result = self.mul_limbs(&result, &base);
                }
                base = self.mul_limbs(&base, &base);
                remaining >>= 1;
            }
        }

        result
    }
}

impl Debug for MontgomeryField {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MontgomeryField(0x{:x})", self.modulus.as_ref())
    }
}

impl FieldBackend for MontgomeryField {
    type Elem = Limbs;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn modulus(&self) -> &Arc<BigUint> {
        &self.modulus
    }

    fn from_biguint(&self, value: &BigUint) -> Limbs {
        let reduced = value % &*self.modulus;
        self.to_montgomery(&limbs_from_biguint(&reduced))
    }

    fn to_biguint(&self, elem: &Limbs) -> BigUint {
        biguint_from_limbs(&self.from_montgomery(elem))
    }

    fn add(&self, a: &Limbs, b: &Limbs) -> Limbs {
        self.add_limbs(a, b)
    }

    fn sub(&self, a: &Limbs, b: &Limbs) -> Limbs {
        self.sub_limbs(a, b)
    }

    fn mul(&self, a: &Limbs, b: &Limbs) -> Limbs {
        self.mul_limbs(a, b)
    }

    fn neg(&self, a: &Limbs) -> Limbs {
        self.neg_limbs(a)
    }

    fn square(&self, a: &Limbs) -> Limbs {
        self.mul_limbs(a, a)
    }

    fn inv(&self, a: &Limbs) -> Limbs {
        self.inv_limbs(a)
    }

    fn is_zero(&self, a: &Limbs) -> bool {
        *a == ZERO
    }
}

/// Splits a value below 2^256 into little-endian limbs.
pub fn limbs_from_biguint(value: &BigUint) -> Limbs {
    let mut limbs = ZERO;
    for (limb, digit) in limbs.iter_mut().zip(value.iter_u64_digits()) {
        *limb = digit;
    }
    limbs
}

pub fn biguint_from_limbs(limbs: &Limbs) -> BigUint {
    let mut bytes = Vec::with_capacity(32);
    for &limb in limbs {
        bytes.extend_from_slice(&limb.to_le_bytes());
    }
    BigUint::from_bytes_le(&bytes)
}

/// -p0^{-1} mod 2^64 by Newton iteration; each round doubles the correct bits.
fn montgomery_mu(p0: u64) -> u64 {
    let mut inv = 1u64;
    for _ in 0..6 {
        inv = inv.wrapping_mul(2u64.wrapping_sub(p0.wrapping_mul(inv)));
    }
    inv.wrapping_neg()
}

/// `a + b mod p` for reduced inputs.
#[inline]
fn add_mod(a: &Limbs, b: &Limbs, modulus: &Limbs) -> Limbs {
    let (r0, carry) = a[0].overflowing_add(b[0]);
    let (r1, carry) = carrying_add(a[1], b[1], carry);
    let (r2, carry) = carrying_add(a[2], b[2], carry);
    let (r3, carry) = carrying_add(a[3], b[3], carry);

    let (s0, borrow) = r0.overflowing_sub(modulus[0]);
    let (s1, borrow) = borrowing_sub(r1, modulus[1], borrow);
    let (s2, borrow) = borrowing_sub(r2, modulus[2], borrow);
    let (s3, borrow) = borrowing_sub(r3, modulus[3], borrow);

    // Subtract when the sum overflowed 2^256 or is at least p
    if carry || !borrow {
        [s0, s1, s2, s3]
    } else {
        [r0, r1, r2, r3]
    }
}

/// `a - b mod p` for reduced inputs.
#[inline]
fn sub_mod(a: &Limbs, b: &Limbs, modulus: &Limbs) -> Limbs {
    let (r0, borrow) = a[0].overflowing_sub(b[0]);
    let (r1, borrow) = borrowing_sub(a[1], b[1], borrow);
    let (r2, borrow) = borrowing_sub(a[2], b[2], borrow);
    let (r3, borrow) = borrowing_sub(a[3], b[3], borrow);

    if borrow {
        let (r0, carry) = r0.overflowing_add(modulus[0]);
        let (r1, carry) = carrying_add(r1, modulus[1], carry);
        let (r2, carry) = carrying_add(r2, modulus[2], carry);
        let (r3, _) = carrying_add(r3, modulus[3], carry);
        [r0, r1, r2, r3]
    } else {
        [r0, r1, r2, r3]
    }
}

#[inline]
const fn carrying_add(a: u64, b: u64, carry: bool) -> (u64, bool) {
    let (sum, overflow1) = a.overflowing_add(b);
    let (sum, overflow2) = sum.overflowing_add(carry as u64);
    (sum, overflow1 || overflow2)
}

#[inline]
const fn borrowing_sub(a: u64, b: u64, borrow: bool) -> (u64, bool) {
    let (diff, overflow1) = a.overflowing_sub(b);
    let (diff, overflow2) = diff.overflowing_sub(borrow as u64);
    (diff, overflow1 || overflow2)
}

/// Montgomery multiplication: (a * b * R^{-1}) mod p
///
/// The accumulator keeps a ninth limb: for moduli close to 2^256 the
/// intermediate `(a*b + k*p) / R` may reach `2p`, which overflows 256 bits.
#[inline]
fn montgomery_mul(a: &Limbs, b: &Limbs, modulus: &Limbs, mu: u64) -> Limbs {
    let mut t = [0u64; 9];

    for i in 0..4 {
        let mut carry = 0u128;
        for j in 0..4 {
            let product = (a[i] as u128) * (b[j] as u128) + (t[i + j] as u128) + carry;
            t[i + j] = product as u64;
            carry = product >> 64;
        }
        t[i + 4] = carry as u64;
    }

    // Montgomery reduction
    for i in 0..4 {
        let k = t[i].wrapping_mul(mu);
        let mut carry = 0u128;

        for j in 0..4 {
            let product = (k as u128) * (modulus[j] as u128) + (t[i + j] as u128) + carry;
            t[i + j] = product as u64;
            carry = product >> 64;
        }

        let mut idx = i + 4;
        while carry != 0 && idx < t.len() {
            let sum = (t[idx] as u128) + carry;
            t[idx] = sum as u64;
            carry = sum >> 64;
            idx += 1;
        }
    }

    let result = [t[4], t[5], t[6], t[7]];

    let (s0, borrow) = result[0].overflowing_sub(modulus[0]);
    let (s1, borrow) = borrowing_sub(result[1], modulus[1], borrow);
    let (s2, borrow) = borrowing_sub(result[2], modulus[2], borrow);
    let (s3, borrow) = borrowing_sub(result[3], modulus[3], borrow);

    if t[8] != 0 || !borrow {
        [s0, s1, s2, s3]
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::BigUintField;
    use proptest::prelude::*;

    fn field(hex: &str) -> MontgomeryField {
        let modulus = BigUint::parse_bytes(hex.as_bytes(), 16).unwrap();
        MontgomeryField::new(Arc::new(modulus)).unwrap()
    }

    fn p256() -> MontgomeryField {
        field("ffffffff00000001000000000000000000000000ffffffffffffffffffffffff")
    }

    fn p25519() -> MontgomeryField {
        field("7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffed")
    }

    #[test]
    fn test_zero_one() {
        let f = p256();
        let one = f.from_u64(1);
        assert_eq!(one, f.one());
        assert_eq!(f.mul(&one, &one), one);
        assert_eq!(f.add(&ZERO, &one), one);
        assert_eq!(f.to_biguint(&one), BigUint::from(1u32));
    }

    #[test]
    fn test_small_arithmetic() {
        let f = p25519();
        let a = f.from_u64(6);
        let b = f.from_u64(7);
        assert_eq!(f.to_biguint(&f.mul(&a, &b)), BigUint::from(42u32));
        assert_eq!(f.to_biguint(&f.add(&a, &b)), BigUint::from(13u32));
        assert_eq!(f.add(&f.sub(&a, &b), &b), a);
        assert_eq!(f.add(&a, &f.neg(&a)), ZERO);
    }

    #[test]
    fn test_inverse() {
        let f = p256();
        let a = f.from_u64(5);
        assert_eq!(f.mul(&a, &f.inv(&a)), f.one());
        assert_eq!(f.inv(&ZERO), ZERO);
    }

    #[test]
    fn test_modulus_near_word_boundary() {
        // 2^256 - 189 is prime and forces the ninth accumulator limb
        let f = field("ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff43");
        let minus_one = f.neg(&f.one());
        let square = f.mul(&minus_one, &minus_one);
        assert_eq!(square, f.one());
    }

    #[test]
    fn test_debug_shows_modulus() {
        assert_eq!(format!("{:?}", field("f1")), "MontgomeryField(0xf1)");
    }

    #[test]
    fn test_rejects_even_and_oversized_moduli() {
        let even = MontgomeryField::new(Arc::new(BigUint::from(1u32) << 255u32));
        assert!(matches!(even, Err(FieldError::UnsupportedModulus { .. })));

        let wide = (BigUint::from(1u32) << 300u32) + 1u32;
        let wide = MontgomeryField::new(Arc::new(wide));
        assert!(matches!(wide, Err(FieldError::UnsupportedModulus { bits: 301, .. })));
    }

    proptest! {
        #[test]
        fn prop_matches_biguint_backend(a in any::<[u64; 4]>(), b in any::<[u64; 4]>()) {
            for mont in [p256(), p25519()] {
                let reference = BigUintField::new(mont.modulus().clone());
                let (a, b) = (biguint_from_limbs(&a), biguint_from_limbs(&b));
                let (ma, mb) = (mont.from_biguint(&a), mont.from_biguint(&b));
                let (ra, rb) = (reference.from_biguint(&a), reference.from_biguint(&b));

                prop_assert_eq!(mont.to_biguint(&mont.mul(&ma, &mb)), reference.mul(&ra, &rb));
                prop_assert_eq!(mont.to_biguint(&mont.add(&ma, &mb)), reference.add(&ra, &rb));
                prop_assert_eq!(mont.to_biguint(&mont.sub(&ma, &mb)), reference.sub(&ra, &rb));
                prop_assert_eq!(mont.to_biguint(&mont.square(&ma)), reference.square(&ra));
                prop_assert_eq!(mont.to_biguint(&mont.inv(&mb)), reference.inv(&rb));
            }
        }
    }
}
