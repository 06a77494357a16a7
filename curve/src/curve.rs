use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use num_bigint::BigUint;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CurveError;
use crate::field::Mod;

/// Curve equation family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CurveShape {
    /// y^2 = x^3 + a*x + b
    ShortWeierstrass,
    /// b*y^2 = x^3 + a*x^2 + x
    Montgomery,
    /// a*x^2 + y^2 = 1 + d*x^2*y^2
    TwistedEdwards,
}

impl CurveShape {
    /// Names of the equation coefficients, in equation order.
    pub fn parameter_names(&self) -> [&'static str; 2] {
        match self {
            CurveShape::ShortWeierstrass | CurveShape::Montgomery => ["a", "b"],
            CurveShape::TwistedEdwards => ["a", "d"],
        }
    }
}

impl fmt::Display for CurveShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CurveShape::ShortWeierstrass => "short Weierstrass",
            CurveShape::Montgomery => "Montgomery",
            CurveShape::TwistedEdwards => "twisted Edwards",
        };
        f.write_str(name)
    }
}

/// Affine point on a curve, or the point at infinity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AffinePoint {
    Infinity,
    Point { x: Mod, y: Mod },
}

impl AffinePoint {
    pub fn new(x: Mod, y: Mod) -> Self {
        AffinePoint::Point { x, y }
    }

    pub fn is_infinity(&self) -> bool {
        matches!(self, AffinePoint::Infinity)
    }

    pub fn x(&self) -> Option<&Mod> {
        match self {
            AffinePoint::Infinity => None,
            AffinePoint::Point { x, .. } => Some(x),
        }
    }

    pub fn y(&self) -> Option<&Mod> {
        match self {
            AffinePoint::Infinity => None,
            AffinePoint::Point { y, .. } => Some(y),
        }
    }
}

/// An elliptic curve over a prime field.
///
/// Curves carry parameters only; formulas live in the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveModel {
    name: String,
    shape: CurveShape,
    modulus: Arc<BigUint>,
    parameters: BTreeMap<String, Mod>,
    // equation coefficients in `CurveShape::parameter_names` order
    coefficients: [Mod; 2],
    generator: AffinePoint,
    order: Option<BigUint>,
    cofactor: BigUint,
}

impl CurveModel {
    /// Builds a curve, checking that every equation coefficient is present
    /// and that the generator satisfies the equation.
    pub fn new(
        name: impl Into<String>,
        shape: CurveShape,
        modulus: BigUint,
        parameters: &[(&str, BigUint)],
        generator: (BigUint, BigUint),
        order: Option<BigUint>,
        cofactor: BigUint,
    ) -> Result<Self, CurveError> {
        let name = name.into();
        let modulus = Arc::new(modulus);
        let parameters: BTreeMap<String, Mod> = parameters
            .iter()
            .map(|(key, value)| (key.to_string(), Mod::new(value.clone(), modulus.clone())))
            .collect();

        let [first, second] = shape.parameter_names();
        let coefficient = |key: &str| {
            parameters
                .get(key)
                .cloned()
                .ok_or_else(|| CurveError::MissingParameter {
                    curve: name.clone(),
                    parameter: key.to_string(),
                })
        };
        let coefficients = [coefficient(first)?, coefficient(second)?];

        let generator = AffinePoint::new(
            Mod::new(generator.0, modulus.clone()),
            Mod::new(generator.1, modulus.clone()),
        );

        let curve = Self {
            name,
            shape,
            modulus,
            parameters,
            coefficients,
            generator,
            order,
            cofactor,
        };
        if !curve.contains(&curve.generator) {
            return Err(CurveError::PointNotOnCurve { curve: curve.name });
        }
        Ok(curve)
    }

    /// Looks up a built-in curve by name.
    pub fn named(name: &str) -> Option<Self> {
        match name {
            "secp256r1" | "P-256" | "prime256v1" => Some(Self::secp256r1()),
            "secp256k1" => Some(Self::secp256k1()),
            "curve25519" => Some(Self::curve25519()),
            "ed25519" => Some(Self::ed25519()),
            _ => None,
        }
    }

    pub fn secp256r1() -> Self {
        let p = hex("ffffffff00000001000000000000000000000000ffffffffffffffffffffffff");
        let a = &p - 3u32;
        builtin(
            "secp256r1",
            CurveShape::ShortWeierstrass,
            p,
            [
                ("a", a),
                ("b", hex("5ac635d8aa3a93e7b3ebbd55769886bc651d06b0cc53b0f63bce3c3e27d2604b")),
            ],
            (
                hex("6b17d1f2e12c4247f8bce6e563a440f277037d812deb33a0f4a13945d898c296"),
                hex("4fe342e2fe1a7f9b8ee7eb4a7c0f9e162bce33576b315ececbb6406837bf51f5"),
            ),
            hex("ffffffff00000000ffffffffffffffffbce6faada7179e84f3b9cac2fc632551"),
            1,
        )
    }

    pub fn secp256k1() -> Self {
        builtin(
            "secp256k1",
            CurveShape::ShortWeierstrass,
            hex("fffffffffffffffffffffffffffffffffffffffffffffffffffffffefffffc2f"),
            [("a", BigUint::from(0u32)), ("b", BigUint::from(7u32))],
            (
                hex("79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"),
                hex("483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8"),
            ),
            hex("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141"),
            1,
        )
    }

    pub fn curve25519() -> Self {
        builtin(
            "curve25519",
            CurveShape::Montgomery,
            hex(P25519),
            [("a", BigUint::from(486662u32)), ("b", BigUint::from(1u32))],
            (
                BigUint::from(9u32),
                hex("20ae19a1b8a086b4e01edd2c7748d14c923d4d7e6d7c61b229e9c5a27eced3d9"),
            ),
            hex(L25519),
            8,
        )
    }

    pub fn ed25519() -> Self {
        let p = hex(P25519);
        let a = &p - 1u32;
        builtin(
            "ed25519",
            CurveShape::TwistedEdwards,
            p,
            [
                ("a", a),
                ("d", hex("52036cee2b6ffe738cc740797779e89800700a4d4141d8ab75eb4dca135978a3")),
            ],
            (
                hex("216936d3cd6e53fec0a4e231fdd6dc5c692cc7609525a7b2c9562d608f25d51a"),
                hex("6666666666666666666666666666666666666666666666666666666666666658"),
            ),
            hex(L25519),
            8,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> CurveShape {
        self.shape
    }

    pub fn modulus(&self) -> &Arc<BigUint> {
        &self.modulus
    }

    pub fn parameter(&self, name: &str) -> Option<&Mod> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> &BTreeMap<String, Mod> {
        &self.parameters
    }

    pub fn generator(&self) -> &AffinePoint {
        &self.generator
    }

    pub fn order(&self) -> Option<&BigUint> {
        self.order.as_ref()
    }

    pub fn cofactor(&self) -> &BigUint {
        &self.cofactor
    }

    /// Field element of this curve's base field.
    pub fn element(&self, value: impl Into<BigUint>) -> Mod {
        Mod::new(value, self.modulus.clone())
    }

    pub(crate) fn coefficients(&self) -> (&Mod, &Mod) {
        (&self.coefficients[0], &self.coefficients[1])
    }

    /// Whether `point` satisfies the curve equation.
    pub fn contains(&self, point: &AffinePoint) -> bool {
        let AffinePoint::Point { x, y } = point else {
            return true;
        };
        if x.modulus().as_ref() != self.modulus.as_ref()
            || y.modulus().as_ref() != self.modulus.as_ref()
        {
            return false;
        }

        let (c0, c1) = self.coefficients();
        let x2 = x.square();
        let y2 = y.square();
        match self.shape {
            CurveShape::ShortWeierstrass => {
                let rhs = &(&(&x2 * x) + &(c0 * x)) + c1;
                y2 == rhs
            }
            CurveShape::Montgomery => {
                let rhs = &(&(&x2 * x) + &(c0 * &x2)) + x;
                c1 * &y2 == rhs
            }
            CurveShape::TwistedEdwards => {
                let lhs = &(c0 * &x2) + &y2;
                let rhs = &self.element(1u32) + &(c1 * &(&x2 * &y2));
                lhs == rhs
            }
        }
    }

    /// Whether `point` is the group identity; on twisted Edwards curves the
    /// affine point (0, 1) is accepted as well.
    pub fn is_neutral(&self, point: &AffinePoint) -> bool {
        match point {
            AffinePoint::Infinity => true,
            AffinePoint::Point { x, y } => {
                self.shape == CurveShape::TwistedEdwards && x.is_zero() && y.is_one()
            }
        }
    }

    /// Maps every representation of the identity to [`AffinePoint::Infinity`].
    pub fn canonical(&self, point: AffinePoint) -> AffinePoint {
        if self.is_neutral(&point) {
            AffinePoint::Infinity
        } else {
            point
        }
    }

    /// Samples a uniformly random affine point (not necessarily in the
    /// prime-order subgroup).
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> AffinePoint {
        loop {
            let t = Mod::random(rng, &self.modulus);
            if let Some(point) = self.lift(&t) {
                return point;
            }
        }
    }

    // Solves the curve equation for the free coordinate: y given x on
    // Weierstrass and Montgomery curves, x given y on twisted Edwards curves.
    fn lift(&self, t: &Mod) -> Option<AffinePoint> {
        let (c0, c1) = self.coefficients();
        let t2 = t.square();
        match self.shape {
            CurveShape::ShortWeierstrass => {
                let rhs = &(&(&t2 * t) + &(c0 * t)) + c1;
                let y = rhs.sqrt()?;
                Some(AffinePoint::new(t.clone(), y))
            }
            CurveShape::Montgomery => {
                let rhs = &(&(&t2 * t) + &(c0 * &t2)) + t;
                let y = (&rhs / c1).sqrt()?;
                Some(AffinePoint::new(t.clone(), y))
            }
            CurveShape::TwistedEdwards => {
                let denominator = &(c1 * &t2) - c0;
                if denominator.is_zero() {
                    return None;
                }
                let numerator = &t2 - &self.element(1u32);
                let x = (&numerator / &denominator).sqrt()?;
                Some(self.canonical(AffinePoint::new(x, t.clone())))
            }
        }
    }
}

const P25519: &str = "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffed";
const L25519: &str = "1000000000000000000000000000000014def9dea2f79cd65812631a5cf5d3ed";

fn hex(digits: &str) -> BigUint {
    BigUint::parse_bytes(digits.as_bytes(), 16).expect("built-in curve constant is valid hex")
}

fn builtin(
    name: &str,
    shape: CurveShape,
    modulus: BigUint,
    parameters: [(&str, BigUint); 2],
    generator: (BigUint, BigUint),
    order: BigUint,
    cofactor: u32,
) -> CurveModel {
    CurveModel::new(
        name,
        shape,
        modulus,
        &parameters,
        generator,
        Some(order),
        BigUint::from(cofactor),
    )
    .expect("built-in curve parameters are consistent")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn all_curves() -> Vec<CurveModel> {
        ["secp256r1", "secp256k1", "curve25519", "ed25519"]
            .iter()
            .map(|name| CurveModel::named(name).unwrap())
            .collect()
    }

    #[test]
    fn test_generators_on_curve() {
        for curve in all_curves() {
            assert!(curve.contains(curve.generator()), "{}", curve.name());
        }
    }

    #[test]
    fn test_random_points_on_curve() {
        let mut rng = StdRng::seed_from_u64(42);
        for curve in all_curves() {
            for _ in 0..5 {
                let point = curve.random_point(&mut rng);
                assert!(curve.contains(&point), "{}", curve.name());
            }
        }
    }

    #[test]
    fn test_off_curve_point_rejected() {
        let curve = CurveModel::secp256r1();
        let AffinePoint::Point { x, y } = curve.generator().clone() else {
            panic!("generator is finite");
        };
        let moved = AffinePoint::new(x, &y + &curve.element(1u32));
        assert!(!curve.contains(&moved));
    }

    #[test]
    fn test_missing_parameter() {
        let result = CurveModel::new(
            "broken",
            CurveShape::ShortWeierstrass,
            BigUint::from(101u32),
            &[("a", BigUint::from(1u32))],
            (BigUint::from(0u32), BigUint::from(1u32)),
            None,
            BigUint::from(1u32),
        );
        assert_eq!(
            result,
            Err(CurveError::MissingParameter {
                curve: "broken".to_string(),
                parameter: "b".to_string(),
            })
        );
    }

    #[test]
    fn test_small_curve() {
        // y^2 = x^3 + 2x + 3 over F_97 contains (3, 6)
        let curve = CurveModel::new(
            "toy",
            CurveShape::ShortWeierstrass,
            BigUint::from(97u32),
            &[("a", BigUint::from(2u32)), ("b", BigUint::from(3u32))],
            (BigUint::from(3u32), BigUint::from(6u32)),
            None,
            BigUint::from(1u32),
        )
        .unwrap();
        assert_eq!(curve.parameter("a"), Some(&curve.element(2u32)));
        assert!(curve.parameter("d").is_none());
    }

    #[test]
    fn test_edwards_identity() {
        let curve = CurveModel::ed25519();
        let identity = AffinePoint::new(curve.element(0u32), curve.element(1u32));
        assert!(curve.contains(&identity));
        assert!(curve.is_neutral(&identity));
        assert_eq!(curve.canonical(identity), AffinePoint::Infinity);
    }
}
