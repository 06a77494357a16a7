//! Affine group law, used as the independent reference for formula and
//! plan evaluation.

use num_bigint::BigUint;

use crate::curve::{AffinePoint, CurveModel, CurveShape};
use crate::field::Mod;

impl CurveModel {
    /// Affine point addition.
    pub fn add_affine(&self, p: &AffinePoint, q: &AffinePoint) -> AffinePoint {
        if self.shape() == CurveShape::TwistedEdwards {
            return self.edwards_add(p, q);
        }

        let (AffinePoint::Point { x: x1, y: y1 }, AffinePoint::Point { x: x2, y: y2 }) = (p, q)
        else {
            // Handle infinity cases
            return if p.is_infinity() { q.clone() } else { p.clone() };
        };

        if x1 == x2 {
            return if y1 == y2 {
                self.double_affine(p)
            } else {
                AffinePoint::Infinity
            };
        }

        // λ = (y2 - y1) / (x2 - x1)
        let lambda = &(y2 - y1) / &(x2 - x1);
        self.chord(&lambda, x1, y1, x2)
    }

    /// Affine point doubling.
    pub fn double_affine(&self, p: &AffinePoint) -> AffinePoint {
        if self.shape() == CurveShape::TwistedEdwards {
            return self.edwards_add(p, p);
        }

        let AffinePoint::Point { x, y } = p else {
            return AffinePoint::Infinity;
        };
        // If y = 0, then 2P = O
        if y.is_zero() {
            return AffinePoint::Infinity;
        }

        let (a, b) = self.coefficients();
        let x2 = x.square();
        let three_x2 = &(&x2 + &x2) + &x2;
        let two_y = y + y;
        let lambda = match self.shape() {
            // λ = (3x^2 + a) / (2y)
            CurveShape::ShortWeierstrass => &(&three_x2 + a) / &two_y,
            // λ = (3x^2 + 2ax + 1) / (2by)
            _ => {
                let ax = a * x;
                let numerator = &(&(&three_x2 + &ax) + &ax) + &self.element(1u32);
                &numerator / &(b * &two_y)
            }
        };
        self.chord(&lambda, x, y, x)
    }

    /// Affine point negation.
    pub fn negate_affine(&self, p: &AffinePoint) -> AffinePoint {
        match p {
            AffinePoint::Infinity => AffinePoint::Infinity,
            AffinePoint::Point { x, y } => match self.shape() {
                CurveShape::TwistedEdwards => AffinePoint::new(-x, y.clone()),
                _ => AffinePoint::new(x.clone(), -y),
            },
        }
    }

    /// Right-to-left double-and-add over the affine group law.
    pub fn multiply_affine(&self, p: &AffinePoint, scalar: &BigUint) -> AffinePoint {
        let mut result = AffinePoint::Infinity;
        let mut temp = p.clone();

        for bit in 0..scalar.bits() {
            if scalar.bit(bit) {
                result = self.add_affine(&result, &temp);
            }
            temp = self.double_affine(&temp);
        }

        self.canonical(result)
    }

    // Third intersection of the line with slope λ through (x1, y1), reflected.
    fn chord(&self, lambda: &Mod, x1: &Mod, y1: &Mod, x2: &Mod) -> AffinePoint {
        let lambda2 = lambda.square();
        let x3 = match self.shape() {
            // x3 = λ^2 - x1 - x2
            CurveShape::ShortWeierstrass => &(&lambda2 - x1) - x2,
            // x3 = bλ^2 - a - x1 - x2
            _ => {
                let (a, b) = self.coefficients();
                &(&(&(b * &lambda2) - a) - x1) - x2
            }
        };
        // y3 = λ(x1 - x3) - y1
        let y3 = &(lambda * &(x1 - &x3)) - y1;
        AffinePoint::new(x3, y3)
    }

    fn edwards_add(&self, p: &AffinePoint, q: &AffinePoint) -> AffinePoint {
        let (x1, y1) = self.edwards_coordinates(p);
        let (x2, y2) = self.edwards_coordinates(q);
        let (a, d) = self.coefficients();
        let one = self.element(1u32);

        let x1x2 = &x1 * &x2;
        let y1y2 = &y1 * &y2;
        let dxy = &(d * &x1x2) * &y1y2;

        // x3 = (x1y2 + y1x2) / (1 + d x1x2y1y2)
        let x3 = &(&(&x1 * &y2) + &(&y1 * &x2)) / &(&one + &dxy);
        // y3 = (y1y2 - a x1x2) / (1 - d x1x2y1y2)
        let y3 = &(&y1y2 - &(a * &x1x2)) / &(&one - &dxy);
        self.canonical(AffinePoint::new(x3, y3))
    }

    fn edwards_coordinates(&self, p: &AffinePoint) -> (Mod, Mod) {
        match p {
            AffinePoint::Infinity => (self.element(0u32), self.element(1u32)),
            AffinePoint::Point { x, y } => (x.clone(), y.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn curves() -> Vec<CurveModel> {
        vec![
            CurveModel::secp256r1(),
            CurveModel::secp256k1(),
            CurveModel::curve25519(),
            CurveModel::ed25519(),
        ]
    }

    #[test]
    fn test_double_matches_add() {
        let mut rng = StdRng::seed_from_u64(42);
        for curve in curves() {
            let p = curve.random_point(&mut rng);
            let doubled = curve.double_affine(&p);
            assert_eq!(curve.add_affine(&p, &p), doubled);
            assert!(curve.contains(&doubled), "{}", curve.name());
        }
    }

    #[test]
    fn test_associativity() {
        let mut rng = StdRng::seed_from_u64(42);
        for curve in curves() {
            let p = curve.random_point(&mut rng);
            let q = curve.random_point(&mut rng);
            let r = curve.random_point(&mut rng);
            let left = curve.add_affine(&curve.add_affine(&p, &q), &r);
            let right = curve.add_affine(&p, &curve.add_affine(&q, &r));
            assert_eq!(left, right, "{}", curve.name());
        }
    }

    #[test]
    fn test_negation() {
        let mut rng = StdRng::seed_from_u64(42);
        for curve in curves() {
            let p = curve.random_point(&mut rng);
            let sum = curve.add_affine(&p, &curve.negate_affine(&p));
            assert!(curve.is_neutral(&sum), "{}", curve.name());
        }
    }

    #[test]
    fn test_generator_order() {
        for curve in [CurveModel::secp256k1(), CurveModel::ed25519()] {
            let order = curve.order().unwrap().clone();
            let result = curve.multiply_affine(curve.generator(), &order);
            assert_eq!(result, AffinePoint::Infinity, "{}", curve.name());
        }
    }

    #[test]
    fn test_small_multiples() {
        let curve = CurveModel::secp256r1();
        let g = curve.generator();
        let two = curve.double_affine(g);
        let three = curve.add_affine(&two, g);
        assert_eq!(curve.multiply_affine(g, &BigUint::from(3u32)), three);
        assert_eq!(curve.multiply_affine(g, &BigUint::from(0u32)), AffinePoint::Infinity);
    }
}
