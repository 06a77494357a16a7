use std::sync::Arc;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::coords::CoordinateSystem;
use crate::curve::{AffinePoint, CurveModel};
use crate::error::CurveError;
use crate::field::Mod;

/// A point in some coordinate system.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    system: CoordinateSystem,
    coords: Vec<Mod>,
}

impl Point {
    pub fn new(system: CoordinateSystem, coords: Vec<Mod>) -> Result<Self, CurveError> {
        if coords.len() != system.dimension() {
            return Err(CurveError::CoordinateCount {
                system,
                expected: system.dimension(),
                found: coords.len(),
            });
        }
        Ok(Self { system, coords })
    }

    pub fn neutral(system: CoordinateSystem, modulus: &Arc<BigUint>) -> Self {
        let coords = system
            .neutral_coordinates()
            .iter()
            .map(|v| Mod::from_u64(*v, modulus))
            .collect();
        Self { system, coords }
    }

    /// Converts an affine point into `system` on `curve`.
    pub fn from_affine(
        system: CoordinateSystem,
        curve: &CurveModel,
        point: &AffinePoint,
    ) -> Result<Self, CurveError> {
        if system.shape() != curve.shape() {
            return Err(CurveError::ShapeMismatch {
                system,
                shape: curve.shape(),
            });
        }

        let AffinePoint::Point { x, y } = point else {
            return Ok(Self::neutral(system, curve.modulus()));
        };
        let one = curve.element(1u32);
        let coords = match system {
            CoordinateSystem::Projective | CoordinateSystem::Jacobian => {
                vec![x.clone(), y.clone(), one]
            }
            CoordinateSystem::Xz => vec![x.clone(), one],
            CoordinateSystem::Extended => vec![x.clone(), y.clone(), x * y, one],
        };
        Ok(Self { system, coords })
    }

    pub fn system(&self) -> CoordinateSystem {
        self.system
    }

    pub fn coords(&self) -> &[Mod] {
        &self.coords
    }

    pub fn coordinate(&self, variable: &str) -> Option<&Mod> {
        self.system
            .variable_index(variable)
            .map(|index| &self.coords[index])
    }

    pub fn is_neutral(&self) -> bool {
        self.system
            .is_neutral_by(&self.coords, Mod::is_zero, |a, b| a == b)
    }

    /// Affine x-coordinate, `None` for the neutral point.
    pub fn affine_x(&self) -> Option<Mod> {
        if self.is_neutral() {
            return None;
        }
        let c = &self.coords;
        let x = match self.system {
            CoordinateSystem::Jacobian => &c[0] / &c[2].square(),
            CoordinateSystem::Projective => &c[0] / &c[2],
            CoordinateSystem::Xz => &c[0] / &c[1],
            CoordinateSystem::Extended => &c[0] / &c[3],
        };
        Some(x)
    }

    pub fn to_affine(&self) -> Result<AffinePoint, CurveError> {
        if self.is_neutral() {
            return Ok(AffinePoint::Infinity);
        }
        let c = &self.coords;
        let point = match self.system {
            CoordinateSystem::Projective => {
                let z_inv = c[2].inverse();
                AffinePoint::new(&c[0] * &z_inv, &c[1] * &z_inv)
            }
            CoordinateSystem::Jacobian => {
                let z_inv = c[2].inverse();
                let z_inv2 = z_inv.square();
                let z_inv3 = &z_inv2 * &z_inv;
                AffinePoint::new(&c[0] * &z_inv2, &c[1] * &z_inv3)
            }
            CoordinateSystem::Extended => {
                let z_inv = c[3].inverse();
                AffinePoint::new(&c[0] * &z_inv, &c[1] * &z_inv)
            }
            CoordinateSystem::Xz => return Err(CurveError::XOnly { system: self.system }),
        };
        Ok(point)
    }

    /// Whether both points denote the same group element (up to sign for
    /// x-only systems).
    pub fn equivalent(&self, other: &Point) -> bool {
        if self.system != other.system {
            return false;
        }
        match self.system {
            CoordinateSystem::Xz => self.affine_x() == other.affine_x(),
            _ => self.to_affine().ok() == other.to_affine().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_affine_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);
        for (curve, system) in [
            (CurveModel::secp256r1(), CoordinateSystem::Projective),
            (CurveModel::secp256r1(), CoordinateSystem::Jacobian),
            (CurveModel::ed25519(), CoordinateSystem::Extended),
        ] {
            let affine = curve.random_point(&mut rng);
            let point = Point::from_affine(system, &curve, &affine).unwrap();
            assert_eq!(point.to_affine().unwrap(), affine);
        }
    }

    #[test]
    fn test_neutral() {
        let curve = CurveModel::curve25519();
        let neutral = Point::from_affine(CoordinateSystem::Xz, &curve, &AffinePoint::Infinity).unwrap();
        assert!(neutral.is_neutral());
        assert_eq!(neutral.affine_x(), None);
    }

    #[test]
    fn test_jacobian_scaling_is_equivalent() {
        let curve = CurveModel::secp256k1();
        let g = Point::from_affine(CoordinateSystem::Jacobian, &curve, curve.generator()).unwrap();
        let z = curve.element(5u32);
        let scaled = Point::new(
            CoordinateSystem::Jacobian,
            vec![&g.coords()[0] * &z.square(), &g.coords()[1] * &(&z.square() * &z), z],
        )
        .unwrap();
        assert!(scaled.equivalent(&g));
    }

    #[test]
    fn test_x_only_has_no_affine_y() {
        let curve = CurveModel::curve25519();
        let g = Point::from_affine(CoordinateSystem::Xz, &curve, curve.generator()).unwrap();
        assert_eq!(g.affine_x().unwrap(), curve.element(9u32));
        assert!(matches!(g.to_affine(), Err(CurveError::XOnly { .. })));
    }

    #[test]
    fn test_shape_mismatch() {
        let curve = CurveModel::secp256r1();
        let result = Point::from_affine(CoordinateSystem::Xz, &curve, curve.generator());
        assert!(matches!(result, Err(CurveError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_coordinate_count() {
        let curve = CurveModel::secp256r1();
        let result = Point::new(CoordinateSystem::Projective, vec![curve.element(1u32)]);
        assert!(matches!(result, Err(CurveError::CoordinateCount { expected: 3, found: 1, .. })));
    }
}
