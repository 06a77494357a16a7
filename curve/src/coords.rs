use std::fmt;

use serde::{Deserialize, Serialize};

use crate::curve::CurveShape;

/// Coordinate system a point is represented in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSystem {
    /// (X : Y : Z) with x = X/Z, y = Y/Z
    Projective,
    /// (X : Y : Z) with x = X/Z^2, y = Y/Z^3
    Jacobian,
    /// (X : Z) with x = X/Z, on Montgomery curves
    Xz,
    /// (X : Y : T : Z) with x = X/Z, y = Y/Z, T = XY/Z
    Extended,
}

impl CoordinateSystem {
    pub const ALL: [CoordinateSystem; 4] = [
        CoordinateSystem::Projective,
        CoordinateSystem::Jacobian,
        CoordinateSystem::Xz,
        CoordinateSystem::Extended,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CoordinateSystem::Projective => "projective",
            CoordinateSystem::Jacobian => "jacobian",
            CoordinateSystem::Xz => "xz",
            CoordinateSystem::Extended => "extended",
        }
    }

    /// The curve shape this system belongs to.
    pub fn shape(&self) -> CurveShape {
        match self {
            CoordinateSystem::Projective | CoordinateSystem::Jacobian => {
                CurveShape::ShortWeierstrass
            }
            CoordinateSystem::Xz => CurveShape::Montgomery,
            CoordinateSystem::Extended => CurveShape::TwistedEdwards,
        }
    }

    pub fn variables(&self) -> &'static [&'static str] {
        match self {
            CoordinateSystem::Projective | CoordinateSystem::Jacobian => &["X", "Y", "Z"],
            CoordinateSystem::Xz => &["X", "Z"],
            CoordinateSystem::Extended => &["X", "Y", "T", "Z"],
        }
    }

    pub fn dimension(&self) -> usize {
        self.variables().len()
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables().iter().position(|v| *v == name)
    }

    /// Integer coordinates of the neutral element.
    pub fn neutral_coordinates(&self) -> &'static [u64] {
        match self {
            CoordinateSystem::Projective => &[0, 1, 0],
            CoordinateSystem::Jacobian => &[1, 1, 0],
            CoordinateSystem::Xz => &[1, 0],
            CoordinateSystem::Extended => &[0, 1, 0, 1],
        }
    }

    /// Neutral test over any element representation.
    ///
    /// Weierstrass and x-only systems test `Z == 0`; extended coordinates
    /// test `X == 0 && Y == Z`.
    pub fn is_neutral_by<E>(
        &self,
        coords: &[E],
        is_zero: impl Fn(&E) -> bool,
        eq: impl Fn(&E, &E) -> bool,
    ) -> bool {
        match self {
            CoordinateSystem::Projective | CoordinateSystem::Jacobian => is_zero(&coords[2]),
            CoordinateSystem::Xz => is_zero(&coords[1]),
            CoordinateSystem::Extended => is_zero(&coords[0]) && eq(&coords[1], &coords[3]),
        }
    }
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_coordinates_pass_neutral_test() {
        for system in CoordinateSystem::ALL {
            let coords = system.neutral_coordinates();
            assert_eq!(coords.len(), system.dimension());
            assert!(system.is_neutral_by(coords, |v| *v == 0, |a, b| a == b));
        }
    }

    #[test]
    fn test_variable_lookup() {
        assert_eq!(CoordinateSystem::Extended.variable_index("T"), Some(2));
        assert_eq!(CoordinateSystem::Xz.variable_index("Y"), None);
        assert_eq!(CoordinateSystem::Jacobian.shape(), CurveShape::ShortWeierstrass);
    }
}
