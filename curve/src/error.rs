use thiserror::Error;

use crate::coords::CoordinateSystem;
use crate::curve::CurveShape;
use crate::formula::OperationKind;

/// Errors raised while building formulas and looking them up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("no {kind} formula for {system} coordinates on {shape} curves")]
    UnsupportedCombination {
        kind: OperationKind,
        system: CoordinateSystem,
        shape: CurveShape,
    },

    #[error("no formula named `{name}` for {system} coordinates")]
    UnknownFormula {
        name: String,
        system: CoordinateSystem,
    },

    #[error("malformed formula `{name}`: {reason}")]
    MalformedFormula { name: String, reason: String },

    #[error("formula `{name}` declares {found} input points but {kind} takes {expected}")]
    ArityMismatch {
        name: String,
        kind: OperationKind,
        expected: usize,
        found: usize,
    },

    #[error("formula `{name}` assumes {assumption}, which curve `{curve}` does not satisfy")]
    UnsatisfiedAssumption {
        name: String,
        assumption: String,
        curve: String,
    },
}

impl FormulaError {
    pub(crate) fn malformed(name: &str, reason: impl Into<String>) -> Self {
        Self::MalformedFormula {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by curve models and point conversions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurveError {
    #[error("point is not on curve `{curve}`")]
    PointNotOnCurve { curve: String },

    #[error("curve `{curve}` is missing parameter `{parameter}`")]
    MissingParameter { curve: String, parameter: String },

    #[error("{system} coordinates do not apply to {shape} curves")]
    ShapeMismatch {
        system: CoordinateSystem,
        shape: CurveShape,
    },

    #[error("{system} coordinates take {expected} values, got {found}")]
    CoordinateCount {
        system: CoordinateSystem,
        expected: usize,
        found: usize,
    },

    #[error("{system} coordinates do not determine an affine y-coordinate")]
    XOnly { system: CoordinateSystem },
}

/// Errors raised when a field backend cannot represent a modulus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{backend} backend does not support a {bits}-bit modulus")]
    UnsupportedModulus { backend: &'static str, bits: u64 },
}
