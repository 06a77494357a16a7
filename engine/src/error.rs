use curve::{CurveError, FieldError, FormulaError, OperationKind};
use thiserror::Error;

use crate::algorithm::Algorithm;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ComposeError {
    #[error(transparent)]
    Formula(#[from] FormulaError),
    #[error("invalid {algorithm}: {reason}")]
    InvalidAlgorithm { algorithm: Algorithm, reason: String },
    #[error("formula `{name}` implements {found}, not {expected}")]
    WrongKind {
        name: String,
        expected: OperationKind,
        found: OperationKind,
    },
    #[error("malformed plan: {0}")]
    MalformedPlan(String),
    #[error("failed to encode plan: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecError {
    #[error("scalar has {bits} bits but the plan handles {bit_length}")]
    InvalidScalar { bits: u64, bit_length: u32 },
    #[error("point is not on curve `{curve}`")]
    PointNotOnCurve { curve: String },
    #[error("expected {expected} digits, got {found}")]
    DigitCount { expected: usize, found: usize },
    #[error("digit {digit} has value {value} outside the plan's alphabet")]
    DigitOutOfRange { digit: u32, value: i64 },
    #[error("step {step}: formula `{formula}` requires {assumption}")]
    UnsatisfiedAssumption {
        step: u32,
        formula: String,
        assumption: String,
    },
    #[error(transparent)]
    Curve(#[from] CurveError),
}

/// Reasons a plan cannot be compiled. Never fatal: the engine interprets
/// the plan instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CodegenError {
    #[error("code generation backend `{backend}` is unavailable")]
    Unavailable { backend: &'static str },
    #[error(transparent)]
    UnsupportedModulus(#[from] FieldError),
    #[error("kernel for `{formula}` has {instructions} instructions, limit is {limit}")]
    TooLarge {
        formula: String,
        instructions: usize,
        limit: usize,
    },
}
