//! Elliptic curves over runtime prime fields and the formulas that operate on them.
//!
//! This crate provides prime field elements with interchangeable arithmetic
//! backends, curve models in short Weierstrass, Montgomery and twisted Edwards
//! form, coordinate systems, and point-arithmetic formulas parsed from
//! three-address code into expression graphs. Formulas are collected in a
//! [`Catalog`]; the affine group law in the `reference` module is the
//! independent check they are tested against.

mod catalog;
mod code;
mod coords;
mod curve;
mod defs;
mod error;
mod expr;
mod field;
mod formula;
mod point;
mod reference;


pub use catalog::Catalog;
pub use code::{parse_line, parse_program, CodeOp, Expr, Operand};
pub use coords::CoordinateSystem;
pub use curve::{AffinePoint, CurveModel, CurveShape};
pub use defs::STANDARD;
pub use error::{CurveError, FieldError, FormulaError};
pub use expr::{BinaryOp, ExprGraph, Node, NodeId, OpCounts, OpKind, UnaryOp};
pub use field::{
    biguint_from_limbs, limbs_from_biguint, BigUintField, FieldBackend, Limbs, Mod,
    MontgomeryField,
};
pub use formula::{Assumption, AssumptionDef, Formula, FormulaDef, FormulaInput, OperationKind};
pub use point::Point;
