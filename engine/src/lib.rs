//! Scalar-multiplication plans and their execution.
//!
//! A [`Composer`] turns a curve, a coordinate system, an [`Algorithm`] and a
//! scalar bit length into an [`ExecutionPlan`]: a fixed sequence of formula
//! applications whose wiring depends on scalar digits only through guards
//! and selections. The [`ExecutionEngine`] runs plans either by interpreting
//! formula graphs or through kernels compiled by a [`CodegenBackend`], and
//! reports every field operation to an [`OpObserver`].

mod algorithm;
mod codegen;
mod compiled;
mod composer;
mod config;
mod engine;
mod error;
mod interpret;
mod plan;
mod runtime;


pub use algorithm::{Algorithm, DigitLayout, Direction, Recoding};
pub use codegen::{CodegenBackend, DisabledBackend, Instr, Kernel, KernelIr, LimbBackend};
pub use compiled::CompiledPlan;
pub use composer::Composer;
pub use config::{AssumptionAction, EngineConfig, Strategy};
pub use engine::ExecutionEngine;
pub use error::{CodegenError, ComposeError, ExecError};
pub use plan::{
    DigitSet, ExecutionPlan, Guard, PlanDependencies, PlanFormula, PlanId, SlotBinding, Source, Step,
    StepKind, StepRole,
};
pub use runtime::{OpEvent, OpObserver, RecordingObserver};
