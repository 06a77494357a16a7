use std::fmt;

use curve::{Limbs, MontgomeryField};
use tracing::debug;

use crate::codegen::{CodegenBackend, Kernel, KernelIr};
use crate::error::CodegenError;
use crate::plan::{ExecutionPlan, PlanId};
use crate::runtime::{lower_bindings, Slot, StepExecutor};

/// A plan whose formulas have been compiled to kernels.
pub struct CompiledPlan {
    plan: PlanId,
    backend: &'static str,
    field: MontgomeryField,
    kernels: Vec<Box<dyn Kernel>>,
    slots: Vec<Vec<Slot<Limbs>>>,
    instructions: usize,
}

impl CompiledPlan {
    /// Compiles every formula of `plan`; any failure aborts the whole plan.
    pub fn build(plan: &ExecutionPlan, backend: &dyn CodegenBackend) -> Result<Self, CodegenError> {
        let field = MontgomeryField::new(plan.curve().modulus().clone())?;
        let mut kernels = Vec::with_capacity(plan.formulas().len());
        let mut instructions = 0;
        for entry in plan.formulas() {
            let ir = KernelIr::lower(&entry.formula);
            instructions += ir.len();
            kernels.push(backend.compile(&ir, &field)?);
        }
        debug!(
            target: "engine::compile",
            plan = %plan.id(),
            backend = backend.name(),
            kernels = kernels.len(),
            instructions,
            "compiled plan"
        );
        Ok(Self {
            plan: plan.id(),
            backend: backend.name(),
            slots: lower_bindings(&field, plan),
            field,
            kernels,
            instructions,
        })
    }

    pub fn plan_id(&self) -> PlanId {
        self.plan
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn kernel_count(&self) -> usize {
        self.kernels.len()
    }

    /// Total instruction count over all kernels.
    pub fn instructions(&self) -> usize {
        self.instructions
    }
}

impl fmt::Debug for CompiledPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPlan")
            .field("plan", &self.plan)
            .field("backend", &self.backend)
            .field("kernels", &self.kernels.len())
            .field("instructions", &self.instructions)
            .finish()
    }
}

impl StepExecutor for CompiledPlan {
    type Field = MontgomeryField;

    fn field(&self) -> &MontgomeryField {
        &self.field
    }

    fn slots(&self, formula: usize) -> &[Slot<Limbs>] {
        &self.slots[formula]
    }

    fn execute(&self, formula: usize, slots: &[Limbs], regs: &mut Vec<Limbs>) {
        self.kernels[formula].call(slots, regs);
    }
}
