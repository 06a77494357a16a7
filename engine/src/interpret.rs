use std::sync::Arc;

use curve::{BinaryOp, FieldBackend, Formula, Node, UnaryOp};

use crate::plan::ExecutionPlan;
use crate::runtime::{lower_bindings, Slot, StepExecutor};

/// Evaluates formula graphs node by node on any field backend.
#[derive(Debug)]
pub(crate) struct Interpreter<F: FieldBackend> {
    field: F,
    formulas: Vec<Arc<Formula>>,
    slots: Vec<Vec<Slot<F::Elem>>>,
}

impl<F: FieldBackend> Interpreter<F> {
    pub(crate) fn new(plan: &ExecutionPlan, field: F) -> Self {
        Self {
            slots: lower_bindings(&field, plan),
            formulas: plan.formulas().iter().map(|f| f.formula.clone()).collect(),
            field,
        }
    }
}

impl<F: FieldBackend> StepExecutor for Interpreter<F> {
    type Field = F;

    fn field(&self) -> &F {
        &self.field
    }

    fn slots(&self, formula: usize) -> &[Slot<F::Elem>] {
        &self.slots[formula]
    }

    fn execute(&self, formula: usize, slots: &[F::Elem], regs: &mut Vec<F::Elem>) {
        let field = &self.field;
        let graph = self.formulas[formula].graph();
        regs.clear();
        regs.reserve(graph.len());
        for node in graph.nodes() {
            let value = match *node {
                Node::Input(slot) => slots[slot as usize].clone(),
                Node::Constant(c) => field.from_u64(c),
                Node::Binary(op, a, b) => {
                    let (a, b) = (&regs[a.index()], &regs[b.index()]);
                    match op {
                        BinaryOp::Add => field.add(a, b),
                        BinaryOp::Sub => field.sub(a, b),
                        BinaryOp::Mul => field.mul(a, b),
                    }
                }
                Node::Unary(op, a) => {
                    let a = &regs[a.index()];
                    match op {
                        UnaryOp::Neg => field.neg(a),
                        UnaryOp::Inv => field.inv(a),
                        UnaryOp::Sqr => field.square(a),
                    }
                }
            };
            regs.push(value);
        }
    }
}
