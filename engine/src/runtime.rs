//! The step loop shared by every execution strategy.

use curve::{Assumption, FieldBackend, Formula, OpKind, OperationKind};
use num_bigint::BigUint;
use tracing::warn;

use crate::config::AssumptionAction;
use crate::error::ExecError;
use crate::plan::{ExecutionPlan, SlotBinding, Source, StepKind};

/// One elementary field operation performed during evaluation.
#[derive(Copy, Clone, Debug)]
pub struct OpEvent<'a> {
    pub step: u32,
    /// Node of the step's formula graph.
    pub node: u32,
    pub op: OpKind,
    /// Canonical value of the result.
    pub value: &'a BigUint,
}

/// Receives every elementary operation of an evaluation, in order.
pub trait OpObserver {
    /// Whether events of `step` are wanted. Skipped steps are still executed.
    fn wants(&self, _step: u32) -> bool {
        true
    }

    fn on_op(&mut self, event: OpEvent<'_>);
}

/// Collects all events; mostly useful in tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordingObserver {
    pub events: Vec<(u32, u32, OpKind, BigUint)>,
}

impl OpObserver for RecordingObserver {
    fn on_op(&mut self, event: OpEvent<'_>) {
        self.events
            .push((event.step, event.node, event.op, event.value.clone()));
    }
}

/// How a formula input slot is filled, in some backend's representation.
#[derive(Clone, Debug)]
pub(crate) enum Slot<E> {
    Coordinate { point: usize, index: usize },
    Constant(E),
}

pub(crate) fn lower_bindings<F: FieldBackend>(field: &F, plan: &ExecutionPlan) -> Vec<Vec<Slot<F::Elem>>> {
    plan.formulas()
        .iter()
        .map(|entry| {
            entry
                .bindings
                .iter()
                .map(|binding| match binding {
                    SlotBinding::Coordinate { point, index } => Slot::Coordinate {
                        point: *point as usize,
                        index: *index as usize,
                    },
                    SlotBinding::Constant(value) => Slot::Constant(field.from_mod(value)),
                })
                .collect()
        })
        .collect()
}

pub(crate) type Elem<X> = <<X as StepExecutor>::Field as FieldBackend>::Elem;

/// Executes single formulas of a plan; the step loop does the rest.
pub(crate) trait StepExecutor {
    type Field: FieldBackend;

    fn field(&self) -> &Self::Field;

    fn slots(&self, formula: usize) -> &[Slot<Elem<Self>>];

    /// Evaluates formula `formula` on the filled `slots`. Afterwards
    /// `regs[i]` holds the value of graph node `i`.
    fn execute(&self, formula: usize, slots: &[Elem<Self>], regs: &mut Vec<Elem<Self>>);
}

pub(crate) struct Run<'a, 'o> {
    pub digits: &'a [i64],
    pub assumptions: AssumptionAction,
    pub observer: Option<&'o mut dyn OpObserver>,
    /// Stop after this step; the run then yields no result.
    pub stop_after: Option<usize>,
}

fn resolve<'v, E>(values: &'v [Vec<Vec<E>>], input: &'v [E], neutral: &'v [E], source: Source) -> &'v [E] {
    match source {
        Source::Input(_) => input,
        Source::Neutral => neutral,
        Source::Step { step, output } => &values[step as usize][output as usize],
    }
}

/// Runs `plan` on the coordinates of the input point.
pub(crate) fn run<X: StepExecutor>(
    plan: &ExecutionPlan,
    exec: &X,
    input: &[Elem<X>],
    mut options: Run<'_, '_>,
) -> Result<Option<Vec<Elem<X>>>, ExecError> {
    let field = exec.field();
    let system = plan.system();
    let neutral: Vec<Elem<X>> = system
        .neutral_coordinates()
        .iter()
        .map(|v| field.from_u64(*v))
        .collect();
    let one = field.from_u64(1);
    let is_neutral = |coords: &[Elem<X>]| system.is_neutral_by(coords, |e| field.is_zero(e), |a, b| a == b);
    let constant_time = plan.algorithm().is_constant_time();

    let mut values: Vec<Vec<Vec<Elem<X>>>> = Vec::with_capacity(plan.steps().len());
    let mut slots = Vec::new();
    let mut regs = Vec::new();

    for (index, step) in plan.steps().iter().enumerate() {
        if options.stop_after.is_some_and(|last| index > last) {
            return Ok(None);
        }

        let outputs = match &step.kind {
            StepKind::Neutral => vec![neutral.clone()],
            StepKind::Select { digit, choices } => {
                let value = options.digits[*digit as usize];
                let (_, source) = choices
                    .iter()
                    .find(|(v, _)| *v == value)
                    .ok_or(ExecError::DigitOutOfRange { digit: *digit, value })?;
                vec![resolve(&values, input, &neutral, *source).to_vec()]
            }
            StepKind::Formula {
                formula,
                operands,
                guard,
                fallback,
            } => {
                if !guard.holds(options.digits) {
                    fallback
                        .iter()
                        .map(|s| resolve(&values, input, &neutral, *s).to_vec())
                        .collect()
                } else {
                    let f = *formula as usize;
                    let entry = &plan.formulas()[f].formula;
                    let points: Vec<&[Elem<X>]> = operands
                        .iter()
                        .map(|s| resolve(&values, input, &neutral, *s))
                        .collect();

                    let forward = shortcut(plan.short_circuit(), entry.kind(), &points, &is_neutral);
                    if let (Some(forward), false) = (forward, constant_time) {
                        vec![forward.to_vec()]
                    } else {
                        // a forwarded result still costs the full formula in constant-time plans
                        if forward.is_none() {
                            check_assumptions(index, entry, &points, &one, &is_neutral, options.assumptions)?;
                        }

                        slots.clear();
                        slots.extend(exec.slots(f).iter().map(|slot| match slot {
                            Slot::Coordinate { point, index: coordinate } => {
                                points[*point][*coordinate].clone()
                            }
                            Slot::Constant(value) => value.clone(),
                        }));
                        exec.execute(f, &slots, &mut regs);

                        if let Some(observer) = options.observer.as_deref_mut() {
                            if observer.wants(index as u32) {
                                for (id, node) in entry.graph().iter() {
                                    let Some(op) = node.op() else { continue };
                                    let value = field.to_biguint(&regs[id.index()]);
                                    observer.on_op(OpEvent {
                                        step: index as u32,
                                        node: id.0,
                                        op,
                                        value: &value,
                                    });
                                }
                            }
                        }

                        match forward {
                            Some(forward) => vec![forward.to_vec()],
                            None => entry
                                .outputs()
                                .chunks(system.dimension())
                                .map(|point| point.iter().map(|id| regs[id.index()].clone()).collect())
                                .collect(),
                        }
                    }
                }
            }
        };
        values.push(outputs);
    }

    Ok(Some(resolve(&values, input, &neutral, plan.output()).to_vec()))
}

/// Result forwarded in place of a formula's output on a neutral operand.
/// Scaling the neutral point always forwards it, since its Z cannot be
/// normalized. Constant-time plans evaluate the formula anyway and drop its
/// output.
fn shortcut<'p, E>(
    enabled: bool,
    kind: OperationKind,
    points: &[&'p [E]],
    is_neutral: impl Fn(&[E]) -> bool,
) -> Option<&'p [E]> {
    match kind {
        OperationKind::Scale if is_neutral(points[0]) => Some(points[0]),
        OperationKind::Double if enabled && is_neutral(points[0]) => Some(points[0]),
        OperationKind::Add if enabled => {
            if is_neutral(points[0]) {
                Some(points[1])
            } else if is_neutral(points[1]) {
                Some(points[0])
            } else {
                None
            }
        }
        _ => None,
    }
}

fn check_assumptions<E: PartialEq>(
    step: usize,
    formula: &Formula,
    points: &[&[E]],
    one: &E,
    is_neutral: impl Fn(&[E]) -> bool,
    action: AssumptionAction,
) -> Result<(), ExecError> {
    if action == AssumptionAction::Ignore {
        return Ok(());
    }
    for assumption in formula.assumptions() {
        let holds = match assumption {
            // checked when composing
            Assumption::ParameterEquals { .. } => true,
            Assumption::CoordinateIsOne { point, index, .. } => {
                points[*point as usize][*index as usize] == *one
            }
            Assumption::NonNeutral { point } => !is_neutral(points[*point as usize]),
        };
        if holds {
            continue;
        }
        match action {
            AssumptionAction::Ignore => {}
            AssumptionAction::Warn => warn!(
                target: "engine::execute",
                step,
                formula = formula.name(),
                %assumption,
                "formula assumption not satisfied"
            ),
            AssumptionAction::Error => {
                return Err(ExecError::UnsatisfiedAssumption {
                    step: step as u32,
                    formula: formula.name().to_string(),
                    assumption: assumption.to_string(),
                })
            }
        }
    }
    Ok(())
}
