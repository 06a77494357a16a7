//! Execution plans: straight-line step sequences in SSA form.
//!
//! A plan wires formula applications together through [`Source`]s. The
//! scalar never appears in a plan; its digits are consumed at evaluation time
//! by guards and selections, so one plan serves every scalar of its bit
//! length.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use curve::{CoordinateSystem, CurveModel, Formula, Mod};
use serde::{Deserialize, Serialize};

use crate::algorithm::{Algorithm, DigitLayout};
use crate::error::ComposeError;

/// Short identity of a plan for logs: the 64-bit FNV-1a digest of its
/// canonical encoding. Stable across builds, but not collision-free; caches
/// key on [`ExecutionPlan::encoding`] instead.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub u64);

impl PlanId {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    fn of(bytes: &[u8]) -> Self {
        let digest = bytes
            .iter()
            .fold(Self::OFFSET, |h, b| (h ^ *b as u64).wrapping_mul(Self::PRIME));
        PlanId(digest)
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Where a step operand comes from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// The external input point.
    Input(u8),
    /// The neutral element of the plan's coordinate system.
    Neutral,
    /// Output point `output` of an earlier step.
    Step { step: u32, output: u8 },
}

/// Condition under which a formula step is evaluated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Guard {
    Always,
    DigitNonZero(u32),
    DigitEquals { digit: u32, value: i64 },
}

impl Guard {
    pub fn holds(&self, digits: &[i64]) -> bool {
        match *self {
            Guard::Always => true,
            Guard::DigitNonZero(d) => digits[d as usize] != 0,
            Guard::DigitEquals { digit, value } => digits[digit as usize] == value,
        }
    }

    pub fn digit(&self) -> Option<u32> {
        match *self {
            Guard::Always => None,
            Guard::DigitNonZero(d) | Guard::DigitEquals { digit: d, .. } => Some(d),
        }
    }
}

/// What a step contributes to the algorithm, for reporting and analysis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepRole {
    Neutral,
    Precompute,
    Double,
    Add,
    Ladder,
    Select,
    Normalize,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// Produces the neutral point.
    Neutral,
    /// Applies `formula` (an index into the plan's formula table). When the
    /// guard fails, `fallback` is forwarded as the outputs instead.
    Formula {
        formula: u16,
        operands: Vec<Source>,
        guard: Guard,
        fallback: Vec<Source>,
    },
    /// Forwards the source paired with the value of `digit`.
    Select {
        digit: u32,
        choices: Vec<(i64, Source)>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,
    pub role: StepRole,
    /// Digit whose iteration emitted the step.
    pub digit: Option<u32>,
}

/// How an input slot of a formula graph is filled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotBinding {
    Coordinate { point: u8, index: u8 },
    /// Curve or derived parameter, resolved when composing.
    Constant(Mod),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFormula {
    pub formula: Arc<Formula>,
    pub bindings: Vec<SlotBinding>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    #[serde(skip)]
    id: PlanId,
    #[serde(skip)]
    encoding: Arc<[u8]>,
    curve: Arc<CurveModel>,
    system: CoordinateSystem,
    algorithm: Algorithm,
    layout: DigitLayout,
    formulas: Vec<PlanFormula>,
    steps: Vec<Step>,
    output: Source,
    short_circuit: bool,
}

impl ExecutionPlan {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        curve: Arc<CurveModel>,
        system: CoordinateSystem,
        algorithm: Algorithm,
        layout: DigitLayout,
        formulas: Vec<PlanFormula>,
        steps: Vec<Step>,
        output: Source,
        short_circuit: bool,
    ) -> Result<Self, ComposeError> {
        let mut plan = Self {
            id: PlanId::default(),
            encoding: Arc::from(Vec::new()),
            curve,
            system,
            algorithm,
            layout,
            formulas,
            steps,
            output,
            short_circuit,
        };
        plan.validate()?;
        let bytes = plan.to_bytes()?;
        plan.id = PlanId::of(&bytes);
        plan.encoding = bytes.into();
        Ok(plan)
    }

    pub fn id(&self) -> PlanId {
        self.id
    }

    /// The canonical encoding, computed once when the plan is built.
    pub fn encoding(&self) -> &Arc<[u8]> {
        &self.encoding
    }

    pub fn curve(&self) -> &Arc<CurveModel> {
        &self.curve
    }

    pub fn system(&self) -> CoordinateSystem {
        self.system
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn layout(&self) -> &DigitLayout {
        &self.layout
    }

    pub fn bit_length(&self) -> u32 {
        self.layout.bit_length
    }

    pub fn formulas(&self) -> &[PlanFormula] {
        &self.formulas
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn output(&self) -> Source {
        self.output
    }

    /// Whether add and double steps forward the other operand when one
    /// operand is neutral.
    pub fn short_circuit(&self) -> bool {
        self.short_circuit
    }

    /// Number of output points of `step`.
    pub fn output_count(&self, step: usize) -> usize {
        match &self.steps[step].kind {
            StepKind::Neutral | StepKind::Select { .. } => 1,
            StepKind::Formula { formula, .. } => self.formulas[*formula as usize].formula.num_outputs(),
        }
    }

    /// Canonical byte encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ComposeError> {
        bincode::serialize(self).map_err(|e| ComposeError::Encoding(e.to_string()))
    }

    /// Checks that every source refers to an earlier step, every digit is in
    /// range, and the formula table matches the plan's coordinate system.
    pub fn validate(&self) -> Result<(), ComposeError> {
        let digits = self.layout.count;
        let malformed = |reason: String| Err(ComposeError::MalformedPlan(reason));

        for (i, entry) in self.formulas.iter().enumerate() {
            let formula = &entry.formula;
            if formula.system() != self.system {
                return malformed(format!(
                    "formula {i} (`{}`) is for {} coordinates",
                    formula.name(),
                    formula.system()
                ));
            }
            if entry.bindings.len() != formula.inputs().len() {
                return malformed(format!("formula {i} binds {} slots", entry.bindings.len()));
            }
            for binding in &entry.bindings {
                if let SlotBinding::Coordinate { point, index } = binding {
                    if *point as usize >= formula.num_inputs()
                        || *index as usize >= self.system.dimension()
                    {
                        return malformed(format!("formula {i} binds a missing coordinate"));
                    }
                }
            }
        }

        for (i, step) in self.steps.iter().enumerate() {
            match &step.kind {
                StepKind::Neutral => {}
                StepKind::Formula {
                    formula,
                    operands,
                    guard,
                    fallback,
                } => {
                    let Some(entry) = self.formulas.get(*formula as usize) else {
                        return malformed(format!("step {i} uses unknown formula {formula}"));
                    };
                    if operands.len() != entry.formula.num_inputs() {
                        return malformed(format!("step {i} has {} operands", operands.len()));
                    }
                    match guard.digit() {
                        None if !fallback.is_empty() => {
                            return malformed(format!("step {i} has a fallback but no guard"))
                        }
                        Some(d) if d >= digits => {
                            return malformed(format!("step {i} guards on missing digit {d}"))
                        }
                        Some(_) if fallback.len() != entry.formula.num_outputs() => {
                            return malformed(format!("step {i} has {} fallbacks", fallback.len()))
                        }
                        _ => {}
                    }
                    for source in operands.iter().chain(fallback) {
                        self.check_source(i, source)?;
                    }
                }
                StepKind::Select { digit, choices } => {
                    if *digit >= digits {
                        return malformed(format!("step {i} selects on missing digit {digit}"));
                    }
                    if choices.is_empty() {
                        return malformed(format!("step {i} selects from nothing"));
                    }
                    let mut seen = HashSet::new();
                    for (value, source) in choices {
                        if !seen.insert(*value) {
                            return malformed(format!("step {i} lists digit value {value} twice"));
                        }
                        self.check_source(i, source)?;
                    }
                }
            }
        }
        self.check_source(self.steps.len(), &self.output)
    }

    fn check_source(&self, step: usize, source: &Source) -> Result<(), ComposeError> {
        let valid = match *source {
            Source::Input(n) => n == 0,
            Source::Neutral => true,
            Source::Step { step: s, output } => {
                (s as usize) < step && (output as usize) < self.output_count(s as usize)
            }
        };
        if valid {
            Ok(())
        } else {
            Err(ComposeError::MalformedPlan(format!(
                "step {step} reads {source:?}, which is not yet defined"
            )))
        }
    }

    /// Digit dependencies of every step output and intermediate value.
    pub fn dependencies(&self) -> PlanDependencies {
        let masks: Vec<Vec<u64>> = self.formulas.iter().map(|f| f.formula.point_masks()).collect();
        let mut outputs: Vec<Vec<DigitSet>> = Vec::with_capacity(self.steps.len());
        let mut operands: Vec<Vec<DigitSet>> = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let read = |source: &Source| match *source {
                Source::Step { step, output } => outputs[step as usize][output as usize].clone(),
                Source::Input(_) | Source::Neutral => DigitSet::default(),
            };
            let (ins, outs) = match &step.kind {
                StepKind::Neutral => (Vec::new(), vec![DigitSet::default()]),
                StepKind::Formula {
                    formula,
                    operands: sources,
                    guard,
                    fallback,
                } => {
                    let ins: Vec<DigitSet> = sources.iter().map(read).collect();
                    let mut all = DigitSet::default();
                    for source in sources.iter().chain(fallback) {
                        all.union_with(&read(source));
                    }
                    if let Some(d) = guard.digit() {
                        all.insert(d);
                    }
                    let count = self.formulas[*formula as usize].formula.num_outputs();
                    (ins, vec![all; count])
                }
                StepKind::Select { digit, choices } => {
                    let mut all = DigitSet::singleton(*digit);
                    for (_, source) in choices {
                        all.union_with(&read(source));
                    }
                    (Vec::new(), vec![all])
                }
            };
            operands.push(ins);
            outputs.push(outs);
        }

        PlanDependencies {
            masks,
            outputs,
            operands,
        }
    }
}

/// Set of digit indices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DigitSet {
    words: Vec<u64>,
}

impl DigitSet {
    pub fn singleton(digit: u32) -> Self {
        let mut set = Self::default();
        set.insert(digit);
        set
    }

    pub fn insert(&mut self, digit: u32) {
        let word = digit as usize / 64;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (digit % 64);
    }

    pub fn contains(&self, digit: u32) -> bool {
        self.words
            .get(digit as usize / 64)
            .is_some_and(|w| w & (1u64 << (digit % 64)) != 0)
    }

    pub fn union_with(&mut self, other: &DigitSet) {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w |= o;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(i, w)| {
            (0..64u32)
                .filter(move |b| w & (1u64 << b) != 0)
                .map(move |b| i as u32 * 64 + b)
        })
    }
}

/// Result of [`ExecutionPlan::dependencies`].
#[derive(Clone, Debug)]
pub struct PlanDependencies {
    masks: Vec<Vec<u64>>,
    outputs: Vec<Vec<DigitSet>>,
    operands: Vec<Vec<DigitSet>>,
}

impl PlanDependencies {
    /// Digits that output point `output` of `step` depends on.
    pub fn output(&self, step: usize, output: usize) -> &DigitSet {
        &self.outputs[step][output]
    }

    /// Digits that node `node` of the formula evaluated at `step` depends
    /// on, including the digit guarding the step. `None` for steps that
    /// evaluate no formula.
    pub fn node(&self, plan: &ExecutionPlan, step: usize, node: usize) -> Option<DigitSet> {
        let StepKind::Formula { formula, guard, .. } = &plan.steps()[step].kind else {
            return None;
        };
        let mask = self.masks[*formula as usize][node];
        let mut set = DigitSet::default();
        for (point, deps) in self.operands[step].iter().enumerate() {
            if mask & (1u64 << point) != 0 {
                set.union_with(deps);
            }
        }
        if let Some(d) = guard.digit() {
            set.insert(d);
        }
        Some(set)
    }

    /// Operation nodes whose value depends on `target` and otherwise only on
    /// digits for which `known` holds, as `(step, node)` pairs in evaluation
    /// order.
    pub fn influenced(
        &self,
        plan: &ExecutionPlan,
        target: u32,
        known: impl Fn(u32) -> bool,
    ) -> Vec<(u32, u32)> {
        let mut positions = Vec::new();
        for (step, entry) in plan.steps().iter().enumerate() {
            let StepKind::Formula { formula, .. } = &entry.kind else {
                continue;
            };
            let graph = plan.formulas()[*formula as usize].formula.graph();
            for (id, node) in graph.iter() {
                if node.op().is_none() {
                    continue;
                }
                let Some(deps) = self.node(plan, step, id.index()) else {
                    continue;
                };
                if deps.contains(target) && deps.iter().all(|d| d == target || known(d)) {
                    positions.push((step as u32, id.0));
                }
            }
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_set() {
        let mut set = DigitSet::singleton(3);
        set.insert(130);
        assert!(set.contains(3) && set.contains(130));
        assert!(!set.contains(4));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 130]);

        let mut other = DigitSet::default();
        assert!(other.is_empty());
        other.union_with(&set);
        assert_eq!(other, set);
    }

    #[test]
    fn test_guard() {
        let digits = [0, 2, -1];
        assert!(Guard::Always.holds(&digits));
        assert!(!Guard::DigitNonZero(0).holds(&digits));
        assert!(Guard::DigitNonZero(2).holds(&digits));
        assert!(Guard::DigitEquals { digit: 1, value: 2 }.holds(&digits));
        assert_eq!(Guard::DigitNonZero(2).digit(), Some(2));
    }

    #[test]
    fn test_plan_id_display() {
        assert_eq!(PlanId(0xabc).to_string(), "0000000000000abc");
    }

    #[test]
    fn test_plan_id_is_stable() {
        assert_eq!(PlanId::of(b""), PlanId(0xcbf29ce484222325));
        assert_eq!(PlanId::of(b"a"), PlanId(0xaf63dc4c8601ec8c));
        assert_eq!(PlanId::of(b"foobar"), PlanId(0x85944171f73967e8));
    }
}
