use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use curve::{Catalog, CoordinateSystem, CurveModel, Formula, FormulaError, FormulaInput, Mod, OperationKind};
use parking_lot::Mutex;
use tracing::debug;

use crate::algorithm::{Algorithm, Direction, DigitLayout};
use crate::error::ComposeError;
use crate::plan::{ExecutionPlan, Guard, PlanFormula, SlotBinding, Source, Step, StepKind, StepRole};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PlanKey {
    /// Canonical encoding of the curve model.
    curve: Vec<u8>,
    system: CoordinateSystem,
    algorithm: Algorithm,
    bit_length: u32,
}

/// Turns (curve, coordinate system, algorithm, bit length) into execution
/// plans.
///
/// Formulas default to the catalog's first entry per operation whose curve
/// assumptions hold; [`Composer::with_formula`] picks a specific one by
/// name. Composed plans are cached.
#[derive(Debug)]
pub struct Composer {
    catalog: Arc<Catalog>,
    overrides: BTreeMap<OperationKind, String>,
    short_circuit: Option<bool>,
    normalize: bool,
    cache: Mutex<HashMap<PlanKey, Arc<ExecutionPlan>>>,
}

impl Composer {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            overrides: BTreeMap::new(),
            short_circuit: None,
            normalize: false,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Uses the formula called `name` for every `kind` step.
    pub fn with_formula(mut self, kind: OperationKind, name: impl Into<String>) -> Self {
        self.overrides.insert(kind, name.into());
        self.cache.get_mut().clear();
        self
    }

    /// Forces neutral short-circuiting on or off. By default it is enabled
    /// exactly when a selected add or double formula is incomplete.
    ///
    /// Variable-time plans skip the formula evaluation on a neutral operand.
    /// Constant-time plans still evaluate it and discard the result, so
    /// their operation sequence does not depend on the scalar.
    pub fn with_short_circuit(mut self, enabled: bool) -> Self {
        self.short_circuit = Some(enabled);
        self.cache.get_mut().clear();
        self
    }

    /// Appends a `Scale` step so results come out with Z = 1.
    pub fn with_normalization(mut self, enabled: bool) -> Self {
        self.normalize = enabled;
        self.cache.get_mut().clear();
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn cached_plans(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn compose(
        &self,
        curve: &Arc<CurveModel>,
        system: CoordinateSystem,
        algorithm: Algorithm,
        bit_length: u32,
    ) -> Result<Arc<ExecutionPlan>, ComposeError> {
        let key = PlanKey {
            curve: bincode::serialize(curve.as_ref()).map_err(|e| ComposeError::Encoding(e.to_string()))?,
            system,
            algorithm,
            bit_length,
        };
        if let Some(plan) = self.cache.lock().get(&key) {
            return Ok(plan.clone());
        }

        let plan = Arc::new(self.build(curve, system, algorithm, bit_length)?);
        debug!(
            target: "engine::compose",
            plan = %plan.id(),
            curve = curve.name(),
            %system,
            %algorithm,
            bit_length,
            steps = plan.steps().len(),
            formulas = plan.formulas().len(),
            "composed plan"
        );
        Ok(self.cache.lock().entry(key).or_insert(plan).clone())
    }

    fn build(
        &self,
        curve: &Arc<CurveModel>,
        system: CoordinateSystem,
        algorithm: Algorithm,
        bit_length: u32,
    ) -> Result<ExecutionPlan, ComposeError> {
        algorithm.validate()?;
        let layout = algorithm.layout(bit_length);
        let mut table = FormulaTable {
            composer: self,
            curve,
            system,
            entries: Vec::new(),
            index: BTreeMap::new(),
        };
        let mut builder = PlanBuilder::default();

        let mut output = if layout.count == 0 {
            builder.neutral()
        } else {
            emit(algorithm, &layout, &mut table, &mut builder)?
        };
        if self.normalize && layout.count > 0 {
            let scale = table.get(OperationKind::Scale)?;
            output = builder.apply(scale, vec![output], StepRole::Normalize, None);
        }

        let short_circuit = self.short_circuit.unwrap_or_else(|| {
            table
                .index
                .iter()
                .any(|(kind, f)| matches!(kind, OperationKind::Add | OperationKind::Double) && !f.complete)
        });

        ExecutionPlan::new(
            curve.clone(),
            system,
            algorithm,
            layout,
            table.entries,
            builder.steps,
            output,
            short_circuit,
        )
    }
}

#[derive(Copy, Clone, Debug)]
struct FormulaRef {
    index: u16,
    outputs: usize,
    complete: bool,
}

/// The plan's formula table, filled on first use of each operation.
struct FormulaTable<'a> {
    composer: &'a Composer,
    curve: &'a CurveModel,
    system: CoordinateSystem,
    entries: Vec<PlanFormula>,
    index: BTreeMap<OperationKind, FormulaRef>,
}

impl FormulaTable<'_> {
    fn get(&mut self, kind: OperationKind) -> Result<FormulaRef, ComposeError> {
        if let Some(found) = self.index.get(&kind) {
            return Ok(*found);
        }

        let (formula, bound) = match self.composer.overrides.get(&kind) {
            Some(name) => self.named(kind, name)?,
            None => self.default(kind)?,
        };

        let mut bindings = Vec::with_capacity(formula.inputs().len());
        for (input, value) in formula.inputs().iter().zip(bound) {
            let binding = match (input, value) {
                (FormulaInput::Coordinate { point, index }, _) => SlotBinding::Coordinate {
                    point: *point,
                    index: *index,
                },
                (FormulaInput::Parameter(_), Some(value)) => SlotBinding::Constant(value),
                (FormulaInput::Parameter(p), None) => {
                    return Err(ComposeError::MalformedPlan(format!(
                        "parameter `{p}` of `{}` is unbound",
                        formula.name()
                    )))
                }
            };
            bindings.push(binding);
        }

        let found = FormulaRef {
            index: self.entries.len() as u16,
            outputs: formula.num_outputs(),
            complete: formula.is_complete(),
        };
        self.entries.push(PlanFormula { formula, bindings });
        self.index.insert(kind, found);
        Ok(found)
    }

    /// Like [`FormulaTable::get`], but `None` when the catalog has no formula
    /// for `kind` and none was requested by name.
    fn try_get(&mut self, kind: OperationKind) -> Result<Option<FormulaRef>, ComposeError> {
        match self.get(kind) {
            Ok(found) => Ok(Some(found)),
            Err(ComposeError::Formula(FormulaError::UnsupportedCombination { .. }))
                if !self.composer.overrides.contains_key(&kind) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn named(
        &self,
        kind: OperationKind,
        name: &str,
    ) -> Result<(Arc<Formula>, Vec<Option<Mod>>), ComposeError> {
        let formula = self
            .composer
            .catalog
            .named(name, self.system, self.curve.shape())?;
        if formula.kind() != kind {
            return Err(ComposeError::WrongKind {
                name: name.to_string(),
                expected: kind,
                found: formula.kind(),
            });
        }
        match formula.bind_parameters(self.curve) {
            Ok(bound) => Ok((formula, bound)),
            Err(FormulaError::UnsatisfiedAssumption { assumption, .. }) => {
                debug!(
                    target: "engine::compose",
                    formula = name,
                    curve = self.curve.name(),
                    %assumption,
                    "requested formula does not fit the curve"
                );
                Err(self.unsupported(kind))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn default(&self, kind: OperationKind) -> Result<(Arc<Formula>, Vec<Option<Mod>>), ComposeError> {
        let shape = self.curve.shape();
        for formula in self.composer.catalog.formulas(kind, self.system, shape) {
            match formula.bind_parameters(self.curve) {
                Ok(bound) => return Ok((formula.clone(), bound)),
                Err(FormulaError::UnsatisfiedAssumption { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(self.unsupported(kind))
    }

    fn unsupported(&self, kind: OperationKind) -> ComposeError {
        FormulaError::UnsupportedCombination {
            kind,
            system: self.system,
            shape: self.curve.shape(),
        }
        .into()
    }
}

#[derive(Default)]
struct PlanBuilder {
    steps: Vec<Step>,
}

impl PlanBuilder {
    fn push(&mut self, kind: StepKind, role: StepRole, digit: Option<u32>) -> u32 {
        self.steps.push(Step { kind, role, digit });
        (self.steps.len() - 1) as u32
    }

    fn neutral(&mut self) -> Source {
        let step = self.push(StepKind::Neutral, StepRole::Neutral, None);
        Source::Step { step, output: 0 }
    }

    fn apply_all(
        &mut self,
        formula: FormulaRef,
        operands: Vec<Source>,
        role: StepRole,
        digit: Option<u32>,
    ) -> Vec<Source> {
        let kind = StepKind::Formula {
            formula: formula.index,
            operands,
            guard: Guard::Always,
            fallback: Vec::new(),
        };
        let step = self.push(kind, role, digit);
        (0..formula.outputs as u8)
            .map(|output| Source::Step { step, output })
            .collect()
    }

    fn apply(&mut self, formula: FormulaRef, operands: Vec<Source>, role: StepRole, digit: Option<u32>) -> Source {
        self.apply_all(formula, operands, role, digit)[0]
    }

    fn apply_guarded(
        &mut self,
        formula: FormulaRef,
        operands: Vec<Source>,
        guard: Guard,
        fallback: Source,
        role: StepRole,
    ) -> Source {
        let kind = StepKind::Formula {
            formula: formula.index,
            operands,
            guard,
            fallback: vec![fallback],
        };
        let step = self.push(kind, role, guard.digit());
        Source::Step { step, output: 0 }
    }

    fn select(&mut self, digit: u32, choices: Vec<(i64, Source)>) -> Source {
        let step = self.push(StepKind::Select { digit, choices }, StepRole::Select, Some(digit));
        Source::Step { step, output: 0 }
    }
}

#[derive(Copy, Clone)]
enum LadderOps {
    Step(FormulaRef),
    Split { dbl: FormulaRef, add: FormulaRef },
}

/// Emits the steps of `algorithm` and returns the source of the result.
fn emit(
    algorithm: Algorithm,
    layout: &DigitLayout,
    table: &mut FormulaTable<'_>,
    b: &mut PlanBuilder,
) -> Result<Source, ComposeError> {
    use OperationKind::*;

    let base = Source::Input(0);
    let n = layout.count;

    let result = match algorithm {
        Algorithm::DoubleAndAdd {
            direction: Direction::LeftToRight,
            always,
        } => {
            let dbl = table.get(Double)?;
            let add = table.get(Add)?;
            let mut r = b.neutral();
            for j in 0..n {
                let d = b.apply(dbl, vec![r], StepRole::Double, Some(j));
                r = if always {
                    let a = b.apply(add, vec![d, base], StepRole::Add, Some(j));
                    b.select(j, vec![(0, d), (1, a)])
                } else {
                    b.apply_guarded(add, vec![d, base], Guard::DigitNonZero(j), d, StepRole::Add)
                };
            }
            r
        }
        Algorithm::DoubleAndAdd {
            direction: Direction::RightToLeft,
            always,
        } => {
            let dbl = table.get(Double)?;
            let add = table.get(Add)?;
            let mut r = b.neutral();
            let mut q = base;
            for j in 0..n {
                r = if always {
                    let a = b.apply(add, vec![r, q], StepRole::Add, Some(j));
                    b.select(j, vec![(0, r), (1, a)])
                } else {
                    b.apply_guarded(add, vec![r, q], Guard::DigitNonZero(j), r, StepRole::Add)
                };
                if j + 1 < n {
                    q = b.apply(dbl, vec![q], StepRole::Double, Some(j));
                }
            }
            r
        }
        Algorithm::Ladder => {
            let step = match table.try_get(LadderStep)? {
                Some(ladder) => LadderOps::Step(ladder),
                None => LadderOps::Split {
                    dbl: table.get(Double)?,
                    add: table.get(Add)?,
                },
            };
            let mut r0 = b.neutral();
            let mut r1 = base;
            for j in 0..n {
                // swap so the doubled point is always the first operand
                let t0 = b.select(j, vec![(0, r0), (1, r1)]);
                let t1 = b.select(j, vec![(0, r1), (1, r0)]);
                let (doubled, sum) = match step {
                    LadderOps::Step(ladder) => {
                        let out = b.apply_all(ladder, vec![base, t0, t1], StepRole::Ladder, Some(j));
                        (out[0], out[1])
                    }
                    LadderOps::Split { dbl, add } => {
                        let doubled = b.apply(dbl, vec![t0], StepRole::Double, Some(j));
                        let sum = b.apply(add, vec![t0, t1], StepRole::Add, Some(j));
                        (doubled, sum)
                    }
                };
                r0 = b.select(j, vec![(0, doubled), (1, sum)]);
                r1 = b.select(j, vec![(0, sum), (1, doubled)]);
            }
            r0
        }
        Algorithm::FixedWindow { width } => {
            let dbl = table.get(Double)?;
            let add = table.get(Add)?;
            let size = 1usize << width;
            let mut multiples = vec![Source::Neutral, base];
            for k in 2..size {
                let entry = if k % 2 == 0 {
                    b.apply(dbl, vec![multiples[k / 2]], StepRole::Precompute, None)
                } else {
                    b.apply(add, vec![multiples[k - 1], base], StepRole::Precompute, None)
                };
                multiples.push(entry);
            }

            let mut r = b.neutral();
            for j in 0..n {
                for _ in 0..width {
                    r = b.apply(dbl, vec![r], StepRole::Double, Some(j));
                }
                let choices = multiples
                    .iter()
                    .enumerate()
                    .map(|(k, source)| (k as i64, *source))
                    .collect();
                let chosen = b.select(j, choices);
                r = b.apply(add, vec![r, chosen], StepRole::Add, Some(j));
            }
            r
        }
        Algorithm::SignedWindow { width } => {
            let dbl = table.get(Double)?;
            let add = table.get(Add)?;
            let neg = table.get(Negate)?;

            // odd multiples P, 3P, .., (2^(w-1) - 1)P and their negations
            let largest = (1i64 << (width - 1)) - 1;
            let mut odd = vec![(1i64, base)];
            if largest > 1 {
                let twice = b.apply(dbl, vec![base], StepRole::Precompute, None);
                let mut k = 3;
                while k <= largest {
                    let previous = odd[odd.len() - 1].1;
                    odd.push((k, b.apply(add, vec![previous, twice], StepRole::Precompute, None)));
                    k += 2;
                }
            }
            let mut choices = Vec::with_capacity(2 * odd.len() + 1);
            for (k, source) in odd.iter().rev() {
                let negated = b.apply(neg, vec![*source], StepRole::Precompute, None);
                choices.push((-k, negated));
            }
            choices.push((0, Source::Neutral));
            choices.extend(odd.iter().copied());

            let mut r = b.neutral();
            for j in 0..n {
                let d = b.apply(dbl, vec![r], StepRole::Double, Some(j));
                let chosen = b.select(j, choices.clone());
                r = b.apply_guarded(add, vec![d, chosen], Guard::DigitNonZero(j), d, StepRole::Add);
            }
            r
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer() -> Composer {
        Composer::new(Arc::new(Catalog::standard().unwrap()))
    }

    fn ltr(always: bool) -> Algorithm {
        Algorithm::DoubleAndAdd {
            direction: Direction::LeftToRight,
            always,
        }
    }

    #[test]
    fn test_compose_is_deterministic() {
        let curve = Arc::new(CurveModel::secp256r1());
        let a = composer()
            .compose(&curve, CoordinateSystem::Projective, ltr(true), 16)
            .unwrap();
        let b = composer()
            .compose(&curve, CoordinateSystem::Projective, ltr(true), 16)
            .unwrap();
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_plan_cache() {
        let curve = Arc::new(CurveModel::secp256r1());
        let composer = composer();
        let a = composer
            .compose(&curve, CoordinateSystem::Jacobian, Algorithm::Ladder, 8)
            .unwrap();
        let b = composer
            .compose(&curve, CoordinateSystem::Jacobian, Algorithm::Ladder, 8)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(composer.cached_plans(), 1);

        let c = composer
            .compose(&curve, CoordinateSystem::Jacobian, Algorithm::Ladder, 9)
            .unwrap();
        assert_ne!(a.id(), c.id());
        assert_eq!(composer.cached_plans(), 2);
    }

    #[test]
    fn test_zero_bit_length() {
        let curve = Arc::new(CurveModel::secp256k1());
        let plan = composer()
            .compose(&curve, CoordinateSystem::Projective, Algorithm::SignedWindow { width: 4 }, 0)
            .unwrap();
        assert_eq!(plan.steps().len(), 1);
        assert_eq!(plan.steps()[0].kind, StepKind::Neutral);
    }

    #[test]
    fn test_step_counts() {
        let curve = Arc::new(CurveModel::secp256r1());
        let composer = composer();
        let system = CoordinateSystem::Projective;

        // neutral + (dbl, add) per bit
        let plan = composer.compose(&curve, system, ltr(false), 10).unwrap();
        assert_eq!(plan.steps().len(), 1 + 2 * 10);

        // neutral + (dbl, add, select) per bit
        let plan = composer.compose(&curve, system, ltr(true), 10).unwrap();
        assert_eq!(plan.steps().len(), 1 + 3 * 10);

        // 14 table entries + neutral + 3 windows of (4 dbl, select, add)
        let plan = composer
            .compose(&curve, system, Algorithm::FixedWindow { width: 4 }, 10)
            .unwrap();
        assert_eq!(plan.steps().len(), 14 + 1 + 3 * 6);
    }

    #[test]
    fn test_montgomery_ladder_uses_ladder_step() {
        let curve = Arc::new(CurveModel::curve25519());
        let plan = composer()
            .compose(&curve, CoordinateSystem::Xz, Algorithm::Ladder, 8)
            .unwrap();
        assert_eq!(plan.formulas().len(), 1);
        assert_eq!(plan.formulas()[0].formula.kind(), OperationKind::LadderStep);
        assert!(!plan.short_circuit());
        assert!(plan
            .steps()
            .iter()
            .all(|s| !matches!(s.kind, StepKind::Formula { guard, .. } if guard != Guard::Always)));
    }

    #[test]
    fn test_unsupported_combination() {
        let curve = Arc::new(CurveModel::curve25519());
        let err = composer()
            .compose(&curve, CoordinateSystem::Xz, ltr(false), 8)
            .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::Formula(FormulaError::UnsupportedCombination { .. })
        ));

        let edwards = Arc::new(CurveModel::ed25519());
        let err = composer()
            .compose(&edwards, CoordinateSystem::Projective, ltr(false), 8)
            .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::Formula(FormulaError::UnsupportedCombination { .. })
        ));
    }

    #[test]
    fn test_parameter_assumption_checked_when_composing() {
        let composer = composer().with_formula(OperationKind::Double, "dbl-2001-b");
        let p256 = Arc::new(CurveModel::secp256r1());
        let plan = composer
            .compose(&p256, CoordinateSystem::Jacobian, ltr(false), 8)
            .unwrap();
        assert!(plan.formulas().iter().any(|f| f.formula.name() == "dbl-2001-b"));

        let k256 = Arc::new(CurveModel::secp256k1());
        assert!(matches!(
            composer.compose(&k256, CoordinateSystem::Jacobian, ltr(false), 8),
            Err(ComposeError::Formula(FormulaError::UnsupportedCombination { .. }))
        ));
    }

    #[test]
    fn test_wrong_kind_override() {
        let curve = Arc::new(CurveModel::secp256r1());
        let composer = composer().with_formula(OperationKind::Add, "dbl-2007-bl");
        assert!(matches!(
            composer.compose(&curve, CoordinateSystem::Jacobian, ltr(false), 8),
            Err(ComposeError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_short_circuit_default() {
        let curve = Arc::new(CurveModel::secp256r1());
        let complete = composer()
            .compose(&curve, CoordinateSystem::Projective, ltr(false), 8)
            .unwrap();
        assert!(!complete.short_circuit());

        let incomplete = composer()
            .compose(&curve, CoordinateSystem::Jacobian, ltr(false), 8)
            .unwrap();
        assert!(incomplete.short_circuit());

        let forced = composer()
            .with_short_circuit(false)
            .compose(&curve, CoordinateSystem::Jacobian, ltr(false), 8)
            .unwrap();
        assert!(!forced.short_circuit());
    }

    #[test]
    fn test_invalid_window() {
        let curve = Arc::new(CurveModel::secp256r1());
        assert!(matches!(
            composer().compose(&curve, CoordinateSystem::Projective, Algorithm::FixedWindow { width: 9 }, 8),
            Err(ComposeError::InvalidAlgorithm { .. })
        ));
    }

    #[test]
    fn test_normalization_appends_scale() {
        let curve = Arc::new(CurveModel::secp256r1());
        let plan = composer()
            .with_normalization(true)
            .compose(&curve, CoordinateSystem::Jacobian, Algorithm::Ladder, 4)
            .unwrap();
        let last = plan.steps().last().unwrap();
        assert_eq!(last.role, StepRole::Normalize);
        assert_eq!(plan.output(), Source::Step { step: plan.steps().len() as u32 - 1, output: 0 });
    }

    #[test]
    fn test_dependencies_follow_digits() {
        let curve = Arc::new(CurveModel::secp256r1());
        let plan = composer()
            .compose(&curve, CoordinateSystem::Projective, ltr(true), 4)
            .unwrap();
        let deps = plan.dependencies();
        let Source::Step { step, output } = plan.output() else {
            panic!("output is a step");
        };
        assert_eq!(deps.output(step as usize, output as usize).iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);

        // with digits 0 and 1 known, digit 2 first shows up in iteration 3,
        // whose doubling reads the state selected by digit 2
        let positions = deps.influenced(&plan, 2, |d| d < 2);
        assert!(!positions.is_empty());
        assert!(positions
            .iter()
            .all(|(s, _)| plan.steps()[*s as usize].digit == Some(3)));
        assert!(positions
            .iter()
            .any(|(s, _)| plan.steps()[*s as usize].role == StepRole::Double));
        // digit 3 is unknown, so nothing after iteration 3 qualifies
        assert!(deps.influenced(&plan, 2, |_| false).is_empty());
    }
}
