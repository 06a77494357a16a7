use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use curve::{AffinePoint, BigUintField, FieldBackend, Point};
use num_bigint::BigUint;
use parking_lot::Mutex;
use tracing::warn;

use crate::codegen::{CodegenBackend, LimbBackend};
use crate::compiled::CompiledPlan;
use crate::config::{EngineConfig, Strategy};
use crate::error::ExecError;
use crate::interpret::Interpreter;
use crate::plan::ExecutionPlan;
use crate::runtime::{self, Elem, OpObserver, Run, StepExecutor};

type CompileCell = Arc<OnceLock<Option<Arc<CompiledPlan>>>>;

/// Evaluates execution plans.
///
/// With [`Strategy::Compiled`] every plan is compiled once, on first use.
/// A plan that fails to compile is interpreted from then on; the failure is
/// logged once and never retried. Compiled plans are kept, keyed on the
/// plan's canonical encoding, until [`ExecutionEngine::clear_compiled`].
pub struct ExecutionEngine {
    config: EngineConfig,
    backend: Arc<dyn CodegenBackend>,
    compiled: Mutex<HashMap<Arc<[u8]>, CompileCell>>,
    compilations: AtomicUsize,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let backend = Arc::new(LimbBackend::new(config.max_kernel_instructions));
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: EngineConfig, backend: Arc<dyn CodegenBackend>) -> Self {
        Self {
            config,
            backend,
            compiled: Mutex::new(HashMap::new()),
            compilations: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn CodegenBackend {
        self.backend.as_ref()
    }

    /// Computes `scalar * point`.
    pub fn evaluate(&self, plan: &ExecutionPlan, point: &AffinePoint, scalar: &BigUint) -> Result<Point, ExecError> {
        let digits = plan.layout().recode(scalar)?;
        self.evaluate_digits(plan, point, &digits)
    }

    /// Like [`ExecutionEngine::evaluate`], reporting every field operation.
    pub fn evaluate_observed(
        &self,
        plan: &ExecutionPlan,
        point: &AffinePoint,
        scalar: &BigUint,
        observer: &mut dyn OpObserver,
    ) -> Result<Point, ExecError> {
        let digits = plan.layout().recode(scalar)?;
        self.evaluate_digits_observed(plan, point, &digits, observer)
    }

    /// Runs the plan on an explicit digit vector.
    pub fn evaluate_digits(&self, plan: &ExecutionPlan, point: &AffinePoint, digits: &[i64]) -> Result<Point, ExecError> {
        self.execute(plan, point, digits, None, None)
            .map(|p| p.unwrap_or_else(|| Point::neutral(plan.system(), plan.curve().modulus())))
    }

    pub fn evaluate_digits_observed(
        &self,
        plan: &ExecutionPlan,
        point: &AffinePoint,
        digits: &[i64],
        observer: &mut dyn OpObserver,
    ) -> Result<Point, ExecError> {
        self.execute(plan, point, digits, Some(observer), None)
            .map(|p| p.unwrap_or_else(|| Point::neutral(plan.system(), plan.curve().modulus())))
    }

    /// Runs steps up to and including `last`, reporting their operations.
    /// Digits consumed only by later steps are ignored.
    pub fn observe_prefix(
        &self,
        plan: &ExecutionPlan,
        point: &AffinePoint,
        digits: &[i64],
        last: usize,
        observer: &mut dyn OpObserver,
    ) -> Result<(), ExecError> {
        self.execute(plan, point, digits, Some(observer), Some(last))
            .map(|_| ())
    }

    /// The compiled form of `plan`, compiling it on first request. `None`
    /// when compilation failed.
    pub fn compiled(&self, plan: &ExecutionPlan) -> Option<Arc<CompiledPlan>> {
        let cell = self
            .compiled
            .lock()
            .entry(plan.encoding().clone())
            .or_default()
            .clone();
        cell.get_or_init(|| {
            self.compilations.fetch_add(1, Ordering::Relaxed);
            match CompiledPlan::build(plan, self.backend.as_ref()) {
                Ok(compiled) => Some(Arc::new(compiled)),
                Err(error) => {
                    warn!(
                        target: "engine::compile",
                        plan = %plan.id(),
                        backend = self.backend.name(),
                        %error,
                        "compilation failed, interpreting plan"
                    );
                    None
                }
            }
        })
        .clone()
    }

    /// Number of compilations attempted so far.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Number of plans with a cached compilation result.
    pub fn compiled_plans(&self) -> usize {
        self.compiled.lock().len()
    }

    /// Drops every cached compilation, including cached failures. Plans
    /// are compiled again on their next use; evaluations already holding a
    /// compiled plan finish with it.
    pub fn clear_compiled(&self) {
        self.compiled.lock().clear();
    }

    fn execute(
        &self,
        plan: &ExecutionPlan,
        point: &AffinePoint,
        digits: &[i64],
        observer: Option<&mut dyn OpObserver>,
        stop_after: Option<usize>,
    ) -> Result<Option<Point>, ExecError> {
        let curve = plan.curve();
        if !curve.contains(point) {
            return Err(ExecError::PointNotOnCurve {
                curve: curve.name().to_string(),
            });
        }
        let expected = plan.layout().count as usize;
        if digits.len() != expected {
            return Err(ExecError::DigitCount {
                expected,
                found: digits.len(),
            });
        }
        let alphabet = plan.layout().alphabet();
        if let Some((digit, &value)) = digits.iter().enumerate().find(|(_, d)| !alphabet.contains(d)) {
            return Err(ExecError::DigitOutOfRange {
                digit: digit as u32,
                value,
            });
        }
        let input = Point::from_affine(plan.system(), curve, point)?;
        let options = Run {
            digits,
            assumptions: self.config.assumptions,
            observer,
            stop_after,
        };

        if self.config.strategy == Strategy::Compiled {
            if let Some(compiled) = self.compiled(plan) {
                return finish(plan, compiled.as_ref(), &input, options);
            }
        }
        let interpreter = Interpreter::new(plan, BigUintField::new(curve.modulus().clone()));
        finish(plan, &interpreter, &input, options)
    }
}

fn finish<X: StepExecutor>(
    plan: &ExecutionPlan,
    exec: &X,
    input: &Point,
    options: Run<'_, '_>,
) -> Result<Option<Point>, ExecError> {
    let field = exec.field();
    let coords: Vec<Elem<X>> = input.coords().iter().map(|c| field.from_mod(c)).collect();
    let Some(output) = runtime::run(plan, exec, &coords, options)? else {
        return Ok(None);
    };
    let coords = output.iter().map(|e| field.to_mod(e)).collect();
    Ok(Some(Point::new(plan.system(), coords)?))
}

impl fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .field("compiled", &self.compiled.lock().len())
            .finish()
    }
}
