//! Leakage simulation: executes plans and turns every elementary operation
//! into samples.

use std::sync::Arc;

use curve::AffinePoint;
use engine::{ExecutionEngine, ExecutionPlan, OpEvent, OpObserver};
use num_bigint::BigUint;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::config::SimulationConfig;
use crate::error::SimulationError;
use crate::leakage::{Leaker, LeakageModel};
use crate::trace::{SampleOrigin, Trace, TraceSet};

/// Traces produced by a batch, in input order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchOutcome {
    pub traces: TraceSet,
    /// Input index of every trace.
    pub indices: Vec<usize>,
    /// Whether the batch stopped early; `traces` then holds only the items
    /// finished before cancellation.
    pub cancelled: bool,
}

#[derive(Debug)]
pub struct LeakageSimulator {
    engine: Arc<ExecutionEngine>,
    model: LeakageModel,
    config: SimulationConfig,
}

struct TraceRecorder<'r, R: ?Sized> {
    leaker: Leaker<'r, R>,
    samples: Vec<f64>,
    origins: Vec<SampleOrigin>,
}

impl<R: Rng + ?Sized> OpObserver for TraceRecorder<'_, R> {
    fn on_op(&mut self, event: OpEvent<'_>) {
        let (samples, origins) = (&mut self.samples, &mut self.origins);
        self.leaker.leak(event.value, |lane, sample| {
            samples.push(sample);
            origins.push(SampleOrigin::new(event.step, event.node, lane));
        });
    }
}

impl LeakageSimulator {
    pub fn new(
        engine: Arc<ExecutionEngine>,
        model: LeakageModel,
        config: SimulationConfig,
    ) -> Result<Self, SimulationError> {
        model.validate()?;
        Ok(Self { engine, model, config })
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    pub fn model(&self) -> &LeakageModel {
        &self.model
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulates one execution of `plan` on `scalar * point`. Samples follow
    /// the plan's evaluation order; the trace records the input point and the
    /// scalar.
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        plan: &ExecutionPlan,
        point: &AffinePoint,
        scalar: &BigUint,
        rng: &mut R,
    ) -> Result<Trace, SimulationError> {
        let mut recorder = TraceRecorder {
            leaker: Leaker::new(&self.model, plan.curve().modulus().bits(), rng)?,
            samples: Vec::new(),
            origins: Vec::new(),
        };
        self.engine
            .evaluate_observed(plan, point, scalar, &mut recorder)?;
        Ok(Trace::new(recorder.samples, recorder.origins)?
            .with_input(point.clone())
            .with_scalar(scalar.clone()))
    }

    /// Simulates every `(point, scalar)` input. Trace `i` draws its noise
    /// from a generator seeded with `(seed, i)`, so the outcome does not
    /// depend on scheduling. Items not yet started when `cancel` fires are
    /// skipped.
    pub fn simulate_batch(
        &self,
        plan: &ExecutionPlan,
        inputs: &[(AffinePoint, BigUint)],
        seed: u64,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, SimulationError> {
        let item = |(index, (point, scalar)): (usize, &(AffinePoint, BigUint))| {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let mut rng = trace_rng(seed, index);
            self.simulate(plan, point, scalar, &mut rng).map(Some)
        };
        let results: Vec<Option<Trace>> = if self.config.parallel {
            inputs.par_iter().enumerate().map(item).collect::<Result<_, _>>()?
        } else {
            inputs.iter().enumerate().map(item).collect::<Result<_, _>>()?
        };

        let mut outcome = BatchOutcome::default();
        for (index, trace) in results.into_iter().enumerate() {
            match trace {
                Some(trace) => {
                    outcome.traces.push(trace);
                    outcome.indices.push(index);
                }
                None => outcome.cancelled = true,
            }
        }
        debug!(
            target: "sca::simulate",
            plan = %plan.id(),
            requested = inputs.len(),
            produced = outcome.traces.len(),
            cancelled = outcome.cancelled,
            "simulated batch"
        );
        Ok(outcome)
    }
}

fn trace_rng(seed: u64, index: usize) -> StdRng {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    bytes[8..16].copy_from_slice(&(index as u64).to_le_bytes());
    StdRng::from_seed(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leakage::{LeakageFunction, Noise};
    use curve::{Catalog, CoordinateSystem, CurveModel};
    use engine::{Algorithm, Composer, EngineConfig};

    fn setup(model: LeakageModel, parallel: bool) -> (LeakageSimulator, Arc<ExecutionPlan>) {
        let curve = Arc::new(CurveModel::secp256k1());
        let plan = Composer::new(Arc::new(Catalog::standard().unwrap()))
            .compose(&curve, CoordinateSystem::Jacobian, Algorithm::Ladder, 8)
            .unwrap();
        let engine = Arc::new(ExecutionEngine::new(EngineConfig::default()));
        let config = SimulationConfig { seed: 1, parallel };
        (LeakageSimulator::new(engine, model, config).unwrap(), plan)
    }

    #[test]
    fn test_limb_leakage_multiplies_samples() {
        let (hw, plan) = setup(LeakageModel::default(), false);
        let (limbs, _) = setup(
            LeakageModel::noiseless(LeakageFunction::LimbHammingWeights { limb_bits: 64 }),
            false,
        );
        let point = plan.curve().generator().clone();
        let scalar = BigUint::from(77u32);
        let mut rng = StdRng::seed_from_u64(42);

        let a = hw.simulate(&plan, &point, &scalar, &mut rng).unwrap();
        let b = limbs.simulate(&plan, &point, &scalar, &mut rng).unwrap();
        assert_eq!(b.len(), 4 * a.len());
        assert_eq!(b.origins()[3], SampleOrigin::new(a.origins()[0].step, a.origins()[0].node, 3));
        assert_eq!(a.input(), Some(&point));
        assert_eq!(a.scalar(), Some(&scalar));
    }

    #[test]
    fn test_batch_does_not_depend_on_scheduling() {
        let model = LeakageModel::new(LeakageFunction::HammingWeight, Noise::Gaussian { sigma: 1.0 }).unwrap();
        let (parallel, plan) = setup(model, true);
        let (serial, _) = setup(model, false);
        let mut rng = StdRng::seed_from_u64(42);
        let inputs: Vec<_> = (0..6u32)
            .map(|i| (plan.curve().random_point(&mut rng), BigUint::from(i * 40)))
            .collect();

        let token = CancellationToken::new();
        let a = parallel.simulate_batch(&plan, &inputs, 9, &token).unwrap();
        let b = serial.simulate_batch(&plan, &inputs, 9, &token).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.indices, vec![0, 1, 2, 3, 4, 5]);
        assert!(!a.cancelled);

        let c = serial.simulate_batch(&plan, &inputs, 10, &token).unwrap();
        assert_ne!(a.traces, c.traces);
    }

    #[test]
    fn test_cancelled_batch() {
        let (simulator, plan) = setup(LeakageModel::default(), true);
        let inputs = vec![(plan.curve().generator().clone(), BigUint::from(3u32)); 4];
        let token = CancellationToken::new();
        token.cancel();
        let outcome = simulator.simulate_batch(&plan, &inputs, 0, &token).unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.traces.is_empty());
    }

    #[test]
    fn test_evaluation_errors_propagate() {
        let (simulator, plan) = setup(LeakageModel::default(), false);
        let mut rng = StdRng::seed_from_u64(42);
        let result = simulator.simulate(&plan, plan.curve().generator(), &BigUint::from(256u32), &mut rng);
        assert!(matches!(result, Err(SimulationError::Exec(_))));
    }
}
