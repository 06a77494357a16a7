//! Sources of traces: simulation, replay, and measurement scopes.

use std::sync::Arc;
use std::time::Duration;

use curve::AffinePoint;
use engine::ExecutionPlan;
use num_bigint::BigUint;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::AcquisitionError;
use crate::simulate::LeakageSimulator;
use crate::trace::{SampleOrigin, Trace, TraceSet};

pub trait TraceSource {
    fn next_trace(&mut self) -> Result<Trace, AcquisitionError>;

    /// Collects `n` traces, stopping at the first error.
    fn acquire(&mut self, n: usize) -> Result<TraceSet, AcquisitionError> {
        (0..n).map(|_| self.next_trace()).collect()
    }
}

/// Simulated executions of one plan with a fixed secret scalar on random
/// public points.
#[derive(Debug)]
pub struct SimulatedSource {
    simulator: Arc<LeakageSimulator>,
    plan: Arc<ExecutionPlan>,
    scalar: BigUint,
    rng: StdRng,
}

impl SimulatedSource {
    /// Seeded from the simulator's configuration.
    pub fn new(simulator: Arc<LeakageSimulator>, plan: Arc<ExecutionPlan>, scalar: BigUint) -> Self {
        let rng = StdRng::seed_from_u64(simulator.config().seed);
        Self {
            simulator,
            plan,
            scalar,
            rng,
        }
    }
}

impl TraceSource for SimulatedSource {
    fn next_trace(&mut self) -> Result<Trace, AcquisitionError> {
        let point = self.plan.curve().random_point(&mut self.rng);
        Ok(self
            .simulator
            .simulate(&self.plan, &point, &self.scalar, &mut self.rng)?)
    }
}

/// Replays previously recorded traces in order.
#[derive(Debug)]
pub struct ReplaySource {
    traces: std::vec::IntoIter<Trace>,
    produced: usize,
}

impl ReplaySource {
    pub fn new(traces: impl Into<TraceSet>) -> Self {
        let traces: TraceSet = traces.into();
        Self {
            traces: traces.into_iter(),
            produced: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.traces.len()
    }
}

impl TraceSource for ReplaySource {
    fn next_trace(&mut self) -> Result<Trace, AcquisitionError> {
        let trace = self.traces.next().ok_or(AcquisitionError::Exhausted {
            produced: self.produced,
        })?;
        self.produced += 1;
        Ok(trace)
    }
}

/// A measurement instrument.
pub trait Scope {
    fn open(&mut self) -> Result<(), AcquisitionError>;

    /// Prepares the next capture.
    fn arm(&mut self) -> Result<(), AcquisitionError>;

    /// Waits for the trigger. `false` when `timeout` elapsed first.
    fn capture(&mut self, timeout: Duration) -> Result<bool, AcquisitionError>;

    /// Samples of the last capture on `channel`, if any.
    fn retrieve(&mut self, channel: &str) -> Result<Option<Vec<f64>>, AcquisitionError>;

    fn close(&mut self) -> Result<(), AcquisitionError>;
}

/// Turns scope captures into traces. The scope is opened on the first
/// capture; `origins` assigns every captured sample to the operation it
/// measures.
#[derive(Debug)]
pub struct ScopeSource<S: Scope> {
    scope: S,
    channel: String,
    origins: Vec<SampleOrigin>,
    timeout: Duration,
    open: bool,
}

impl<S: Scope> ScopeSource<S> {
    pub fn new(scope: S, channel: impl Into<String>, origins: Vec<SampleOrigin>) -> Self {
        Self {
            scope,
            channel: channel.into(),
            origins,
            timeout: Duration::from_secs(1),
            open: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Captures one trace of an execution on the public `input`.
    pub fn capture_with_input(&mut self, input: AffinePoint) -> Result<Trace, AcquisitionError> {
        Ok(self.capture()?.with_input(input))
    }

    /// Closes the scope if it was opened and hands it back.
    pub fn close(mut self) -> Result<S, AcquisitionError> {
        if self.open {
            self.scope.close()?;
        }
        Ok(self.scope)
    }

    fn capture(&mut self) -> Result<Trace, AcquisitionError> {
        if !self.open {
            self.scope.open()?;
            self.open = true;
        }
        self.scope.arm()?;
        if !self.scope.capture(self.timeout)? {
            return Err(AcquisitionError::Timeout {
                millis: self.timeout.as_millis(),
            });
        }
        let samples = self
            .scope
            .retrieve(&self.channel)?
            .ok_or_else(|| AcquisitionError::NoData {
                channel: self.channel.clone(),
            })?;
        Ok(Trace::new(samples, self.origins.clone())?)
    }
}

impl<S: Scope> TraceSource for ScopeSource<S> {
    fn next_trace(&mut self) -> Result<Trace, AcquisitionError> {
        self.capture()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TraceError;

    #[derive(Default)]
    struct MockScope {
        calls: Vec<&'static str>,
        captures: Vec<Option<Vec<f64>>>,
        triggered: bool,
    }

    impl Scope for MockScope {
        fn open(&mut self) -> Result<(), AcquisitionError> {
            self.calls.push("open");
            Ok(())
        }

        fn arm(&mut self) -> Result<(), AcquisitionError> {
            self.calls.push("arm");
            Ok(())
        }

        fn capture(&mut self, _timeout: Duration) -> Result<bool, AcquisitionError> {
            self.calls.push("capture");
            Ok(self.triggered)
        }

        fn retrieve(&mut self, channel: &str) -> Result<Option<Vec<f64>>, AcquisitionError> {
            assert_eq!(channel, "A");
            self.calls.push("retrieve");
            Ok(self.captures.pop().flatten())
        }

        fn close(&mut self) -> Result<(), AcquisitionError> {
            self.calls.push("close");
            Ok(())
        }
    }

    fn origins(n: u32) -> Vec<SampleOrigin> {
        (0..n).map(|i| SampleOrigin::new(1, i, 0)).collect()
    }

    #[test]
    fn test_scope_lifecycle() {
        let scope = MockScope {
            captures: vec![Some(vec![3.0, 4.0]), Some(vec![1.0, 2.0])],
            triggered: true,
            ..MockScope::default()
        };
        let mut source = ScopeSource::new(scope, "A", origins(2));
        let set = source.acquire(2).unwrap();
        assert_eq!(set.get(0).unwrap().samples(), &[1.0, 2.0]);
        assert_eq!(set.get(1).unwrap().origins(), origins(2).as_slice());

        let scope = source.close().unwrap();
        assert_eq!(
            scope.calls,
            vec!["open", "arm", "capture", "retrieve", "arm", "capture", "retrieve", "close"]
        );
    }

    #[test]
    fn test_scope_failures() {
        let mut source = ScopeSource::new(MockScope::default(), "A", origins(2))
            .with_timeout(Duration::from_millis(5));
        assert_eq!(source.next_trace(), Err(AcquisitionError::Timeout { millis: 5 }));

        let scope = MockScope {
            captures: vec![None, Some(vec![1.0])],
            triggered: true,
            ..MockScope::default()
        };
        let mut source = ScopeSource::new(scope, "A", origins(2));
        assert_eq!(
            source.next_trace(),
            Err(AcquisitionError::Trace(TraceError::OriginCount { samples: 1, origins: 2 }))
        );
        assert_eq!(
            source.next_trace(),
            Err(AcquisitionError::NoData {
                channel: "A".to_string()
            })
        );
    }

    #[test]
    fn test_replay() {
        let trace = Trace::new(vec![0.5], origins(1)).unwrap();
        let mut source = ReplaySource::new(vec![trace.clone(), trace.clone()]);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.acquire(2).unwrap().len(), 2);
        assert_eq!(source.next_trace(), Err(AcquisitionError::Exhausted { produced: 2 }));
    }
}
