//! Side-channel leakage simulation and statistical attacks on execution plans.
//!
//! A [`LeakageSimulator`] runs plans through an [`engine::ExecutionEngine`]
//! and turns every elementary field operation into samples of a [`Trace`].
//! Traces can also come from any other [`TraceSource`], such as a
//! measurement [`Scope`]. The [`AttackEngine`] ranks the candidate values of
//! one scalar digit by how well their predicted intermediates explain a
//! [`TraceSet`].

mod acquisition;
mod attack;
mod cancel;
mod config;
mod error;
mod leakage;
mod simulate;
mod trace;


pub use acquisition::{ReplaySource, Scope, ScopeSource, SimulatedSource, TraceSource};
pub use attack::{
    difference_of_means, pearson, AttackEngine, HypothesisScore, HypothesisSpace, RankedRecovery, Statistic,
};
pub use cancel::CancellationToken;
pub use config::{AnalysisConfig, AttackConfig, SimulationConfig};
pub use error::{AcquisitionError, AttackError, ConfigError, SimulationError, TraceError};
pub use leakage::{LeakageFunction, LeakageModel, Noise};
pub use simulate::{BatchOutcome, LeakageSimulator};
pub use trace::{SampleOrigin, Trace, TraceSet};
