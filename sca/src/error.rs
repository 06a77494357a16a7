use std::path::PathBuf;

use engine::ExecError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceError {
    #[error("trace has {samples} samples but {origins} sample origins")]
    OriginCount { samples: usize, origins: usize },

    #[error("window {start}..{end} out of bounds for a trace of {len} samples")]
    Window { start: usize, end: usize, len: usize },

    #[error("cannot resample an empty trace or to zero samples")]
    EmptyResample,

    #[error("trace {index} is incompatible with trace 0: {reason}")]
    Incompatible { index: usize, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("invalid noise: sigma must be finite and non-negative, got {sigma}")]
    InvalidNoise { sigma: f64 },

    #[error("leakage of {function} is not defined: {reason}")]
    InvalidLeakage { function: String, reason: String },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Trace(#[from] TraceError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AcquisitionError {
    #[error("scope error: {0}")]
    Scope(String),

    #[error("no trigger within {millis} ms")]
    Timeout { millis: u128 },

    #[error("scope returned no data on channel `{channel}`")]
    NoData { channel: String },

    #[error("trace source exhausted after {produced} traces")]
    Exhausted { produced: usize },

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttackError {
    #[error("{statistic} needs at least {required} traces, got {found}")]
    InsufficientTraces {
        statistic: &'static str,
        required: usize,
        found: usize,
    },

    #[error("trace {index} is incompatible with trace 0: {reason}")]
    IncompatibleTraces { index: usize, reason: &'static str },

    #[error("trace {index} carries no public input point")]
    MissingInput { index: usize },

    #[error("digit {digit} does not exist in a plan with {count} digits")]
    InvalidTarget { digit: u32, count: u32 },

    #[error("digit {digit} is both the target and known")]
    TargetKnown { digit: u32 },

    #[error("digit {digit} cannot take the value {value}")]
    InvalidDigit { digit: u32, value: i64 },

    #[error("no operation depends only on digit {target} and the known digits")]
    NoInfluencedPositions { target: u32 },

    #[error("no trace sample originates from an influenced operation")]
    NoMatchingSamples,

    #[error(transparent)]
    Leakage(#[from] SimulationError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_are_cloned_through() {
        let exec = ExecError::InvalidScalar { bits: 9, bit_length: 8 };
        let error = AcquisitionError::from(SimulationError::from(exec.clone()));
        assert_eq!(error.clone(), error);
        assert_eq!(
            AttackError::from(exec.clone()).clone().to_string(),
            exec.to_string()
        );
    }
}
