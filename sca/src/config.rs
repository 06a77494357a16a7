use std::path::Path;

use engine::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::leakage::LeakageModel;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Seed of the per-trace noise generators and of simulated sources.
    pub seed: u64,
    pub parallel: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            parallel: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttackConfig {
    /// Score hypotheses in parallel.
    pub parallel: bool,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Everything an analysis session needs, usually read from a TOML file:
///
/// ```toml
/// [engine]
/// strategy = "compiled"
///
/// [leakage]
/// function = { kind = "hamming-weight" }
/// noise = { kind = "gaussian", sigma = 2.0 }
///
/// [simulation]
/// seed = 7
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub engine: EngineConfig,
    pub leakage: LeakageModel,
    pub simulation: SimulationConfig,
    pub attack: AttackConfig,
}

impl AnalysisConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
