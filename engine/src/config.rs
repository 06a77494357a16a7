use serde::{Deserialize, Serialize};

/// How plans are executed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Walk formula graphs with the reference backend.
    #[default]
    Interpreted,
    /// Compile every formula of a plan to a kernel on first use, falling back
    /// to interpretation when compilation fails.
    Compiled,
}

/// What happens when a formula runs on inputs violating its assumptions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssumptionAction {
    Ignore,
    Warn,
    #[default]
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub strategy: Strategy,
    pub assumptions: AssumptionAction,
    /// Kernels with more instructions are not compiled.
    pub max_kernel_instructions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Interpreted,
            assumptions: AssumptionAction::Error,
            max_kernel_instructions: 4096,
        }
    }
}

impl EngineConfig {
    pub fn compiled() -> Self {
        Self {
            strategy: Strategy::Compiled,
            ..Self::default()
        }
    }
}
