use thiserror::Error;

/// Top-level error surfaced by the engine and the CLI.
///
/// Subsystem crates define their own error enums; they are folded into
/// these variants at the engine boundary so callers see one vocabulary.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("simulation is not running; call start first")]
    NotRunning,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("planning failure: {0}")]
    Planning(String),

    #[error("gateway unavailable: {0}")]
    Gateway(String),

    #[error("unresolved target: {0}")]
    UnresolvedTarget(String),

    #[error("auto-tick failure: {0}")]
    AutoTick(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SimError {
    /// Short machine-readable code for log lines and admin responses.
    pub fn code(&self) -> &'static str {
        match self {
            SimError::InputInvalid(_) => "INPUT_INVALID",
            SimError::NotRunning => "NOT_RUNNING",
            SimError::Storage(_) => "STORAGE_ERROR",
            SimError::Planning(_) => "PLANNING_FAILURE",
            SimError::Gateway(_) => "GATEWAY_UNAVAILABLE",
            SimError::UnresolvedTarget(_) => "UNRESOLVED_TARGET",
            SimError::AutoTick(_) => "AUTO_TICK_FAILURE",
            SimError::Config(_) => "CONFIG_ERROR",
            SimError::Serialization(_) => "SERIALIZATION_ERROR",
            SimError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
