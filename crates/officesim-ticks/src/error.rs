use thiserror::Error;

#[derive(Debug, Error)]
pub enum TickError {
    #[error("simulation must be running before enabling automatic ticks")]
    NotRunning,

    #[error("invalid tick interval: {0}")]
    InvalidInterval(String),

    #[error("auto-tick task did not exit cleanly within the stop timeout")]
    StopTimeout,
}

pub type Result<T> = std::result::Result<T, TickError>;
