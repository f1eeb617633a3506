use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunLoopError {
    #[error("watchdog divisions must be at least 1")]
    InvalidDivisions,
    #[error("watchdog timeout must be non-zero")]
    InvalidTimeout,
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}
