//! Gas error types.

use swapflow_executor::ExecutorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GasError {
    #[error("Fee source failed: {0}")]
    FeeSource(String),

    /// Recovered inside `GasCoordinator::estimate`; never returned to callers.
    #[error("Gas estimation failed: {0}")]
    GasEstimationFailed(String),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

pub type GasResult<T> = Result<T, GasError>;
