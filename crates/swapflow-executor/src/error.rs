//! Executor error types.

use swapflow_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Wallet unavailable")]
    WalletUnavailable,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transaction reverted: {0}")]
    Reverted(String),

    #[error("Nonce unavailable: {0}")]
    NonceUnavailable(String),

    #[error("Invalid rap parameters: {0}")]
    InvalidParameters(String),

    #[error("Swap requires trade details")]
    MissingTradeDetails,

    #[error("Rap already started: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
