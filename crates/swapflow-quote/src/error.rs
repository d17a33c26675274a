//! Quote error types.

use swapflow_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("Quote source failed: {0}")]
    Upstream(String),

    #[error("No USD price for {0}")]
    MissingPrice(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type QuoteResult<T> = Result<T, QuoteError>;
