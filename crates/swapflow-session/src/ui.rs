//! Navigation and UI contract.
//!
//! The orchestrator only signals outcomes; rendering and routing belong to
//! the UI layer.

use alloy::primitives::B256;
use swapflow_core::BoxFuture;
use swapflow_risk::ConfirmationReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSignal {
    /// The operation finished; the UI may navigate away.
    OperationSucceeded { tx_hash: Option<B256> },
    OperationFailed { message: String },
    /// A confirmation prompt is about to be shown.
    ConfirmationRequired { reason: ConfirmationReason },
}

pub trait UiSink: Send + Sync {
    fn notify(&self, signal: UiSignal);

    /// Ask the user to confirm. Resolves `false` on cancel.
    fn confirm(&self, reason: ConfirmationReason) -> BoxFuture<'_, bool>;
}
