//! Rap execution for swapflow.
//!
//! This crate provides:
//! - Collaborator contracts for wallets, RPC providers and nonce sources
//! - Serialized nonce reservation per account and network
//! - Rap planning into concrete on-chain calls
//! - The step-ordered execution pipeline with partial-failure reporting

pub mod error;
pub mod nonce;
pub mod pipeline;
pub mod provider;
pub mod rap;

pub use error::{ExecutorError, ExecutorResult};
pub use nonce::{NonceLease, NonceManager};
pub use pipeline::{
    RapCompletion, RapContext, RapExecutionPipeline, RapReport, RapState, StepReport, StepStatus,
};
pub use provider::{
    NetworkProvider, NetworkRegistry, NonceSource, SigningHandle, TxReceipt,
    UnsignedTransaction, WalletProvider,
};
pub use rap::{plan_actions, ApprovalCheck, RapAction};
