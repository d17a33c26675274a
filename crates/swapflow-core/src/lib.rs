//! Core domain types for swap, deposit and withdrawal orchestration.
//!
//! This crate provides the data model shared by every component:
//! - `Amount`, `Price`: precision-safe numeric types
//! - `Network`, `ChainId`: network identification and per-network behavior
//! - `Asset`: asset identity plus catalog-owned market fields
//! - `TradeDetails`, `SwapParameters`: quote snapshots and rap inputs
//! - `GasFeeParamsBySpeed`, `TxFee`: gas pricing
//! - `RapType`, `RapActionKind`: multi-step operation templates

pub mod asset;
pub mod decimal;
pub mod error;
pub mod gas;
pub mod network;
pub mod operation;
pub mod rap;
pub mod trade;

use std::future::Future;
use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use asset::{wrapped_native_address, Asset, Implementation, NATIVE_ASSET_ADDRESS};
pub use decimal::{wei_to_native, Amount, Price};
pub use error::{CoreError, Result};
pub use gas::{
    GasFeeParams, GasFeeParamsBySpeed, GasLimitDefaults, GasSpeed, TxFee,
    BASIC_DEPOSIT_GAS_LIMIT, BASIC_SWAP_GAS_LIMIT, BASIC_WITHDRAWAL_GAS_LIMIT,
    DEFAULT_L1_GAS_FEE_OPTIMISM_SWAP,
};
pub use network::{ChainId, Network};
pub use operation::{EditedField, OperationKind};
pub use rap::{RapActionKind, RapType};
pub use trade::{SwapParameters, TradeDetails, TransactionRequest};
