//! Aggregator quote source contract.

use alloy::primitives::Address;
use swapflow_core::{Amount, Asset, BoxFuture, ChainId, TradeDetails};

use crate::error::QuoteResult;

/// Which side of the trade is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteAmount {
    ExactInput(Amount),
    ExactOutput(Amount),
}

impl QuoteAmount {
    #[must_use]
    pub fn amount(&self) -> Amount {
        match self {
            Self::ExactInput(a) | Self::ExactOutput(a) => *a,
        }
    }
}

/// Request for a route between two assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub chain_id: ChainId,
    pub input_asset: Asset,
    pub output_asset: Asset,
    pub amount: QuoteAmount,
    /// Maximum adverse movement, in basis points.
    pub slippage_bips: u32,
    /// Account the call data is built for.
    pub from: Address,
}

/// Source of aggregator routes.
///
/// `Ok(None)` means no route exists for the pair and amount; it is not an
/// error.
pub trait QuoteSource: Send + Sync {
    fn get_trade_details(&self, request: QuoteRequest)
        -> BoxFuture<'_, QuoteResult<Option<TradeDetails>>>;
}
