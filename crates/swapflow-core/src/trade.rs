//! Quote snapshots and the parameter bundle handed to rap execution.

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::decimal::Amount;
use crate::network::ChainId;

/// Raw call needed to build an on-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Target contract, `None` for contract creation.
    pub to: Option<Address>,
    pub from: Address,
    pub value: U256,
    pub data: Bytes,
}

impl TransactionRequest {
    #[must_use]
    pub fn call(from: Address, to: Address, data: Bytes) -> Self {
        Self {
            to: Some(to),
            from,
            value: U256::ZERO,
            data,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// An aggregator quote.
///
/// Immutable once produced: a new quote replaces the old one, it never
/// mutates it. Equality is deep value equality over every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeDetails {
    /// Aggregator that produced the route.
    pub source: String,
    /// Liquidity protocols along the route.
    pub protocols: Vec<String>,
    /// Chain the call data was built for.
    pub chain_id: ChainId,
    pub input_amount: Amount,
    pub output_amount: Amount,
    /// Contract that must be approved to pull the input token.
    pub allowance_target: Option<Address>,
    /// Call to execute the trade.
    pub tx: TransactionRequest,
}

impl TradeDetails {
    #[must_use]
    pub fn matches_chain(&self, chain_id: ChainId) -> bool {
        self.chain_id == chain_id
    }
}

/// Everything a rap needs, captured by value at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParameters {
    pub chain_id: ChainId,
    pub input_asset: Asset,
    pub output_asset: Asset,
    pub input_amount: Amount,
    pub output_amount: Amount,
    /// First nonce of the reserved sequence.
    pub nonce: u64,
    pub flashbots: bool,
    /// Quote for swaps; `None` for savings operations.
    pub trade_details: Option<TradeDetails>,
    /// Savings market contract for deposits and withdrawals.
    pub savings_contract: Option<Address>,
}
