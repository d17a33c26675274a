//! Collaborator contracts consumed by rap execution.
//!
//! Wallets, RPC providers and nonce sources are external. These traits keep
//! them injectable so the pipeline can run against in-memory doubles.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use swapflow_core::{BoxFuture, ChainId, GasFeeParams, Network, TransactionRequest};

use crate::error::ExecutorResult;

/// Transaction ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub chain_id: ChainId,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fee: GasFeeParams,
    pub request: TransactionRequest,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    /// `false` when the transaction reverted.
    pub success: bool,
}

/// Signing handle obtained from the wallet provider.
pub trait SigningHandle: Send + Sync {
    fn address(&self) -> Address;

    /// Sign and return the raw encoded transaction.
    fn sign_transaction(&self, tx: UnsignedTransaction) -> BoxFuture<'_, ExecutorResult<Bytes>>;
}

/// Wallet provider. `None` signals the wallet cannot be loaded.
pub trait WalletProvider: Send + Sync {
    fn load_wallet(&self) -> BoxFuture<'_, Option<Arc<dyn SigningHandle>>>;
}

/// RPC handle for one chain.
pub trait NetworkProvider: Send + Sync {
    fn chain_id(&self) -> ChainId;

    fn estimate_gas(&self, request: TransactionRequest) -> BoxFuture<'_, ExecutorResult<u64>>;

    /// L1 data-availability fee of a call on rollups (wei).
    fn estimate_l1_fee(&self, request: TransactionRequest) -> BoxFuture<'_, ExecutorResult<u128>>;

    fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> BoxFuture<'_, ExecutorResult<U256>>;

    /// Broadcast a signed transaction, through a private relay when
    /// `flashbots` is set. Resolves once the node acknowledges it.
    fn send_raw_transaction(&self, raw: Bytes, flashbots: bool)
        -> BoxFuture<'_, ExecutorResult<B256>>;

    fn wait_for_receipt(&self, tx_hash: B256) -> BoxFuture<'_, ExecutorResult<TxReceipt>>;
}

/// Provider selection keyed by the resolved chain id.
pub trait NetworkRegistry: Send + Sync {
    fn provider_for(&self, chain_id: ChainId) -> ExecutorResult<Arc<dyn NetworkProvider>>;
}

/// Source of the next unused on-chain nonce.
pub trait NonceSource: Send + Sync {
    fn get_next_nonce(&self, account: Address, network: Network)
        -> BoxFuture<'_, ExecutorResult<u64>>;
}
