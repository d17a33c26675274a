//! In-memory collaborators.
//!
//! A simulated chain, wallet, quote source, fee source and UI that keep
//! enough state to drive a full session offline. Used by the `swapflow`
//! binary and the tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as AlloySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use swapflow_core::{
    Amount, Asset, BoxFuture, ChainId, GasFeeParams, GasFeeParamsBySpeed, GasSpeed, Network,
    TradeDetails, TransactionRequest,
};
use swapflow_executor::{
    ExecutorError, ExecutorResult, NetworkProvider, NetworkRegistry, NonceSource, SigningHandle,
    TxReceipt, UnsignedTransaction, WalletProvider,
};
use swapflow_gas::{GasError, GasFeeSource, GasResult};
use swapflow_quote::{QuoteAmount, QuoteError, QuoteRequest, QuoteResult, QuoteSource};
use swapflow_risk::ConfirmationReason;
use tracing::debug;

use crate::ui::{UiSignal, UiSink};

sol! {
    interface ISimToken {
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface ISimRouter {
        function swap(address tokenIn, address tokenOut, uint256 amountIn, uint256 minAmountOut) external payable;
    }
}

const GWEI: u128 = 1_000_000_000;

/// Router every simulated quote routes through.
pub const SIM_ROUTER: Address = Address::repeat_byte(0xbb);

// ============================================================================
// Wallet
// ============================================================================

/// Signing handle backed by a local private key.
pub struct SimSigner {
    key: PrivateKeySigner,
}

impl SimSigner {
    pub fn from_secret(secret: &[u8]) -> ExecutorResult<Self> {
        let key = PrivateKeySigner::from_slice(secret)
            .map_err(|e| ExecutorError::Signing(format!("invalid key: {e}")))?;
        Ok(Self { key })
    }
}

impl SigningHandle for SimSigner {
    fn address(&self) -> Address {
        self.key.address()
    }

    fn sign_transaction(&self, tx: UnsignedTransaction) -> BoxFuture<'_, ExecutorResult<Bytes>> {
        Box::pin(async move {
            let envelope = Envelope {
                chain_id: tx.chain_id,
                nonce: tx.nonce,
                from: self.key.address(),
                to: tx.request.to.unwrap_or(Address::ZERO),
                data: tx.request.data.clone(),
            };
            let signature = self
                .key
                .sign_hash(&envelope.signing_hash())
                .await
                .map_err(|e| ExecutorError::Signing(e.to_string()))?;
            Ok(envelope.encode(&signature.as_bytes()))
        })
    }
}

/// Wallet that either always or never yields its signer.
pub struct SimWallet {
    signer: Option<Arc<SimSigner>>,
    loads: AtomicUsize,
}

impl SimWallet {
    pub fn from_secret(secret: &[u8]) -> ExecutorResult<Self> {
        Ok(Self {
            signer: Some(Arc::new(SimSigner::from_secret(secret)?)),
            loads: AtomicUsize::new(0),
        })
    }

    /// A wallet that cannot be loaded.
    pub fn unavailable() -> Self {
        Self {
            signer: None,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl WalletProvider for SimWallet {
    fn load_wallet(&self) -> BoxFuture<'_, Option<Arc<dyn SigningHandle>>> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.signer
                .clone()
                .map(|s| s as Arc<dyn SigningHandle>)
        })
    }
}

/// Raw transaction layout understood by [`SimChain`]:
/// `chain_id(8) | nonce(8) | from(20) | to(20) | signature(65) | data`.
struct Envelope {
    chain_id: ChainId,
    nonce: u64,
    from: Address,
    to: Address,
    data: Bytes,
}

const SIGNATURE_LEN: usize = 65;
const HEADER_LEN: usize = 8 + 8 + 20 + 20 + SIGNATURE_LEN;

impl Envelope {
    fn signing_hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(56 + self.data.len());
        buf.extend_from_slice(&self.chain_id.value().to_be_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(self.from.as_slice());
        buf.extend_from_slice(self.to.as_slice());
        buf.extend_from_slice(&self.data);
        keccak256(&buf)
    }

    fn encode(&self, signature: &[u8; SIGNATURE_LEN]) -> Bytes {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.data.len());
        buf.extend_from_slice(&self.chain_id.value().to_be_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(self.from.as_slice());
        buf.extend_from_slice(self.to.as_slice());
        buf.extend_from_slice(signature);
        buf.extend_from_slice(&self.data);
        buf.into()
    }

    fn decode(raw: &[u8]) -> ExecutorResult<Self> {
        if raw.len() < HEADER_LEN {
            return Err(ExecutorError::Provider(format!(
                "raw transaction too short: {} bytes",
                raw.len()
            )));
        }
        let word = |range: std::ops::Range<usize>| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&raw[range]);
            u64::from_be_bytes(bytes)
        };
        Ok(Self {
            chain_id: ChainId::new(word(0..8)),
            nonce: word(8..16),
            from: Address::from_slice(&raw[16..36]),
            to: Address::from_slice(&raw[36..56]),
            data: Bytes::copy_from_slice(&raw[HEADER_LEN..]),
        })
    }
}

// ============================================================================
// Chain
// ============================================================================

/// A broadcast transaction as the simulated chain saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTx {
    pub chain_id: ChainId,
    pub nonce: u64,
    pub from: Address,
    pub to: Address,
    pub tx_hash: B256,
    pub flashbots: bool,
}

#[derive(Default)]
struct Ledger {
    nonces: HashMap<(Address, ChainId), u64>,
    /// (token, owner, spender) -> allowance
    allowances: HashMap<(Address, Address, Address), U256>,
    receipts: HashMap<B256, TxReceipt>,
    sent: Vec<SentTx>,
    /// One-shot broadcast failure for calls to this address.
    fail_next_send_to: Option<Address>,
    fail_estimates: bool,
    receipt_delay: Duration,
    nonce_delay: Duration,
    nonce_fetches: usize,
    block_number: u64,
}

/// Shared ledger of every simulated network.
///
/// Acts as the network registry and the nonce source.
#[derive(Clone)]
pub struct SimChain {
    ledger: Arc<Mutex<Ledger>>,
    gas_per_call: u64,
    l1_fee_wei: u128,
}

impl Default for SimChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimChain {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger::default())),
            gas_per_call: 100_000,
            l1_fee_wei: 50_000_000_000_000,
        }
    }

    /// Fail the next broadcast addressed to `to`.
    pub fn fail_next_send_to(&self, to: Address) {
        self.ledger.lock().fail_next_send_to = Some(to);
    }

    pub fn set_fail_estimates(&self, fail: bool) {
        self.ledger.lock().fail_estimates = fail;
    }

    /// Delay every nonce fetch, holding submissions before their rap starts.
    pub fn set_nonce_delay(&self, delay: Duration) {
        self.ledger.lock().nonce_delay = delay;
    }

    /// Delay every receipt lookup, keeping raps with approvals executing.
    pub fn set_receipt_delay(&self, delay: Duration) {
        self.ledger.lock().receipt_delay = delay;
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.ledger
            .lock()
            .allowances
            .insert((token, owner, spender), amount);
    }

    pub fn allowance_of(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.ledger
            .lock()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.ledger.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.ledger.lock().sent.len()
    }

    pub fn sent_chain_ids(&self) -> Vec<ChainId> {
        self.ledger.lock().sent.iter().map(|tx| tx.chain_id).collect()
    }

    pub fn nonce_fetches(&self) -> usize {
        self.ledger.lock().nonce_fetches
    }

    fn provider(&self, chain_id: ChainId) -> SimProvider {
        SimProvider {
            chain_id,
            chain: self.clone(),
        }
    }

    fn broadcast(&self, chain_id: ChainId, raw: &[u8], flashbots: bool) -> ExecutorResult<B256> {
        let envelope = Envelope::decode(raw)?;
        if envelope.chain_id != chain_id {
            return Err(ExecutorError::Provider(format!(
                "transaction for chain {} sent to chain {chain_id}",
                envelope.chain_id
            )));
        }

        let mut ledger = self.ledger.lock();
        if ledger.fail_next_send_to == Some(envelope.to) {
            ledger.fail_next_send_to = None;
            return Err(ExecutorError::Provider("execution reverted".to_string()));
        }

        let expected = ledger
            .nonces
            .get(&(envelope.from, chain_id))
            .copied()
            .unwrap_or(0);
        if envelope.nonce != expected {
            return Err(ExecutorError::Provider(format!(
                "nonce {} rejected, expected {expected}",
                envelope.nonce
            )));
        }
        ledger.nonces.insert((envelope.from, chain_id), expected + 1);

        if let Ok(call) = ISimToken::approveCall::abi_decode(&envelope.data, true) {
            ledger
                .allowances
                .insert((envelope.to, envelope.from, call.spender), call.amount);
        }

        let tx_hash = keccak256(raw);
        ledger.block_number += 1;
        let receipt = TxReceipt {
            tx_hash,
            block_number: ledger.block_number,
            success: true,
        };
        ledger.receipts.insert(tx_hash, receipt);
        ledger.sent.push(SentTx {
            chain_id,
            nonce: envelope.nonce,
            from: envelope.from,
            to: envelope.to,
            tx_hash,
            flashbots,
        });
        debug!(%chain_id, nonce = envelope.nonce, %tx_hash, "Simulated broadcast");
        Ok(tx_hash)
    }
}

impl NetworkRegistry for SimChain {
    fn provider_for(&self, chain_id: ChainId) -> ExecutorResult<Arc<dyn NetworkProvider>> {
        Network::from_chain_id(chain_id)?;
        Ok(Arc::new(self.provider(chain_id)))
    }
}

impl NonceSource for SimChain {
    fn get_next_nonce(&self, account: Address, network: Network) -> BoxFuture<'_, ExecutorResult<u64>> {
        Box::pin(async move {
            let delay = {
                let mut ledger = self.ledger.lock();
                ledger.nonce_fetches += 1;
                ledger.nonce_delay
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let ledger = self.ledger.lock();
            Ok(ledger
                .nonces
                .get(&(account, network.chain_id()))
                .copied()
                .unwrap_or(0))
        })
    }
}

/// RPC handle for one simulated chain.
struct SimProvider {
    chain_id: ChainId,
    chain: SimChain,
}

impl NetworkProvider for SimProvider {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn estimate_gas(&self, _request: TransactionRequest) -> BoxFuture<'_, ExecutorResult<u64>> {
        Box::pin(async move {
            if self.chain.ledger.lock().fail_estimates {
                return Err(ExecutorError::Provider("estimation unavailable".to_string()));
            }
            Ok(self.chain.gas_per_call)
        })
    }

    fn estimate_l1_fee(&self, _request: TransactionRequest) -> BoxFuture<'_, ExecutorResult<u128>> {
        Box::pin(async move { Ok(self.chain.l1_fee_wei) })
    }

    fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> BoxFuture<'_, ExecutorResult<U256>> {
        Box::pin(async move { Ok(self.chain.allowance_of(token, owner, spender)) })
    }

    fn send_raw_transaction(&self, raw: Bytes, flashbots: bool) -> BoxFuture<'_, ExecutorResult<B256>> {
        Box::pin(async move { self.chain.broadcast(self.chain_id, &raw, flashbots) })
    }

    fn wait_for_receipt(&self, tx_hash: B256) -> BoxFuture<'_, ExecutorResult<TxReceipt>> {
        Box::pin(async move {
            let delay = self.chain.ledger.lock().receipt_delay;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.chain
                .ledger
                .lock()
                .receipts
                .get(&tx_hash)
                .copied()
                .ok_or_else(|| ExecutorError::Provider(format!("unknown transaction {tx_hash}")))
        })
    }
}

// ============================================================================
// Quotes
// ============================================================================

/// Quotes at the assets' USD prices minus a fixed price impact.
pub struct SimQuoteSource {
    impact_pct: Decimal,
    no_route: AtomicBool,
    calls: Mutex<Vec<QuoteRequest>>,
}

impl SimQuoteSource {
    pub fn new(impact_pct: Decimal) -> Self {
        Self {
            impact_pct,
            no_route: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_no_route(&self, no_route: bool) {
        self.no_route.store(no_route, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<QuoteRequest> {
        self.calls.lock().clone()
    }

    fn quote(&self, request: &QuoteRequest) -> QuoteResult<TradeDetails> {
        let input_price = price_of(&request.input_asset)?;
        let output_price = price_of(&request.output_asset)?;
        let kept = Decimal::ONE - self.impact_pct / Decimal::ONE_HUNDRED;

        let (input_amount, output_amount) = match request.amount {
            QuoteAmount::ExactInput(input) => {
                let output = input.inner() * input_price * kept / output_price;
                (input, round_to(output, &request.output_asset))
            }
            QuoteAmount::ExactOutput(output) => {
                let input = output.inner() * output_price / kept / input_price;
                (round_to(input, &request.input_asset), output)
            }
        };

        let units = |amount: Amount, asset: &Asset| {
            amount
                .to_base_units(asset.decimals)
                .ok_or_else(|| QuoteError::InvalidAmount(amount.to_string()))
        };
        let amount_in = units(input_amount, &request.input_asset)?;
        let slippage = Decimal::from(request.slippage_bips) / Decimal::from(10_000);
        let min_out = units(
            round_to(output_amount.inner() * (Decimal::ONE - slippage), &request.output_asset),
            &request.output_asset,
        )?;

        let data = ISimRouter::swapCall {
            tokenIn: request.input_asset.address,
            tokenOut: request.output_asset.address,
            amountIn: amount_in,
            minAmountOut: min_out,
        }
        .abi_encode();
        let mut tx = TransactionRequest::call(request.from, SIM_ROUTER, data.into());
        if request.input_asset.is_native() {
            tx = tx.with_value(amount_in);
        }

        Ok(TradeDetails {
            source: "sim".to_string(),
            protocols: vec!["sim_amm".to_string()],
            chain_id: request.chain_id,
            input_amount,
            output_amount,
            allowance_target: Some(SIM_ROUTER),
            tx,
        })
    }
}

fn price_of(asset: &Asset) -> QuoteResult<Decimal> {
    asset
        .price
        .filter(|p| !p.is_zero())
        .map(|p| p.inner())
        .ok_or_else(|| QuoteError::MissingPrice(asset.symbol.clone()))
}

fn round_to(value: Decimal, asset: &Asset) -> Amount {
    Amount::new(value.round_dp(u32::from(asset.decimals)).normalize())
}

impl QuoteSource for SimQuoteSource {
    fn get_trade_details(
        &self,
        request: QuoteRequest,
    ) -> BoxFuture<'_, QuoteResult<Option<TradeDetails>>> {
        Box::pin(async move {
            self.calls.lock().push(request.clone());
            if self.no_route.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.quote(&request).map(Some)
        })
    }
}

// ============================================================================
// Gas fees
// ============================================================================

/// EIP-1559 fees around a configurable total, in gwei.
pub struct SimFeeSource {
    gwei: AtomicU64,
    fail: AtomicBool,
    fetches: AtomicUsize,
}

impl SimFeeSource {
    pub fn new(gwei: u64) -> Self {
        Self {
            gwei: AtomicU64::new(gwei),
            fail: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_gwei(&self, gwei: u64) {
        self.gwei.store(gwei, Ordering::SeqCst);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn eip1559(total_wei: u128) -> GasFeeParams {
    let priority = GWEI.min(total_wei);
    GasFeeParams::Eip1559 {
        max_base_fee_wei: total_wei - priority,
        max_priority_fee_wei: priority,
    }
}

impl GasFeeSource for SimFeeSource {
    fn fetch_fee_params(
        &self,
        network: Network,
        _flashbots: bool,
    ) -> BoxFuture<'_, GasResult<GasFeeParamsBySpeed>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(GasError::FeeSource(format!("{network} fee oracle unavailable")));
            }
            let normal = u128::from(self.gwei.load(Ordering::SeqCst)) * GWEI;
            Ok(GasFeeParamsBySpeed::new()
                .with(GasSpeed::Slow, eip1559(normal * 8 / 10))
                .with(GasSpeed::Normal, eip1559(normal))
                .with(GasSpeed::Fast, eip1559(normal * 12 / 10)))
        })
    }
}

// ============================================================================
// UI
// ============================================================================

/// Records signals and answers confirmations with a fixed choice.
pub struct SimUi {
    accept: AtomicBool,
    signals: Mutex<Vec<UiSignal>>,
    prompts: Mutex<Vec<ConfirmationReason>>,
}

impl SimUi {
    pub fn new(accept: bool) -> Self {
        Self {
            accept: AtomicBool::new(accept),
            signals: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn signals(&self) -> Vec<UiSignal> {
        self.signals.lock().clone()
    }

    pub fn prompts(&self) -> Vec<ConfirmationReason> {
        self.prompts.lock().clone()
    }
}

impl UiSink for SimUi {
    fn notify(&self, signal: UiSignal) {
        self.signals.lock().push(signal);
    }

    fn confirm(&self, reason: ConfirmationReason) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            self.prompts.lock().push(reason);
            self.accept.load(Ordering::SeqCst)
        })
    }
}
