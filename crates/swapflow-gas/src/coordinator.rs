//! Gas coordinator.
//!
//! Holds the polled fee parameters of the active network, the gas limit of
//! the current candidate rap and the L1 data surcharge, and derives the
//! selected transaction fee from them.
//!
//! # Estimation
//!
//! Every change of trade details (deep value inequality) re-simulates the
//! candidate rap. Simulation failure falls back to the operation's default
//! gas limit; a failed L1 sub-estimate falls back to a fixed surcharge.
//! Results are applied in issue order: an estimate finishing after a newer
//! one was applied is discarded.
//!
//! # Polling
//!
//! One poll task per coordinator, keyed by network and flashbots mode.
//! `stop_polling` cancels and aborts it; dropping the coordinator does too.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use swapflow_core::{
    Amount, Asset, ChainId, GasFeeParams, GasFeeParamsBySpeed, GasLimitDefaults, GasSpeed,
    Network, OperationKind, Price, RapType, SwapParameters, TradeDetails, TxFee,
};
use swapflow_executor::{plan_actions, NetworkRegistry};
use swapflow_telemetry::Metrics;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{GasError, GasResult};
use crate::source::GasFeeSource;

/// Gas configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasConfig {
    /// Fee parameter poll interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub limits: GasLimitDefaults,
    #[serde(default)]
    pub default_speed: GasSpeed,
}

fn default_poll_interval_ms() -> u64 {
    5000
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            limits: GasLimitDefaults::default(),
            default_speed: GasSpeed::default(),
        }
    }
}

/// Candidate rap to estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEstimateRequest {
    pub kind: OperationKind,
    pub chain_id: ChainId,
    pub input_asset: Asset,
    pub output_asset: Asset,
    pub input_amount: Amount,
    pub output_amount: Amount,
    pub trade_details: Option<TradeDetails>,
    pub account: Address,
    pub savings_contract: Option<Address>,
}

/// Point-in-time view of the gas state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasSnapshot {
    pub network: Option<Network>,
    pub kind: OperationKind,
    pub gas_limit: u64,
    pub l1_fee_wei: u128,
    pub selected_speed: GasSpeed,
    pub fee_params: GasFeeParamsBySpeed,
    pub selected_fee: Option<TxFee>,
}

#[derive(Debug)]
struct GasState {
    network: Option<Network>,
    kind: OperationKind,
    fee_params: GasFeeParamsBySpeed,
    selected_speed: GasSpeed,
    /// `None` until the first fee snapshot or estimate.
    gas_limit: Option<u64>,
    l1_fee_wei: u128,
    native_price: Option<Price>,
    selected_fee: Option<TxFee>,
    last_trade_details: Option<TradeDetails>,
    last_applied_seq: u64,
    /// Bumped on every reset; estimates from an older epoch are dropped.
    epoch: u64,
}

impl GasState {
    fn new(speed: GasSpeed) -> Self {
        Self {
            network: None,
            kind: OperationKind::Swap,
            fee_params: GasFeeParamsBySpeed::new(),
            selected_speed: speed,
            gas_limit: None,
            l1_fee_wei: 0,
            native_price: None,
            selected_fee: None,
            last_trade_details: None,
            last_applied_seq: 0,
            epoch: 0,
        }
    }
}

struct GasInner {
    fee_source: Arc<dyn GasFeeSource>,
    registry: Arc<dyn NetworkRegistry>,
    config: GasConfig,
    state: Mutex<GasState>,
    issued_seq: AtomicU64,
}

impl GasInner {
    fn default_gas_limit(&self, kind: OperationKind, chain_id: ChainId) -> u64 {
        self.config.limits.for_operation(kind, chain_id)
    }

    fn default_l1_fee(&self, network: Network) -> u128 {
        if network.has_l1_data_fee() {
            u128::from(self.config.limits.default_l1_fee_wei)
        } else {
            0
        }
    }

    fn recompute(&self, state: &mut GasState) {
        let Some(network) = state.network else {
            state.selected_fee = None;
            return;
        };
        let gas_limit = state
            .gas_limit
            .unwrap_or_else(|| self.default_gas_limit(state.kind, network.chain_id()));
        state.selected_fee = state.fee_params.get(state.selected_speed).map(|params| {
            TxFee::compute(
                state.selected_speed,
                params,
                gas_limit,
                state.l1_fee_wei,
                state.native_price,
            )
        });
        Metrics::gas_limit(network.as_str(), gas_limit);
    }

    fn apply_fee_params(&self, network: Network, params: GasFeeParamsBySpeed) -> bool {
        let mut state = self.state.lock();
        if state.network != Some(network) {
            debug!(%network, "Fee snapshot for inactive network ignored");
            return false;
        }
        if params.is_empty() || state.fee_params == params {
            return false;
        }

        let first = state.fee_params.is_empty();
        if first && state.last_applied_seq == 0 {
            state.gas_limit = Some(self.default_gas_limit(state.kind, network.chain_id()));
            state.l1_fee_wei = self.default_l1_fee(network);
        }
        state.fee_params = params;
        self.recompute(&mut state);
        debug!(%network, first, "Fee parameters applied");
        true
    }
}

struct PollHandle {
    network: Network,
    flashbots: bool,
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct GasCoordinator {
    inner: Arc<GasInner>,
    polling: Mutex<Option<PollHandle>>,
}

impl GasCoordinator {
    pub fn new(
        fee_source: Arc<dyn GasFeeSource>,
        registry: Arc<dyn NetworkRegistry>,
        config: GasConfig,
    ) -> Self {
        let speed = config.default_speed;
        Self {
            inner: Arc::new(GasInner {
                fee_source,
                registry,
                config,
                state: Mutex::new(GasState::new(speed)),
                issued_seq: AtomicU64::new(0),
            }),
            polling: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &GasConfig {
        &self.inner.config
    }

    /// Default gas limit of an operation on a chain.
    pub fn default_gas_limit(&self, kind: OperationKind, chain_id: ChainId) -> u64 {
        self.inner.default_gas_limit(kind, chain_id)
    }

    /// Make `network` and `kind` current. A network change resets all gas
    /// state; a kind change drops the estimate.
    pub fn select_network(&self, kind: OperationKind, network: Network) {
        let mut state = self.inner.state.lock();
        if state.network != Some(network) {
            info!(%network, %kind, "Gas state reset for network");
            let speed = state.selected_speed;
            let native_price = state.native_price;
            let epoch = state.epoch + 1;
            *state = GasState::new(speed);
            state.network = Some(network);
            state.kind = kind;
            state.native_price = native_price;
            state.l1_fee_wei = self.inner.default_l1_fee(network);
            state.epoch = epoch;
        } else if state.kind != kind {
            state.kind = kind;
            state.gas_limit = None;
            state.last_trade_details = None;
            state.epoch += 1;
            self.inner.recompute(&mut state);
        }
    }

    /// USD price of the network's native asset.
    pub fn set_native_price(&self, price: Option<Price>) {
        let mut state = self.inner.state.lock();
        if state.native_price != price {
            state.native_price = price;
            self.inner.recompute(&mut state);
        }
    }

    /// Gas limit of the candidate rap.
    ///
    /// Never fails: simulation errors fall back to the default limit.
    pub async fn estimate(&self, request: &GasEstimateRequest) -> u64 {
        let default = self.default_gas_limit(request.kind, request.chain_id);
        let network = network_label(request.chain_id);

        if request.kind == OperationKind::Swap && request.trade_details.is_none() {
            debug!(network, default, "No trade details yet, using default gas limit");
            Metrics::gas_estimate_fallback(network, "no_trade_details");
            return default;
        }

        match self.simulate(request).await {
            Ok(limit) => {
                debug!(network, limit, "Gas limit estimated");
                limit
            }
            Err(e) => {
                warn!(
                    network,
                    kind = %request.kind,
                    error = %e,
                    fallback = default,
                    "Gas estimation failed, using default limit"
                );
                Metrics::gas_estimate_fallback(network, "simulation_failed");
                default
            }
        }
    }

    async fn simulate(&self, request: &GasEstimateRequest) -> GasResult<u64> {
        let rap_type = RapType::select(request.kind, &request.input_asset, &request.output_asset);
        let params = SwapParameters {
            chain_id: request.chain_id,
            input_asset: request.input_asset.clone(),
            output_asset: request.output_asset.clone(),
            input_amount: request.input_amount,
            output_amount: request.output_amount,
            nonce: 0,
            flashbots: false,
            trade_details: request.trade_details.clone(),
            savings_contract: request.savings_contract,
        };
        let actions = plan_actions(rap_type, &params, request.account, &self.inner.config.limits)?;
        let provider = self.inner.registry.provider_for(request.chain_id)?;

        let mut total: u64 = 0;
        for action in actions {
            let limit = provider
                .estimate_gas(action.call)
                .await
                .map_err(|e| GasError::GasEstimationFailed(format!("{}: {e}", action.kind)))?;
            total = total.saturating_add(limit);
        }
        Ok(total)
    }

    /// L1 data surcharge of the candidate call (wei). Zero off rollups.
    pub async fn l1_surcharge(&self, request: &GasEstimateRequest) -> u128 {
        let Ok(network) = Network::from_chain_id(request.chain_id) else {
            return 0;
        };
        if !network.has_l1_data_fee() {
            return 0;
        }
        let fallback = u128::from(self.inner.config.limits.default_l1_fee_wei);
        let Some(trade) = &request.trade_details else {
            return fallback;
        };

        let estimate = match self.inner.registry.provider_for(request.chain_id) {
            Ok(provider) => provider.estimate_l1_fee(trade.tx.clone()).await,
            Err(e) => Err(e),
        };
        match estimate {
            Ok(fee) => fee,
            Err(e) => {
                warn!(%network, error = %e, fallback, "L1 fee estimation failed, using default surcharge");
                Metrics::gas_estimate_fallback(network.as_str(), "l1_fee_failed");
                fallback
            }
        }
    }

    /// Apply a gas limit and surcharge and recompute the selected fee.
    ///
    /// `None` surcharge uses the network default.
    pub fn update_fee(&self, gas_limit: u64, l1_fee_wei: Option<u128>) {
        let mut state = self.inner.state.lock();
        state.gas_limit = Some(gas_limit);
        if let Some(network) = state.network {
            state.l1_fee_wei = l1_fee_wei.unwrap_or_else(|| self.inner.default_l1_fee(network));
        }
        self.inner.recompute(&mut state);
    }

    /// React to new trade details.
    ///
    /// Re-estimates only when the details differ by value from the last
    /// ones seen. Returns whether a new estimate was applied.
    pub async fn on_trade_details(&self, request: GasEstimateRequest) -> bool {
        let (seq, epoch) = {
            let mut state = self.inner.state.lock();
            if state.last_trade_details == request.trade_details {
                return false;
            }
            state.last_trade_details = request.trade_details.clone();
            (
                self.inner.issued_seq.fetch_add(1, Ordering::AcqRel) + 1,
                state.epoch,
            )
        };

        let gas_limit = self.estimate(&request).await;
        let l1_fee_wei = self.l1_surcharge(&request).await;

        let mut state = self.inner.state.lock();
        if state.epoch != epoch || seq <= state.last_applied_seq {
            debug!(seq, applied = state.last_applied_seq, "Stale gas estimate discarded");
            Metrics::gas_estimate_stale(network_label(request.chain_id));
            return false;
        }
        state.last_applied_seq = seq;
        state.gas_limit = Some(gas_limit);
        state.l1_fee_wei = l1_fee_wei;
        self.inner.recompute(&mut state);
        true
    }

    /// Apply a polled fee snapshot. Ignored unless `network` is current and
    /// the parameters changed by value.
    pub fn apply_fee_params(&self, network: Network, params: GasFeeParamsBySpeed) -> bool {
        self.inner.apply_fee_params(network, params)
    }

    pub fn select_speed(&self, speed: GasSpeed) {
        let mut state = self.inner.state.lock();
        state.selected_speed = speed;
        self.inner.recompute(&mut state);
    }

    pub fn selected_fee(&self) -> Option<TxFee> {
        self.inner.state.lock().selected_fee.clone()
    }

    pub fn selected_fee_params(&self) -> Option<GasFeeParams> {
        let state = self.inner.state.lock();
        state.fee_params.get(state.selected_speed).copied()
    }

    pub fn snapshot(&self) -> GasSnapshot {
        let state = self.inner.state.lock();
        let gas_limit = match (state.gas_limit, state.network) {
            (Some(limit), _) => limit,
            (None, Some(network)) => self.default_gas_limit(state.kind, network.chain_id()),
            (None, None) => self.default_gas_limit(state.kind, ChainId::MAINNET),
        };
        GasSnapshot {
            network: state.network,
            kind: state.kind,
            gas_limit,
            l1_fee_wei: state.l1_fee_wei,
            selected_speed: state.selected_speed,
            fee_params: state.fee_params.clone(),
            selected_fee: state.selected_fee.clone(),
        }
    }

    /// Start polling fee parameters for `network`.
    ///
    /// No-op when already polling the same network in the same mode;
    /// otherwise the previous task is stopped first.
    pub fn start_polling(&self, network: Network, flashbots: bool) {
        let mut polling = self.polling.lock();
        if let Some(handle) = polling.as_ref() {
            if handle.network == network && handle.flashbots == flashbots && !handle.task.is_finished() {
                return;
            }
        }
        if let Some(handle) = polling.take() {
            handle.token.cancel();
            handle.task.abort();
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(poll_loop(self.inner.clone(), network, flashbots, token.clone()));
        info!(%network, flashbots, interval_ms = self.inner.config.poll_interval_ms, "Gas polling started");
        *polling = Some(PollHandle {
            network,
            flashbots,
            token,
            task,
        });
    }

    pub fn stop_polling(&self) {
        if let Some(handle) = self.polling.lock().take() {
            handle.token.cancel();
            handle.task.abort();
            info!(network = %handle.network, "Gas polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.polling
            .lock()
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    /// Drop every derived gas value.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        let epoch = state.epoch + 1;
        *state = GasState::new(self.inner.config.default_speed);
        state.epoch = epoch;
    }
}

impl Drop for GasCoordinator {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

async fn poll_loop(
    inner: Arc<GasInner>,
    network: Network,
    flashbots: bool,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(inner.config.poll_interval_ms));

    loop {
        tokio::select! {
            () = token.cancelled() => {
                debug!(%network, "Gas poll loop cancelled");
                break;
            }
            _ = ticker.tick() => {
                match inner.fee_source.fetch_fee_params(network, flashbots).await {
                    Ok(params) => {
                        Metrics::gas_poll(network.as_str(), "ok");
                        inner.apply_fee_params(network, params);
                    }
                    Err(e) => {
                        warn!(%network, error = %e, "Gas fee poll failed");
                        Metrics::gas_poll(network.as_str(), "error");
                    }
                }
            }
        }
    }
}

fn network_label(chain_id: ChainId) -> &'static str {
    Network::from_chain_id(chain_id)
        .map(|n| n.as_str())
        .unwrap_or("unknown")
}
