//! Exchange session orchestration.
//!
//! A [`SwapOrchestrator`] is the explicit context of one exchange flow. It is
//! created on flow entry, driven by [`SessionEvent`]s through a single
//! dispatcher and torn down on flow exit.
//!
//! # Lifecycle
//!
//! ```text
//! new -> activate -> dispatch* -> handle_submit* -> teardown
//! ```
//!
//! # Submission
//!
//! `handle_submit` takes the reentrancy permit, re-validates preconditions,
//! pauses for confirmation when gas costs more than the output, authorizes
//! the wallet and hands over to `submit`, which reserves nonces and runs the
//! rap on its own task. The permit travels with that task, so the session
//! stays blocked until the rap is terminal even if the caller goes away.
//! Teardown detaches the UI but never cancels a rap that is already
//! executing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use swapflow_core::{
    Amount, Asset, EditedField, GasSpeed, Network, OperationKind, Price, RapType, SwapParameters,
};
use swapflow_executor::{
    NetworkRegistry, NonceManager, RapCompletion, RapContext, RapExecutionPipeline, RapReport,
    RapState, SigningHandle, WalletProvider,
};
use swapflow_gas::{GasCoordinator, GasEstimateRequest, GasFeeSource};
use swapflow_quote::{DerivedOutcome, DerivedOutputEngine, DerivedOutputs, DerivedRequest, QuoteSource};
use swapflow_risk::{HighImpactDebouncer, ImpactSeverity, PriceImpactGuard};
use swapflow_telemetry::{EventProperties, Metrics, Telemetry, TelemetrySink};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{SwapError, SwapResult};
use crate::ui::{UiSignal, UiSink};

/// External collaborators of a session.
#[derive(Clone)]
pub struct Collaborators {
    pub wallet: Arc<dyn WalletProvider>,
    pub networks: Arc<dyn NetworkRegistry>,
    /// Shared with every other flow of the same account.
    pub nonces: Arc<NonceManager>,
    pub quotes: Arc<dyn QuoteSource>,
    pub gas_fees: Arc<dyn GasFeeSource>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub ui: Arc<dyn UiSink>,
}

/// Initial selection of a session.
#[derive(Debug, Clone)]
pub struct SessionInit {
    pub kind: OperationKind,
    pub account: Address,
    pub input: Option<Asset>,
    pub output: Option<Asset>,
    /// Savings market for deposits and withdrawals.
    pub savings_contract: Option<Address>,
    /// USD price of the native asset of the session network.
    pub native_price: Option<Price>,
}

/// Tracked input changes.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    EditAmount { field: EditedField, amount: Amount },
    SelectInput(Asset),
    SelectOutput(Asset),
    /// Swap input and output selections.
    Flip,
    /// Use the whole input balance.
    MaxInput,
    SelectSpeed(GasSpeed),
    SetFlashbots(bool),
    NativePrice(Option<Price>),
}

/// Why the submit control is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReady {
    Inactive,
    CurrencyNotSelected,
    EnterAmount,
    InsufficientLiquidity,
    Loading,
    NoQuote,
    InsufficientBalance,
    Authorizing,
}

impl From<NotReady> for SwapError {
    fn from(reason: NotReady) -> Self {
        match reason {
            NotReady::Inactive => SwapError::Inactive,
            NotReady::CurrencyNotSelected => SwapError::CurrencyNotSelected,
            NotReady::EnterAmount => SwapError::AmountRequired,
            NotReady::InsufficientLiquidity => SwapError::InsufficientLiquidity,
            NotReady::Loading => SwapError::QuotePending,
            NotReady::NoQuote => SwapError::NoRoute,
            NotReady::InsufficientBalance => SwapError::InsufficientBalance,
            NotReady::Authorizing => SwapError::SubmissionInFlight,
        }
    }
}

/// Submit-control state as the UI renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub blocked_by: Option<NotReady>,
    /// Debounced high price impact flag.
    pub is_high_price_impact: bool,
    pub severity: ImpactSeverity,
}

impl Readiness {
    pub fn can_submit(&self) -> bool {
        self.blocked_by.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted {
        rap_type: RapType,
        tx_hash: Option<B256>,
        report: RapReport,
    },
    /// The user declined, or the session went away before anything was sent.
    Cancelled,
}

/// Proof that the caller holds the session's single submission slot.
///
/// The slot is released when the permit is dropped.
#[derive(Debug)]
pub struct SubmissionPermit {
    in_flight: Arc<AtomicBool>,
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

struct SessionState {
    active: bool,
    kind: OperationKind,
    account: Address,
    input: Option<Asset>,
    output: Option<Asset>,
    savings_contract: Option<Address>,
    edited_field: EditedField,
    edited_amount: Amount,
    outputs: Option<DerivedOutputs>,
    insufficient_liquidity: bool,
    network: Network,
    slippage_bips: u32,
    flashbots_setting: bool,
    high_impact: HighImpactDebouncer,
}

impl SessionState {
    fn flashbots(&self) -> bool {
        self.flashbots_setting && self.network.supports_flashbots()
    }

    fn resolved_network(&self) -> Network {
        self.input
            .as_ref()
            .or(self.output.as_ref())
            .map_or(Network::Mainnet, |asset| asset.network)
    }

    fn output_asset(&self) -> Option<&Asset> {
        match self.kind {
            OperationKind::Deposit | OperationKind::Withdrawal => self.input.as_ref(),
            OperationKind::Swap => self.output.as_ref(),
        }
    }

    fn clear_amounts(&mut self) {
        self.edited_field = EditedField::Input;
        self.edited_amount = Amount::ZERO;
        self.outputs = None;
        self.insufficient_liquidity = false;
        self.high_impact.reset();
    }
}

/// Everything `submit` needs, captured under one lock.
#[derive(Debug, Clone)]
struct SubmissionSnapshot {
    kind: OperationKind,
    network: Network,
    input: Asset,
    output: Asset,
    outputs: DerivedOutputs,
    slippage_bips: u32,
    flashbots: bool,
    savings_contract: Option<Address>,
}

pub struct SwapOrchestrator {
    config: AppConfig,
    wallet: Arc<dyn WalletProvider>,
    networks: Arc<dyn NetworkRegistry>,
    nonces: Arc<NonceManager>,
    gas_fees: Arc<dyn GasFeeSource>,
    ui: Arc<dyn UiSink>,
    telemetry: Telemetry,
    engine: DerivedOutputEngine,
    gas: GasCoordinator,
    guard: PriceImpactGuard,
    state: Mutex<SessionState>,
    native_price: Option<Price>,
    in_flight: Arc<AtomicBool>,
    ui_attached: AtomicBool,
    clock: Instant,
}

impl SwapOrchestrator {
    pub fn new(config: AppConfig, collaborators: Collaborators, init: SessionInit) -> Self {
        let engine = DerivedOutputEngine::new(
            collaborators.quotes,
            Duration::from_millis(config.quote.debounce_ms),
        );
        let gas = GasCoordinator::new(
            collaborators.gas_fees.clone(),
            collaborators.networks.clone(),
            config.gas.clone(),
        );
        let guard = PriceImpactGuard::new(config.price_impact.clone());
        let state = SessionState {
            active: false,
            kind: init.kind,
            account: init.account,
            input: init.input,
            output: init.output,
            savings_contract: init.savings_contract,
            edited_field: EditedField::Input,
            edited_amount: Amount::ZERO,
            outputs: None,
            insufficient_liquidity: false,
            network: Network::Mainnet,
            slippage_bips: config.slippage.for_network(Network::Mainnet),
            flashbots_setting: config.session.flashbots_enabled,
            high_impact: HighImpactDebouncer::new(config.price_impact.debounce_ms),
        };

        Self {
            wallet: collaborators.wallet,
            networks: collaborators.networks,
            nonces: collaborators.nonces,
            gas_fees: collaborators.gas_fees,
            ui: collaborators.ui,
            telemetry: Telemetry::new(collaborators.telemetry),
            engine,
            gas,
            guard,
            state: Mutex::new(state),
            native_price: init.native_price,
            in_flight: Arc::new(AtomicBool::new(false)),
            ui_attached: AtomicBool::new(false),
            clock: Instant::now(),
            config,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.state.lock().kind
    }

    pub fn network(&self) -> Network {
        self.state.lock().network
    }

    pub fn slippage_bips(&self) -> u32 {
        self.state.lock().slippage_bips
    }

    /// Whether submissions go through the private relay.
    pub fn flashbots(&self) -> bool {
        self.state.lock().flashbots()
    }

    pub fn input(&self) -> Option<Asset> {
        self.state.lock().input.clone()
    }

    pub fn output(&self) -> Option<Asset> {
        self.state.lock().output.clone()
    }

    /// Latest derived amounts.
    pub fn outputs(&self) -> Option<DerivedOutputs> {
        self.state.lock().outputs.clone()
    }

    /// Counter-amount field visibility.
    pub fn show_output_field(&self) -> bool {
        self.kind().show_output_field()
    }

    pub fn gas(&self) -> &GasCoordinator {
        &self.gas
    }

    /// Enter the flow: resolve the network, align the default output to it
    /// and start gas polling.
    pub async fn activate(&self) {
        let (kind, network, flashbots) = {
            let mut state = self.state.lock();
            let network = state.resolved_network();
            if let Some(output) = state.output.take() {
                state.output = if output.network == network {
                    Some(output)
                } else {
                    let aligned = output.on_network(network);
                    if aligned.is_none() {
                        debug!(symbol = %output.symbol, %network, "Output asset not available on input network, cleared");
                    }
                    aligned
                };
            }
            state.network = network;
            state.slippage_bips = self.config.slippage.for_network(network);
            state.active = true;
            (state.kind, network, state.flashbots())
        };
        self.ui_attached.store(true, Ordering::Release);

        self.gas.select_network(kind, network);
        self.gas.set_native_price(self.native_price);
        self.refresh_fees(network, flashbots).await;
        self.gas.start_polling(network, flashbots);

        info!(%kind, %network, flashbots, "Session activated");
    }

    /// Apply one tracked input change and recompute what depends on it.
    pub async fn dispatch(&self, event: SessionEvent) -> SwapResult<()> {
        if !self.state.lock().active {
            return Err(SwapError::Inactive);
        }
        debug!(?event, "Session event");

        match event {
            SessionEvent::EditAmount { field, amount } => {
                let mut state = self.state.lock();
                state.edited_field = field;
                state.edited_amount = amount;
            }
            SessionEvent::SelectInput(asset) => {
                self.state.lock().input = Some(asset);
                self.sync_network().await;
            }
            SessionEvent::SelectOutput(asset) => {
                self.state.lock().output = Some(asset);
                self.sync_network().await;
            }
            SessionEvent::Flip => {
                {
                    let mut state = self.state.lock();
                    if state.kind.is_savings() {
                        debug!(kind = %state.kind, "Flip ignored for savings operation");
                        return Ok(());
                    }
                    let previous_output = state
                        .outputs
                        .as_ref()
                        .map_or(Amount::ZERO, |o| o.output_amount);
                    let SessionState { input, output, .. } = &mut *state;
                    std::mem::swap(input, output);
                    state.edited_field = EditedField::Input;
                    state.edited_amount = previous_output;
                }
                self.sync_network().await;
            }
            SessionEvent::MaxInput => {
                let reserve = self.gas.selected_fee().map(|fee| fee.native);
                let mut state = self.state.lock();
                let input = state.input.as_ref().ok_or(SwapError::CurrencyNotSelected)?;
                let mut max = input.balance.inner();
                if input.is_native() {
                    if let Some(reserve) = reserve {
                        max = (max - reserve).max(Decimal::ZERO);
                    }
                }
                state.edited_field = EditedField::Input;
                state.edited_amount = Amount::new(max);
            }
            SessionEvent::SelectSpeed(speed) => {
                self.gas.select_speed(speed);
                return Ok(());
            }
            SessionEvent::SetFlashbots(enabled) => {
                let (network, flashbots) = {
                    let mut state = self.state.lock();
                    state.flashbots_setting = enabled;
                    (state.network, state.flashbots())
                };
                self.gas.start_polling(network, flashbots);
                return Ok(());
            }
            SessionEvent::NativePrice(price) => {
                self.gas.set_native_price(price);
                return Ok(());
            }
        }

        self.recompute().await
    }

    /// Submit-control state.
    pub fn readiness(&self) -> Readiness {
        let now_ms = self.now_ms();
        let mut state = self.state.lock();
        let blocked_by = if self.in_flight.load(Ordering::Acquire) {
            Some(NotReady::Authorizing)
        } else {
            self.precondition(&state)
        };
        let severity = state
            .outputs
            .as_ref()
            .and_then(|o| o.price_impact)
            .map(|impact| self.guard.severity(impact))
            .unwrap_or_default();

        Readiness {
            blocked_by,
            is_high_price_impact: state.high_impact.value_at(now_ms),
            severity,
        }
    }

    /// Obtain a signing handle. A missing wallet aborts the submission.
    pub async fn authorize(&self) -> SwapResult<Arc<dyn SigningHandle>> {
        match self.wallet.load_wallet().await {
            Some(signer) => {
                debug!(account = %signer.address(), "Wallet loaded");
                Ok(signer)
            }
            None => {
                let kind = self.kind();
                error!(%kind, "Wallet unavailable, submission aborted");
                Metrics::submit_rejected(SwapError::WalletUnavailable.as_str());
                self.notify(UiSignal::OperationFailed {
                    message: SwapError::WalletUnavailable.to_string(),
                });
                Err(SwapError::WalletUnavailable)
            }
        }
    }

    /// Take the session's submission slot.
    pub fn begin_submission(&self) -> SwapResult<SubmissionPermit> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            Metrics::submit_rejected(SwapError::SubmissionInFlight.as_str());
            return Err(SwapError::SubmissionInFlight);
        }
        Ok(SubmissionPermit {
            in_flight: self.in_flight.clone(),
        })
    }

    /// The submit control.
    pub async fn handle_submit(&self) -> SwapResult<SubmitOutcome> {
        let permit = self.begin_submission()?;

        let snapshot = self.snapshot().map_err(|e| {
            Metrics::submit_rejected(e.as_str());
            e
        })?;
        self.track_submitted(&snapshot);

        if !self.confirm_cost(&snapshot).await {
            return Ok(SubmitOutcome::Cancelled);
        }

        let signer = self.authorize().await?;
        self.submit(permit, signer).await
    }

    /// Reserve nonces and run the rap for the current selection.
    ///
    /// The rap runs on its own task and owns `permit` until it reaches a
    /// terminal state; dropping this future or tearing the session down does
    /// not stop it and does not release the submission slot early.
    pub async fn submit(
        &self,
        permit: SubmissionPermit,
        signer: Arc<dyn SigningHandle>,
    ) -> SwapResult<SubmitOutcome> {
        let snapshot = self.snapshot()?;
        let chain_id = snapshot.network.chain_id();
        let fee = self
            .gas
            .selected_fee_params()
            .ok_or(SwapError::GasPriceUnavailable)?;
        let provider = self.networks.provider_for(chain_id)?;
        let account = signer.address();

        let lease = self.nonces.reserve(account, snapshot.network).await?;
        let params = SwapParameters {
            chain_id,
            input_asset: snapshot.input.clone(),
            output_asset: snapshot.output.clone(),
            input_amount: snapshot.outputs.input_amount,
            output_amount: snapshot.outputs.output_amount,
            nonce: lease.start(),
            flashbots: snapshot.flashbots,
            trade_details: snapshot.outputs.trade_details.clone(),
            savings_contract: snapshot.savings_contract,
        };
        let rap_type = RapType::select(snapshot.kind, &snapshot.input, &snapshot.output);
        let pipeline = RapExecutionPipeline::build(
            rap_type,
            params,
            account,
            fee,
            &self.gas.config().limits,
        )?
        .on_complete(self.completion_handler(&snapshot));

        if !self.ui_attached.load(Ordering::Acquire) {
            pipeline.abort("session torn down")?;
            return Ok(SubmitOutcome::Cancelled);
        }

        info!(
            %rap_type,
            network = %snapshot.network,
            nonce_start = lease.start(),
            flashbots = snapshot.flashbots,
            "Submitting rap"
        );
        let context = RapContext {
            signer,
            provider,
            lease,
        };
        let task = tokio::spawn(async move {
            let report = pipeline.execute(context).await;
            (report, permit)
        });
        // Held until the outcome below is applied.
        let (report, _permit) = task.await.map_err(|e| SwapError::Task(e.to_string()))?;

        match &report.state {
            RapState::Completed => {
                let tx_hash = report.final_tx_hash();
                self.state.lock().clear_amounts();
                self.engine.reset();
                self.notify(UiSignal::OperationSucceeded { tx_hash });
                Ok(SubmitOutcome::Submitted {
                    rap_type,
                    tx_hash,
                    report,
                })
            }
            RapState::PartiallyFailed { step, cause } => {
                self.notify(UiSignal::OperationFailed {
                    message: cause.clone(),
                });
                Err(SwapError::StepExecutionFailed {
                    index: *step,
                    cause: cause.clone(),
                })
            }
            RapState::Aborted { .. } => Ok(SubmitOutcome::Cancelled),
            RapState::Built | RapState::Executing { .. } => Err(SwapError::Task(format!(
                "rap returned in state {}",
                report.state.as_str()
            ))),
        }
    }

    /// Leave the flow. Stops polling and drops every derived value; a rap
    /// already executing keeps running.
    pub fn teardown(&self) {
        self.ui_attached.store(false, Ordering::Release);
        self.gas.stop_polling();
        self.gas.clear();
        self.engine.reset();

        let mut state = self.state.lock();
        state.active = false;
        state.clear_amounts();
        info!(kind = %state.kind, network = %state.network, "Session torn down");
    }

    async fn refresh_fees(&self, network: Network, flashbots: bool) {
        match self.gas_fees.fetch_fee_params(network, flashbots).await {
            Ok(params) => {
                self.gas.apply_fee_params(network, params);
            }
            Err(e) => warn!(%network, error = %e, "Initial gas fee fetch failed"),
        }
    }

    /// Follow the resolved network after a selection change.
    async fn sync_network(&self) {
        let (kind, network, flashbots) = {
            let mut state = self.state.lock();
            let network = state.resolved_network();
            if network == state.network {
                return;
            }
            state.network = network;
            state.slippage_bips = self.config.slippage.for_network(network);
            state.outputs = None;
            (state.kind, network, state.flashbots())
        };
        info!(%network, "Session network changed");

        self.gas.select_network(kind, network);
        self.refresh_fees(network, flashbots).await;
        self.gas.start_polling(network, flashbots);
    }

    async fn recompute(&self) -> SwapResult<()> {
        let Some(request) = self.derived_request() else {
            return Ok(());
        };

        let outcome = match self.engine.compute_derived(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Derivation failed");
                self.state.lock().outputs = None;
                return Err(e.into());
            }
        };

        match outcome {
            DerivedOutcome::Ready(outputs) => {
                if self.engine.state().outputs() != Some(&outputs) {
                    return Ok(());
                }
                let raw_high = outputs
                    .price_impact
                    .is_some_and(|impact| self.guard.severity(impact) != ImpactSeverity::None);
                let now_ms = self.now_ms();
                let gas_request = {
                    let mut state = self.state.lock();
                    state.outputs = Some(outputs.clone());
                    state.insufficient_liquidity = false;
                    state.high_impact.update_at(raw_high, now_ms);
                    self.gas_request(&state, &outputs)
                };
                if let Some(request) = gas_request {
                    self.gas.on_trade_details(request).await;
                }
            }
            DerivedOutcome::InsufficientLiquidity => {
                let now_ms = self.now_ms();
                let mut state = self.state.lock();
                state.outputs = None;
                state.insufficient_liquidity = true;
                state.high_impact.update_at(false, now_ms);
            }
            DerivedOutcome::Superseded => {}
        }
        Ok(())
    }

    fn derived_request(&self) -> Option<DerivedRequest> {
        let state = self.state.lock();
        let input = state.input.clone()?;
        let output = state.output_asset()?.clone();
        Some(DerivedRequest {
            chain_id: state.network.chain_id(),
            kind: state.kind,
            edited_field: state.edited_field,
            edited_amount: state.edited_amount,
            input_asset: input,
            output_asset: output,
            slippage_bips: state.slippage_bips,
            from: state.account,
        })
    }

    fn gas_request(
        &self,
        state: &SessionState,
        outputs: &DerivedOutputs,
    ) -> Option<GasEstimateRequest> {
        Some(GasEstimateRequest {
            kind: state.kind,
            chain_id: state.network.chain_id(),
            input_asset: state.input.clone()?,
            output_asset: state.output_asset()?.clone(),
            input_amount: outputs.input_amount,
            output_amount: outputs.output_amount,
            trade_details: outputs.trade_details.clone(),
            account: state.account,
            savings_contract: state.savings_contract,
        })
    }

    fn precondition(&self, state: &SessionState) -> Option<NotReady> {
        if !state.active {
            return Some(NotReady::Inactive);
        }
        let Some(input) = state.input.as_ref() else {
            return Some(NotReady::CurrencyNotSelected);
        };
        if state.output_asset().is_none() {
            return Some(NotReady::CurrencyNotSelected);
        }
        if state.edited_amount.is_zero() {
            return Some(NotReady::EnterAmount);
        }
        if state.insufficient_liquidity {
            return Some(NotReady::InsufficientLiquidity);
        }
        if self.engine.state().is_loading() {
            return Some(NotReady::Loading);
        }
        let Some(outputs) = state.outputs.as_ref() else {
            return Some(NotReady::NoQuote);
        };
        if state.kind == OperationKind::Swap && outputs.trade_details.is_none() {
            return Some(NotReady::NoQuote);
        }
        if outputs.input_amount > input.balance {
            return Some(NotReady::InsufficientBalance);
        }
        None
    }

    fn snapshot(&self) -> SwapResult<SubmissionSnapshot> {
        let state = self.state.lock();
        if let Some(reason) = self.precondition(&state) {
            return Err(reason.into());
        }
        let input = state.input.clone().ok_or(SwapError::CurrencyNotSelected)?;
        let output = state
            .output_asset()
            .cloned()
            .ok_or(SwapError::CurrencyNotSelected)?;
        let outputs = state.outputs.clone().ok_or(SwapError::NoRoute)?;

        let chain_id = state.network.chain_id();
        if let Some(trade) = &outputs.trade_details {
            if !trade.matches_chain(chain_id) {
                return Err(SwapError::StaleTradeDetails {
                    expected: chain_id,
                    found: trade.chain_id,
                });
            }
        }

        Ok(SubmissionSnapshot {
            kind: state.kind,
            network: state.network,
            input,
            output,
            outputs,
            slippage_bips: state.slippage_bips,
            flashbots: state.flashbots(),
            savings_contract: state.savings_contract,
        })
    }

    /// Gas-vs-output check. Returns `false` when the user declined.
    async fn confirm_cost(&self, snapshot: &SubmissionSnapshot) -> bool {
        let gas_cost_usd = self
            .gas
            .selected_fee()
            .and_then(|fee| fee.usd)
            .unwrap_or(Decimal::ZERO);
        let output_value_usd = snapshot
            .output
            .value_of(snapshot.outputs.output_amount)
            .unwrap_or(Decimal::ZERO);
        let impact = snapshot.outputs.price_impact.unwrap_or(Decimal::ZERO);

        let evaluation = self.guard.evaluate(output_value_usd, gas_cost_usd, impact);
        let Some(reason) = evaluation.reason else {
            return true;
        };

        self.notify(UiSignal::ConfirmationRequired {
            reason: reason.clone(),
        });
        let confirmed = self.ui.confirm(reason).await;
        if !confirmed {
            info!(
                kind = %snapshot.kind,
                %gas_cost_usd,
                %output_value_usd,
                "High-cost submission declined"
            );
        }
        confirmed
    }

    /// Properties shared by the submitted, completed and failed events.
    fn event_properties(&self, snapshot: &SubmissionSnapshot) -> EventProperties {
        let amount_in_usd = if self.config.session.displays_usd() {
            snapshot.outputs.native_amount
        } else {
            snapshot.input.value_of(snapshot.outputs.input_amount)
        };
        let is_high_price_impact = {
            let now_ms = self.now_ms();
            self.state.lock().high_impact.value_at(now_ms)
        };
        let trade = snapshot.outputs.trade_details.as_ref();
        let liquidity_sources = trade.map_or(Value::Array(Vec::new()), |t| json!(t.protocols));

        properties(json!({
            "aggregator": trade.map_or("", |t| t.source.as_str()),
            "amountInUSD": amount_in_usd.map_or("0".to_string(), |v| v.round_dp(2).to_string()),
            "inputTokenAddress": snapshot.input.address.to_string(),
            "inputTokenName": snapshot.input.name,
            "inputTokenSymbol": snapshot.input.symbol,
            "isHighPriceImpact": is_high_price_impact,
            "liquiditySources": liquidity_sources.to_string(),
            "network": snapshot.network.as_str(),
            "outputTokenAddress": snapshot.output.address.to_string(),
            "outputTokenName": snapshot.output.name,
            "outputTokenSymbol": snapshot.output.symbol,
            "priceImpact": snapshot.outputs.price_impact.map(|p| p.to_string()),
            "slippage": (Decimal::from(snapshot.slippage_bips) / Decimal::ONE_HUNDRED).to_string(),
            "type": snapshot.kind.as_str(),
        }))
    }

    fn track_submitted(&self, snapshot: &SubmissionSnapshot) {
        self.telemetry.track(
            &format!("Submitted {}", snapshot.kind),
            self.event_properties(snapshot),
        );
    }

    /// Completion telemetry. Runs on the rap task, so it is reported even
    /// when the session is gone.
    fn completion_handler(
        &self,
        snapshot: &SubmissionSnapshot,
    ) -> impl FnOnce(RapCompletion) + Send + 'static {
        let telemetry = self.telemetry.clone();
        let kind = snapshot.kind;
        let mut props = self.event_properties(snapshot);

        move |completion: RapCompletion| {
            if completion.success {
                telemetry.track(&format!("Completed {kind}"), props);
            } else {
                props.insert(
                    "error".to_string(),
                    completion.error_message.map_or(Value::Null, Value::String),
                );
                telemetry.track(&format!("Failed {kind}"), props);
            }
        }
    }

    fn notify(&self, signal: UiSignal) {
        if self.ui_attached.load(Ordering::Acquire) {
            self.ui.notify(signal);
        } else {
            debug!(?signal, "UI detached, signal dropped");
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.clock.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

fn properties(value: Value) -> EventProperties {
    match value {
        Value::Object(map) => map,
        _ => EventProperties::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimChain, SimFeeSource, SimQuoteSource, SimUi, SimWallet};
    use rust_decimal_macros::dec;
    use swapflow_core::ChainId;
    use swapflow_telemetry::RecordingSink;

    struct Harness {
        orchestrator: SwapOrchestrator,
        chain: Arc<SimChain>,
        quotes: Arc<SimQuoteSource>,
        ui: Arc<SimUi>,
        sink: Arc<RecordingSink>,
    }

    fn usdc(network: Network) -> Asset {
        Asset::new(Address::repeat_byte(0x11), network, 6, "USDC", "USD Coin")
            .with_price(Price::new(dec!(1)))
            .with_balance(Amount::new(dec!(500)))
    }

    fn harness(kind: OperationKind, input: Option<Asset>, output: Option<Asset>) -> Harness {
        let mut config = AppConfig::default();
        config.quote.debounce_ms = 0;
        let chain = Arc::new(SimChain::new());
        let quotes = Arc::new(SimQuoteSource::new(dec!(0.2)));
        let ui = Arc::new(SimUi::new(true));
        let sink = Arc::new(RecordingSink::new());
        let collaborators = Collaborators {
            wallet: Arc::new(SimWallet::from_secret(&[0x42; 32]).unwrap()),
            networks: chain.clone(),
            nonces: Arc::new(NonceManager::new(chain.clone())),
            quotes: quotes.clone(),
            gas_fees: Arc::new(SimFeeSource::new(30)),
            telemetry: sink.clone(),
            ui: ui.clone(),
        };
        let init = SessionInit {
            kind,
            account: Address::repeat_byte(0x01),
            input,
            output,
            savings_contract: Some(Address::repeat_byte(0xcc)),
            native_price: Some(Price::new(dec!(2000))),
        };
        Harness {
            orchestrator: SwapOrchestrator::new(config, collaborators, init),
            chain,
            quotes,
            ui,
            sink,
        }
    }

    #[tokio::test]
    async fn test_chain_resolves_from_input_then_output_then_mainnet() {
        let h = harness(OperationKind::Swap, Some(usdc(Network::Polygon)), None);
        h.orchestrator.activate().await;
        assert_eq!(h.orchestrator.network(), Network::Polygon);
        assert_eq!(h.orchestrator.slippage_bips(), 200);
        h.orchestrator.teardown();

        let h = harness(OperationKind::Swap, None, Some(usdc(Network::Arbitrum)));
        h.orchestrator.activate().await;
        assert_eq!(h.orchestrator.network(), Network::Arbitrum);
        h.orchestrator.teardown();

        let h = harness(OperationKind::Swap, None, None);
        h.orchestrator.activate().await;
        assert_eq!(h.orchestrator.network(), Network::Mainnet);
        assert_eq!(h.orchestrator.slippage_bips(), 100);
        h.orchestrator.teardown();
    }

    #[tokio::test]
    async fn test_output_without_implementation_on_input_network_is_cleared() {
        let h = harness(
            OperationKind::Swap,
            Some(Asset::native(Network::Polygon)),
            Some(usdc(Network::Mainnet)),
        );
        h.orchestrator.activate().await;

        assert_eq!(h.orchestrator.network(), Network::Polygon);
        assert!(h.orchestrator.output().is_none());
        h.orchestrator.teardown();
    }

    #[tokio::test]
    async fn test_flashbots_only_on_supporting_network() {
        let h = harness(OperationKind::Swap, Some(usdc(Network::Polygon)), None);
        h.orchestrator.activate().await;
        h.orchestrator
            .dispatch(SessionEvent::SetFlashbots(true))
            .await
            .unwrap();
        assert!(!h.orchestrator.flashbots());

        h.orchestrator
            .dispatch(SessionEvent::SelectInput(usdc(Network::Mainnet)))
            .await
            .unwrap();
        assert!(h.orchestrator.flashbots());
        h.orchestrator.teardown();
    }

    #[tokio::test]
    async fn test_readiness_requires_amount_then_quote() {
        let h = harness(
            OperationKind::Swap,
            Some(usdc(Network::Mainnet)),
            Some(Asset::native(Network::Mainnet).with_price(Price::new(dec!(2000)))),
        );
        h.orchestrator.activate().await;
        assert_eq!(
            h.orchestrator.readiness().blocked_by,
            Some(NotReady::EnterAmount)
        );

        h.orchestrator
            .dispatch(SessionEvent::EditAmount {
                field: EditedField::Input,
                amount: Amount::new(dec!(100)),
            })
            .await
            .unwrap();

        let readiness = h.orchestrator.readiness();
        assert!(readiness.can_submit());
        assert!(!readiness.is_high_price_impact);
        h.orchestrator.teardown();
    }

    #[tokio::test]
    async fn test_insufficient_balance_blocks_submit() {
        let h = harness(
            OperationKind::Swap,
            Some(usdc(Network::Mainnet)),
            Some(Asset::native(Network::Mainnet).with_price(Price::new(dec!(2000)))),
        );
        h.orchestrator.activate().await;
        h.orchestrator
            .dispatch(SessionEvent::EditAmount {
                field: EditedField::Input,
                amount: Amount::new(dec!(900)),
            })
            .await
            .unwrap();

        assert_eq!(
            h.orchestrator.readiness().blocked_by,
            Some(NotReady::InsufficientBalance)
        );
        let err = h.orchestrator.handle_submit().await.unwrap_err();
        assert!(matches!(err, SwapError::InsufficientBalance));
        assert_eq!(h.chain.sent_count(), 0);
        h.orchestrator.teardown();
    }

    #[tokio::test]
    async fn test_missing_output_currency_rejected() {
        let h = harness(OperationKind::Swap, Some(usdc(Network::Mainnet)), None);
        h.orchestrator.activate().await;

        let err = h.orchestrator.handle_submit().await.unwrap_err();
        assert!(matches!(err, SwapError::CurrencyNotSelected));
        h.orchestrator.teardown();
    }

    #[tokio::test]
    async fn test_no_route_reports_insufficient_liquidity() {
        let h = harness(
            OperationKind::Swap,
            Some(usdc(Network::Mainnet)),
            Some(Asset::native(Network::Mainnet)),
        );
        h.quotes.set_no_route(true);
        h.orchestrator.activate().await;
        h.orchestrator
            .dispatch(SessionEvent::EditAmount {
                field: EditedField::Input,
                amount: Amount::new(dec!(10)),
            })
            .await
            .unwrap();

        assert_eq!(
            h.orchestrator.readiness().blocked_by,
            Some(NotReady::InsufficientLiquidity)
        );
        let err = h.orchestrator.handle_submit().await.unwrap_err();
        assert!(matches!(err, SwapError::InsufficientLiquidity));
        h.orchestrator.teardown();
    }

    #[tokio::test]
    async fn test_flip_reuses_previous_output_amount() {
        let eth = Asset::native(Network::Mainnet)
            .with_price(Price::new(dec!(2000)))
            .with_balance(Amount::new(dec!(1)));
        let h = harness(OperationKind::Swap, Some(usdc(Network::Mainnet)), Some(eth));
        h.orchestrator.activate().await;
        h.orchestrator
            .dispatch(SessionEvent::EditAmount {
                field: EditedField::Input,
                amount: Amount::new(dec!(100)),
            })
            .await
            .unwrap();
        let previous_output = h.orchestrator.outputs().unwrap().output_amount;

        h.orchestrator.dispatch(SessionEvent::Flip).await.unwrap();

        assert!(h.orchestrator.input().unwrap().is_native());
        assert_eq!(h.orchestrator.outputs().unwrap().input_amount, previous_output);
        assert_eq!(h.quotes.calls().len(), 2);
        h.orchestrator.teardown();
    }

    #[tokio::test]
    async fn test_max_native_input_keeps_gas_reserve() {
        let eth = Asset::native(Network::Mainnet)
            .with_price(Price::new(dec!(2000)))
            .with_balance(Amount::new(dec!(1)));
        let h = harness(OperationKind::Swap, Some(eth), Some(usdc(Network::Mainnet)));
        h.orchestrator.activate().await;
        let reserve = h.orchestrator.gas().selected_fee().unwrap().native;

        h.orchestrator.dispatch(SessionEvent::MaxInput).await.unwrap();

        assert_eq!(
            h.orchestrator.outputs().unwrap().input_amount,
            Amount::new(dec!(1) - reserve)
        );
        h.orchestrator.teardown();
    }

    #[tokio::test]
    async fn test_teardown_clears_derived_and_gas_state() {
        let h = harness(
            OperationKind::Swap,
            Some(usdc(Network::Mainnet)),
            Some(Asset::native(Network::Mainnet)),
        );
        h.orchestrator.activate().await;
        h.orchestrator
            .dispatch(SessionEvent::EditAmount {
                field: EditedField::Input,
                amount: Amount::new(dec!(100)),
            })
            .await
            .unwrap();
        assert!(h.orchestrator.gas().is_polling());

        h.orchestrator.teardown();

        assert!(!h.orchestrator.gas().is_polling());
        assert!(h.orchestrator.gas().selected_fee().is_none());
        assert!(h.orchestrator.outputs().is_none());
        assert_eq!(h.orchestrator.readiness().blocked_by, Some(NotReady::Inactive));
        assert!(matches!(
            h.orchestrator.dispatch(SessionEvent::MaxInput).await,
            Err(SwapError::Inactive)
        ));
    }

    #[tokio::test]
    async fn test_submission_permit_is_exclusive() {
        let h = harness(OperationKind::Swap, None, None);
        let permit = h.orchestrator.begin_submission().unwrap();

        assert!(matches!(
            h.orchestrator.begin_submission(),
            Err(SwapError::SubmissionInFlight)
        ));
        drop(permit);
        assert!(h.orchestrator.begin_submission().is_ok());
    }

    #[tokio::test]
    async fn test_successful_swap_tracks_submitted_and_completed() {
        let h = harness(
            OperationKind::Swap,
            Some(usdc(Network::Mainnet)),
            Some(Asset::native(Network::Mainnet).with_price(Price::new(dec!(2000)))),
        );
        h.orchestrator.activate().await;
        h.orchestrator
            .dispatch(SessionEvent::EditAmount {
                field: EditedField::Input,
                amount: Amount::new(dec!(100)),
            })
            .await
            .unwrap();

        let outcome = h.orchestrator.handle_submit().await.unwrap();

        let SubmitOutcome::Submitted { rap_type, tx_hash, report } = outcome else {
            panic!("expected submission");
        };
        assert_eq!(rap_type, RapType::Swap);
        assert!(tx_hash.is_some());
        assert_eq!(report.nonces(), vec![0, 1]);
        assert_eq!(
            h.sink.event_names(),
            vec!["Submitted swap".to_string(), "Completed swap".to_string()]
        );
        let (_, completed) = &h.sink.events()[1];
        assert_eq!(completed["slippage"], json!("1"));
        assert_eq!(completed["network"], json!("mainnet"));
        assert!(h
            .ui
            .signals()
            .contains(&UiSignal::OperationSucceeded { tx_hash }));
        assert!(h.chain.sent_chain_ids().iter().all(|c| *c == ChainId::MAINNET));
        h.orchestrator.teardown();
    }

    #[tokio::test]
    async fn test_trade_details_from_other_chain_rejected() {
        let h = harness(
            OperationKind::Swap,
            Some(usdc(Network::Mainnet)),
            Some(Asset::native(Network::Mainnet).with_price(Price::new(dec!(2000)))),
        );
        h.orchestrator.activate().await;
        h.orchestrator
            .dispatch(SessionEvent::EditAmount {
                field: EditedField::Input,
                amount: Amount::new(dec!(100)),
            })
            .await
            .unwrap();
        if let Some(trade) = h
            .orchestrator
            .state
            .lock()
            .outputs
            .as_mut()
            .and_then(|o| o.trade_details.as_mut())
        {
            trade.chain_id = ChainId(137);
        }

        let err = h.orchestrator.handle_submit().await.unwrap_err();

        assert!(matches!(
            err,
            SwapError::StaleTradeDetails {
                expected: ChainId::MAINNET,
                found: ChainId(137),
            }
        ));
        assert_eq!(h.chain.sent_count(), 0);
        assert!(h.sink.event_names().is_empty());
        h.orchestrator.teardown();
    }
}
