//! Derived output engine.
//!
//! Every amount edit or pair change issues a new generation. Only the most
//! recently issued generation may publish its result; earlier ones resolve
//! to [`DerivedOutcome::Superseded`] and leave the published state alone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use swapflow_core::{Amount, Asset, ChainId, EditedField, Network, OperationKind, TradeDetails};
use swapflow_risk::PriceImpactGuard;
use swapflow_telemetry::Metrics;
use tracing::{debug, warn};

use crate::error::{QuoteError, QuoteResult};
use crate::source::{QuoteAmount, QuoteRequest, QuoteSource};

/// One amount edit and the context it happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedRequest {
    pub chain_id: ChainId,
    pub kind: OperationKind,
    pub edited_field: EditedField,
    /// Token units for input/output edits, USD for native edits.
    pub edited_amount: Amount,
    pub input_asset: Asset,
    /// Ignored by savings operations, which map 1:1 onto the input asset.
    pub output_asset: Asset,
    pub slippage_bips: u32,
    pub from: Address,
}

/// Amounts derived from one edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedOutputs {
    pub input_amount: Amount,
    pub output_amount: Amount,
    /// USD value of the input amount.
    pub native_amount: Option<Decimal>,
    pub trade_details: Option<TradeDetails>,
    /// Percent lost between input and output USD value.
    pub price_impact: Option<Decimal>,
}

impl DerivedOutputs {
    fn passthrough(input_asset: &Asset, amount: Amount) -> Self {
        Self {
            input_amount: amount,
            output_amount: amount,
            native_amount: input_asset.value_of(amount),
            trade_details: None,
            price_impact: None,
        }
    }
}

/// Result of one `compute_derived` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedOutcome {
    Ready(DerivedOutputs),
    /// No route exists; submission stays disabled.
    InsufficientLiquidity,
    /// A newer edit was issued while this one was in flight.
    Superseded,
}

/// Published state, as the UI would render it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DerivedState {
    #[default]
    Idle,
    Loading,
    Ready(DerivedOutputs),
    InsufficientLiquidity,
}

impl DerivedState {
    #[must_use]
    pub fn outputs(&self) -> Option<&DerivedOutputs> {
        match self {
            Self::Ready(outputs) => Some(outputs),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

pub struct DerivedOutputEngine {
    source: Arc<dyn QuoteSource>,
    debounce: Duration,
    generation: AtomicU64,
    state: Mutex<DerivedState>,
}

impl DerivedOutputEngine {
    pub fn new(source: Arc<dyn QuoteSource>, debounce: Duration) -> Self {
        Self {
            source,
            debounce,
            generation: AtomicU64::new(0),
            state: Mutex::new(DerivedState::Idle),
        }
    }

    /// Currently published state.
    pub fn state(&self) -> DerivedState {
        self.state.lock().clone()
    }

    /// Supersede anything in flight and clear the published state.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.state.lock() = DerivedState::Idle;
    }

    /// Derive amounts for one edit.
    ///
    /// Savings operations map 1:1 without touching the quote source.
    pub async fn compute_derived(&self, request: DerivedRequest) -> QuoteResult<DerivedOutcome> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let network = network_label(request.chain_id);

        match request.kind {
            OperationKind::Deposit | OperationKind::Withdrawal => {
                let amount = match request.edited_field {
                    EditedField::Native => native_to_input(&request)?,
                    EditedField::Input | EditedField::Output => request.edited_amount,
                };
                let outputs = DerivedOutputs::passthrough(&request.input_asset, amount);
                self.publish(generation, DerivedState::Ready(outputs.clone()));
                Metrics::quote_outcome(network, "passthrough");
                Ok(DerivedOutcome::Ready(outputs))
            }
            OperationKind::Swap => self.derive_swap(generation, network, request).await,
        }
    }

    async fn derive_swap(
        &self,
        generation: u64,
        network: &'static str,
        request: DerivedRequest,
    ) -> QuoteResult<DerivedOutcome> {
        let amount = match request.edited_field {
            EditedField::Input => QuoteAmount::ExactInput(request.edited_amount),
            EditedField::Native => QuoteAmount::ExactInput(native_to_input(&request)?),
            EditedField::Output => QuoteAmount::ExactOutput(request.edited_amount),
        };

        if amount.amount().is_zero() {
            let outputs = DerivedOutputs {
                input_amount: Amount::ZERO,
                output_amount: Amount::ZERO,
                native_amount: None,
                trade_details: None,
                price_impact: None,
            };
            self.publish(generation, DerivedState::Ready(outputs.clone()));
            return Ok(DerivedOutcome::Ready(outputs));
        }
        if !amount.amount().is_positive() {
            return Err(QuoteError::InvalidAmount(amount.amount().to_string()));
        }

        self.publish(generation, DerivedState::Loading);

        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
            if self.is_superseded(generation) {
                Metrics::quote_outcome(network, "superseded");
                return Ok(DerivedOutcome::Superseded);
            }
        }

        let quote_request = QuoteRequest {
            chain_id: request.chain_id,
            input_asset: request.input_asset.clone(),
            output_asset: request.output_asset.clone(),
            amount,
            slippage_bips: request.slippage_bips,
            from: request.from,
        };
        let started = Instant::now();
        let result = self.source.get_trade_details(quote_request).await;
        Metrics::quote_latency(network, started.elapsed().as_secs_f64() * 1000.0);

        if self.is_superseded(generation) {
            debug!(generation, network, "Quote superseded by a newer edit");
            Metrics::quote_outcome(network, "superseded");
            return Ok(DerivedOutcome::Superseded);
        }

        let trade = match result {
            Ok(Some(trade)) => trade,
            Ok(None) => {
                debug!(network, "No route for pair");
                self.publish(generation, DerivedState::InsufficientLiquidity);
                Metrics::quote_outcome(network, "insufficient_liquidity");
                return Ok(DerivedOutcome::InsufficientLiquidity);
            }
            Err(e) => {
                warn!(network, error = %e, "Quote source failed");
                self.publish(generation, DerivedState::Idle);
                Metrics::quote_outcome(network, "error");
                return Err(e);
            }
        };

        let (input_amount, output_amount) = match amount {
            QuoteAmount::ExactInput(input) => (input, trade.output_amount),
            QuoteAmount::ExactOutput(output) => (trade.input_amount, output),
        };
        let outputs = DerivedOutputs {
            input_amount,
            output_amount,
            native_amount: request.input_asset.value_of(input_amount),
            price_impact: price_impact(
                request.input_asset.value_of(input_amount),
                request.output_asset.value_of(output_amount),
            ),
            trade_details: Some(trade),
        };

        if !self.publish(generation, DerivedState::Ready(outputs.clone())) {
            Metrics::quote_outcome(network, "superseded");
            return Ok(DerivedOutcome::Superseded);
        }
        Metrics::quote_outcome(network, "ready");
        Ok(DerivedOutcome::Ready(outputs))
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) != generation
    }

    /// Publish `state` if `generation` is still the latest.
    fn publish(&self, generation: u64, state: DerivedState) -> bool {
        let mut guard = self.state.lock();
        if self.is_superseded(generation) {
            return false;
        }
        *guard = state;
        true
    }
}

/// Convert a USD edit into input token units at the input's live price.
fn native_to_input(request: &DerivedRequest) -> QuoteResult<Amount> {
    let price = request
        .input_asset
        .price
        .filter(|p| !p.is_zero())
        .ok_or_else(|| QuoteError::MissingPrice(request.input_asset.symbol.clone()))?;
    request
        .edited_amount
        .checked_div(price.inner())
        .ok_or_else(|| QuoteError::InvalidAmount(request.edited_amount.to_string()))
}

fn price_impact(input_value: Option<Decimal>, output_value: Option<Decimal>) -> Option<Decimal> {
    PriceImpactGuard::price_impact(input_value?, output_value?)
}

fn network_label(chain_id: ChainId) -> &'static str {
    Network::from_chain_id(chain_id)
        .map(|n| n.as_str())
        .unwrap_or("unknown")
}
