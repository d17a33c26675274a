//! Prometheus metrics for swapflow.
//!
//! Covers:
//! - Quote derivation outcomes and latency
//! - Gas fee polling and estimation fallbacks
//! - Rap execution per rap and per step
//! - Submission rejections and analytics sink failures
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a fatal configuration error that should
//! crash at first use rather than fail silently. These panics only occur
//! during lazy static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec,
};

/// Quote derivations by outcome.
/// Labels: outcome (ready/insufficient_liquidity/superseded/error/passthrough)
pub static QUOTES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "swapflow_quotes_total",
        "Total derived-output computations by outcome",
        &["network", "outcome"]
    )
    .unwrap()
});

/// Upstream quote latency in milliseconds.
pub static QUOTE_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "swapflow_quote_latency_ms",
        "Upstream quote source latency in milliseconds",
        &["network"],
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// Gas fee polls by outcome.
pub static GAS_POLLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "swapflow_gas_polls_total",
        "Total gas fee polls",
        &["network", "outcome"]
    )
    .unwrap()
});

/// Gas estimations that fell back to a default.
/// Labels: reason (simulation_failed/l1_fee_failed/no_trade_details)
pub static GAS_ESTIMATE_FALLBACK_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "swapflow_gas_estimate_fallback_total",
        "Total gas estimations recovered with a default value",
        &["network", "reason"]
    )
    .unwrap()
});

/// Last applied gas limit.
pub static GAS_LIMIT: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "swapflow_gas_limit",
        "Gas limit currently applied to the fee estimate",
        &["network"]
    )
    .unwrap()
});

/// Gas estimates discarded because a newer one was already applied.
pub static GAS_ESTIMATE_STALE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "swapflow_gas_estimate_stale_total",
        "Total gas estimates discarded as stale",
        &["network"]
    )
    .unwrap()
});

/// Raps by final state.
/// Labels: outcome (completed/partially_failed/aborted)
pub static RAPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "swapflow_raps_total",
        "Total rap executions by final state",
        &["rap_type", "outcome"]
    )
    .unwrap()
});

/// Rap steps by status.
/// Labels: status (confirmed/skipped/failed)
pub static RAP_STEPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "swapflow_rap_steps_total",
        "Total rap steps by action kind and status",
        &["kind", "status"]
    )
    .unwrap()
});

/// Rap duration in milliseconds.
pub static RAP_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "swapflow_rap_duration_ms",
        "Rap execution duration in milliseconds",
        &["rap_type"],
        vec![100.0, 500.0, 1000.0, 5000.0, 15000.0, 30000.0, 60000.0, 180000.0]
    )
    .unwrap()
});

/// Submissions rejected before any chain interaction.
pub static SUBMIT_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "swapflow_submit_rejected_total",
        "Total submissions rejected before chain interaction",
        &["reason"]
    )
    .unwrap()
});

/// Analytics events by sink outcome.
pub static EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "swapflow_events_total",
        "Total analytics events by outcome",
        &["event", "outcome"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a derived-output outcome.
    pub fn quote_outcome(network: &str, outcome: &str) {
        QUOTES_TOTAL.with_label_values(&[network, outcome]).inc();
    }

    /// Record upstream quote latency.
    pub fn quote_latency(network: &str, latency_ms: f64) {
        QUOTE_LATENCY_MS
            .with_label_values(&[network])
            .observe(latency_ms);
    }

    /// Record a gas fee poll.
    pub fn gas_poll(network: &str, outcome: &str) {
        GAS_POLLS_TOTAL.with_label_values(&[network, outcome]).inc();
    }

    /// Record a gas estimation fallback.
    pub fn gas_estimate_fallback(network: &str, reason: &str) {
        GAS_ESTIMATE_FALLBACK_TOTAL
            .with_label_values(&[network, reason])
            .inc();
    }

    /// Set the applied gas limit.
    pub fn gas_limit(network: &str, gas_limit: u64) {
        GAS_LIMIT.with_label_values(&[network]).set(gas_limit as f64);
    }

    /// Record a stale gas estimate.
    pub fn gas_estimate_stale(network: &str) {
        GAS_ESTIMATE_STALE_TOTAL.with_label_values(&[network]).inc();
    }

    /// Record a finished rap.
    pub fn rap_finished(rap_type: &str, outcome: &str, duration_ms: f64) {
        RAPS_TOTAL.with_label_values(&[rap_type, outcome]).inc();
        RAP_DURATION_MS
            .with_label_values(&[rap_type])
            .observe(duration_ms);
    }

    /// Record a rap step.
    pub fn rap_step(kind: &str, status: &str) {
        RAP_STEPS_TOTAL.with_label_values(&[kind, status]).inc();
    }

    /// Record a rejected submission.
    pub fn submit_rejected(reason: &str) {
        SUBMIT_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record an analytics event.
    pub fn event(event: &str, outcome: &str) {
        EVENTS_TOTAL.with_label_values(&[event, outcome]).inc();
    }
}
