//! Session error types.

use swapflow_core::ChainId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwapError {
    /// Wallet could not be loaded. Not retried automatically.
    #[error("Wallet unavailable")]
    WalletUnavailable,

    #[error("No route for this trade")]
    NoRoute,

    #[error("Insufficient liquidity")]
    InsufficientLiquidity,

    #[error("Quote still loading")]
    QuotePending,

    /// Step `index` failed; earlier steps remain committed on-chain.
    #[error("Step {index} failed: {cause}")]
    StepExecutionFailed { index: usize, cause: String },

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Currency not selected")]
    CurrencyNotSelected,

    #[error("Amount required")]
    AmountRequired,

    #[error("Trade details built for chain {found}, session is on chain {expected}")]
    StaleTradeDetails { expected: ChainId, found: ChainId },

    #[error("Gas price unavailable")]
    GasPriceUnavailable,

    #[error("Submission already in flight")]
    SubmissionInFlight,

    #[error("Session not active")]
    Inactive,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Quote error: {0}")]
    Quote(#[from] swapflow_quote::QuoteError),

    #[error("Executor error: {0}")]
    Executor(#[from] swapflow_executor::ExecutorError),

    #[error("Risk error: {0}")]
    Risk(#[from] swapflow_risk::RiskError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] swapflow_telemetry::TelemetryError),

    #[error("Core error: {0}")]
    Core(#[from] swapflow_core::CoreError),

    #[error("Rap task failed: {0}")]
    Task(String),
}

impl SwapError {
    /// Short label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WalletUnavailable => "wallet_unavailable",
            Self::NoRoute => "no_route",
            Self::InsufficientLiquidity => "insufficient_liquidity",
            Self::QuotePending => "quote_pending",
            Self::StepExecutionFailed { .. } => "step_failed",
            Self::InsufficientBalance => "insufficient_balance",
            Self::CurrencyNotSelected => "currency_not_selected",
            Self::AmountRequired => "amount_required",
            Self::StaleTradeDetails { .. } => "stale_trade_details",
            Self::GasPriceUnavailable => "gas_unavailable",
            Self::SubmissionInFlight => "in_flight",
            Self::Inactive => "inactive",
            Self::Config(_) => "config",
            Self::Quote(_) => "quote",
            Self::Executor(_) => "executor",
            Self::Risk(_) => "risk",
            Self::Telemetry(_) => "telemetry",
            Self::Core(_) => "core",
            Self::Task(_) => "task",
        }
    }
}

pub type SwapResult<T> = Result<T, SwapError>;
