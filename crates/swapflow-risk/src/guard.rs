//! Price impact guard.
//!
//! Two independent checks:
//! - Price impact above the high threshold raises an advisory flag
//!   (surfaced through [`crate::HighImpactDebouncer`]).
//! - Gas costing more than the output is worth pauses submission until the
//!   user confirms. Declining is a cancellation, not an error.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{RiskError, RiskResult};

/// Price impact thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceImpactConfig {
    /// Percent above which impact is flagged as high.
    #[serde(default = "default_high_threshold_pct")]
    pub high_threshold_pct: Decimal,
    /// Percent above which impact is flagged as severe.
    #[serde(default = "default_severe_threshold_pct")]
    pub severe_threshold_pct: Decimal,
    /// Window the high-impact flag must hold before it is surfaced.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_high_threshold_pct() -> Decimal {
    Decimal::from(5)
}

fn default_severe_threshold_pct() -> Decimal {
    Decimal::from(10)
}

fn default_debounce_ms() -> u64 {
    1000
}

impl Default for PriceImpactConfig {
    fn default() -> Self {
        Self {
            high_threshold_pct: default_high_threshold_pct(),
            severe_threshold_pct: default_severe_threshold_pct(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl PriceImpactConfig {
    pub fn validate(&self) -> RiskResult<()> {
        if self.high_threshold_pct.is_sign_negative() {
            return Err(RiskError::ConfigError(format!(
                "high_threshold_pct must be non-negative, got {}",
                self.high_threshold_pct
            )));
        }
        if self.severe_threshold_pct < self.high_threshold_pct {
            return Err(RiskError::ConfigError(format!(
                "severe_threshold_pct ({}) below high_threshold_pct ({})",
                self.severe_threshold_pct, self.high_threshold_pct
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactSeverity {
    #[default]
    None,
    High,
    Severe,
}

/// Why submission is paused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationReason {
    /// Gas costs more than the output is worth.
    GasExceedsOutput {
        gas_cost_usd: Decimal,
        output_value_usd: Decimal,
    },
}

impl fmt::Display for ConfirmationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GasExceedsOutput {
                gas_cost_usd,
                output_value_usd,
            } => write!(
                f,
                "this will cost more than you receive: gas ${} vs output ${}",
                gas_cost_usd.round_dp(2),
                output_value_usd.round_dp(2)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceImpactEvaluation {
    pub is_high_price_impact: bool,
    pub severity: ImpactSeverity,
    /// Submission must wait for explicit confirmation.
    pub block_submission: bool,
    pub requires_confirmation: bool,
    pub reason: Option<ConfirmationReason>,
}

impl PriceImpactEvaluation {
    pub fn is_pass(&self) -> bool {
        !self.block_submission
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriceImpactGuard {
    config: PriceImpactConfig,
}

impl PriceImpactGuard {
    pub fn new(config: PriceImpactConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PriceImpactConfig {
        &self.config
    }

    /// Evaluate a trade.
    ///
    /// Unknown USD values are passed as zero; a zero output value never
    /// requires confirmation.
    pub fn evaluate(
        &self,
        output_value_usd: Decimal,
        gas_cost_usd: Decimal,
        price_impact_pct: Decimal,
    ) -> PriceImpactEvaluation {
        let severity = self.severity(price_impact_pct);
        let requires_confirmation =
            gas_cost_usd > output_value_usd && output_value_usd > Decimal::ZERO;
        let reason = requires_confirmation.then_some(ConfirmationReason::GasExceedsOutput {
            gas_cost_usd,
            output_value_usd,
        });

        if requires_confirmation {
            debug!(
                gas_cost_usd = %gas_cost_usd,
                output_value_usd = %output_value_usd,
                "Gas exceeds output value, confirmation required"
            );
        }

        PriceImpactEvaluation {
            is_high_price_impact: severity != ImpactSeverity::None,
            severity,
            block_submission: requires_confirmation,
            requires_confirmation,
            reason,
        }
    }

    pub fn severity(&self, price_impact_pct: Decimal) -> ImpactSeverity {
        if price_impact_pct > self.config.severe_threshold_pct {
            ImpactSeverity::Severe
        } else if price_impact_pct > self.config.high_threshold_pct {
            ImpactSeverity::High
        } else {
            ImpactSeverity::None
        }
    }

    /// Percent of input value lost in the output, rounded to 2 dp.
    ///
    /// Returns `None` when the input value is zero.
    pub fn price_impact(input_value_usd: Decimal, output_value_usd: Decimal) -> Option<Decimal> {
        if input_value_usd.is_zero() {
            return None;
        }
        let impact = input_value_usd
            .checked_sub(output_value_usd)?
            .checked_div(input_value_usd)?
            .checked_mul(Decimal::ONE_HUNDRED)?;
        Some(impact.round_dp(2))
    }
}
