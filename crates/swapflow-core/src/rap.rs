//! Rap templates: which ordered on-chain actions an operation expands into.
//!
//! Selection is a pure function of the operation kind and the currency
//! pair; the executor turns the template into concrete calls.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::asset::Asset;
use crate::gas::GasLimitDefaults;
use crate::network::ChainId;
use crate::operation::OperationKind;

/// Gas limit of an ERC-20 approval.
pub const APPROVE_GAS_LIMIT: u64 = 60_000;
/// Gas limit of a wrapped-native deposit or withdrawal.
pub const WRAP_GAS_LIMIT: u64 = 36_000;
/// Gas limit of a bridge call when the route gives no estimate.
pub const BRIDGE_GAS_LIMIT: u64 = 300_000;

/// One atomic on-chain step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RapActionKind {
    Approve,
    Swap,
    Wrap,
    Unwrap,
    CrosschainBridge,
    Deposit,
    Withdraw,
}

impl RapActionKind {
    /// Steps whose effect must be mined before the next step is signed.
    #[must_use]
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::Approve)
    }

    /// Fallback gas limit when estimation of this step fails.
    #[must_use]
    pub fn default_gas_limit(&self, defaults: &GasLimitDefaults, chain_id: ChainId) -> u64 {
        match self {
            Self::Approve => APPROVE_GAS_LIMIT,
            Self::Wrap | Self::Unwrap => WRAP_GAS_LIMIT,
            Self::CrosschainBridge => BRIDGE_GAS_LIMIT,
            Self::Swap => defaults.basic_swap_for(chain_id),
            Self::Deposit => defaults.basic_deposit,
            Self::Withdraw => defaults.basic_withdrawal,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Swap => "swap",
            Self::Wrap => "wrap",
            Self::Unwrap => "unwrap",
            Self::CrosschainBridge => "crosschain_bridge",
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for RapActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered action template for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RapType {
    Swap,
    WrapNative,
    UnwrapNative,
    CrosschainSwap,
    DepositSavings,
    WithdrawSavings,
}

impl RapType {
    /// Select the template for an operation and currency pair.
    #[must_use]
    pub fn select(kind: OperationKind, input: &Asset, output: &Asset) -> Self {
        match kind {
            OperationKind::Deposit => Self::DepositSavings,
            OperationKind::Withdrawal => Self::WithdrawSavings,
            OperationKind::Swap => {
                if input.network != output.network {
                    Self::CrosschainSwap
                } else if input.is_native() && output.is_wrapped_native() {
                    Self::WrapNative
                } else if input.is_wrapped_native() && output.is_native() {
                    Self::UnwrapNative
                } else {
                    Self::Swap
                }
            }
        }
    }

    /// Expand into the ordered action kinds.
    ///
    /// ERC-20 inputs that are pulled by a contract get a leading approval;
    /// at execution time the approval is skipped when allowance suffices.
    #[must_use]
    pub fn expand(&self, input: &Asset) -> Vec<RapActionKind> {
        let needs_approval = !input.is_native();
        let with_approval = |main: RapActionKind| {
            if needs_approval {
                vec![RapActionKind::Approve, main]
            } else {
                vec![main]
            }
        };
        match self {
            Self::Swap => with_approval(RapActionKind::Swap),
            Self::CrosschainSwap => with_approval(RapActionKind::CrosschainBridge),
            Self::DepositSavings => with_approval(RapActionKind::Deposit),
            Self::WrapNative => vec![RapActionKind::Wrap],
            Self::UnwrapNative => vec![RapActionKind::Unwrap],
            Self::WithdrawSavings => vec![RapActionKind::Withdraw],
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Swap => "swap",
            Self::WrapNative => "wrap_native",
            Self::UnwrapNative => "unwrap_native",
            Self::CrosschainSwap => "crosschain_swap",
            Self::DepositSavings => "deposit_savings",
            Self::WithdrawSavings => "withdraw_savings",
        }
    }
}

impl fmt::Display for RapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
