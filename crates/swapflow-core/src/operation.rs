//! Operation kinds and edit targets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The user-facing operation of an exchange session.
///
/// Closed set: every consumer matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Move an asset into a savings market.
    Deposit,
    /// Redeem an asset out of a savings market.
    Withdrawal,
    /// Trade one asset for another through an aggregator quote.
    Swap,
}

impl OperationKind {
    /// Deposits and withdrawals are "savings" operations: 1:1, no quote.
    #[must_use]
    pub fn is_savings(&self) -> bool {
        match self {
            Self::Deposit | Self::Withdrawal => true,
            Self::Swap => false,
        }
    }

    /// Whether a counter-amount (output field) is shown and derived.
    #[must_use]
    pub fn show_output_field(&self) -> bool {
        !self.is_savings()
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Swap => "swap",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which amount field the user edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditedField {
    Input,
    Output,
    /// The fiat (USD) mirror of the input field.
    Native,
}
