//! Gas fee parameters, fee totals and default gas limits.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{wei_to_native, Price};
use crate::network::{ChainId, Network};
use crate::operation::OperationKind;

/// Gas limit for a plain deposit into a savings market.
pub const BASIC_DEPOSIT_GAS_LIMIT: u64 = 550_000;
/// Gas limit for a plain withdrawal out of a savings market.
pub const BASIC_WITHDRAWAL_GAS_LIMIT: u64 = 550_000;
/// Base swap gas limit used when a network has no specific value.
pub const BASIC_SWAP_GAS_LIMIT: u64 = 200_000;
/// Fallback L1 data fee for an optimism swap (wei).
pub const DEFAULT_L1_GAS_FEE_OPTIMISM_SWAP: u64 = 140_000_000_000_000;

/// Speed tier selected by the user.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GasSpeed {
    Slow,
    #[default]
    Normal,
    Fast,
    Custom,
}

/// Fee parameters for one speed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GasFeeParams {
    /// EIP-1559 fee market.
    Eip1559 {
        max_base_fee_wei: u128,
        max_priority_fee_wei: u128,
    },
    /// Pre-1559 networks.
    Legacy { gas_price_wei: u128 },
}

impl GasFeeParams {
    /// Worst-case price per unit of gas.
    #[must_use]
    pub fn max_fee_per_gas(&self) -> u128 {
        match self {
            Self::Eip1559 {
                max_base_fee_wei,
                max_priority_fee_wei,
            } => max_base_fee_wei.saturating_add(*max_priority_fee_wei),
            Self::Legacy { gas_price_wei } => *gas_price_wei,
        }
    }
}

/// Polled fee parameters keyed by speed tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GasFeeParamsBySpeed(pub BTreeMap<GasSpeed, GasFeeParams>);

impl GasFeeParamsBySpeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, speed: GasSpeed, params: GasFeeParams) -> Self {
        self.0.insert(speed, params);
        self
    }

    #[must_use]
    pub fn get(&self, speed: GasSpeed) -> Option<&GasFeeParams> {
        self.0.get(&speed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GasSpeed, &GasFeeParams)> {
        self.0.iter()
    }
}

/// Total fee of a transaction at one speed tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxFee {
    pub speed: GasSpeed,
    pub gas_limit: u64,
    /// Execution fee plus the L1 surcharge, in wei.
    pub max_fee_wei: u128,
    /// L1 data surcharge included in `max_fee_wei`.
    pub l1_fee_wei: u128,
    /// `max_fee_wei` in native units.
    pub native: Decimal,
    /// `native` converted at the native asset's USD price.
    pub usd: Option<Decimal>,
}

impl TxFee {
    /// Compute the fee of `gas_limit` units at `params` plus `l1_fee_wei`.
    #[must_use]
    pub fn compute(
        speed: GasSpeed,
        params: &GasFeeParams,
        gas_limit: u64,
        l1_fee_wei: u128,
        native_price: Option<Price>,
    ) -> Self {
        let max_fee_wei = params
            .max_fee_per_gas()
            .saturating_mul(u128::from(gas_limit))
            .saturating_add(l1_fee_wei);
        let native = wei_to_native(max_fee_wei).unwrap_or(Decimal::MAX);
        let usd = native_price.and_then(|p| native.checked_mul(p.inner()));
        Self {
            speed,
            gas_limit,
            max_fee_wei,
            l1_fee_wei,
            native,
            usd,
        }
    }
}

/// Default gas limits used before a quote exists or when simulation fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasLimitDefaults {
    #[serde(default = "default_basic_deposit")]
    pub basic_deposit: u64,
    #[serde(default = "default_basic_withdrawal")]
    pub basic_withdrawal: u64,
    /// Per-network swap base estimate; missing networks use `basic_swap`.
    #[serde(default = "default_swap_by_network")]
    pub swap_by_network: BTreeMap<Network, u64>,
    #[serde(default = "default_basic_swap")]
    pub basic_swap: u64,
    /// Fallback L1 surcharge for rollups when the sub-estimate fails (wei).
    #[serde(default = "default_l1_fee_wei")]
    pub default_l1_fee_wei: u64,
}

fn default_basic_deposit() -> u64 {
    BASIC_DEPOSIT_GAS_LIMIT
}

fn default_basic_withdrawal() -> u64 {
    BASIC_WITHDRAWAL_GAS_LIMIT
}

fn default_basic_swap() -> u64 {
    BASIC_SWAP_GAS_LIMIT
}

fn default_l1_fee_wei() -> u64 {
    DEFAULT_L1_GAS_FEE_OPTIMISM_SWAP
}

fn default_swap_by_network() -> BTreeMap<Network, u64> {
    BTreeMap::from([
        (Network::Mainnet, 200_000),
        (Network::Polygon, 250_000),
        (Network::Optimism, 200_000),
        (Network::Arbitrum, 1_500_000),
    ])
}

impl Default for GasLimitDefaults {
    fn default() -> Self {
        Self {
            basic_deposit: default_basic_deposit(),
            basic_withdrawal: default_basic_withdrawal(),
            swap_by_network: default_swap_by_network(),
            basic_swap: default_basic_swap(),
            default_l1_fee_wei: default_l1_fee_wei(),
        }
    }
}

impl GasLimitDefaults {
    /// Network-aware base estimate for a swap.
    #[must_use]
    pub fn basic_swap_for(&self, chain_id: ChainId) -> u64 {
        Network::from_chain_id(chain_id)
            .ok()
            .and_then(|n| self.swap_by_network.get(&n).copied())
            .unwrap_or(self.basic_swap)
    }

    /// Default gas limit of an operation on a chain.
    #[must_use]
    pub fn for_operation(&self, kind: OperationKind, chain_id: ChainId) -> u64 {
        match kind {
            OperationKind::Deposit => self.basic_deposit,
            OperationKind::Withdrawal => self.basic_withdrawal,
            OperationKind::Swap => self.basic_swap_for(chain_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_max_fee_per_gas() {
        let eip1559 = GasFeeParams::Eip1559 {
            max_base_fee_wei: 30_000_000_000,
            max_priority_fee_wei: 2_000_000_000,
        };
        assert_eq!(eip1559.max_fee_per_gas(), 32_000_000_000);

        let legacy = GasFeeParams::Legacy {
            gas_price_wei: 50_000_000_000,
        };
        assert_eq!(legacy.max_fee_per_gas(), 50_000_000_000);
    }

    #[test]
    fn test_tx_fee_includes_l1_surcharge() {
        let params = GasFeeParams::Legacy {
            gas_price_wei: 1_000_000_000,
        };
        let fee = TxFee::compute(
            GasSpeed::Normal,
            &params,
            200_000,
            u128::from(DEFAULT_L1_GAS_FEE_OPTIMISM_SWAP),
            Some(Price::new(dec!(2000))),
        );

        assert_eq!(fee.max_fee_wei, 200_000_000_000_000 + 140_000_000_000_000);
        assert_eq!(fee.native, dec!(0.00034));
        assert_eq!(fee.usd, Some(dec!(0.68)));
    }

    #[test]
    fn test_default_gas_limit_by_operation() {
        let defaults = GasLimitDefaults::default();

        assert_eq!(
            defaults.for_operation(OperationKind::Deposit, ChainId::MAINNET),
            BASIC_DEPOSIT_GAS_LIMIT
        );
        assert_eq!(
            defaults.for_operation(OperationKind::Withdrawal, ChainId::MAINNET),
            BASIC_WITHDRAWAL_GAS_LIMIT
        );
        assert_eq!(
            defaults.for_operation(OperationKind::Swap, Network::Arbitrum.chain_id()),
            1_500_000
        );
        assert_eq!(
            defaults.for_operation(OperationKind::Swap, Network::Goerli.chain_id()),
            BASIC_SWAP_GAS_LIMIT
        );
    }

    #[test]
    fn test_fee_params_by_speed() {
        let params = GasFeeParamsBySpeed::new().with(
            GasSpeed::Fast,
            GasFeeParams::Legacy {
                gas_price_wei: 1,
            },
        );
        assert!(!params.is_empty());
        assert!(params.get(GasSpeed::Fast).is_some());
        assert!(params.get(GasSpeed::Slow).is_none());
    }
}
