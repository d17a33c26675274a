//! Asset identity and market fields.
//!
//! Identity (address, network, decimals, symbol) never changes. Price and
//! balance are refreshed by the external asset catalog; the orchestration
//! core only reads them.

use std::collections::BTreeMap;

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::decimal::{Amount, Price};
use crate::network::Network;

/// Sentinel address used for the native gas asset on every network.
pub const NATIVE_ASSET_ADDRESS: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

/// Wrapped native token contract for a network.
#[must_use]
pub fn wrapped_native_address(network: Network) -> Address {
    match network {
        Network::Mainnet => address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
        Network::Polygon => address!("0d500b1d8e8ef31e21c99d1db9a6444d3adf1270"),
        Network::Optimism => address!("4200000000000000000000000000000000000006"),
        Network::Arbitrum => address!("82af49447d8a07e3bd95bd0d56f35241523fbab1"),
        Network::Goerli => address!("b4fbf271143f4fbf7b91a5ded31805e42b2208d6"),
    }
}

/// Deployment of the same asset on another network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Implementation {
    pub address: Address,
    pub decimals: u8,
}

/// A fungible asset on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub address: Address,
    pub network: Network,
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
    /// Last known USD price, `None` when the catalog has no quote.
    #[serde(default)]
    pub price: Option<Price>,
    /// Wallet balance of the active account.
    #[serde(default)]
    pub balance: Amount,
    /// Known deployments on other networks.
    #[serde(default)]
    pub implementations: BTreeMap<Network, Implementation>,
}

impl Asset {
    #[must_use]
    pub fn new(
        address: Address,
        network: Network,
        decimals: u8,
        symbol: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            address,
            network,
            decimals,
            symbol: symbol.into(),
            name: name.into(),
            price: None,
            balance: Amount::ZERO,
            implementations: BTreeMap::new(),
        }
    }

    /// Native gas asset of a network.
    #[must_use]
    pub fn native(network: Network) -> Self {
        let symbol = network.native_symbol();
        Self::new(NATIVE_ASSET_ADDRESS, network, 18, symbol, symbol)
    }

    #[must_use]
    pub fn with_price(mut self, price: Price) -> Self {
        self.price = Some(price);
        self
    }

    #[must_use]
    pub fn with_balance(mut self, balance: Amount) -> Self {
        self.balance = balance;
        self
    }

    #[must_use]
    pub fn with_implementation(mut self, network: Network, implementation: Implementation) -> Self {
        self.implementations.insert(network, implementation);
        self
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        self.address == NATIVE_ASSET_ADDRESS
    }

    #[must_use]
    pub fn is_wrapped_native(&self) -> bool {
        self.address == wrapped_native_address(self.network)
    }

    /// Unique id across networks: the address alone on mainnet, suffixed
    /// with the network elsewhere.
    #[must_use]
    pub fn unique_id(&self) -> String {
        match self.network {
            Network::Mainnet => format!("{:#x}", self.address),
            other => format!("{:#x}_{}", self.address, other),
        }
    }

    /// USD value of `amount` of this asset, if the price is known and the
    /// product fits a decimal.
    #[must_use]
    pub fn value_of(&self, amount: Amount) -> Option<rust_decimal::Decimal> {
        self.price.and_then(|p| amount.value_at(p))
    }

    /// Re-target this asset to `network` through its implementation table.
    ///
    /// Returns `None` when the asset has no deployment there.
    #[must_use]
    pub fn on_network(&self, network: Network) -> Option<Asset> {
        if self.network == network {
            return Some(self.clone());
        }
        let implementation = self.implementations.get(&network)?;
        let mut moved = self.clone();
        moved.address = implementation.address;
        moved.decimals = implementation.decimals;
        moved.network = network;
        moved
            .implementations
            .insert(self.network, Implementation { address: self.address, decimals: self.decimals });
        Some(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usdc() -> Asset {
        Asset::new(
            address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
            Network::Mainnet,
            6,
            "USDC",
            "USD Coin",
        )
        .with_price(Price::new(dec!(1)))
        .with_implementation(
            Network::Optimism,
            Implementation {
                address: address!("7f5c764cbc14f9669b88837ca1490cca17c31607"),
                decimals: 6,
            },
        )
    }

    #[test]
    fn test_native_asset() {
        let eth = Asset::native(Network::Mainnet);
        assert!(eth.is_native());
        assert!(!eth.is_wrapped_native());
        assert_eq!(eth.decimals, 18);
    }

    #[test]
    fn test_unique_id() {
        let token = usdc();
        assert_eq!(token.unique_id(), "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");

        let moved = token.on_network(Network::Optimism).unwrap();
        assert_eq!(
            moved.unique_id(),
            "0x7f5c764cbc14f9669b88837ca1490cca17c31607_optimism"
        );
    }

    #[test]
    fn test_on_network_missing_implementation() {
        assert!(usdc().on_network(Network::Polygon).is_none());
    }

    #[test]
    fn test_on_network_keeps_origin_reachable() {
        let moved = usdc().on_network(Network::Optimism).unwrap();
        let back = moved.on_network(Network::Mainnet).unwrap();
        assert_eq!(back.address, usdc().address);
    }

    #[test]
    fn test_value_of() {
        assert_eq!(usdc().value_of(Amount::new(dec!(100))), Some(dec!(100)));
        assert_eq!(Asset::native(Network::Mainnet).value_of(Amount::ONE), None);
    }
}
