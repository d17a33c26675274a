//! Network and chain identification.
//!
//! Every asset, quote and transaction is bound to exactly one network. The
//! chain id is the canonical key; the `Network` enum carries the per-network
//! behavior (flashbots support, L1 data fees).

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// EVM chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const MAINNET: Self = Self(1);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Polygon,
    Optimism,
    Arbitrum,
    Goerli,
}

impl Network {
    pub const ALL: [Network; 5] = [
        Network::Mainnet,
        Network::Polygon,
        Network::Optimism,
        Network::Arbitrum,
        Network::Goerli,
    ];

    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        match self {
            Self::Mainnet => ChainId(1),
            Self::Polygon => ChainId(137),
            Self::Optimism => ChainId(10),
            Self::Arbitrum => ChainId(42161),
            Self::Goerli => ChainId(5),
        }
    }

    /// Resolve a chain id back to a network.
    pub fn from_chain_id(chain_id: ChainId) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|n| n.chain_id() == chain_id)
            .ok_or(CoreError::UnsupportedChain(chain_id.0))
    }

    /// Private relay submission is only available on mainnet.
    #[must_use]
    pub fn supports_flashbots(&self) -> bool {
        matches!(self, Self::Mainnet)
    }

    /// Rollups that charge a separate fee for posting call data to L1.
    #[must_use]
    pub fn has_l1_data_fee(&self) -> bool {
        matches!(self, Self::Optimism)
    }

    #[must_use]
    pub fn is_testnet(&self) -> bool {
        matches!(self, Self::Goerli)
    }

    #[must_use]
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Self::Polygon => "MATIC",
            Self::Mainnet | Self::Optimism | Self::Arbitrum | Self::Goerli => "ETH",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Polygon => "polygon",
            Self::Optimism => "optimism",
            Self::Arbitrum => "arbitrum",
            Self::Goerli => "goerli",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|n| n.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownNetwork(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_round_trip() {
        for network in Network::ALL {
            assert_eq!(Network::from_chain_id(network.chain_id()).unwrap(), network);
        }
    }

    #[test]
    fn test_unknown_chain_id() {
        assert!(matches!(
            Network::from_chain_id(ChainId(999)),
            Err(CoreError::UnsupportedChain(999))
        ));
    }

    #[test]
    fn test_flashbots_only_on_mainnet() {
        assert!(Network::Mainnet.supports_flashbots());
        assert!(!Network::Polygon.supports_flashbots());
        assert!(!Network::Optimism.supports_flashbots());
    }

    #[test]
    fn test_l1_data_fee_networks() {
        assert!(Network::Optimism.has_l1_data_fee());
        assert!(!Network::Arbitrum.has_l1_data_fee());
        assert!(!Network::Mainnet.has_l1_data_fee());
    }

    #[test]
    fn test_parse_network() {
        assert_eq!("Optimism".parse::<Network>().unwrap(), Network::Optimism);
        assert!("solana".parse::<Network>().is_err());
    }
}
