//! Application configuration.
//!
//! Layered with the `config` crate: TOML file first, then environment
//! variables prefixed `SWAPFLOW` (`SWAPFLOW_GAS__POLL_INTERVAL_MS=2000`).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use swapflow_core::Network;
use swapflow_gas::GasConfig;
use swapflow_risk::PriceImpactConfig;
use tracing::warn;

use crate::error::{SwapError, SwapResult};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub slippage: SlippageConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub price_impact: PriceImpactConfig,
    #[serde(default)]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Default slippage per network, in basis points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlippageConfig {
    /// Overrides of the built-in per-network defaults.
    #[serde(default)]
    pub overrides: BTreeMap<Network, u32>,
    /// Used for networks without a built-in default or override.
    #[serde(default = "default_fallback_bips")]
    pub fallback_bips: u32,
}

fn default_fallback_bips() -> u32 {
    100
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self {
            overrides: BTreeMap::new(),
            fallback_bips: default_fallback_bips(),
        }
    }
}

impl SlippageConfig {
    /// Slippage applied when a session resolves to `network`.
    pub fn for_network(&self, network: Network) -> u32 {
        if let Some(bips) = self.overrides.get(&network) {
            return *bips;
        }
        match network {
            Network::Mainnet => 100,
            Network::Polygon | Network::Optimism | Network::Arbitrum => 200,
            Network::Goerli => 100,
        }
    }

    fn validate(&self) -> SwapResult<()> {
        let too_high = self
            .overrides
            .iter()
            .find(|(_, bips)| **bips > 10_000)
            .map(|(network, bips)| (network.to_string(), *bips))
            .or_else(|| (self.fallback_bips > 10_000).then(|| ("fallback".to_string(), self.fallback_bips)));
        match too_high {
            Some((key, bips)) => Err(SwapError::Config(format!(
                "slippage for {key} is {bips} bips, above 10000"
            ))),
            None => Ok(()),
        }
    }
}

/// Quote fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// Quiet period after an edit before the upstream quote is issued.
    #[serde(default = "default_quote_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_quote_debounce_ms() -> u64 {
    300
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_quote_debounce_ms(),
        }
    }
}

/// Account-level settings carried into each session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Submit through a private relay where the network supports it.
    #[serde(default)]
    pub flashbots_enabled: bool,
    /// Currency of the native amount field.
    #[serde(default = "default_display_currency")]
    pub display_currency: String,
}

fn default_display_currency() -> String {
    "USD".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flashbots_enabled: false,
            display_currency: default_display_currency(),
        }
    }
}

impl SessionConfig {
    pub fn displays_usd(&self) -> bool {
        self.display_currency.eq_ignore_ascii_case("USD")
    }
}

impl AppConfig {
    /// Load from `path` layered with `SWAPFLOW_*` environment variables.
    ///
    /// A missing file is not an error: defaults are used with a warning.
    pub fn load(path: &str) -> SwapResult<Self> {
        if !Path::new(path).exists() {
            warn!(path = %path, "Config file not found, using defaults");
        }

        let config: Self = config::Config::builder()
            .add_source(config::File::from(Path::new(path)).required(false))
            .add_source(
                config::Environment::with_prefix("SWAPFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SwapError::Config(format!("Failed to build config: {e}")))?
            .try_deserialize()
            .map_err(|e| SwapError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file, without environment overrides.
    pub fn from_file(path: &str) -> SwapResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SwapError::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| SwapError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SwapResult<()> {
        self.slippage.validate()?;
        self.price_impact.validate()?;
        if self.gas.poll_interval_ms == 0 {
            return Err(SwapError::Config(
                "gas.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use swapflow_core::GasSpeed;

    #[test]
    fn test_builtin_slippage_per_network() {
        let slippage = SlippageConfig::default();
        assert_eq!(slippage.for_network(Network::Mainnet), 100);
        assert_eq!(slippage.for_network(Network::Polygon), 200);
        assert_eq!(slippage.for_network(Network::Optimism), 200);
        assert_eq!(slippage.for_network(Network::Arbitrum), 200);
        assert_eq!(slippage.for_network(Network::Goerli), 100);
    }

    #[test]
    fn test_slippage_override_wins() {
        let mut slippage = SlippageConfig::default();
        slippage.overrides.insert(Network::Polygon, 50);
        assert_eq!(slippage.for_network(Network::Polygon), 50);
        assert_eq!(slippage.for_network(Network::Arbitrum), 200);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[gas]
poll_interval_ms = 2000

[slippage.overrides]
mainnet = 50

[price_impact]
high_threshold_pct = 3
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.gas.poll_interval_ms, 2000);
        assert_eq!(config.gas.default_speed, GasSpeed::Normal);
        assert_eq!(config.gas.limits.basic_deposit, 550_000);
        assert_eq!(config.slippage.for_network(Network::Mainnet), 50);
        assert_eq!(config.price_impact.high_threshold_pct, dec!(3));
        assert_eq!(config.price_impact.severe_threshold_pct, dec!(10));
        assert_eq!(config.quote.debounce_ms, 300);
        assert!(!config.session.flashbots_enabled);
    }

    #[test]
    fn test_layered_load_reads_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[session]
flashbots_enabled = true

[quote]
debounce_ms = 150
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str().unwrap()).unwrap();

        assert!(config.session.flashbots_enabled);
        assert_eq!(config.quote.debounce_ms, 150);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let config = AppConfig::load(path.to_str().unwrap()).unwrap();

        assert_eq!(config.gas, GasConfig::default());
        assert_eq!(config.slippage, SlippageConfig::default());
    }

    #[test]
    fn test_invalid_slippage_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[slippage]\nfallback_bips = 20000").unwrap();

        let err = AppConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, SwapError::Config(_)));
    }

    #[test]
    fn test_inverted_impact_thresholds_rejected() {
        let mut config = AppConfig::default();
        config.price_impact.high_threshold_pct = dec!(20);

        assert!(matches!(config.validate(), Err(SwapError::Risk(_))));
    }
}
