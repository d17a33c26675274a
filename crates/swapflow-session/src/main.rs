//! swapflow - Entry Point
//!
//! Runs one exchange session against in-memory collaborators: derive the
//! trade, check its cost, submit the rap and report the outcome.

use std::sync::Arc;

use alloy::primitives::address;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use swapflow_core::{Amount, Asset, EditedField, Network, OperationKind, Price};
use swapflow_executor::NonceManager;
use swapflow_session::sim::{SimChain, SimFeeSource, SimQuoteSource, SimUi, SimWallet};
use swapflow_session::{
    AppConfig, Collaborators, SessionEvent, SessionInit, SubmitOutcome, SwapOrchestrator,
};
use swapflow_telemetry::TracingSink;
use tracing::{error, info};

const DEMO_KEY: [u8; 32] = [0x42; 32];

/// swapflow exchange session
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SWAPFLOW_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Operation to run
    #[arg(short, long, value_enum, default_value_t = KindArg::Swap)]
    kind: KindArg,

    /// Input amount
    #[arg(short, long, default_value = "100")]
    amount: Decimal,

    /// Normal-speed gas price in gwei
    #[arg(long, default_value_t = 30)]
    gwei: u64,

    /// Cancel when gas costs more than the output
    #[arg(long)]
    decline_high_cost: bool,

    /// Hex-encoded signing key; a fixed demo key when omitted
    #[arg(long)]
    private_key: Option<String>,
}

fn signing_key(hex_key: Option<&str>) -> Result<Vec<u8>> {
    match hex_key {
        Some(key) => Ok(hex::decode(key.trim().trim_start_matches("0x"))?),
        None => Ok(DEMO_KEY.to_vec()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Swap,
    Deposit,
    #[value(alias = "withdraw")]
    Withdrawal,
}

impl From<KindArg> for OperationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Swap => OperationKind::Swap,
            KindArg::Deposit => OperationKind::Deposit,
            KindArg::Withdrawal => OperationKind::Withdrawal,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    swapflow_telemetry::init_logging()?;

    info!("Starting swapflow v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > SWAPFLOW_CONFIG env var > default
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("SWAPFLOW_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = AppConfig::load(&config_path)?;
    let kind = OperationKind::from(args.kind);

    let chain = Arc::new(SimChain::new());
    let wallet = Arc::new(SimWallet::from_secret(&signing_key(args.private_key.as_deref())?)?);
    let account = wallet.address().unwrap_or_default();
    let collaborators = Collaborators {
        wallet: wallet.clone(),
        networks: chain.clone(),
        nonces: Arc::new(NonceManager::new(chain.clone())),
        quotes: Arc::new(SimQuoteSource::new(dec!(0.2))),
        gas_fees: Arc::new(SimFeeSource::new(args.gwei)),
        telemetry: Arc::new(TracingSink),
        ui: Arc::new(SimUi::new(!args.decline_high_cost)),
    };

    let usdc = Asset::new(
        address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
        Network::Mainnet,
        6,
        "USDC",
        "USD Coin",
    )
    .with_price(Price::new(dec!(1)))
    .with_balance(Amount::new(dec!(1000)));
    let eth = Asset::native(Network::Mainnet)
        .with_price(Price::new(dec!(2000)))
        .with_balance(Amount::new(dec!(1)));

    let session = SwapOrchestrator::new(
        config,
        collaborators,
        SessionInit {
            kind,
            account,
            input: Some(usdc),
            output: (kind == OperationKind::Swap).then_some(eth),
            savings_contract: Some(address!("39aa39c021dfbae8fac545936693ac917d5e7563")),
            native_price: Some(Price::new(dec!(2000))),
        },
    );

    session.activate().await;
    session
        .dispatch(SessionEvent::EditAmount {
            field: EditedField::Input,
            amount: Amount::new(args.amount),
        })
        .await?;

    let readiness = session.readiness();
    info!(
        ?readiness,
        outputs = ?session.outputs(),
        fee = ?session.gas().selected_fee(),
        "Trade derived"
    );

    let result = session.handle_submit().await;
    session.teardown();

    match result {
        Ok(SubmitOutcome::Submitted {
            rap_type,
            tx_hash,
            report,
        }) => {
            info!(
                %rap_type,
                ?tx_hash,
                nonces = ?report.nonces(),
                duration_ms = report.duration_ms,
                "Operation succeeded"
            );
        }
        Ok(SubmitOutcome::Cancelled) => info!("Operation cancelled"),
        Err(e) => {
            error!(error = %e, "Operation failed");
            return Err(e.into());
        }
    }

    for tx in chain.sent() {
        info!(chain_id = %tx.chain_id, nonce = tx.nonce, to = %tx.to, tx_hash = %tx.tx_hash, "Broadcast");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_defaults_to_swap() {
        let args = Args::try_parse_from(["swapflow"]).unwrap();
        assert_eq!(OperationKind::from(args.kind), OperationKind::Swap);
    }

    #[test]
    fn test_kind_accepts_withdraw_alias() {
        let args = Args::try_parse_from(["swapflow", "--kind", "withdraw"]).unwrap();
        assert_eq!(OperationKind::from(args.kind), OperationKind::Withdrawal);

        assert!(Args::try_parse_from(["swapflow", "--kind", "bridge"]).is_err());
    }

    #[test]
    fn test_signing_key_strips_prefix() {
        let key = signing_key(Some(" 0x4242 ")).unwrap();
        assert_eq!(key, vec![0x42, 0x42]);
        assert_eq!(signing_key(None).unwrap(), DEMO_KEY.to_vec());
        assert!(signing_key(Some("zz")).is_err());
    }
}
