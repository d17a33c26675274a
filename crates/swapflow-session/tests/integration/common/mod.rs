//! Shared session fixtures.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use rust_decimal_macros::dec;
use swapflow_core::{Amount, Asset, EditedField, Network, OperationKind, Price};
use swapflow_executor::NonceManager;
use swapflow_session::sim::{SimChain, SimFeeSource, SimQuoteSource, SimUi, SimWallet};
use swapflow_session::{AppConfig, Collaborators, SessionEvent, SessionInit, SwapOrchestrator};
use swapflow_telemetry::RecordingSink;

pub const SECRET: [u8; 32] = [0x42; 32];
pub const SAVINGS: Address = Address::repeat_byte(0xcc);

pub fn usdc() -> Asset {
    Asset::new(Address::repeat_byte(0x11), Network::Mainnet, 6, "USDC", "USD Coin")
        .with_price(Price::new(dec!(1)))
        .with_balance(Amount::new(dec!(1000)))
}

pub fn eth() -> Asset {
    Asset::native(Network::Mainnet)
        .with_price(Price::new(dec!(2000)))
        .with_balance(Amount::new(dec!(2)))
}

/// Session plus handles on every recording collaborator.
pub struct Session {
    pub orchestrator: Arc<SwapOrchestrator>,
    pub chain: Arc<SimChain>,
    pub quotes: Arc<SimQuoteSource>,
    pub fees: Arc<SimFeeSource>,
    pub ui: Arc<SimUi>,
    pub wallet: Arc<SimWallet>,
    pub sink: Arc<RecordingSink>,
}

pub struct SessionBuilder {
    kind: OperationKind,
    input: Option<Asset>,
    output: Option<Asset>,
    gwei: u64,
    accept: bool,
    wallet: Option<SimWallet>,
    chain: Option<Arc<SimChain>>,
    nonces: Option<Arc<NonceManager>>,
    config: AppConfig,
}

impl SessionBuilder {
    pub fn new(kind: OperationKind) -> Self {
        let mut config = AppConfig::default();
        config.quote.debounce_ms = 0;
        Self {
            kind,
            input: Some(usdc()),
            output: (kind == OperationKind::Swap).then(eth),
            gwei: 30,
            accept: true,
            wallet: None,
            chain: None,
            nonces: None,
            config,
        }
    }

    pub fn output(mut self, output: Option<Asset>) -> Self {
        self.output = output;
        self
    }

    pub fn gwei(mut self, gwei: u64) -> Self {
        self.gwei = gwei;
        self
    }

    pub fn accept_confirmation(mut self, accept: bool) -> Self {
        self.accept = accept;
        self
    }

    pub fn wallet(mut self, wallet: SimWallet) -> Self {
        self.wallet = Some(wallet);
        self
    }

    /// Share a chain and nonce manager with another session.
    pub fn shared(mut self, chain: Arc<SimChain>, nonces: Arc<NonceManager>) -> Self {
        self.chain = Some(chain);
        self.nonces = Some(nonces);
        self
    }

    pub fn config(mut self, f: impl FnOnce(&mut AppConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> Session {
        let chain = self.chain.unwrap_or_else(|| Arc::new(SimChain::new()));
        let nonces = self
            .nonces
            .unwrap_or_else(|| Arc::new(NonceManager::new(chain.clone())));
        let wallet = Arc::new(
            self.wallet
                .unwrap_or_else(|| SimWallet::from_secret(&SECRET).unwrap()),
        );
        let quotes = Arc::new(SimQuoteSource::new(dec!(0.2)));
        let fees = Arc::new(SimFeeSource::new(self.gwei));
        let ui = Arc::new(SimUi::new(self.accept));
        let sink = Arc::new(RecordingSink::new());

        let collaborators = Collaborators {
            wallet: wallet.clone(),
            networks: chain.clone(),
            nonces,
            quotes: quotes.clone(),
            gas_fees: fees.clone(),
            telemetry: sink.clone(),
            ui: ui.clone(),
        };
        let init = SessionInit {
            kind: self.kind,
            account: wallet.address().unwrap_or(Address::repeat_byte(0x01)),
            input: self.input,
            output: self.output,
            savings_contract: Some(SAVINGS),
            native_price: Some(Price::new(dec!(2000))),
        };

        Session {
            orchestrator: Arc::new(SwapOrchestrator::new(self.config, collaborators, init)),
            chain,
            quotes,
            fees,
            ui,
            wallet,
            sink,
        }
    }
}

impl Session {
    /// Activate and enter `amount` in the input field.
    pub async fn start_with_input(&self, amount: rust_decimal::Decimal) {
        self.orchestrator.activate().await;
        self.orchestrator
            .dispatch(SessionEvent::EditAmount {
                field: EditedField::Input,
                amount: Amount::new(amount),
            })
            .await
            .unwrap();
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
