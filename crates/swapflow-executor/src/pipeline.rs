//! Rap execution pipeline.
//!
//! # State machine
//!
//! ```text
//! Built -> Executing(step) -> Completed
//!                          -> PartiallyFailed(step, cause)
//! Built -> Aborted(reason)
//! ```
//!
//! Steps run strictly in index order. Each submitted step consumes exactly
//! one nonce from the rap's lease and is acknowledged before the next step
//! is signed. A failure stops the rap; steps already committed on-chain stay
//! committed. Approvals are skipped when the allowance already covers the
//! trade, so a retry never resubmits a committed approval.

use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::{Address, B256};
use swapflow_core::{GasFeeParams, GasLimitDefaults, RapActionKind, RapType, SwapParameters};
use swapflow_telemetry::Metrics;
use tracing::{debug, error, info, warn};

use crate::error::{ExecutorError, ExecutorResult};
use crate::nonce::NonceLease;
use crate::provider::{NetworkProvider, SigningHandle, UnsignedTransaction};
use crate::rap::{plan_actions, RapAction};

/// Lifecycle of one rap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RapState {
    Built,
    Executing { step: usize },
    Completed,
    /// Step `step` failed; steps before it remain committed.
    PartiallyFailed { step: usize, cause: String },
    /// Cancelled before any step was submitted.
    Aborted { reason: String },
}

impl RapState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartiallyFailed { .. } | Self::Aborted { .. }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::Executing { .. } => "executing",
            Self::Completed => "completed",
            Self::PartiallyFailed { .. } => "partially_failed",
            Self::Aborted { .. } => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    /// Approval not needed; no nonce consumed.
    Skipped,
    /// Acknowledged by the node.
    Submitted { tx_hash: B256 },
    /// Mined successfully.
    Confirmed { tx_hash: B256 },
    Failed { cause: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub index: usize,
    pub kind: RapActionKind,
    pub nonce: Option<u64>,
    pub gas_limit: Option<u64>,
    pub status: StepStatus,
}

/// What the completion callback receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RapCompletion {
    pub success: bool,
    pub error_message: Option<String>,
}

/// Final record of a rap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RapReport {
    pub rap_type: RapType,
    pub state: RapState,
    pub steps: Vec<StepReport>,
    pub duration_ms: u64,
}

impl RapReport {
    pub fn is_success(&self) -> bool {
        self.state == RapState::Completed
    }

    /// Hash of the last submitted step.
    pub fn final_tx_hash(&self) -> Option<B256> {
        self.steps.iter().rev().find_map(|s| match s.status {
            StepStatus::Submitted { tx_hash } | StepStatus::Confirmed { tx_hash } => Some(tx_hash),
            _ => None,
        })
    }

    /// Nonces consumed by submitted steps, in step order.
    pub fn nonces(&self) -> Vec<u64> {
        self.steps.iter().filter_map(|s| s.nonce).collect()
    }
}

/// Collaborators a rap runs against.
pub struct RapContext {
    pub signer: Arc<dyn SigningHandle>,
    pub provider: Arc<dyn NetworkProvider>,
    pub lease: NonceLease,
}

type CompletionCallback = Box<dyn FnOnce(RapCompletion) + Send>;

pub struct RapExecutionPipeline {
    rap_type: RapType,
    params: SwapParameters,
    fee: GasFeeParams,
    actions: Vec<RapAction>,
    state: RapState,
    steps: Vec<StepReport>,
    on_complete: Option<CompletionCallback>,
}

impl std::fmt::Debug for RapExecutionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RapExecutionPipeline")
            .field("rap_type", &self.rap_type)
            .field("state", &self.state)
            .field("actions", &self.actions.len())
            .finish()
    }
}

impl RapExecutionPipeline {
    /// Expand the template for `params`. No chain interaction.
    pub fn build(
        rap_type: RapType,
        params: SwapParameters,
        account: Address,
        fee: GasFeeParams,
        defaults: &GasLimitDefaults,
    ) -> ExecutorResult<Self> {
        let actions = plan_actions(rap_type, &params, account, defaults)?;
        let steps = actions
            .iter()
            .enumerate()
            .map(|(index, action)| StepReport {
                index,
                kind: action.kind,
                nonce: None,
                gas_limit: None,
                status: StepStatus::Pending,
            })
            .collect();

        debug!(
            rap_type = %rap_type,
            steps = actions.len(),
            chain_id = %params.chain_id,
            "Rap built"
        );

        Ok(Self {
            rap_type,
            params,
            fee,
            actions,
            state: RapState::Built,
            steps,
            on_complete: None,
        })
    }

    /// Register the completion callback. It is invoked exactly once, when
    /// the rap reaches a terminal state.
    pub fn on_complete(mut self, callback: impl FnOnce(RapCompletion) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn rap_type(&self) -> RapType {
        self.rap_type
    }

    pub fn state(&self) -> &RapState {
        &self.state
    }

    pub fn actions(&self) -> &[RapAction] {
        &self.actions
    }

    /// Cancel before anything is submitted.
    pub fn abort(mut self, reason: impl Into<String>) -> ExecutorResult<RapReport> {
        if self.state != RapState::Built {
            return Err(ExecutorError::InvalidState(self.state.as_str().to_string()));
        }
        let reason = reason.into();
        warn!(rap_type = %self.rap_type, %reason, "Rap aborted before submission");
        self.state = RapState::Aborted { reason };
        Ok(self.finish(Instant::now()))
    }

    /// Run every step in order.
    pub async fn execute(mut self, mut ctx: RapContext) -> RapReport {
        let started = Instant::now();
        info!(
            rap_type = %self.rap_type,
            steps = self.actions.len(),
            nonce_start = ctx.lease.start(),
            flashbots = self.params.flashbots,
            "Executing rap"
        );

        for index in 0..self.actions.len() {
            self.state = RapState::Executing { step: index };
            if let Err(e) = self.run_step(index, &mut ctx).await {
                let cause = e.to_string();
                error!(rap_type = %self.rap_type, step = index, error = %cause, "Rap step failed");
                self.steps[index].status = StepStatus::Failed {
                    cause: cause.clone(),
                };
                Metrics::rap_step(self.actions[index].kind.as_str(), "failed");
                self.state = RapState::PartiallyFailed { step: index, cause };
                return self.finish(started);
            }
        }

        self.state = RapState::Completed;
        self.finish(started)
    }

    async fn run_step(&mut self, index: usize, ctx: &mut RapContext) -> ExecutorResult<()> {
        let action = self.actions[index].clone();

        if let Some(check) = action.approval {
            match ctx
                .provider
                .allowance(check.token, ctx.signer.address(), check.spender)
                .await
            {
                Ok(allowance) if allowance >= check.required => {
                    debug!(step = index, %allowance, "Allowance sufficient, approval skipped");
                    self.steps[index].status = StepStatus::Skipped;
                    Metrics::rap_step(action.kind.as_str(), "skipped");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(step = index, error = %e, "Allowance check failed, approving");
                }
            }
        }

        let gas_limit = match ctx.provider.estimate_gas(action.call.clone()).await {
            Ok(limit) => limit,
            Err(e) => {
                warn!(
                    step = index,
                    kind = %action.kind,
                    error = %e,
                    fallback = action.fallback_gas_limit,
                    "Gas estimation failed, using default limit"
                );
                action.fallback_gas_limit
            }
        };

        let nonce = ctx.lease.consume();
        self.steps[index].nonce = Some(nonce);
        self.steps[index].gas_limit = Some(gas_limit);

        let tx = UnsignedTransaction {
            chain_id: self.params.chain_id,
            nonce,
            gas_limit,
            fee: self.fee,
            request: action.call,
        };

        let raw = match ctx.signer.sign_transaction(tx).await {
            Ok(raw) => raw,
            Err(e) => {
                ctx.lease.rollback_last();
                self.steps[index].nonce = None;
                return Err(e);
            }
        };
        let tx_hash = match ctx
            .provider
            .send_raw_transaction(raw, self.params.flashbots)
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                ctx.lease.rollback_last();
                self.steps[index].nonce = None;
                return Err(e);
            }
        };

        debug!(step = index, kind = %action.kind, nonce, %tx_hash, "Step submitted");
        self.steps[index].status = StepStatus::Submitted { tx_hash };

        if action.requires_confirmation {
            let receipt = ctx.provider.wait_for_receipt(tx_hash).await?;
            if !receipt.success {
                return Err(ExecutorError::Reverted(format!("{tx_hash}")));
            }
            self.steps[index].status = StepStatus::Confirmed { tx_hash };
            Metrics::rap_step(action.kind.as_str(), "confirmed");
        } else {
            Metrics::rap_step(action.kind.as_str(), "submitted");
        }
        Ok(())
    }

    fn finish(mut self, started: Instant) -> RapReport {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let completion = match &self.state {
            RapState::Completed => RapCompletion {
                success: true,
                error_message: None,
            },
            RapState::PartiallyFailed { step, cause } => RapCompletion {
                success: false,
                error_message: Some(format!("step {step} failed: {cause}")),
            },
            RapState::Aborted { reason } => RapCompletion {
                success: false,
                error_message: Some(reason.clone()),
            },
            RapState::Built | RapState::Executing { .. } => RapCompletion {
                success: false,
                error_message: Some("rap did not finish".to_string()),
            },
        };

        Metrics::rap_finished(self.rap_type.as_str(), self.state.as_str(), duration_ms as f64);
        info!(
            rap_type = %self.rap_type,
            state = self.state.as_str(),
            duration_ms,
            "Rap finished"
        );

        if let Some(callback) = self.on_complete.take() {
            callback(completion);
        }

        RapReport {
            rap_type: self.rap_type,
            state: self.state,
            steps: self.steps,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce::NonceManager;
    use crate::provider::{NonceSource, TxReceipt};
    use alloy::primitives::{Bytes, U256};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU64, Ordering};
    use swapflow_core::{
        Amount, Asset, BoxFuture, ChainId, Network, TradeDetails, TransactionRequest,
    };

    struct TestSigner;

    impl SigningHandle for TestSigner {
        fn address(&self) -> Address {
            Address::repeat_byte(0x01)
        }

        fn sign_transaction(&self, tx: UnsignedTransaction) -> BoxFuture<'_, ExecutorResult<Bytes>> {
            Box::pin(async move { Ok(Bytes::from(tx.nonce.to_be_bytes().to_vec())) })
        }
    }

    /// Chain double: records sends, fails the send at `fail_send_at`.
    #[derive(Default)]
    struct TestChain {
        sent: Mutex<Vec<u64>>,
        allowance: Mutex<U256>,
        fail_send_at: Mutex<Option<usize>>,
        fail_estimate: bool,
        revert_approvals: bool,
        next_nonce: AtomicU64,
    }

    impl NetworkProvider for TestChain {
        fn chain_id(&self) -> ChainId {
            ChainId::MAINNET
        }

        fn estimate_gas(&self, _: TransactionRequest) -> BoxFuture<'_, ExecutorResult<u64>> {
            Box::pin(async move {
                if self.fail_estimate {
                    Err(ExecutorError::Provider("execution reverted".to_string()))
                } else {
                    Ok(120_000)
                }
            })
        }

        fn estimate_l1_fee(&self, _: TransactionRequest) -> BoxFuture<'_, ExecutorResult<u128>> {
            Box::pin(async move { Ok(0) })
        }

        fn allowance(&self, _: Address, _: Address, _: Address) -> BoxFuture<'_, ExecutorResult<U256>> {
            Box::pin(async move { Ok(*self.allowance.lock()) })
        }

        fn send_raw_transaction(&self, raw: Bytes, _: bool) -> BoxFuture<'_, ExecutorResult<B256>> {
            Box::pin(async move {
                let mut sent = self.sent.lock();
                if *self.fail_send_at.lock() == Some(sent.len()) {
                    return Err(ExecutorError::Provider("replacement underpriced".to_string()));
                }
                let mut nonce = [0u8; 8];
                nonce.copy_from_slice(&raw[..8]);
                let nonce = u64::from_be_bytes(nonce);
                sent.push(nonce);
                // Approvals raise the allowance once mined.
                if sent.len() == 1 {
                    *self.allowance.lock() = U256::MAX;
                }
                self.next_nonce.store(nonce + 1, Ordering::SeqCst);
                Ok(B256::from(U256::from(nonce)))
            })
        }

        fn wait_for_receipt(&self, tx_hash: B256) -> BoxFuture<'_, ExecutorResult<TxReceipt>> {
            Box::pin(async move {
                Ok(TxReceipt {
                    tx_hash,
                    block_number: 1,
                    success: !self.revert_approvals,
                })
            })
        }
    }

    impl NonceSource for TestChain {
        fn get_next_nonce(&self, _: Address, _: Network) -> BoxFuture<'_, ExecutorResult<u64>> {
            Box::pin(async move { Ok(self.next_nonce.load(Ordering::SeqCst)) })
        }
    }

    fn params() -> SwapParameters {
        let usdc = Asset::new(Address::repeat_byte(0x11), Network::Mainnet, 6, "USDC", "USD Coin");
        SwapParameters {
            chain_id: ChainId::MAINNET,
            input_asset: usdc,
            output_asset: Asset::native(Network::Mainnet),
            input_amount: Amount::new(dec!(100)),
            output_amount: Amount::new(dec!(0.05)),
            nonce: 0,
            flashbots: false,
            trade_details: Some(TradeDetails {
                source: "0x".to_string(),
                protocols: vec![],
                chain_id: ChainId::MAINNET,
                input_amount: Amount::new(dec!(100)),
                output_amount: Amount::new(dec!(0.05)),
                allowance_target: Some(Address::repeat_byte(0xaa)),
                tx: TransactionRequest::call(
                    Address::ZERO,
                    Address::repeat_byte(0xbb),
                    Bytes::from_static(&[1, 2, 3, 4]),
                ),
            }),
            savings_contract: None,
        }
    }

    fn fee() -> GasFeeParams {
        GasFeeParams::Eip1559 {
            max_base_fee_wei: 30_000_000_000,
            max_priority_fee_wei: 2_000_000_000,
        }
    }

    fn build() -> RapExecutionPipeline {
        RapExecutionPipeline::build(
            RapType::Swap,
            params(),
            Address::repeat_byte(0x01),
            fee(),
            &GasLimitDefaults::default(),
        )
        .unwrap()
    }

    async fn context(chain: &Arc<TestChain>, nonces: &NonceManager) -> RapContext {
        RapContext {
            signer: Arc::new(TestSigner),
            provider: chain.clone(),
            lease: nonces
                .reserve(Address::repeat_byte(0x01), Network::Mainnet)
                .await
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_steps_run_in_order_with_contiguous_nonces() {
        let chain = Arc::new(TestChain::default());
        chain.next_nonce.store(41, Ordering::SeqCst);
        let nonces = NonceManager::new(chain.clone());

        let report = build().execute(context(&chain, &nonces).await).await;

        assert_eq!(report.state, RapState::Completed);
        assert_eq!(report.nonces(), vec![41, 42]);
        assert_eq!(*chain.sent.lock(), vec![41, 42]);
        assert!(matches!(report.steps[0].status, StepStatus::Confirmed { .. }));
        assert!(matches!(report.steps[1].status, StepStatus::Submitted { .. }));
        assert_eq!(report.final_tx_hash(), Some(B256::from(U256::from(42u64))));
    }

    #[tokio::test]
    async fn test_second_step_failure_is_partial_and_retry_skips_approval() {
        let chain = Arc::new(TestChain::default());
        *chain.fail_send_at.lock() = Some(1);
        let nonces = NonceManager::new(chain.clone());

        let report = build().execute(context(&chain, &nonces).await).await;

        assert!(matches!(report.state, RapState::PartiallyFailed { step: 1, .. }));
        assert!(matches!(report.steps[0].status, StepStatus::Confirmed { .. }));
        assert_eq!(*chain.sent.lock(), vec![0]);

        *chain.fail_send_at.lock() = None;
        let retry = build().execute(context(&chain, &nonces).await).await;

        assert_eq!(retry.state, RapState::Completed);
        assert_eq!(retry.steps[0].status, StepStatus::Skipped);
        assert_eq!(*chain.sent.lock(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_failed_step_stops_later_steps() {
        let chain = Arc::new(TestChain::default());
        *chain.fail_send_at.lock() = Some(0);
        let nonces = NonceManager::new(chain.clone());

        let report = build().execute(context(&chain, &nonces).await).await;

        assert!(matches!(report.state, RapState::PartiallyFailed { step: 0, .. }));
        assert_eq!(report.steps[1].status, StepStatus::Pending);
        assert!(chain.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_reverted_approval_fails_step() {
        let chain = Arc::new(TestChain {
            revert_approvals: true,
            ..Default::default()
        });
        let nonces = NonceManager::new(chain.clone());

        let report = build().execute(context(&chain, &nonces).await).await;

        assert!(matches!(report.state, RapState::PartiallyFailed { step: 0, .. }));
        assert_eq!(chain.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_estimation_failure_uses_fallback_limit() {
        let chain = Arc::new(TestChain {
            fail_estimate: true,
            ..Default::default()
        });
        let nonces = NonceManager::new(chain.clone());

        let report = build().execute(context(&chain, &nonces).await).await;

        assert_eq!(report.state, RapState::Completed);
        assert_eq!(report.steps[0].gas_limit, Some(60_000));
        assert_eq!(report.steps[1].gas_limit, Some(200_000));
    }

    #[tokio::test]
    async fn test_completion_callback_invoked_once() {
        let chain = Arc::new(TestChain::default());
        *chain.fail_send_at.lock() = Some(1);
        let nonces = NonceManager::new(chain.clone());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();

        build()
            .on_complete(move |completion| recorded.lock().push(completion))
            .execute(context(&chain, &nonces).await)
            .await;

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].success);
        assert!(calls[0].error_message.as_deref().unwrap().starts_with("step 1 failed"));
    }

    #[test]
    fn test_abort_before_submission() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();

        let report = build()
            .on_complete(move |completion| recorded.lock().push(completion))
            .abort("wallet unavailable")
            .unwrap();

        assert_eq!(
            report.state,
            RapState::Aborted {
                reason: "wallet unavailable".to_string()
            }
        );
        assert!(report.nonces().is_empty());
        assert_eq!(calls.lock().len(), 1);
    }
}
