//! Rap planning: expand a rap template into concrete on-chain calls.

use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use swapflow_core::{
    wrapped_native_address, GasLimitDefaults, RapActionKind, RapType, SwapParameters,
    TradeDetails, TransactionRequest,
};

use crate::error::{ExecutorError, ExecutorResult};

sol! {
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface IWrappedNative {
        function deposit() external payable;
        function withdraw(uint256 wad) external;
    }

    interface ISavingsMarket {
        function mint(uint256 mintAmount) external returns (uint256);
        function redeemUnderlying(uint256 redeemAmount) external returns (uint256);
    }
}

/// Allowance that makes an approval step redundant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalCheck {
    pub token: Address,
    pub spender: Address,
    /// Allowance needed by the following step.
    pub required: U256,
}

/// One atomic step of a rap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RapAction {
    pub kind: RapActionKind,
    pub call: TransactionRequest,
    /// Gas limit used when estimation fails.
    pub fallback_gas_limit: u64,
    /// Must be mined before the next step is signed.
    pub requires_confirmation: bool,
    /// Present on approvals; skipped when the allowance already suffices.
    pub approval: Option<ApprovalCheck>,
}

/// Expand `rap_type` into concrete actions for `params` sent from `account`.
pub fn plan_actions(
    rap_type: RapType,
    params: &SwapParameters,
    account: Address,
    defaults: &GasLimitDefaults,
) -> ExecutorResult<Vec<RapAction>> {
    let input_units = params
        .input_amount
        .to_base_units(params.input_asset.decimals)
        .ok_or_else(|| {
            ExecutorError::InvalidParameters(format!(
                "input amount {} not representable",
                params.input_amount
            ))
        })?;
    if input_units.is_zero() {
        return Err(ExecutorError::InvalidParameters(
            "input amount is zero".to_string(),
        ));
    }

    rap_type
        .expand(&params.input_asset)
        .into_iter()
        .map(|kind| -> ExecutorResult<RapAction> {
            let (call, approval) = match kind {
                RapActionKind::Approve => {
                    let spender = approval_spender(rap_type, params)?;
                    let data = IERC20::approveCall {
                        spender,
                        amount: U256::MAX,
                    }
                    .abi_encode();
                    (
                        TransactionRequest::call(account, params.input_asset.address, data.into()),
                        Some(ApprovalCheck {
                            token: params.input_asset.address,
                            spender,
                            required: input_units,
                        }),
                    )
                }
                RapActionKind::Swap | RapActionKind::CrosschainBridge => {
                    let trade = trade_for(params)?;
                    let mut call = trade.tx.clone();
                    call.from = account;
                    (call, None)
                }
                RapActionKind::Wrap => {
                    let data = IWrappedNative::depositCall {}.abi_encode();
                    let weth = wrapped_native_address(params.input_asset.network);
                    (
                        TransactionRequest::call(account, weth, data.into()).with_value(input_units),
                        None,
                    )
                }
                RapActionKind::Unwrap => {
                    let data = IWrappedNative::withdrawCall { wad: input_units }.abi_encode();
                    (
                        TransactionRequest::call(account, params.input_asset.address, data.into()),
                        None,
                    )
                }
                RapActionKind::Deposit => {
                    let data = ISavingsMarket::mintCall {
                        mintAmount: input_units,
                    }
                    .abi_encode();
                    (
                        TransactionRequest::call(account, savings_contract(params)?, data.into()),
                        None,
                    )
                }
                RapActionKind::Withdraw => {
                    let data = ISavingsMarket::redeemUnderlyingCall {
                        redeemAmount: input_units,
                    }
                    .abi_encode();
                    (
                        TransactionRequest::call(account, savings_contract(params)?, data.into()),
                        None,
                    )
                }
            };
            Ok(RapAction {
                kind,
                call,
                fallback_gas_limit: kind.default_gas_limit(defaults, params.chain_id),
                requires_confirmation: kind.requires_confirmation(),
                approval,
            })
        })
        .collect()
}

fn trade_for(params: &SwapParameters) -> ExecutorResult<&TradeDetails> {
    let trade = params
        .trade_details
        .as_ref()
        .ok_or(ExecutorError::MissingTradeDetails)?;
    if !trade.matches_chain(params.chain_id) {
        return Err(ExecutorError::InvalidParameters(format!(
            "trade details built for chain {}, rap targets chain {}",
            trade.chain_id, params.chain_id
        )));
    }
    Ok(trade)
}

fn savings_contract(params: &SwapParameters) -> ExecutorResult<Address> {
    params
        .savings_contract
        .ok_or_else(|| ExecutorError::InvalidParameters("missing savings contract".to_string()))
}

fn approval_spender(rap_type: RapType, params: &SwapParameters) -> ExecutorResult<Address> {
    match rap_type {
        RapType::DepositSavings => savings_contract(params),
        RapType::Swap | RapType::CrosschainSwap => {
            let trade = trade_for(params)?;
            trade
                .allowance_target
                .or(trade.tx.to)
                .ok_or_else(|| ExecutorError::InvalidParameters("trade has no spender".to_string()))
        }
        RapType::WrapNative | RapType::UnwrapNative | RapType::WithdrawSavings => {
            Err(ExecutorError::InvalidParameters(format!(
                "{rap_type} has no approval step"
            )))
        }
    }
}

/// Four-byte function selector of a call.
pub fn selector(call: &TransactionRequest) -> Option<[u8; 4]> {
    call.data.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok())
}
