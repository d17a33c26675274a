//! Fee parameter source contract.

use swapflow_core::{BoxFuture, GasFeeParamsBySpeed, Network};

use crate::error::GasResult;

/// Source of polled fee parameters.
pub trait GasFeeSource: Send + Sync {
    /// Current fee parameters for every speed tier. With `flashbots` set the
    /// private relay's view is returned instead of the public mempool's.
    fn fetch_fee_params(
        &self,
        network: Network,
        flashbots: bool,
    ) -> BoxFuture<'_, GasResult<GasFeeParamsBySpeed>>;
}
