//! Gas coordination for an exchange session.
//!
//! Polls fee parameters per network, keeps a gas limit estimate in step
//! with the current quote and recomputes the total fee, including the L1
//! data surcharge on rollups.

pub mod coordinator;
pub mod error;
pub mod source;

pub use coordinator::{GasConfig, GasCoordinator, GasEstimateRequest, GasSnapshot};
pub use error::{GasError, GasResult};
pub use source::GasFeeSource;
