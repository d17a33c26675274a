//! Submission guards for an exchange session.
//!
//! - `PriceImpactGuard`: flags high price impact and pauses submission when
//!   gas costs more than the trade delivers
//! - `HighImpactDebouncer`: holds the high-impact flag steady during rapid
//!   quote updates

pub mod debounce;
pub mod error;
pub mod guard;

pub use debounce::HighImpactDebouncer;
pub use error::{RiskError, RiskResult};
pub use guard::{
    ConfirmationReason, ImpactSeverity, PriceImpactConfig, PriceImpactEvaluation, PriceImpactGuard,
};
