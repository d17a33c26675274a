//! Derived trade amounts for an exchange session.
//!
//! The engine turns an amount edit into the counter-amount, route and price
//! impact, fetching routes from a [`QuoteSource`]. Results are
//! last-issued-wins: a slow earlier quote never overwrites a newer edit.

pub mod engine;
pub mod error;
pub mod source;

pub use engine::{DerivedOutcome, DerivedOutputEngine, DerivedOutputs, DerivedRequest, DerivedState};
pub use error::{QuoteError, QuoteResult};
pub use source::{QuoteAmount, QuoteRequest, QuoteSource};
