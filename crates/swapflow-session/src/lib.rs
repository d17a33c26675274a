//! Exchange session orchestration for swapflow.
//!
//! This crate wires the quote engine, price impact guard, gas coordinator
//! and rap pipeline into one session:
//! - `SwapOrchestrator`: explicit session context with a dispatcher
//! - `AppConfig`: layered TOML and environment configuration
//! - `UiSink`: outcome signals and confirmation prompts
//! - `sim`: in-memory collaborators for offline runs

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod sim;
pub mod ui;

pub use config::{AppConfig, QuoteConfig, SessionConfig, SlippageConfig};
pub use error::{SwapError, SwapResult};
pub use orchestrator::{
    Collaborators, NotReady, Readiness, SessionEvent, SessionInit, SubmissionPermit,
    SubmitOutcome, SwapOrchestrator,
};
pub use ui::{UiSignal, UiSink};
