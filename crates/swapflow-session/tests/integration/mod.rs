//! Integration tests for swapflow-session.
//!
//! These tests drive whole sessions against in-memory collaborators:
//! - Derivation, gas and confirmation flow
//! - Rap submission, partial failure and retry
//! - Wallet and reentrancy guards

pub mod common;
