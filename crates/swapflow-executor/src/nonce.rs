//! Nonce reservation for rap execution.
//!
//! A rap reserves the nonce sequence of its account and network for its
//! whole lifetime. The reservation is a serialized fetch-and-increment:
//! concurrent raps for the same account and network wait for the previous
//! lease to drop, and each lease starts above everything handed out before.
//!
//! # Guarantees
//! - Nonces within one lease are strictly increasing by one
//! - No nonce is issued to two leases of the same account and network
//! - A nonce rolled back before broadcast is reissued by the same lease

use std::ops::Range;
use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use swapflow_core::Network;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::ExecutorResult;
use crate::provider::NonceSource;

#[derive(Debug, Default)]
struct NonceSlot {
    /// First nonce not yet issued by any lease.
    next_free: Option<u64>,
}

/// Serializes nonce allocation per account and network.
pub struct NonceManager {
    source: Arc<dyn NonceSource>,
    slots: DashMap<(Address, Network), Arc<Mutex<NonceSlot>>>,
}

impl NonceManager {
    pub fn new(source: Arc<dyn NonceSource>) -> Self {
        Self {
            source,
            slots: DashMap::new(),
        }
    }

    /// Reserve the nonce sequence of `account` on `network`.
    ///
    /// Waits while another lease for the same pair is alive. The lease
    /// starts at `max(chain next nonce, local high-water mark)`.
    pub async fn reserve(&self, account: Address, network: Network) -> ExecutorResult<NonceLease> {
        let slot = self
            .slots
            .entry((account, network))
            .or_default()
            .value()
            .clone();
        let guard = slot.lock_owned().await;

        let chain_next = self.source.get_next_nonce(account, network).await?;
        let start = guard.next_free.map_or(chain_next, |local| local.max(chain_next));

        debug!(%account, %network, chain_next, start, "Nonce sequence reserved");

        Ok(NonceLease {
            guard,
            start,
            next: start,
        })
    }
}

/// Exclusive nonce sequence for one rap.
pub struct NonceLease {
    guard: OwnedMutexGuard<NonceSlot>,
    start: u64,
    next: u64,
}

impl std::fmt::Debug for NonceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceLease")
            .field("start", &self.start)
            .field("next", &self.next)
            .finish()
    }
}

impl NonceLease {
    /// First nonce of the sequence.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Take the next nonce.
    pub fn consume(&mut self) -> u64 {
        let nonce = self.next;
        self.next += 1;
        nonce
    }

    /// Return the last consumed nonce. Only valid when it never reached the
    /// network.
    pub fn rollback_last(&mut self) {
        if self.next > self.start {
            self.next -= 1;
        }
    }

    /// Nonces consumed so far.
    pub fn issued(&self) -> Range<u64> {
        self.start..self.next
    }
}

impl Drop for NonceLease {
    fn drop(&mut self) {
        if self.next > self.start {
            self.guard.next_free = Some(self.next);
        }
    }
}
