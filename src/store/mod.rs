//! Counter store capability and implementations.

mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Capability trait for the external counter store.
///
/// This is the narrow surface the gate needs from a key-value counter service:
/// per-key integer counters with expiry. Any concrete store (the in-process
/// [`MemoryStore`], a networked key-value service) can be substituted behind
/// this trait.
///
/// Atomicity contract: `increment` must be serialized per key with respect to
/// concurrent callers. The gate performs no locking of its own and relies on
/// the store as the single source of truth for counts.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Get the current counter value for a key, or `None` if no entry exists
    /// (never created, or already expired).
    async fn get(&self, key: &str) -> Result<Option<u64>>;

    /// Create or overwrite the entry at `key` with `value`. The entry carries
    /// no expiry until `expire` is called for it.
    async fn set(&self, key: &str, value: u64) -> Result<()>;

    /// Atomically add 1 to the counter at `key`, creating it at 1 if absent.
    /// Returns the new value. Does not touch the entry's expiry.
    async fn increment(&self, key: &str) -> Result<u64>;

    /// Set or refresh the time-to-live of the entry at `key`. A zero duration
    /// expires the entry immediately. No-op if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Remaining time-to-live of the entry at `key` in whole seconds, rounded
    /// up. Returns 0 when the key is absent or carries no expiry.
    async fn ttl(&self, key: &str) -> Result<u64>;
}
