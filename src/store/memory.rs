//! In-process counter store implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::CounterStore;
use crate::error::Result;

/// A single counter entry: the value and its optional expiry deadline.
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: u64,
    deadline: Option<Instant>,
}

impl CounterEntry {
    fn expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }
}

/// An in-process counter store backed by a concurrent hash map.
///
/// Expired entries are dropped lazily on access rather than by a background
/// sweeper. Dashmap's per-shard locking serializes mutations on a key, which
/// satisfies the atomic-increment contract of [`CounterStore`].
///
/// Suitable for tests and single-process deployments; multi-node deployments
/// should put a shared key-value service behind [`CounterStore`] instead.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, CounterEntry>,
}

impl MemoryStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of live (unexpired) entries. Primarily useful for tests.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.expired(now)).count()
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.expired(now) {
                return Ok(Some(entry.value));
            }
        }
        // Drop the read guard before removing the stale entry.
        self.entries.remove_if(key, |_, entry| entry.expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: u64) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            CounterEntry {
                value,
                deadline: None,
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(CounterEntry {
                value: 0,
                deadline: None,
            });
        if entry.expired(now) {
            // A stale entry counts as absent: restart from zero with no expiry.
            *entry = CounterEntry {
                value: 0,
                deadline: None,
            };
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.deadline = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<u64> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.expired(now) {
                if let Some(deadline) = entry.deadline {
                    let remaining = deadline.saturating_duration_since(now);
                    // Round up so a fresh window reports its full length and a
                    // nearly-expired key reports 1, not a premature 0.
                    let mut secs = remaining.as_secs();
                    if remaining.subsec_nanos() > 0 {
                        secs += 1;
                    }
                    return Ok(secs);
                }
            }
        }
        Ok(0)
    }
}
