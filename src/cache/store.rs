//! In-memory TTL store
//!
//! Provides `ResponseCache`, a keyed map of payloads with per-entry
//! time-to-live. Reads and writes are serialized per entry by a reader/writer
//! lock, and entries are replaced whole, so a reader never observes a
//! half-written value.

use chrono::{DateTime, Duration, Utc};
use log::trace;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::upstream::Payload;

/// A single cached payload with its freshness window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request key this entry answers
    pub key: String,
    /// The cached payload
    pub value: Payload,
    /// When the payload was stored
    pub stored_at: DateTime<Utc>,
    /// How long the payload stays valid after `stored_at`
    pub ttl: std::time::Duration,
}

impl CacheEntry {
    /// Instant at which the entry stops being valid
    ///
    /// `None` means the TTL is too large to represent and the entry never
    /// expires in practice.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = Duration::from_std(self.ttl).ok()?;
        self.stored_at.checked_add_signed(ttl)
    }

    /// An entry is valid iff `now < stored_at + ttl`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

/// Keyed store of prior upstream results with time-based expiry
#[derive(Debug)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    /// Creates an empty cache driven by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty cache driven by the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Returns the cached payload for `key` if present and unexpired
    ///
    /// Expired entries are reported as absent but are not removed.
    pub fn get(&self, key: &str) -> Option<Payload> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Returns the full unexpired entry for `key`, including its timestamps
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.is_valid_at(now) {
            Some(entry.clone())
        } else {
            trace!("cache entry for {} expired", key);
            None
        }
    }

    /// Inserts or replaces the entry for `key`, stamped with the current time
    ///
    /// Last writer wins; there is no merging with a previous entry.
    pub fn put(&self, key: &str, value: Payload, ttl: std::time::Duration) {
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            stored_at: self.clock.now(),
            ttl,
        };
        self.entries.write().insert(key.to_string(), entry);
    }

    /// Inserts an entry keeping its original `stored_at`
    ///
    /// Used when restoring a snapshot. Returns `false` (and stores nothing)
    /// if the entry is already expired.
    pub fn restore(&self, entry: CacheEntry) -> bool {
        if !entry.is_valid_at(self.clock.now()) {
            return false;
        }
        self.entries.write().insert(entry.key.clone(), entry);
        true
    }

    /// Removes every expired entry, returning how many were dropped
    ///
    /// Never called implicitly; readers already ignore expired entries.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid_at(now));
        before - entries.len()
    }

    /// Copies out every unexpired entry
    pub fn valid_entries(&self) -> Vec<CacheEntry> {
        let now = self.clock.now();
        self.entries
            .read()
            .values()
            .filter(|entry| entry.is_valid_at(now))
            .cloned()
            .collect()
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is stored at all
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
