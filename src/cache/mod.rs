//! Response cache for upstream payloads
//!
//! This module provides an in-memory, time-expiring store of prior upstream
//! results keyed by request key. Expiry is lazy: an entry past its TTL is
//! invisible to readers but stays in memory until overwritten or purged.
//! A JSON snapshot of the store can be written to disk and read back so that
//! fresh entries survive process restarts.

mod snapshot;
mod store;

pub use snapshot::{CacheSnapshot, SnapshotError};
pub use store::{CacheEntry, ResponseCache};
