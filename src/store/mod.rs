//! Concurrent key-value storage with per-entry absolute expiration and a
//! batched background evictor.
//!
//! The in-memory implementation (`MemoryStore`) is built around a single
//! `parking_lot::RwLock<HashMap<..>>` rather than a sharded map: both the
//! eviction scan and the stabilization loop's `keys()` visitor need a
//! point-in-time, lock-wide view, which a sharded map doesn't give for
//! free. This mirrors `syncMap` in the reference implementation, which
//! makes the same tradeoff.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use std::time::{SystemTime, UNIX_EPOCH};

/// A stored value plus its absolute expiration deadline. `expiration == 0`
/// means "never expires".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: String,
    pub expiration: u64,
}

impl Entry {
    pub fn expired(&self, now_seconds: u64) -> bool {
        self.expiration != 0 && now_seconds >= self.expiration
    }
}

/// Seconds since the epoch, truncated to second precision. Sub-second TTLs
/// are rounded up at the protocol boundary (see `command::parse_lifetime`),
/// not here.
pub fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_secs()
}

/// The storage backend contract. An in-memory implementation is provided
/// (`MemoryStore`); a disk-backed implementation can replace it by
/// implementing this trait and delegating eviction to its own TTL
/// machinery.
pub trait Store: Send + Sync {
    fn len(&self) -> usize;

    fn set(&self, key: &str, value: &str);

    /// `lifetime_secs` must be > 0.
    fn set_expiring(&self, key: &str, value: &str, lifetime_secs: u64);

    fn delete(&self, key: &str);

    /// Returns `(value, expiration_seconds)` on success. A `get` on an
    /// expired entry removes it and returns `DbError::KeyExpired`; a `get`
    /// on an absent entry returns `DbError::KeyNotFound`.
    fn get(&self, key: &str) -> Result<(String, u64)>;

    /// Visits currently-stored keys under read protection. The visitor
    /// must not call back into the store. Stops early when the visitor
    /// returns `false`.
    fn keys(&self, visit: &mut dyn FnMut(&str) -> bool);

    /// Removes up to `budget` expired entries. Returns the number removed.
    fn evict_expired(&self, budget: usize) -> usize;
}
