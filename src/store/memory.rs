use super::{now_seconds, Entry, Store};
use crate::error::{DbError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::debug;

/// In-memory `Store` implementation: a single read-write lock guarding a
/// `HashMap`, plus a background task that evicts expired entries in
/// bounded batches.
pub struct MemoryStore {
    data: RwLock<HashMap<String, Entry>>,
    stopped: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        })
    }

    /// Spawns the periodic eviction task. Returns a handle the caller can
    /// abort, though the task also stops on its own once `shutdown` is
    /// called.
    pub fn spawn_evictor(
        self: &Arc<Self>,
        tick: Duration,
        batch_percent: u32,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(tick);
            loop {
                ticker.tick().await;
                if store.stopped.load(Ordering::Relaxed) {
                    break;
                }

                let len = store.len();
                let budget = batch_budget(len, batch_percent);
                let evicted = store.evict_expired(budget);
                if evicted > 0 {
                    debug!(evicted, budget, "evicted expired keys");
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        }
    }
}

/// `ceil(len * batch_percent / 100)`.
fn batch_budget(len: usize, batch_percent: u32) -> usize {
    ((len as u64 * batch_percent as u64 + 99) / 100) as usize
}

impl Store for MemoryStore {
    fn len(&self) -> usize {
        self.data.read().len()
    }

    fn set(&self, key: &str, value: &str) {
        self.data.write().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expiration: 0,
            },
        );
    }

    fn set_expiring(&self, key: &str, value: &str, lifetime_secs: u64) {
        let expiration = now_seconds().saturating_add(lifetime_secs.max(1));
        self.data.write().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expiration,
            },
        );
    }

    fn delete(&self, key: &str) {
        self.data.write().remove(key);
    }

    fn get(&self, key: &str) -> Result<(String, u64)> {
        let now = now_seconds();

        // Expiry can mutate the map, so take write access up front rather
        // than re-checking under write after an initial read.
        let mut data = self.data.write();
        match data.get(key) {
            None => Err(DbError::KeyNotFound),
            Some(entry) if entry.expired(now) => {
                data.remove(key);
                Err(DbError::KeyExpired)
            }
            Some(entry) => Ok((entry.value.clone(), entry.expiration)),
        }
    }

    fn keys(&self, visit: &mut dyn FnMut(&str) -> bool) {
        let data = self.data.read();
        for key in data.keys() {
            if !visit(key) {
                break;
            }
        }
    }

    fn evict_expired(&self, budget: usize) -> usize {
        let now = now_seconds();
        let mut data = self.data.write();

        let expired: Vec<String> = data
            .iter()
            .filter(|(_, entry)| entry.expired(now))
            .take(budget)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            data.remove(key);
        }

        expired.len()
    }
}
