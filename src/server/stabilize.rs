//! The stabilization loop: after membership changes, locally held keys
//! that now belong to a remote peer are migrated there and removed
//! locally.

use crate::cluster::Cluster;
use crate::command::{Command, CommandResult};
use crate::error::DbError;
use crate::protocol;
use crate::router::NodeRef;
use crate::store::{now_seconds, Store};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const MAX_CONCURRENT_MIGRATIONS: usize = 16;

pub fn spawn(
    store: Arc<dyn Store>,
    cluster: Arc<Cluster>,
    interval: Duration,
    batch_percent: u32,
    stopped: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if stopped.load(Ordering::Relaxed) {
                break;
            }
            run_once(&store, &cluster, batch_percent).await;
        }
    })
}

/// One stabilization tick: schedule up to `budget` misplaced keys for
/// migration and run the migrations concurrently, bounded by a small
/// semaphore so a large batch doesn't open hundreds of relay connections
/// at once.
async fn run_once(store: &Arc<dyn Store>, cluster: &Arc<Cluster>, batch_percent: u32) {
    if cluster.members().len() < 2 {
        return;
    }

    let len = store.len();
    let budget = batch_budget(len, batch_percent);
    if budget == 0 {
        return;
    }

    let local = cluster.local().clone();
    let mut scheduled: Vec<(String, NodeRef)> = Vec::new();
    store.keys(&mut |key| {
        if let Some(owner) = cluster.responsible(key) {
            if owner != local {
                scheduled.push((key.to_string(), owner));
            }
        }
        scheduled.len() < budget
    });

    if scheduled.is_empty() {
        return;
    }

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_MIGRATIONS));
    let mut tasks = Vec::with_capacity(scheduled.len());

    for (key, owner) in scheduled {
        let store = Arc::clone(store);
        let semaphore = Arc::clone(&semaphore);
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore is never closed");
            migrate_key(&store, &key, &owner).await
        }));
    }

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "migration task panicked");
        }
    }
}

fn batch_budget(len: usize, batch_percent: u32) -> usize {
    ((len as u64 * batch_percent as u64 + 99) / 100) as usize
}

/// Reads the key locally, relays a `Store`/`StoreExpiring` to its new
/// owner, and deletes the local copy only once the owner confirms
/// success. Failures are left for the next tick — both commands are
/// idempotent under retry.
async fn migrate_key(store: &Arc<dyn Store>, key: &str, owner: &NodeRef) {
    let (value, expiration) = match store.get(key) {
        Ok(entry) => entry,
        Err(DbError::KeyNotFound) | Err(DbError::KeyExpired) => return,
        Err(e) => {
            warn!(key, error = %e, "could not read key for migration");
            return;
        }
    };

    let command = if expiration == 0 {
        Command::Store { key: key.to_string(), value }
    } else {
        let lifetime_secs = expiration.saturating_sub(now_seconds()).max(1);
        Command::StoreExpiring { key: key.to_string(), value, lifetime_secs }
    };

    match protocol::relay_to(&command, owner).await {
        Ok(CommandResult::Void) | Ok(CommandResult::Payload(_)) => {
            store.delete(key);
            debug!(key, owner = %owner, "migrated key to new owner");
        }
        Err(e) => {
            warn!(key, owner = %owner, error = %e, "migration failed, will retry next tick");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_budget_rounds_up() {
        assert_eq!(batch_budget(10, 20), 2);
        assert_eq!(batch_budget(0, 20), 0);
    }
}
