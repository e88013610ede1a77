//! Expiry Sweeper Task
//!
//! Background task that periodically removes expired cache entries.

use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::{CacheStore, SharedEntry};
use crate::error::{CacheError, Result};

/// Attempts made to remove one expired key before leaving it for the next pass.
pub const SWEEP_REMOVE_ATTEMPTS: usize = 10;

/// Pause between removal attempts for a contended key, in milliseconds.
pub const SWEEP_RETRY_BACKOFF_MS: u64 = 1;

/// Spawns a background task that periodically sweeps expired entries.
///
/// The task sleeps for `interval`, runs one pass, and only then starts the
/// next sleep, so passes never overlap however long one takes. It holds a
/// weak reference to the store and exits once the store is dropped.
///
/// # Arguments
/// * `store` - The store to sweep
/// * `interval` - Delay between the end of one pass and the start of the next
///
/// # Returns
/// A JoinHandle for the spawned task, which the owner aborts on disposal.
/// Fails with `CacheError::NoRuntime` when called outside a tokio runtime.
pub fn spawn_sweeper<K, V>(
    store: &Arc<CacheStore<K, V>>,
    interval: Duration,
) -> Result<JoinHandle<()>>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
    let weak_store: Weak<CacheStore<K, V>> = Arc::downgrade(store);

    Ok(runtime.spawn(async move {
        info!(
            "Starting expiry sweeper with interval of {} ms",
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            let Some(store) = weak_store.upgrade() else {
                debug!("Sweeper: store dropped, exiting");
                break;
            };

            let removed = sweep_expired(&store, Instant::now()).await;

            if removed > 0 {
                info!("Sweeper: removed {} expired entries", removed);
            } else {
                debug!("Sweeper: no expired entries found");
            }
        }
    }))
}

/// Runs a single pass over the store, removing entries expired at `now`.
///
/// Returns the number of entries removed. A key that keeps changing under
/// the sweeper is skipped after `SWEEP_REMOVE_ATTEMPTS` tries.
pub async fn sweep_expired<K, V>(store: &CacheStore<K, V>, now: Instant) -> usize
where
    K: Eq + Hash + Clone,
{
    let mut removed = 0;

    for (key, entry) in store.snapshot() {
        if entry.is_expired_at(now) && remove_expired(store, &key, entry, now).await {
            removed += 1;
        }
    }

    removed
}

/// Removes `key` if it still holds an expired entry.
///
/// Losing the race to a writer means the entry was slid, refreshed or
/// removed; the key is re-read and only retried while still expired.
async fn remove_expired<K, V>(
    store: &CacheStore<K, V>,
    key: &K,
    mut expected: SharedEntry<V>,
    now: Instant,
) -> bool
where
    K: Eq + Hash + Clone,
{
    for attempt in 1..=SWEEP_REMOVE_ATTEMPTS {
        if store.remove_if_same(key, &expected) {
            return true;
        }

        match store.try_get(key) {
            Some(current) if current.is_expired_at(now) => expected = current,
            _ => return false,
        }

        if attempt < SWEEP_REMOVE_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(SWEEP_RETRY_BACKOFF_MS)).await;
        }
    }

    debug!("Sweeper: gave up on a contended key until the next pass");
    false
}
