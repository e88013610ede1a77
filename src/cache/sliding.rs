//! Sliding Cache Module
//!
//! The public get-or-compute cache combining the store, the in-flight
//! registry and the background sweeper.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheStore, InFlight, SharedEntry};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweeper;

// == Sliding Cache ==
/// In-memory cache that computes values on demand.
///
/// Each entry can carry an absolute TTL, a sliding extension applied on
/// every hit, both or neither. Expired entries stop being served at once
/// and are physically removed by a background sweeper within one sweep
/// interval.
///
/// Concurrent misses for the same key share a single factory invocation.
/// The cache owns its store; dropping or disposing it releases the store
/// and stops the sweeper.
///
/// # Example
/// ```no_run
/// # async fn demo() -> Result<(), sliding_cache::CacheError> {
/// use sliding_cache::SlidingCache;
///
/// let cache: SlidingCache<u32, String> = SlidingCache::new()?;
/// let value = cache
///     .get_or_compute(
///         7,
///         |key| async move { Ok::<_, sliding_cache::CacheError>(key.to_string()) },
///         60,
///         0,
///     )
///     .await?;
/// assert_eq!(value, "7");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SlidingCache<K, V>
where
    K: Eq + Hash,
{
    store: Arc<CacheStore<K, V>>,
    in_flight: InFlight<K, V>,
    sweeper: JoinHandle<()>,
    config: CacheConfig,
    disposed: AtomicBool,
}

impl<K, V> SlidingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a cache sweeping every 60 seconds.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Result<Self> {
        Self::with_config(CacheConfig::default())
    }

    /// Creates a cache sweeping every `sweep_interval_ms` milliseconds.
    pub fn with_interval_ms(sweep_interval_ms: u64) -> Result<Self> {
        Self::with_config(CacheConfig::default().with_sweep_interval_ms(sweep_interval_ms))
    }

    /// Creates a cache from an explicit configuration.
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(CacheStore::new());
        let sweeper = spawn_sweeper(&store, config.sweep_interval())?;

        Ok(Self {
            store,
            in_flight: InFlight::new(),
            sweeper,
            config,
            disposed: AtomicBool::new(false),
        })
    }

    // == Get Or Compute ==
    /// Returns the cached value for `key`, computing it with `factory` on a miss.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Computes the value for `key`; only invoked on a miss
    /// * `ttl_seconds` - Absolute lifetime of a newly computed entry, 0 = never expires
    /// * `slide_seconds` - Extension applied to the entry's expiry on every hit, 0 = no sliding
    ///
    /// A hit returns the value that was read even if a concurrent writer
    /// replaces the entry at the same moment. A miss returns the value the
    /// store holds once the computed value has been committed.
    ///
    /// # Errors
    /// Factory errors are returned unchanged and nothing is cached, so the
    /// next call computes again. A disposed cache fails with
    /// `CacheError::Disposed` converted into `E`.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: K,
        factory: F,
        ttl_seconds: u64,
        slide_seconds: u64,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: From<CacheError>,
    {
        self.ensure_active()?;

        if let Some(value) = self.lookup(&key, slide_seconds) {
            return Ok(value);
        }

        debug!("Cache miss, computing value");
        let ran_here = AtomicBool::new(false);
        let value = self
            .in_flight
            .run::<E, _, _>(key.clone(), || {
                let key = key.clone();
                let ran_here = &ran_here;
                async move {
                    ran_here.store(true, Ordering::Relaxed);
                    // a computation that settled after our first read may have stored it
                    if let Some(value) = self.lookup(&key, slide_seconds) {
                        return Ok(value);
                    }
                    let value = factory(key.clone()).await?;
                    Ok(self.commit(key, value, ttl_seconds, slide_seconds))
                }
            })
            .await?;

        // a caller served by another's computation still counts as an access
        if slide_seconds > 0 && !ran_here.load(Ordering::Relaxed) {
            self.lookup(&key, slide_seconds);
        }
        Ok(value)
    }

    // == Lookup ==
    /// Returns the live value for `key`, sliding its expiry if requested.
    ///
    /// The value read is returned even if the slide loses to a concurrent writer.
    fn lookup(&self, key: &K, slide_seconds: u64) -> Option<V> {
        let existing = self.store.try_get(key)?;
        let now = Instant::now();
        if existing.is_expired_at(now) {
            return None;
        }

        debug!("Cache hit, expires in {:?}", existing.ttl_remaining_at(now));

        if slide_seconds > 0 {
            self.slide(key, &existing, slide_seconds);
        }
        Some(existing.value.clone())
    }

    // == Commit ==
    /// Records a freshly computed value and returns what the store now holds.
    fn commit(&self, key: K, value: V, ttl_seconds: u64, slide_seconds: u64) -> V {
        if self.is_disposed() {
            return value;
        }

        let now = Instant::now();
        let fresh = Arc::new(CacheEntry::new(value, now, ttl_seconds));
        let present = self.store.put_if_absent(key.clone(), Arc::clone(&fresh));

        if present.is_expired_at(now) {
            // stale leftover the sweeper has not reached yet
            self.store.insert(key.clone(), Arc::clone(&fresh));
        } else if slide_seconds > 0 {
            self.slide(&key, &present, slide_seconds);
        }

        match self.store.try_get(&key) {
            Some(stored) => stored.value.clone(),
            None => fresh.value.clone(),
        }
    }

    // == Slide ==
    /// Pushes back the expiry of `current` unless a writer already replaced it.
    fn slide(&self, key: &K, current: &SharedEntry<V>, slide_seconds: u64) -> bool {
        let slid = Arc::new(current.slid_by(slide_seconds));
        let won = self.store.compare_and_set(key, current, slid);
        if !won {
            debug!("Slide lost to a concurrent writer");
        }
        won
    }

    // == Cached Item Count ==
    /// Returns the number of entries currently held, expired or not.
    pub fn cached_item_count(&self) -> Result<usize> {
        self.ensure_active()?;
        Ok(self.store.len())
    }

    /// Returns the configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl<K, V> SlidingCache<K, V>
where
    K: Eq + Hash,
{
    // == Disposal ==
    /// Returns true once the cache has been disposed. Never fails.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Fails with `CacheError::Disposed` once the cache has been disposed.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(CacheError::Disposed);
        }
        Ok(())
    }

    /// Stops the sweeper and drops every entry.
    ///
    /// Calling it more than once is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.sweeper.abort();
        self.store.clear();
        self.in_flight.clear();
        info!("Cache disposed");
    }
}

impl<K, V> Drop for SlidingCache<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.dispose();
    }
}
