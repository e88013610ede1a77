//! Sliding Cache demo
//!
//! Walks through the absolute and sliding expiration rules against a slow
//! backend, logging every step.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sliding_cache::{CacheConfig, CacheError, SlidingCache};

/// Simulated latency of the backend behind the cache.
const BACKEND_LATENCY: Duration = Duration::from_millis(200);

/// Main entry point for the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Exercise TTL expiry, sliding expiry and coalesced misses
/// 4. Dispose the cache
#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sliding_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env().context("failed to load cache configuration")?;
    info!(
        "Configuration loaded: sweep_interval={}ms",
        config.sweep_interval_ms
    );

    let cache: Arc<SlidingCache<String, String>> = Arc::new(SlidingCache::with_config(config)?);
    let backend_calls = Arc::new(AtomicUsize::new(0));

    // TTL only: served for one second, then recomputed
    let value = lookup(&cache, &backend_calls, "user:1", 1, 0).await?;
    info!("t=0.0s ttl=1 -> {}", value);
    tokio::time::sleep(Duration::from_millis(500)).await;
    let value = lookup(&cache, &backend_calls, "user:1", 1, 0).await?;
    info!("t=0.5s ttl=1 -> {} (cached)", value);
    tokio::time::sleep(Duration::from_millis(600)).await;
    let value = lookup(&cache, &backend_calls, "user:1", 1, 0).await?;
    info!("t=1.1s ttl=1 -> {} (recomputed)", value);

    // TTL plus slide: every hit pushes the expiry back
    lookup(&cache, &backend_calls, "session:9", 1, 1).await?;
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(900)).await;
        let value = lookup(&cache, &backend_calls, "session:9", 1, 1).await?;
        info!("sliding hit -> {}", value);
    }

    // Concurrent misses for one key share a single backend call
    let before = backend_calls.load(Ordering::SeqCst);
    let lookups: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let backend_calls = Arc::clone(&backend_calls);
            tokio::spawn(async move { lookup(&cache, &backend_calls, "report:42", 30, 0).await })
        })
        .collect();
    for handle in lookups {
        handle.await??;
    }
    info!(
        "8 concurrent lookups caused {} backend call(s)",
        backend_calls.load(Ordering::SeqCst) - before
    );

    info!(
        "Cached items: {}, backend calls: {}",
        cache.cached_item_count()?,
        backend_calls.load(Ordering::SeqCst)
    );

    cache.dispose();
    info!("Demo complete");
    Ok(())
}

/// Looks `key` up through the cache, falling back to the slow backend.
async fn lookup(
    cache: &SlidingCache<String, String>,
    backend_calls: &AtomicUsize,
    key: &str,
    ttl_seconds: u64,
    slide_seconds: u64,
) -> Result<String, CacheError> {
    cache
        .get_or_compute(
            key.to_string(),
            |key| async move {
                backend_calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(BACKEND_LATENCY).await;
                Ok(format!("{key}@{}", backend_calls.load(Ordering::SeqCst)))
            },
            ttl_seconds,
            slide_seconds,
        )
        .await
}
