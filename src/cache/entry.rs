//! Cache Entry Module
//!
//! Defines the immutable value/expiry pair held for each key.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// A cached value together with the instant it stops being served.
///
/// Entries are never mutated. Sliding and refreshing replace the whole
/// entry in the store, which lets the store detect concurrent changes by
/// pointer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    /// The cached value
    pub value: V,
    /// Absolute expiry instant, None = never expires
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates an entry computed at `now` with an optional TTL.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `now` - The instant the value was produced
    /// * `ttl_seconds` - TTL in seconds, 0 = never expires
    ///
    /// A TTL reaching past the clock's range never expires.
    pub fn new(value: V, now: Instant, ttl_seconds: u64) -> Self {
        if ttl_seconds == 0 {
            return Self::eternal(value);
        }

        Self {
            value,
            expires_at: now.checked_add(Duration::from_secs(ttl_seconds)),
        }
    }

    /// Creates an entry that never expires.
    pub fn eternal(value: V) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired as of `now`.
    ///
    /// An entry is expired once `now` reaches its expiry instant, so an
    /// entry is served only while `expires_at > now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => expires <= now,
            None => false,
        }
    }

    /// Returns remaining lifetime as of `now`, or None if the entry never expires.
    pub fn ttl_remaining_at(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|expires| expires.saturating_duration_since(now))
    }
}

impl<V: Clone> CacheEntry<V> {
    // == Slide ==
    /// Returns a new entry with the same value and the expiry pushed back.
    ///
    /// Entries that never expire stay that way, and so does an entry slid
    /// past the clock's range.
    pub fn slid_by(&self, slide_seconds: u64) -> Self {
        Self {
            value: self.value.clone(),
            expires_at: self
                .expires_at
                .and_then(|expires| expires.checked_add(Duration::from_secs(slide_seconds))),
        }
    }
}
