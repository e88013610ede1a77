//! Cache Module
//!
//! Provides the get-or-compute cache with absolute and sliding expiration.

mod entry;
mod inflight;
mod sliding;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use inflight::InFlight;
pub use sliding::SlidingCache;
pub use store::{CacheStore, SharedEntry};
