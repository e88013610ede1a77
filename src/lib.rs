//! Sliding Cache - an in-memory get-or-compute cache
//!
//! Values are computed on demand by a caller-supplied async factory and
//! kept until an absolute TTL elapses, optionally pushed back by a sliding
//! extension on every hit. A background task sweeps expired entries.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::SlidingCache;
pub use config::CacheConfig;
pub use error::{CacheError, Result};
