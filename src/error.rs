//! Error types for the sliding cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised by the cache itself.
///
/// Factory failures are not wrapped here: they reach the caller of
/// `get_or_compute` unchanged, in whatever error type the factory uses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The cache was disposed before the operation was invoked
    #[error("cache has been disposed")]
    Disposed,

    /// No tokio runtime was available to host the sweeper
    #[error("no tokio runtime available to run the sweeper")]
    NoRuntime,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(CacheError::Disposed.to_string(), "cache has been disposed");
        assert_eq!(
            CacheError::InvalidConfig("sweep interval must be positive".to_string()).to_string(),
            "Invalid configuration: sweep interval must be positive"
        );
    }

    #[test]
    fn test_error_converts_into_anyhow() {
        let err: anyhow::Error = CacheError::Disposed.into();
        assert!(err.downcast_ref::<CacheError>().is_some());
    }
}
