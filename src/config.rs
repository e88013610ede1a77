//! Configuration Module
//!
//! Handles loading and validating cache configuration.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default interval between sweeper passes, in milliseconds.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Environment variable overriding the sweep interval.
pub const SWEEP_INTERVAL_ENV: &str = "SWEEP_INTERVAL_MS";

/// Cache configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Interval between background sweeps, in milliseconds
    pub sweep_interval_ms: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SWEEP_INTERVAL_MS` - Sweeper interval in milliseconds (default: 60000)
    ///
    /// A missing variable falls back to the default; a value that does not
    /// parse, or parses to zero, is rejected.
    pub fn from_env() -> Result<Self> {
        let sweep_interval_ms = match env::var(SWEEP_INTERVAL_ENV) {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|_| {
                CacheError::InvalidConfig(format!("{SWEEP_INTERVAL_ENV} is not a number: {raw:?}"))
            })?,
            Err(_) => DEFAULT_SWEEP_INTERVAL_MS,
        };

        let config = Self { sweep_interval_ms };
        config.validate()?;
        Ok(config)
    }

    /// Returns a copy with the given sweep interval.
    pub fn with_sweep_interval_ms(mut self, sweep_interval_ms: u64) -> Self {
        self.sweep_interval_ms = sweep_interval_ms;
        self
    }

    /// Checks that the configuration can drive a sweeper.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "sweep interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The sweep interval as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}
