//! Checker configuration.
//!
//! Loaded from environment variables with sensible defaults, validated once
//! at wiring time.

use crate::error::{DejavuError, Result};
use crate::hash::DEFAULT_FINGERPRINT_WIDTH;
use std::time::Duration;

/// Default Hamming-distance cutoff for the "recycled image" classification.
pub const DEFAULT_MATCH_THRESHOLD: u32 = 10;

/// Default number of check results kept in the cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Configuration for an [`ImageChecker`](crate::checker::ImageChecker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerConfig {
    /// Fingerprint width in bits, fixed per deployment (default: 64)
    pub fingerprint_width: u32,
    /// Maximum Hamming distance counted as a match (default: 10)
    pub match_threshold: u32,
    /// Result cache capacity in entries (default: 1024)
    pub cache_capacity: usize,
    /// Optional result time-to-live; `None` means results never expire
    pub cache_ttl: Option<Duration>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            fingerprint_width: DEFAULT_FINGERPRINT_WIDTH,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: None,
        }
    }
}

impl CheckerConfig {
    /// Load configuration from environment variables.
    ///
    /// Recognized variables: `DEJAVU_FINGERPRINT_WIDTH`,
    /// `DEJAVU_MATCH_THRESHOLD`, `DEJAVU_CACHE_CAPACITY`,
    /// `DEJAVU_CACHE_TTL_SECS`. Unset or unparseable values fall back to the
    /// defaults; a TTL of 0 seconds means no expiry.
    pub fn from_env() -> Self {
        let fingerprint_width = std::env::var("DEJAVU_FINGERPRINT_WIDTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_FINGERPRINT_WIDTH);

        let match_threshold = std::env::var("DEJAVU_MATCH_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MATCH_THRESHOLD);

        let cache_capacity = std::env::var("DEJAVU_CACHE_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CACHE_CAPACITY);

        let cache_ttl = std::env::var("DEJAVU_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&secs: &u64| secs > 0)
            .map(Duration::from_secs);

        Self {
            fingerprint_width,
            match_threshold,
            cache_capacity,
            cache_ttl,
        }
    }

    /// Reject configurations that cannot produce a working checker.
    ///
    /// # Errors
    ///
    /// [`DejavuError::InvalidConfig`] when the width is not a positive
    /// multiple of 8, the capacity is zero, or the threshold exceeds the
    /// width (every fingerprint would match every entry).
    pub fn validate(&self) -> Result<()> {
        if self.fingerprint_width == 0 || self.fingerprint_width % 8 != 0 {
            return Err(DejavuError::InvalidConfig(format!(
                "Fingerprint width must be a positive multiple of 8, got {}",
                self.fingerprint_width
            )));
        }
        if self.cache_capacity == 0 {
            return Err(DejavuError::InvalidConfig(
                "Cache capacity must be at least 1".into(),
            ));
        }
        if self.match_threshold > self.fingerprint_width {
            return Err(DejavuError::InvalidConfig(format!(
                "Match threshold {} exceeds fingerprint width {}",
                self.match_threshold, self.fingerprint_width
            )));
        }
        Ok(())
    }
}
