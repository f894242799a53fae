//! Content-addressed cache of completed check results.
//!
//! Keyed by the exact [`ContentDigest`] of the submitted bytes, so only
//! byte-identical resubmissions hit. Bounded capacity with LRU eviction,
//! evaluated synchronously inside [`ResultCache::put`], and an optional
//! per-entry TTL enforced lazily on access. There is no background sweep.
//!
//! Only fully assembled results are ever stored; decode failures never reach
//! this cache (the checker enforces that).
//!
//! Lock poisoning is handled fail-open: a poisoned lock makes `get` miss and
//! `put` skip. The cache is an optimization, and recomputing a check is
//! always safe.

use crate::checker::CheckResult;
use crate::hash::ContentDigest;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    result: CheckResult,
    created_at: Instant,
}

/// LRU result cache keyed by content digest.
///
/// Recency is updated on both `get` and `put`. Safe to share across threads
/// and async tasks.
#[derive(Debug)]
pub struct ResultCache {
    entries: Mutex<LruCache<ContentDigest, CacheEntry>>,
    ttl: Option<Duration>,
}

impl ResultCache {
    /// Create a cache holding at most `capacity` results.
    ///
    /// With a TTL, entries older than the duration are treated as misses and
    /// dropped when accessed.
    pub fn new(capacity: NonZeroUsize, ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Look up a cached result. A hit marks the entry most recently used.
    pub fn get(&self, digest: &ContentDigest) -> Option<CheckResult> {
        let mut entries = self.entries.lock().ok()?;

        let entry = entries.get(digest)?;
        if let Some(ttl) = self.ttl {
            if entry.created_at.elapsed() > ttl {
                entries.pop(digest);
                tracing::debug!(%digest, "Cache entry expired");
                return None;
            }
        }

        tracing::debug!(%digest, "Cache hit");
        Some(entry.result.clone())
    }

    /// Insert or replace a result.
    ///
    /// When the cache is full, the least-recently-used entry is evicted
    /// before this call returns.
    pub fn put(&self, digest: ContentDigest, result: CheckResult) {
        let entry = CacheEntry {
            result,
            created_at: Instant::now(),
        };

        if let Ok(mut entries) = self.entries.lock() {
            if let Some((evicted, _)) = entries.push(digest, entry) {
                if evicted != digest {
                    tracing::debug!(%evicted, "Evicted least-recently-used cache entry");
                }
            }
            tracing::debug!(%digest, size = entries.len(), "Cached check result");
        }
    }

    /// Number of cached results.
    ///
    /// Includes entries past their TTL that have not been touched since
    /// expiring; those are dropped lazily on access.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured TTL, if any.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Maximum number of results the cache holds.
    pub fn capacity(&self) -> usize {
        self.entries.lock().map(|e| e.cap().get()).unwrap_or(0)
    }
}
