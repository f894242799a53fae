//! The check orchestrator.
//!
//! [`ImageChecker`] runs the per-request pipeline: digest the bytes, consult
//! the result cache, and on a miss compute the perceptual fingerprint, query
//! the similarity index, collect analyzer warnings, assemble the result and
//! store it. Concurrent checks of byte-identical submissions are coalesced
//! into a single computation (single-flight): the first request leads, the
//! rest attach to its published outcome.
//!
//! The computation runs on a detached blocking task. A caller that stops
//! waiting (timeout, disconnect) abandons only its own wait; the task still
//! completes, stores the result and serves the remaining waiters.

use crate::analyzer::{AuthenticityAnalyzer, NoopAnalyzer};
use crate::cache::ResultCache;
use crate::config::CheckerConfig;
use crate::error::{DejavuError, Result};
use crate::hash::{BlockhashCodec, ContentDigest, ImageCodec};
use crate::index::{Provenance, ScanStrategy, SimilarityIndex, SimilarityMatch};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Outcome of one completed check, as published to every attached waiter.
type CheckOutcome = Result<CheckResult>;

type InflightMap = HashMap<ContentDigest, watch::Receiver<Option<CheckOutcome>>>;

/// Removes the flight's slot from the in-flight table on drop, unwind
/// included.
struct InflightSlot {
    inflight: Arc<Mutex<InflightMap>>,
    digest: ContentDigest,
}

impl Drop for InflightSlot {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.digest);
    }
}

/// Result of checking one image against the known-fake corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Corpus entries within the match threshold, closest first.
    pub matches: Vec<SimilarityMatch>,
    /// Metadata warnings from the authenticity analyzer.
    pub warnings: Vec<String>,
}

impl CheckResult {
    /// Whether any corpus entry matched within the threshold.
    pub fn is_recycled(&self) -> bool {
        !self.matches.is_empty()
    }

    /// The closest match, if any.
    pub fn best_match(&self) -> Option<&SimilarityMatch> {
        self.matches.first()
    }
}

/// Snapshot of checker state for liveness reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Known-fake entries in the similarity index.
    pub entry_count: usize,
    /// Results currently held by the cache.
    pub cache_size: usize,
}

/// Orchestrates image checks against a known-fake corpus.
///
/// Cheap to clone; clones share the index, cache and in-flight table.
///
/// # Example
///
/// ```no_run
/// use dejavu_core::{CheckerBuilder, Provenance};
///
/// # async fn example() -> dejavu_core::Result<()> {
/// let checker = CheckerBuilder::new().build()?;
///
/// let known_fake = std::fs::read("old_flood.jpg").unwrap();
/// checker.add_known_fake(
///     &known_fake,
///     Provenance {
///         original_url: "https://example.com/old_flood.jpg".into(),
///         original_date: "2018-07-05".into(),
///         description: "Flood photo from 2018".into(),
///     },
/// )?;
///
/// let submitted = std::fs::read("viral_repost.jpg").unwrap();
/// let result = checker.check(&submitted).await?;
/// if result.is_recycled() {
///     println!("Recycled image: {:?}", result.best_match());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ImageChecker {
    config: CheckerConfig,
    codec: Arc<dyn ImageCodec>,
    analyzer: Arc<dyn AuthenticityAnalyzer>,
    index: Arc<SimilarityIndex>,
    cache: Arc<ResultCache>,
    inflight: Arc<Mutex<InflightMap>>,
}

/// Manual impl: the codec and analyzer are trait objects without a `Debug`
/// bound, so only the stateful parts are printable.
impl std::fmt::Debug for ImageChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageChecker")
            .field("config", &self.config)
            .field("index", &self.index)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ImageChecker {
    /// Start wiring a checker.
    pub fn builder() -> CheckerBuilder {
        CheckerBuilder::new()
    }

    /// Check image bytes against the known-fake corpus.
    ///
    /// Byte-identical resubmissions are answered from the cache. Concurrent
    /// checks of the same bytes share one computation.
    ///
    /// # Errors
    ///
    /// [`DejavuError::Decode`] when the bytes are not a supported image;
    /// decode failures are never cached, so a later resubmission recomputes.
    /// [`DejavuError::Aborted`] when the shared computation terminated
    /// without publishing an outcome.
    pub async fn check(&self, bytes: &[u8]) -> Result<CheckResult> {
        let digest = self.codec.digest(bytes);

        if let Some(result) = self.cache.get(&digest) {
            return Ok(result);
        }

        let mut rx = {
            let mut inflight = self.lock_inflight();

            // A flight that finished between the miss above and this lock has
            // already stored its result; re-check before leading a new one.
            if let Some(result) = self.cache.get(&digest) {
                return Ok(result);
            }

            if let Some(rx) = inflight.get(&digest) {
                tracing::debug!(%digest, "Attached to in-flight check");
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                inflight.insert(digest, rx.clone());
                self.spawn_check(digest, bytes.to_vec(), tx);
                rx
            }
        };

        loop {
            let published = rx.borrow_and_update().clone();
            if let Some(outcome) = published {
                return outcome;
            }
            rx.changed().await.map_err(|_| DejavuError::Aborted)?;
        }
    }

    /// Fingerprint the bytes and add them to the known-fake corpus.
    ///
    /// Returns the assigned entry id.
    ///
    /// # Errors
    ///
    /// [`DejavuError::Decode`] when the bytes are not a supported image; the
    /// corpus is left unchanged.
    pub fn add_known_fake(&self, bytes: &[u8], provenance: Provenance) -> Result<u64> {
        let fingerprint = self.codec.fingerprint(bytes)?;
        self.index.add(fingerprint, provenance)
    }

    /// Current corpus and cache sizes.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            entry_count: self.index.len(),
            cache_size: self.cache.len(),
        }
    }

    /// The similarity index backing this checker.
    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    /// The configuration this checker was built with.
    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    fn spawn_check(
        &self,
        digest: ContentDigest,
        bytes: Vec<u8>,
        tx: watch::Sender<Option<CheckOutcome>>,
    ) {
        tracing::debug!(%digest, "Starting image check");

        let codec = Arc::clone(&self.codec);
        let analyzer = Arc::clone(&self.analyzer);
        let index = Arc::clone(&self.index);
        let cache = Arc::clone(&self.cache);
        let inflight = Arc::clone(&self.inflight);
        let threshold = self.config.match_threshold;

        // Detached on purpose: a caller abandoning its wait must not cancel
        // the computation for other waiters.
        tokio::task::spawn_blocking(move || {
            // The slot must die with the flight. If the computation panics,
            // the guard still removes it during unwind; waiters see the
            // dropped sender as `Aborted` and a retry leads a fresh flight.
            let slot = InflightSlot { inflight, digest };
            let outcome = run_check(&*codec, &*analyzer, &index, threshold, &bytes);

            // Publish order: cache store, slot removal, broadcast. A racing
            // check that misses the cache still finds the slot; one that
            // finds no slot sees the cached result.
            match &outcome {
                Ok(result) => cache.put(digest, result.clone()),
                Err(error) => {
                    tracing::warn!(%digest, %error, "Check failed; result not cached");
                }
            }
            drop(slot);
            let _ = tx.send(Some(outcome));
        });
    }

    fn lock_inflight(&self) -> std::sync::MutexGuard<'_, InflightMap> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_check(
    codec: &dyn ImageCodec,
    analyzer: &dyn AuthenticityAnalyzer,
    index: &SimilarityIndex,
    threshold: u32,
    bytes: &[u8],
) -> Result<CheckResult> {
    let fingerprint = codec.fingerprint(bytes)?;
    let matches = index.query(&fingerprint, threshold)?;
    let warnings = analyzer.analyze(bytes);

    tracing::debug!(
        matches = matches.len(),
        warnings = warnings.len(),
        "Check completed"
    );
    Ok(CheckResult { matches, warnings })
}

/// Wires an [`ImageChecker`] from its parts.
///
/// Unset parts fall back to production defaults: [`BlockhashCodec`],
/// [`NoopAnalyzer`], a fresh index with the configured width, and
/// [`CheckerConfig::default`]. Width agreement between the configuration,
/// the codec and the index is validated here, at wiring time, so version
/// skew never surfaces as a per-request error.
pub struct CheckerBuilder {
    config: CheckerConfig,
    codec: Option<Arc<dyn ImageCodec>>,
    analyzer: Option<Arc<dyn AuthenticityAnalyzer>>,
    index: Option<Arc<SimilarityIndex>>,
    strategy: ScanStrategy,
}

impl CheckerBuilder {
    pub fn new() -> Self {
        Self {
            config: CheckerConfig::default(),
            codec: None,
            analyzer: None,
            index: None,
            strategy: ScanStrategy::default(),
        }
    }

    /// Use this configuration instead of the defaults.
    pub fn with_config(mut self, config: CheckerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom codec instead of [`BlockhashCodec`].
    pub fn with_codec(mut self, codec: impl ImageCodec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Use a custom analyzer instead of [`NoopAnalyzer`].
    pub fn with_analyzer(mut self, analyzer: impl AuthenticityAnalyzer + 'static) -> Self {
        self.analyzer = Some(Arc::new(analyzer));
        self
    }

    /// Use an existing index (for example one rebuilt from persisted
    /// entries) instead of a fresh empty one.
    pub fn with_index(mut self, index: Arc<SimilarityIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Scan strategy for the fresh index built when none is supplied.
    pub fn with_scan_strategy(mut self, strategy: ScanStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Validate the wiring and build the checker.
    ///
    /// # Errors
    ///
    /// [`DejavuError::InvalidConfig`] for a rejected configuration,
    /// [`DejavuError::WidthMismatch`] when the codec or a supplied index
    /// disagrees with the configured fingerprint width.
    pub fn build(self) -> Result<ImageChecker> {
        self.config.validate()?;

        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(BlockhashCodec::new()));
        if codec.algorithm().width() != self.config.fingerprint_width {
            return Err(DejavuError::WidthMismatch {
                expected: self.config.fingerprint_width,
                actual: codec.algorithm().width(),
            });
        }

        let index = match self.index {
            Some(index) => {
                if index.width() != self.config.fingerprint_width {
                    return Err(DejavuError::WidthMismatch {
                        expected: self.config.fingerprint_width,
                        actual: index.width(),
                    });
                }
                index
            }
            None => Arc::new(SimilarityIndex::new(
                self.config.fingerprint_width,
                self.strategy,
            )?),
        };

        let capacity = NonZeroUsize::new(self.config.cache_capacity).ok_or_else(|| {
            DejavuError::InvalidConfig("Cache capacity must be at least 1".into())
        })?;
        let cache = Arc::new(ResultCache::new(capacity, self.config.cache_ttl));

        Ok(ImageChecker {
            config: self.config,
            codec,
            analyzer: self
                .analyzer
                .unwrap_or_else(|| Arc::new(NoopAnalyzer)),
            index,
            cache,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

impl Default for CheckerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{Fingerprint, FingerprintAlgorithm};

    /// Treats the first 8 input bytes as the fingerprint. Shorter inputs are
    /// a decode error.
    struct FirstBytesCodec;

    impl ImageCodec for FirstBytesCodec {
        fn fingerprint(&self, image_data: &[u8]) -> Result<Fingerprint> {
            let bits: [u8; 8] = image_data
                .get(..8)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| DejavuError::Decode("Input shorter than 8 bytes".into()))?;
            Ok(Fingerprint::new(bits, FingerprintAlgorithm::Blockhash64))
        }

        fn algorithm(&self) -> FingerprintAlgorithm {
            FingerprintAlgorithm::Blockhash64
        }
    }

    struct StaticAnalyzer(Vec<String>);

    impl AuthenticityAnalyzer for StaticAnalyzer {
        fn analyze(&self, _image_data: &[u8]) -> Vec<String> {
            self.0.clone()
        }
    }

    fn prov(desc: &str) -> Provenance {
        Provenance {
            original_url: format!("https://example.com/{desc}.jpg"),
            original_date: "2018-07-05".to_string(),
            description: desc.to_string(),
        }
    }

    fn checker() -> ImageChecker {
        CheckerBuilder::new()
            .with_codec(FirstBytesCodec)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults_build() {
        let checker = CheckerBuilder::new().build().unwrap();
        let health = checker.health();
        assert_eq!(health.entry_count, 0);
        assert_eq!(health.cache_size, 0);
        assert_eq!(checker.config().match_threshold, 10);
    }

    #[test]
    fn test_builder_rejects_codec_width_skew() {
        let config = CheckerConfig {
            fingerprint_width: 128,
            ..Default::default()
        };
        let err = CheckerBuilder::new()
            .with_config(config)
            .with_codec(FirstBytesCodec)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            DejavuError::WidthMismatch {
                expected: 128,
                actual: 64
            }
        );
    }

    #[test]
    fn test_builder_rejects_index_width_skew() {
        let index = Arc::new(SimilarityIndex::new(32, ScanStrategy::Linear).unwrap());
        let err = CheckerBuilder::new()
            .with_codec(FirstBytesCodec)
            .with_index(index)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            DejavuError::WidthMismatch {
                expected: 64,
                actual: 32
            }
        );
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = CheckerConfig {
            cache_capacity: 0,
            ..Default::default()
        };
        let err = CheckerBuilder::new()
            .with_config(config)
            .build()
            .unwrap_err();
        assert!(matches!(err, DejavuError::InvalidConfig(_)));
    }

    #[test]
    fn test_add_known_fake_assigns_ids() {
        let checker = checker();
        let id1 = checker.add_known_fake(&[0x11; 16], prov("a")).unwrap();
        let id2 = checker.add_known_fake(&[0x22; 16], prov("b")).unwrap();
        assert_eq!((id1, id2), (1, 2));
        assert_eq!(checker.health().entry_count, 2);
    }

    #[test]
    fn test_add_known_fake_decode_failure_leaves_corpus_unchanged() {
        let checker = checker();
        checker.add_known_fake(&[0x11; 16], prov("a")).unwrap();

        let err = checker.add_known_fake(&[0x01, 0x02], prov("bad")).unwrap_err();
        assert!(matches!(err, DejavuError::Decode(_)));
        assert_eq!(checker.health().entry_count, 1);
    }

    #[tokio::test]
    async fn test_check_matches_at_distance_three() {
        let checker = checker();
        // Entry fingerprint: all zeros.
        checker.add_known_fake(&[0x00; 16], prov("flood photo")).unwrap();

        // Query differs in exactly 3 bits of the first byte.
        let mut submitted = [0x00u8; 16];
        submitted[0] = 0x07;
        let result = checker.check(&submitted).await.unwrap();

        assert!(result.is_recycled());
        assert_eq!(result.matches.len(), 1);
        let best = result.best_match().unwrap();
        assert_eq!(best.entry_id, 1);
        assert_eq!(best.distance, 3);
        assert_eq!(best.similarity_percent, 95);
        assert_eq!(best.provenance.description, "flood photo");
    }

    #[tokio::test]
    async fn test_check_no_match_beyond_threshold() {
        let checker = checker();
        checker.add_known_fake(&[0x00; 16], prov("a")).unwrap();

        let result = checker.check(&[0xFF; 16]).await.unwrap();
        assert!(!result.is_recycled());
        assert!(result.best_match().is_none());
    }

    #[tokio::test]
    async fn test_check_collects_analyzer_warnings() {
        let checker = CheckerBuilder::new()
            .with_codec(FirstBytesCodec)
            .with_analyzer(StaticAnalyzer(vec!["No EXIF metadata".to_string()]))
            .build()
            .unwrap();

        let result = checker.check(&[0x42; 16]).await.unwrap();
        assert_eq!(result.warnings, vec!["No EXIF metadata".to_string()]);
    }

    #[tokio::test]
    async fn test_check_decode_failure_is_not_cached() {
        let checker = checker();

        let err = checker.check(&[0x01]).await.unwrap_err();
        assert!(matches!(err, DejavuError::Decode(_)));
        assert_eq!(checker.health().cache_size, 0);
    }

    #[tokio::test]
    async fn test_check_caches_result() {
        let checker = checker();
        checker.check(&[0x42; 16]).await.unwrap();
        assert_eq!(checker.health().cache_size, 1);

        // Entries added after a result was cached are not reconsulted for
        // byte-identical resubmissions.
        checker.add_known_fake(&[0x42; 16], prov("late")).unwrap();
        let result = checker.check(&[0x42; 16]).await.unwrap();
        assert!(result.matches.is_empty());
    }
}
