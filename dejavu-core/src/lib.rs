//! dejavu-core - Near-duplicate detection engine for recycled media
//!
//! This crate detects recycled imagery: previously flagged photos that
//! resurface, usually re-encoded or lightly edited, attached to a new event.
//! It fingerprints submitted images, searches a corpus of known-fake
//! fingerprints within a Hamming-distance threshold, and caches check
//! results by exact content digest with single-flight de-duplication of
//! concurrent identical requests.
//!
//! # Components
//!
//! - Perceptual fingerprints (Blockhash, 64-bit) and SHA3-256 content digests
//! - A similarity index with linear or prefix-bucketed scanning
//! - An LRU result cache with optional lazy TTL
//! - A pluggable metadata-analysis seam producing warnings
//! - The check orchestrator tying them together
//!
//! # Example
//!
//! ```no_run
//! use dejavu_core::{CheckerBuilder, CheckerConfig, Provenance};
//!
//! # async fn example() -> dejavu_core::Result<()> {
//! let checker = CheckerBuilder::new()
//!     .with_config(CheckerConfig::from_env())
//!     .build()?;
//!
//! // Index a known fake with its provenance.
//! let original = std::fs::read("old_flood.jpg").unwrap();
//! let id = checker.add_known_fake(
//!     &original,
//!     Provenance {
//!         original_url: "https://example.com/old_flood.jpg".into(),
//!         original_date: "2018-07-05".into(),
//!         description: "Flood photo from 2018".into(),
//!     },
//! )?;
//! println!("Indexed as entry {id}");
//!
//! // Check a viral repost against the corpus.
//! let submitted = std::fs::read("viral_repost.jpg").unwrap();
//! let result = checker.check(&submitted).await?;
//! for m in &result.matches {
//!     println!("entry {} at distance {} ({}% similar)", m.entry_id, m.distance, m.similarity_percent);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod cache;
pub mod checker;
pub mod config;
pub mod error;
pub mod hash;
pub mod index;

// Re-export main types for convenience
pub use analyzer::{AuthenticityAnalyzer, NoopAnalyzer};
pub use cache::ResultCache;
pub use checker::{CheckResult, CheckerBuilder, HealthReport, ImageChecker};
pub use config::{CheckerConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_MATCH_THRESHOLD};
pub use error::{DejavuError, Result};
pub use hash::{
    BlockhashCodec, ContentDigest, Fingerprint, FingerprintAlgorithm, ImageCodec,
    DEFAULT_FINGERPRINT_WIDTH,
};
pub use index::{
    similarity_percent, KnownFakeEntry, Provenance, ScanStrategy, SimilarityIndex,
    SimilarityMatch,
};
