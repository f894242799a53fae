//! In-memory similarity index over known-fake fingerprints.
//!
//! The index answers one question: which corpus entries lie within a Hamming
//! distance threshold of a query fingerprint? Matches come back ordered by
//! distance, ties broken by entry id, each carrying a width-normalized
//! similarity percentage.
//!
//! Every fingerprint entering the index must match the width fixed at
//! construction. A foreign width is an error, never a penalty: one index holds
//! one fingerprint version.

use crate::error::{DejavuError, Result};
use crate::hash::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Where a known fake was first published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// URL of the earliest known publication.
    pub original_url: String,
    /// Date of the earliest known publication (ISO 8601).
    pub original_date: String,
    /// Human-readable description of the original context.
    pub description: String,
}

/// One corpus entry: a fingerprint plus the provenance of the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownFakeEntry {
    /// Index-assigned identifier, strictly increasing with insertion order.
    pub id: u64,
    /// Perceptual fingerprint of the known fake.
    pub fingerprint: Fingerprint,
    /// Provenance of the original publication.
    pub provenance: Provenance,
}

/// Result of a similarity query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    /// Id of the matching corpus entry.
    pub entry_id: u64,
    /// Hamming distance from the query fingerprint (0 = identical).
    pub distance: u32,
    /// Width-normalized similarity, `round(100 * (1 - distance / width))`.
    pub similarity_percent: u8,
    /// Provenance of the matching entry.
    pub provenance: Provenance,
}

/// Candidate enumeration strategy for queries.
///
/// Both strategies return identical results; they differ only in how many
/// entries they visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanStrategy {
    /// Visit every entry. Exact and predictable, fine for small corpora.
    #[default]
    Linear,
    /// Bucket entries by their leading fingerprint byte and visit only
    /// buckets whose prefix can still satisfy the threshold. Exact: total
    /// distance is never less than leading-byte distance, so no qualifying
    /// entry lives in a skipped bucket. Degenerates to a full scan when the
    /// threshold reaches 8.
    PrefixBuckets,
}

impl std::fmt::Display for ScanStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::PrefixBuckets => write!(f, "prefix-buckets"),
        }
    }
}

/// Width-normalized similarity percentage for a Hamming distance.
///
/// `round(100 * (1 - distance / width))`, clamped to `[0, 100]`. Distance 3
/// of 64 bits is 95%, regardless of how wide future fingerprints get.
pub fn similarity_percent(distance: u32, width: u32) -> u8 {
    if width == 0 {
        return 0;
    }
    let ratio = 1.0 - f64::from(distance) / f64::from(width);
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Default)]
struct IndexState {
    entries: Vec<KnownFakeEntry>,
    /// Entry positions keyed by leading fingerprint byte. Only maintained
    /// under [`ScanStrategy::PrefixBuckets`].
    buckets: HashMap<u8, Vec<usize>>,
    last_id: u64,
}

/// Thread-safe similarity index over the known-fake corpus.
///
/// Reads (queries, snapshots, counts) run concurrently; additions take the
/// write lock, so every entry is either fully visible or not yet visible to
/// any query.
#[derive(Debug)]
pub struct SimilarityIndex {
    width: u32,
    strategy: ScanStrategy,
    state: RwLock<IndexState>,
}

impl SimilarityIndex {
    /// Create an empty index for fingerprints of the given width.
    ///
    /// # Errors
    ///
    /// [`DejavuError::InvalidConfig`] when the width is zero or not a whole
    /// number of bytes.
    pub fn new(width: u32, strategy: ScanStrategy) -> Result<Self> {
        if width == 0 || width % 8 != 0 {
            return Err(DejavuError::InvalidConfig(format!(
                "Fingerprint width must be a positive multiple of 8, got {width}"
            )));
        }
        Ok(Self {
            width,
            strategy,
            state: RwLock::new(IndexState::default()),
        })
    }

    /// Rebuild an index from persisted entries.
    ///
    /// Entry ids must be strictly increasing, the order the index assigned
    /// them; id assignment resumes after the last one.
    ///
    /// # Errors
    ///
    /// [`DejavuError::WidthMismatch`] if any entry has a foreign width,
    /// [`DejavuError::NonMonotonicId`] if ids are out of order or duplicated.
    pub fn from_entries(
        width: u32,
        strategy: ScanStrategy,
        entries: Vec<KnownFakeEntry>,
    ) -> Result<Self> {
        let index = Self::new(width, strategy)?;
        {
            let mut state = index.write_state();
            for entry in entries {
                if entry.fingerprint.width() != width {
                    return Err(DejavuError::WidthMismatch {
                        expected: width,
                        actual: entry.fingerprint.width(),
                    });
                }
                if entry.id <= state.last_id {
                    return Err(DejavuError::NonMonotonicId {
                        last: state.last_id,
                        got: entry.id,
                    });
                }
                state.last_id = entry.id;
                Self::push_entry(&mut state, strategy, entry);
            }
        }
        Ok(index)
    }

    /// The fingerprint width this index accepts, in bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The candidate enumeration strategy in use.
    pub fn strategy(&self) -> ScanStrategy {
        self.strategy
    }

    /// Number of entries in the corpus.
    pub fn len(&self) -> usize {
        self.read_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a known fake to the corpus and return its assigned id.
    ///
    /// Ids start at 1 and increase with every successful addition. A failed
    /// addition consumes no id.
    ///
    /// # Errors
    ///
    /// [`DejavuError::WidthMismatch`] when the fingerprint width differs from
    /// the index width.
    pub fn add(&self, fingerprint: Fingerprint, provenance: Provenance) -> Result<u64> {
        if fingerprint.width() != self.width {
            return Err(DejavuError::WidthMismatch {
                expected: self.width,
                actual: fingerprint.width(),
            });
        }

        let mut state = self.write_state();
        let id = state.last_id + 1;
        state.last_id = id;

        tracing::debug!(
            entry_id = id,
            fingerprint = %fingerprint,
            "Added known-fake entry"
        );

        Self::push_entry(
            &mut state,
            self.strategy,
            KnownFakeEntry {
                id,
                fingerprint,
                provenance,
            },
        );
        Ok(id)
    }

    /// Find all entries within `threshold` Hamming distance of the query.
    ///
    /// Matches are ordered by distance, then by entry id. A threshold at or
    /// above the width matches the whole corpus.
    ///
    /// # Errors
    ///
    /// [`DejavuError::WidthMismatch`] when the query fingerprint width
    /// differs from the index width. A foreign-width query is rejected
    /// rather than answered with an empty result, because "no match" is a
    /// verdict and a mis-versioned fingerprint must not produce one.
    pub fn query(&self, fingerprint: &Fingerprint, threshold: u32) -> Result<Vec<SimilarityMatch>> {
        if fingerprint.width() != self.width {
            return Err(DejavuError::WidthMismatch {
                expected: self.width,
                actual: fingerprint.width(),
            });
        }

        let state = self.read_state();
        let mut matches = match self.strategy {
            ScanStrategy::Linear => Self::scan(fingerprint, threshold, state.entries.iter()),
            ScanStrategy::PrefixBuckets => {
                let candidates = prefix_masks(threshold)
                    .filter_map(|mask| state.buckets.get(&(fingerprint.leading_byte() ^ mask)))
                    .flatten()
                    .map(|&pos| &state.entries[pos]);
                Self::scan(fingerprint, threshold, candidates)
            }
        };

        matches.sort_by_key(|m| (m.distance, m.entry_id));

        tracing::debug!(
            threshold,
            matches = matches.len(),
            strategy = %self.strategy,
            "Similarity query completed"
        );
        Ok(matches)
    }

    /// Snapshot of all entries in id order, for persistence.
    pub fn entries(&self) -> Vec<KnownFakeEntry> {
        self.read_state().entries.clone()
    }

    fn scan<'a>(
        query: &Fingerprint,
        threshold: u32,
        candidates: impl Iterator<Item = &'a KnownFakeEntry>,
    ) -> Vec<SimilarityMatch> {
        candidates
            .filter_map(|entry| {
                // Widths were checked on insert and on query entry.
                let distance = query.hamming_distance(&entry.fingerprint).ok()?;
                (distance <= threshold).then(|| SimilarityMatch {
                    entry_id: entry.id,
                    distance,
                    similarity_percent: similarity_percent(distance, query.width()),
                    provenance: entry.provenance.clone(),
                })
            })
            .collect()
    }

    fn push_entry(state: &mut IndexState, strategy: ScanStrategy, entry: KnownFakeEntry) {
        if strategy == ScanStrategy::PrefixBuckets {
            let pos = state.entries.len();
            state
                .buckets
                .entry(entry.fingerprint.leading_byte())
                .or_default()
                .push(pos);
        }
        state.entries.push(entry);
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimilarityIndex {
    /// 64-bit linear-scan index.
    fn default() -> Self {
        Self {
            width: crate::hash::DEFAULT_FINGERPRINT_WIDTH,
            strategy: ScanStrategy::Linear,
            state: RwLock::new(IndexState::default()),
        }
    }
}

/// All byte masks whose popcount can still satisfy the threshold.
///
/// A candidate bucket differs from the query's leading byte by one of these
/// masks. At most 256 masks, so enumeration is constant work.
fn prefix_masks(threshold: u32) -> impl Iterator<Item = u8> {
    (0u16..256).filter_map(move |m| {
        let mask = m as u8;
        (u32::from(mask).count_ones() <= threshold).then_some(mask)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::FingerprintAlgorithm;

    fn fp(bits: [u8; 8]) -> Fingerprint {
        Fingerprint::new(bits, FingerprintAlgorithm::Blockhash64)
    }

    fn prov(desc: &str) -> Provenance {
        Provenance {
            original_url: format!("https://example.com/{desc}.jpg"),
            original_date: "2018-07-05".to_string(),
            description: desc.to_string(),
        }
    }

    #[test]
    fn test_new_rejects_invalid_width() {
        assert!(SimilarityIndex::new(0, ScanStrategy::Linear).is_err());
        assert!(SimilarityIndex::new(12, ScanStrategy::Linear).is_err());
        assert!(SimilarityIndex::new(64, ScanStrategy::Linear).is_ok());
    }

    #[test]
    fn test_ids_are_strictly_increasing_from_one() {
        let index = SimilarityIndex::new(64, ScanStrategy::Linear).unwrap();
        assert_eq!(index.add(fp([0x00; 8]), prov("a")).unwrap(), 1);
        assert_eq!(index.add(fp([0x01; 8]), prov("b")).unwrap(), 2);
        assert_eq!(index.add(fp([0x02; 8]), prov("c")).unwrap(), 3);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_failed_add_consumes_no_id() {
        let index = SimilarityIndex::new(64, ScanStrategy::Linear).unwrap();
        index.add(fp([0x00; 8]), prov("a")).unwrap();

        let narrow = Fingerprint::from_hex("deadbeef", FingerprintAlgorithm::Blockhash64).unwrap();
        let err = index.add(narrow, prov("bad")).unwrap_err();
        assert_eq!(
            err,
            DejavuError::WidthMismatch {
                expected: 64,
                actual: 32
            }
        );
        assert_eq!(index.len(), 1);

        // Next successful add continues the sequence without gaps.
        assert_eq!(index.add(fp([0x01; 8]), prov("b")).unwrap(), 2);
    }

    #[test]
    fn test_query_orders_by_distance_then_id() {
        let index = SimilarityIndex::new(64, ScanStrategy::Linear).unwrap();
        // Distance 2 from the query.
        index.add(fp([0x03, 0, 0, 0, 0, 0, 0, 0]), prov("far")).unwrap();
        // Distance 0.
        index.add(fp([0x00; 8]), prov("exact")).unwrap();
        // Distance 2 again, higher id than "far".
        index.add(fp([0x00, 0x03, 0, 0, 0, 0, 0, 0]), prov("far2")).unwrap();

        let matches = index.query(&fp([0x00; 8]), 10).unwrap();
        let order: Vec<(u64, u32)> = matches.iter().map(|m| (m.entry_id, m.distance)).collect();
        assert_eq!(order, vec![(2, 0), (1, 2), (3, 2)]);
    }

    #[test]
    fn test_query_filters_by_threshold() {
        let index = SimilarityIndex::new(64, ScanStrategy::Linear).unwrap();
        index.add(fp([0xFF; 8]), prov("opposite")).unwrap();
        index.add(fp([0x01, 0, 0, 0, 0, 0, 0, 0]), prov("close")).unwrap();

        let matches = index.query(&fp([0x00; 8]), 10).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entry_id, 2);
        assert_eq!(matches[0].distance, 1);

        // Threshold 0 keeps only exact matches.
        assert!(index.query(&fp([0x00; 8]), 0).unwrap().is_empty());

        // Threshold at the full width matches everything.
        assert_eq!(index.query(&fp([0x00; 8]), 64).unwrap().len(), 2);
    }

    #[test]
    fn test_query_rejects_foreign_width() {
        let index = SimilarityIndex::new(64, ScanStrategy::Linear).unwrap();
        index.add(fp([0x00; 8]), prov("a")).unwrap();

        let narrow = Fingerprint::from_hex("cafe", FingerprintAlgorithm::Blockhash64).unwrap();
        let err = index.query(&narrow, 10).unwrap_err();
        assert!(matches!(err, DejavuError::WidthMismatch { .. }));
    }

    #[test]
    fn test_query_empty_index() {
        let index = SimilarityIndex::new(64, ScanStrategy::Linear).unwrap();
        assert!(index.query(&fp([0x42; 8]), 10).unwrap().is_empty());
    }

    #[test]
    fn test_similarity_percent_formula() {
        assert_eq!(similarity_percent(0, 64), 100);
        assert_eq!(similarity_percent(3, 64), 95);
        assert_eq!(similarity_percent(10, 64), 84);
        assert_eq!(similarity_percent(32, 64), 50);
        assert_eq!(similarity_percent(64, 64), 0);
        // Clamped even for out-of-range inputs.
        assert_eq!(similarity_percent(100, 64), 0);
        assert_eq!(similarity_percent(0, 0), 0);
    }

    #[test]
    fn test_match_carries_similarity_percent() {
        let index = SimilarityIndex::new(64, ScanStrategy::Linear).unwrap();
        index.add(fp([0x07, 0, 0, 0, 0, 0, 0, 0]), prov("three-bits")).unwrap();

        let matches = index.query(&fp([0x00; 8]), 10).unwrap();
        assert_eq!(matches[0].distance, 3);
        assert_eq!(matches[0].similarity_percent, 95);
    }

    #[test]
    fn test_prefix_buckets_matches_linear() {
        let linear = SimilarityIndex::new(64, ScanStrategy::Linear).unwrap();
        let bucketed = SimilarityIndex::new(64, ScanStrategy::PrefixBuckets).unwrap();

        // Spread leading bytes across many buckets, including near-threshold
        // prefix distances.
        let patterns: Vec<[u8; 8]> = (0u8..32)
            .map(|i| {
                let mut bits = [i.wrapping_mul(37); 8];
                bits[0] = i;
                bits
            })
            .collect();
        for bits in &patterns {
            linear.add(fp(*bits), prov("p")).unwrap();
            bucketed.add(fp(*bits), prov("p")).unwrap();
        }

        for query in [[0u8; 8], [0x05; 8], [0xFF; 8], patterns[17]] {
            for threshold in [0, 1, 3, 7, 8, 10, 64] {
                let a = linear.query(&fp(query), threshold).unwrap();
                let b = bucketed.query(&fp(query), threshold).unwrap();
                assert_eq!(a, b, "query={query:?} threshold={threshold}");
            }
        }
    }

    #[test]
    fn test_prefix_buckets_skips_distant_prefixes() {
        let index = SimilarityIndex::new(64, ScanStrategy::PrefixBuckets).unwrap();
        // Leading byte differs in all 8 bits; total distance 8 > threshold 3.
        index.add(fp([0xFF, 0, 0, 0, 0, 0, 0, 0]), prov("far")).unwrap();
        // Leading byte differs in 1 bit.
        index.add(fp([0x01, 0, 0, 0, 0, 0, 0, 0]), prov("near")).unwrap();

        let matches = index.query(&fp([0x00; 8]), 3).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entry_id, 2);
    }

    #[test]
    fn test_from_entries_roundtrip() {
        let index = SimilarityIndex::new(64, ScanStrategy::Linear).unwrap();
        index.add(fp([0x11; 8]), prov("a")).unwrap();
        index.add(fp([0x22; 8]), prov("b")).unwrap();

        let restored =
            SimilarityIndex::from_entries(64, ScanStrategy::PrefixBuckets, index.entries())
                .unwrap();
        assert_eq!(restored.len(), 2);

        // Id assignment resumes after the persisted entries.
        assert_eq!(restored.add(fp([0x33; 8]), prov("c")).unwrap(), 3);

        // Queries behave identically after the roundtrip.
        let matches = restored.query(&fp([0x11; 8]), 0).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entry_id, 1);
    }

    #[test]
    fn test_from_entries_rejects_non_monotonic_ids() {
        let entries = vec![
            KnownFakeEntry {
                id: 2,
                fingerprint: fp([0x11; 8]),
                provenance: prov("a"),
            },
            KnownFakeEntry {
                id: 2,
                fingerprint: fp([0x22; 8]),
                provenance: prov("b"),
            },
        ];
        let err = SimilarityIndex::from_entries(64, ScanStrategy::Linear, entries).unwrap_err();
        assert_eq!(err, DejavuError::NonMonotonicId { last: 2, got: 2 });
    }

    #[test]
    fn test_from_entries_rejects_foreign_width() {
        let entries = vec![KnownFakeEntry {
            id: 1,
            fingerprint: Fingerprint::from_hex("dead", FingerprintAlgorithm::Blockhash64).unwrap(),
            provenance: prov("a"),
        }];
        let err = SimilarityIndex::from_entries(64, ScanStrategy::Linear, entries).unwrap_err();
        assert!(matches!(err, DejavuError::WidthMismatch { actual: 16, .. }));
    }

    #[test]
    fn test_concurrent_adds_and_queries() {
        use std::sync::Arc;
        use std::thread;

        let index = Arc::new(SimilarityIndex::new(64, ScanStrategy::PrefixBuckets).unwrap());

        let writer = {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for i in 0u8..50 {
                    index.add(fp([i; 8]), prov("w")).unwrap();
                }
            })
        };
        let reader = {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for _ in 0..50 {
                    // Every observed match set is a consistent snapshot.
                    let matches = index.query(&fp([0x00; 8]), 64).unwrap();
                    for pair in matches.windows(2) {
                        assert!(pair[0].distance <= pair[1].distance);
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(index.len(), 50);
    }
}
