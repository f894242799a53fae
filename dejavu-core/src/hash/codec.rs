//! Image decoding and fingerprint computation.
//!
//! [`ImageCodec`] is the seam between raw submitted bytes and the similarity
//! machinery: the checker only ever sees fingerprints, never pixels. The
//! production codec decodes with the `image` crate and fingerprints with
//! Blockhash; tests substitute deterministic codecs through the same trait.

use crate::error::{DejavuError, Result};
use crate::hash::fingerprint::{ContentDigest, Fingerprint, FingerprintAlgorithm};
use blockhash::{blockhash64, Blockhash64};
use image::DynamicImage;

/// Decodes image bytes into a perceptual fingerprint.
///
/// Implementations must be thread-safe (`Send + Sync`); the checker calls
/// them from blocking worker threads.
pub trait ImageCodec: Send + Sync {
    /// Decode the bytes and compute their perceptual fingerprint.
    ///
    /// # Errors
    ///
    /// [`DejavuError::Decode`] when the bytes are empty, truncated or not a
    /// supported image format. Decode failures are never cached downstream.
    fn fingerprint(&self, image_data: &[u8]) -> Result<Fingerprint>;

    /// The algorithm this codec computes, and with it the fingerprint width.
    fn algorithm(&self) -> FingerprintAlgorithm;

    /// Exact digest of the bytes. Pure hashing, defined for any input.
    ///
    /// Provided so the codec covers both image identities. Implementations
    /// must keep this deterministic; the result cache is keyed by it.
    fn digest(&self, image_data: &[u8]) -> ContentDigest {
        ContentDigest::from_bytes(image_data)
    }
}

/// Production codec: `image` decoding plus the Blockhash algorithm.
///
/// Supports JPEG, PNG, GIF and WebP input.
#[derive(Debug, Clone, Default)]
pub struct BlockhashCodec {
    algorithm: FingerprintAlgorithm,
}

impl BlockhashCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint an already-decoded image.
    pub fn fingerprint_image(&self, image: &DynamicImage) -> Fingerprint {
        match self.algorithm {
            FingerprintAlgorithm::Blockhash64 => {
                let hash: Blockhash64 = blockhash64(image);
                let bits: [u8; 8] = hash.into();
                Fingerprint::new(bits, FingerprintAlgorithm::Blockhash64)
            }
        }
    }

    /// Check whether the bytes look like a supported image format.
    pub fn is_supported_format(data: &[u8]) -> bool {
        image::guess_format(data).is_ok()
    }
}

impl ImageCodec for BlockhashCodec {
    fn fingerprint(&self, image_data: &[u8]) -> Result<Fingerprint> {
        let image = image::load_from_memory(image_data)
            .map_err(|e| DejavuError::Decode(format!("Failed to decode image: {e}")))?;

        Ok(self.fingerprint_image(&image))
    }

    fn algorithm(&self) -> FingerprintAlgorithm {
        self.algorithm
    }
}
