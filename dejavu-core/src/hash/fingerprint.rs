//! Content digests and perceptual fingerprints.
//!
//! Two identities are computed for every submitted image:
//!
//! - A **content digest** (SHA3-256 over the exact bytes) identifies a byte-for-byte
//!   resubmission and keys the result cache.
//! - A **perceptual fingerprint** (Blockhash, 64 bits) stays close under re-encoding,
//!   recompression and resizing, and drives the similarity search.
//!
//! Fingerprints carry their algorithm tag; two fingerprints are only comparable when
//! their bit widths agree. Mixing widths is a hard error rather than a penalty,
//! because one index must never silently blend fingerprint versions.

use crate::error::{DejavuError, Result};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Fingerprint width produced by [`FingerprintAlgorithm::Blockhash64`], in bits.
pub const DEFAULT_FINGERPRINT_WIDTH: u32 = 64;

/// SHA3-256 digest of the exact submitted bytes.
///
/// Equal bytes always produce an equal digest, which makes this the cache key
/// for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(#[serde(with = "hex_array")] [u8; 32]);

impl ContentDigest {
    /// Digest raw bytes. Defined for any input, including empty.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(data);
        let result = hasher.finalize();

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);
        Self(digest)
    }

    /// Parse a 64-character hexadecimal digest string.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| DejavuError::Decode(format!("Invalid digest hex: {e}")))?;
        let digest: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            DejavuError::Decode(format!("Digest must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(digest))
    }

    /// The digest as a lowercase hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Perceptual fingerprint algorithm selection.
///
/// The tag is stored alongside every fingerprint so a persisted corpus records
/// which algorithm produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FingerprintAlgorithm {
    /// Blockhash with 64-bit output, grid-based. Robust against JPEG
    /// recompression, resizing and minor edits.
    #[default]
    Blockhash64,
}

impl FingerprintAlgorithm {
    /// Output width of this algorithm in bits.
    pub fn width(&self) -> u32 {
        match self {
            Self::Blockhash64 => DEFAULT_FINGERPRINT_WIDTH,
        }
    }
}

impl std::fmt::Display for FingerprintAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blockhash64 => write!(f, "blockhash64"),
        }
    }
}

/// A computed perceptual fingerprint.
///
/// Serialized with the bit string as a hexadecimal literal, so persisted
/// entries stay greppable:
///
/// ```json
/// {"algorithm":"Blockhash64","bits":"d1c4e2d1c4e2d1c4"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Algorithm that produced this fingerprint.
    pub algorithm: FingerprintAlgorithm,
    /// The fingerprint bit string, most significant byte first.
    #[serde(with = "hex_bits")]
    bits: Vec<u8>,
}

impl Fingerprint {
    /// Wrap a fixed 64-bit fingerprint produced by [`FingerprintAlgorithm::Blockhash64`].
    pub fn new(bits: [u8; 8], algorithm: FingerprintAlgorithm) -> Self {
        Self {
            algorithm,
            bits: bits.to_vec(),
        }
    }

    /// Build a fingerprint from a hexadecimal bit string.
    ///
    /// Accepts any whole-byte width; the width check happens at comparison
    /// time, not here, so foreign-width fingerprints can be represented and
    /// then rejected explicitly.
    pub fn from_hex(hex_str: &str, algorithm: FingerprintAlgorithm) -> Result<Self> {
        let bits = hex::decode(hex_str)
            .map_err(|e| DejavuError::Decode(format!("Invalid fingerprint hex: {e}")))?;
        if bits.is_empty() {
            return Err(DejavuError::Decode("Empty fingerprint".into()));
        }
        Ok(Self { algorithm, bits })
    }

    /// The fingerprint width in bits.
    pub fn width(&self) -> u32 {
        (self.bits.len() * 8) as u32
    }

    /// The fingerprint as a lowercase hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bits)
    }

    /// The most significant byte, used for prefix bucketing.
    ///
    /// `from_hex` rejects empty bit strings, so the leading byte always exists.
    pub(crate) fn leading_byte(&self) -> u8 {
        self.bits[0]
    }

    /// Number of differing bits between two fingerprints of equal width.
    ///
    /// # Errors
    ///
    /// [`DejavuError::WidthMismatch`] when the widths differ. Fingerprints of
    /// different widths come from different algorithm versions and have no
    /// meaningful distance.
    pub fn hamming_distance(&self, other: &Self) -> Result<u32> {
        if self.width() != other.width() {
            return Err(DejavuError::WidthMismatch {
                expected: self.width(),
                actual: other.width(),
            });
        }

        Ok(self
            .bits
            .iter()
            .zip(other.bits.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

mod hex_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bits: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bits))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bits = hex::decode(&s).map_err(serde::de::Error::custom)?;
        if bits.is_empty() {
            return Err(serde::de::Error::custom("empty fingerprint"));
        }
        Ok(bits)
    }
}

mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::custom(format!("expected 32 bytes, got {}", v.len())))
    }
}
