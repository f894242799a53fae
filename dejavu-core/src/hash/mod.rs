//! Image identity: exact digests and perceptual fingerprints.
//!
//! # Components
//!
//! - **Content digests**: SHA3-256 over the submitted bytes, for exact-match
//!   caching of check results.
//! - **Perceptual fingerprints**: compact bit strings that stay close under
//!   re-encoding, for similarity search against the known-fake corpus.
//! - **Codecs**: the decoding seam that turns raw bytes into fingerprints.

pub mod codec;
pub mod fingerprint;

pub use codec::{BlockhashCodec, ImageCodec};
pub use fingerprint::{
    ContentDigest, Fingerprint, FingerprintAlgorithm, DEFAULT_FINGERPRINT_WIDTH,
};
