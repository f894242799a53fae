//! Metadata-based authenticity analysis.
//!
//! The checker treats metadata analysis as an opaque collaborator: bytes in,
//! warnings out. What the analyzer inspects (EXIF fields, container
//! oddities, stripping) is its own business and stays outside this crate's
//! contract.

/// Produces human-readable warnings about the submitted bytes.
///
/// The signature is infallible on purpose. An implementation that cannot
/// complete its analysis must degrade to an explicit warning such as
/// "metadata analysis unavailable, needs review" rather than fail the check
/// or silently report a clean result. A missing warning reads as "nothing
/// suspicious", which is exactly the wrong default for a failure.
pub trait AuthenticityAnalyzer: Send + Sync {
    /// Analyze the bytes and return zero or more warnings.
    fn analyze(&self, image_data: &[u8]) -> Vec<String>;
}

/// Analyzer that reports nothing. The default when no collaborator is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalyzer;

impl AuthenticityAnalyzer for NoopAnalyzer {
    fn analyze(&self, _image_data: &[u8]) -> Vec<String> {
        Vec::new()
    }
}
