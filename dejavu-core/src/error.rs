use thiserror::Error;

/// Errors are `Clone` so a single in-flight check outcome can be handed to
/// every request that coalesced onto it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DejavuError {
    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Fingerprint width mismatch: expected {expected} bits, got {actual}")]
    WidthMismatch { expected: u32, actual: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Non-monotonic entry id: last={last}, got={got}")]
    NonMonotonicId { last: u64, got: u64 },

    #[error("Check aborted before a result was published")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, DejavuError>;
