use resub_crypto::CanonicalError;

/// Errors produced by the event fabric.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FabricError {
    /// The fabric has been sealed and accepts no further changes.
    #[error("fabric is sealed")]
    FabricSealed,

    #[error("unknown event category: {0}")]
    InvalidCategory(String),

    #[error("event type must be a non-empty string")]
    InvalidType,

    /// Payloads must be structured (a JSON object or array).
    #[error("event payload must be an object or array, got {0}")]
    InvalidPayload(&'static str),

    #[error("invalid subscription pattern: {0:?}")]
    InvalidPattern(String),

    #[error("subscription limit of {limit} reached")]
    ResourceExhausted { limit: usize },

    #[error("unsupported fabric export version: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("canonical encoding failed: {0}")]
    Canonical(#[from] CanonicalError),
}

/// Convenience alias used throughout the fabric crate.
pub type Result<T> = std::result::Result<T, FabricError>;
