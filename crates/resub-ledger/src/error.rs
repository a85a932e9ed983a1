use resub_crypto::CanonicalError;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("entry {hash} carries an invalid signature")]
    InvalidSignature { hash: String },

    #[error("entry {hash} is already recorded")]
    DuplicateEntry { hash: String },

    #[error("entry hash mismatch: stored {stored}, recomputed {computed}")]
    HashMismatch { stored: String, computed: String },

    #[error("export declares {declared} entries but carries {actual}")]
    CountMismatch { declared: usize, actual: usize },

    #[error("unsupported ledger export version: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("canonical encoding failed: {0}")]
    Canonical(#[from] CanonicalError),
}
