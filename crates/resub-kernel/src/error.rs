use std::path::PathBuf;

use resub_crypto::CanonicalError;
use resub_fabric::FabricError;
use resub_ledger::LedgerError;
use resub_types::Did;

/// Errors produced by the kernel.
///
/// Every variant aborts the operation before a new snapshot is installed.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("kernel is sealed")]
    KernelSealed,

    #[error("invalid transaction type: {0}")]
    InvalidType(String),

    #[error("invalid transaction payload: {0}")]
    InvalidPayload(String),

    #[error("nonce {nonce} has already been used")]
    ReplayAttack { nonce: String },

    #[error("transaction is {size} bytes, limit is {max}")]
    TransactionTooLarge { size: usize, max: usize },

    #[error("unknown transaction type: {0}")]
    UnknownTransactionType(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("unsupported kernel export version: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("export belongs to {expected}, kernel identity is {found}")]
    IdentityMismatch { expected: Did, found: Did },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("fabric error: {0}")]
    Fabric(#[from] FabricError),

    #[error("canonical encoding failed: {0}")]
    Canonical(#[from] CanonicalError),
}

/// Errors loading a [`KernelConfig`](crate::KernelConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
