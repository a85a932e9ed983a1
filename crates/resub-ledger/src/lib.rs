//! Append-only signed ledger for the reputation substrate.
//!
//! This crate provides:
//! - [`LedgerEntry`], a signed record whose hash covers its own signature
//! - [`Ledger`], an ordered collection that only accepts verified entries
//! - Audits over every stored signature ([`LedgerAudit`])
//! - Version-gated export/import snapshots ([`LedgerExport`])
//!
//! A `Ledger` is a plain value. Callers that need snapshot semantics clone
//! it and append to the copy.

pub mod entry;
pub mod error;
pub mod ledger;

pub use entry::LedgerEntry;
pub use error::LedgerError;
pub use ledger::{Ledger, LedgerAudit, LedgerExport, EMPTY_LEDGER_HASH, LEDGER_VERSION};
