use serde::{Deserialize, Serialize};

use resub_types::{Did, Pulse};

use crate::entry::LedgerEntry;
use crate::error::LedgerError;

/// Version tag written into every export.
pub const LEDGER_VERSION: &str = "resub-ledger/1";

/// Aggregate hash of a ledger with no entries.
pub const EMPTY_LEDGER_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Domain tag that opens the aggregate hash.
const AGGREGATE_TAG: &[u8] = b"resub-ledger-v1:";

/// Ordered, append-only collection of verified entries.
///
/// Entries and the hash index are persistent collections, so cloning a
/// ledger shares structure with the original. The aggregate hash is kept
/// as a running hasher that each append extends.
#[derive(Clone, Debug)]
pub struct Ledger {
    entries: im::Vector<LedgerEntry>,
    index: im::HashMap<String, usize>,
    aggregate: blake3::Hasher,
}

impl Default for Ledger {
    fn default() -> Self {
        let mut aggregate = blake3::Hasher::new();
        aggregate.update(AGGREGATE_TAG);
        Self {
            entries: im::Vector::new(),
            index: im::HashMap::new(),
            aggregate,
        }
    }
}

/// Result of re-verifying every stored signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAudit {
    pub total: usize,
    pub valid_count: usize,
    /// Hashes of entries whose signature no longer verifies.
    pub invalid_entries: Vec<String>,
    pub all_valid: bool,
}

/// Serializable snapshot of a ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerExport {
    pub version: String,
    pub entries: Vec<LedgerEntry>,
    pub count: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a verified entry.
    pub fn append(&mut self, entry: LedgerEntry) -> Result<(), LedgerError> {
        if !entry.verify() {
            tracing::warn!(hash = entry.hash(), "rejected ledger entry with bad signature");
            return Err(LedgerError::InvalidSignature {
                hash: entry.hash().to_string(),
            });
        }
        if self.index.contains_key(entry.hash()) {
            return Err(LedgerError::DuplicateEntry {
                hash: entry.hash().to_string(),
            });
        }
        tracing::debug!(
            hash = entry.hash(),
            action = entry.action(),
            seq = self.entries.len(),
            "ledger entry appended"
        );
        self.aggregate.update(entry.hash().as_bytes());
        self.aggregate.update(b"\n");
        self.index.insert(entry.hash().to_string(), self.entries.len());
        self.entries.push_back(entry);
        Ok(())
    }

    /// BLAKE3 over the domain tag followed by each member hash and a
    /// newline, in append order. Constant time: the digest is finalized from
    /// the running hasher.
    ///
    /// An empty ledger yields [`EMPTY_LEDGER_HASH`].
    pub fn compute_hash(&self) -> String {
        if self.entries.is_empty() {
            return EMPTY_LEDGER_HASH.to_string();
        }
        hex::encode(self.aggregate.finalize().as_bytes())
    }

    /// Re-verify every signature.
    pub fn verify_all(&self) -> LedgerAudit {
        let invalid_entries: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.verify())
            .map(|e| e.hash().to_string())
            .collect();
        let total = self.entries.len();
        LedgerAudit {
            total,
            valid_count: total - invalid_entries.len(),
            all_valid: invalid_entries.is_empty(),
            invalid_entries,
        }
    }

    pub fn by_action(&self, action: &str) -> Vec<&LedgerEntry> {
        self.entries.iter().filter(|e| e.action() == action).collect()
    }

    /// Entries signed by `did`. Linear scan; the DID is re-derived from each
    /// entry's key.
    pub fn by_signer(&self, did: &Did) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| &e.signer_did() == did)
            .collect()
    }

    /// Entries with `from <= pulse <= to`.
    pub fn in_range(&self, from: Pulse, to: Pulse) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| (from..=to).contains(&e.pulse()))
            .collect()
    }

    pub fn get(&self, hash: &str) -> Option<&LedgerEntry> {
        self.index.get(hash).and_then(|&i| self.entries.get(i))
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.index.contains_key(hash)
    }

    pub fn latest(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    /// Entries in append order.
    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn export(&self) -> LedgerExport {
        LedgerExport {
            version: LEDGER_VERSION.to_string(),
            entries: self.entries.iter().cloned().collect(),
            count: self.entries.len(),
        }
    }

    /// Rebuild a ledger from an export.
    ///
    /// The declared count must match the entries carried, each entry's
    /// stored hash must match its recomputed hash, and each entry goes
    /// through [`Ledger::append`] again.
    pub fn import(export: LedgerExport) -> Result<Self, LedgerError> {
        if export.version != LEDGER_VERSION {
            return Err(LedgerError::VersionMismatch {
                expected: LEDGER_VERSION.to_string(),
                found: export.version,
            });
        }
        if export.count != export.entries.len() {
            return Err(LedgerError::CountMismatch {
                declared: export.count,
                actual: export.entries.len(),
            });
        }
        let mut ledger = Self::new();
        for entry in export.entries {
            let computed = entry.recompute_hash()?;
            if computed != entry.hash() {
                return Err(LedgerError::HashMismatch {
                    stored: entry.hash().to_string(),
                    computed,
                });
            }
            ledger.append(entry)?;
        }
        Ok(ledger)
    }
}
