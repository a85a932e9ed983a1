use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use resub_fabric::Category;
use resub_ledger::LedgerEntry;

use crate::error::KernelError;
use crate::state::KernelState;
use crate::transaction::Transaction;

/// Append a signed entry to the ledger.
pub const LEDGER_APPEND: &str = "ledger.append";

/// Register a federation route for a DID.
pub const ROUTER_REGISTER: &str = "router.register";

/// Extension point for transaction types beyond the built-ins.
///
/// Custom transactions go through the same nonce, hashing, signing, and
/// logging path as built-ins but leave the ledger and routes untouched.
pub trait TransactionHandler: Send + Sync {
    /// Reject a malformed payload before anything is recorded.
    fn validate(&self, payload: &Value) -> Result<(), KernelError>;

    /// Event to publish once the transaction has been applied.
    fn event(&self, _tx: &Transaction) -> Option<DomainEvent> {
        None
    }
}

/// A type-specific event published after a transaction is applied.
#[derive(Clone, Debug, PartialEq)]
pub struct DomainEvent {
    pub category: Category,
    pub event_type: String,
    pub payload: Value,
}

/// Everything [`apply_transaction`] needs besides the state and the
/// transaction.
#[derive(Clone)]
pub struct TransitionRules {
    pub replay_protection: bool,
    pub handlers: BTreeMap<String, Arc<dyn TransactionHandler>>,
}

impl Default for TransitionRules {
    fn default() -> Self {
        Self {
            replay_protection: true,
            handlers: BTreeMap::new(),
        }
    }
}

impl std::fmt::Debug for TransitionRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionRules")
            .field("replay_protection", &self.replay_protection)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Derive the next snapshot from `state` and `tx`.
///
/// Pure: the result depends only on the arguments. A stored ledger entry is
/// rebuilt from its fields and its hash recomputed, so tampering with a
/// logged transaction cannot go unnoticed.
pub fn apply_transaction(
    state: &KernelState,
    tx: &Transaction,
    rules: &TransitionRules,
) -> Result<KernelState, KernelError> {
    let computed = tx.content_hash()?;
    if computed != tx.hash() {
        return Err(KernelError::InvariantViolation(format!(
            "transaction hash mismatch: stored {}, recomputed {computed}",
            tx.hash()
        )));
    }
    if rules.replay_protection && state.has_nonce(tx.nonce()) {
        return Err(KernelError::ReplayAttack {
            nonce: tx.nonce().to_string(),
        });
    }

    let mut ledger = Arc::clone(state.ledger());
    let mut router = Arc::clone(state.router());
    match tx.tx_type() {
        LEDGER_APPEND => {
            let entry = stored_entry(tx.payload())?;
            let mut next = (*ledger).clone();
            next.append(entry)?;
            ledger = Arc::new(next);
        }
        ROUTER_REGISTER => {
            let did = required_str(tx.payload(), "did")?;
            let endpoint = required_str(tx.payload(), "endpoint")?;
            router = Arc::new(router.with_route(did, endpoint, tx.pulse()));
        }
        other if rules.handlers.contains_key(other) => {}
        other => return Err(KernelError::UnknownTransactionType(other.to_string())),
    }

    Ok(state.advance(ledger, router, tx)?)
}

/// Rebuild the ledger entry embedded in a `ledger.append` payload.
fn stored_entry(payload: &Value) -> Result<LedgerEntry, KernelError> {
    let raw = payload
        .get("entry")
        .ok_or_else(|| KernelError::InvariantViolation("ledger.append without entry".into()))?;
    let stored: LedgerEntry = serde_json::from_value(raw.clone())
        .map_err(|e| KernelError::InvariantViolation(format!("malformed ledger entry: {e}")))?;

    let rebuilt = LedgerEntry::from_parts(
        stored.action(),
        stored.data().clone(),
        *stored.signature(),
        *stored.public_key(),
        stored.pulse(),
    )?;
    if rebuilt.hash() != stored.hash() {
        return Err(KernelError::InvariantViolation(format!(
            "ledger entry hash mismatch: stored {}, recomputed {}",
            stored.hash(),
            rebuilt.hash()
        )));
    }
    if payload.get("action") != Some(&Value::String(rebuilt.action().to_string()))
        || payload.get("data") != Some(rebuilt.data())
    {
        return Err(KernelError::InvariantViolation(
            "ledger entry does not match transaction payload".into(),
        ));
    }
    Ok(rebuilt)
}

fn required_str<'a>(payload: &'a Value, field: &str) -> Result<&'a str, KernelError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| KernelError::InvalidPayload(format!("{field} must be a non-empty string")))
}

/// Type names are lowercase dotted identifiers such as `ledger.append`.
pub(crate) fn validate_type(tx_type: &str) -> Result<(), KernelError> {
    let valid = !tx_type.is_empty()
        && tx_type.split('.').all(|segment| {
            let mut chars = segment.chars();
            chars.next().is_some_and(|c| c.is_ascii_lowercase())
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        });
    if valid {
        Ok(())
    } else {
        Err(KernelError::InvalidType(tx_type.to_string()))
    }
}

/// Structural checks run before a transaction announces intent.
pub(crate) fn validate_payload(
    tx_type: &str,
    payload: &Value,
    rules: &TransitionRules,
) -> Result<(), KernelError> {
    if !payload.is_object() {
        return Err(KernelError::InvalidPayload("payload must be an object".into()));
    }
    match tx_type {
        LEDGER_APPEND => {
            required_str(payload, "action")?;
            if payload.get("data").is_none() {
                return Err(KernelError::InvalidPayload("data is required".into()));
            }
            if payload.get("entry").is_some() {
                return Err(KernelError::InvalidPayload("entry is reserved".into()));
            }
            Ok(())
        }
        ROUTER_REGISTER => {
            required_str(payload, "did")?;
            required_str(payload, "endpoint")?;
            Ok(())
        }
        other => match rules.handlers.get(other) {
            Some(handler) => handler.validate(payload),
            None => Err(KernelError::UnknownTransactionType(other.to_string())),
        },
    }
}
