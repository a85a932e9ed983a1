use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use resub_crypto::Signer;
use resub_fabric::{Category, EmitOptions, EventFabric, FabricExport, Priority};
use resub_ledger::{Ledger, LedgerAudit, LedgerEntry, LedgerExport};
use resub_types::{Clock, Did, NonceSource, Pulse};

use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::state::{IdentityRef, KernelState};
use crate::transaction::{Transaction, TransactionReceipt};
use crate::transition::{
    apply_transaction, validate_payload, validate_type, DomainEvent, TransactionHandler,
    TransitionRules, LEDGER_APPEND, ROUTER_REGISTER,
};

/// Version tag written into every export.
pub const KERNEL_VERSION: &str = "resub-kernel/1";

/// Result of a successful [`Kernel::execute_transaction`].
#[derive(Clone, Debug)]
pub struct Execution {
    pub snapshot: Arc<KernelState>,
    pub receipt: TransactionReceipt,
}

/// A transaction that could not be applied during replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFailure {
    pub index: usize,
    pub hash: String,
    pub error: String,
}

/// Result of [`Kernel::replay`].
#[derive(Clone, Debug)]
pub struct ReplayReport {
    pub state: KernelState,
    pub applied: usize,
    pub failures: Vec<ReplayFailure>,
}

/// Result of [`Kernel::verify_integrity`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub valid: bool,
    pub state_hash_match: bool,
    pub ledger_all_valid: bool,
    pub transaction_count: u64,
    pub expected_state_hash: String,
    pub replayed_state_hash: String,
    pub replay_failures: Vec<ReplayFailure>,
    pub ledger_audit: LedgerAudit,
}

/// Boot parameters needed to rebuild the genesis snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisRef {
    pub pulse: Pulse,
    pub state_hash: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedState {
    pub identity: IdentityRef,
    pub genesis: GenesisRef,
    pub ledger_export: LedgerExport,
    pub transaction_count: u64,
    pub pulse: Pulse,
    pub state_hash: String,
    pub fabric_export: FabricExport,
}

/// Serializable snapshot of a kernel, its log, and its event history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelExport {
    pub version: String,
    pub state: ExportedState,
    pub transactions: Vec<Transaction>,
    pub exported: Pulse,
}

/// Drives transaction execution over immutable snapshots.
///
/// The kernel holds the boot snapshot, the current snapshot, and the log of
/// every applied transaction. A new snapshot is installed only after a
/// transaction has passed every check.
pub struct Kernel {
    identity: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
    nonces: Arc<dyn NonceSource>,
    config: KernelConfig,
    rules: TransitionRules,
    genesis: Arc<KernelState>,
    state: Arc<KernelState>,
    log: Vec<Transaction>,
    sealed: bool,
}

impl Kernel {
    /// Build the genesis snapshot and announce it on the fabric.
    pub fn boot(
        identity: Arc<dyn Signer>,
        clock: Arc<dyn Clock>,
        nonces: Arc<dyn NonceSource>,
        fabric: EventFabric,
        config: KernelConfig,
    ) -> Result<Self, KernelError> {
        let pulse = clock.now();
        let genesis = Arc::new(KernelState::genesis(
            IdentityRef::of(identity.as_ref()),
            fabric.clone(),
            pulse,
        )?);
        let kernel = Self {
            rules: TransitionRules {
                replay_protection: config.replay_protection,
                handlers: BTreeMap::new(),
            },
            identity,
            clock,
            nonces,
            config,
            state: Arc::clone(&genesis),
            genesis,
            log: Vec::new(),
            sealed: false,
        };

        if kernel.config.start_fabric {
            fabric.start();
        }
        fabric.emit(
            Category::Kernel,
            "booted",
            json!({
                "did": kernel.did(),
                "version": KERNEL_VERSION,
                "pulse": pulse,
                "stateHash": kernel.state.state_hash(),
            }),
            EmitOptions::priority(Priority::High),
        )?;
        info!(
            did = %kernel.did().short_id(),
            state_hash = kernel.state.state_hash(),
            "kernel booted"
        );
        Ok(kernel)
    }

    /// Validate, record, and apply one transaction.
    pub fn execute_transaction(
        &mut self,
        tx_type: &str,
        payload: Value,
    ) -> Result<Execution, KernelError> {
        let result = self.try_execute(tx_type, payload);
        if let Err(error) = &result {
            warn!(tx_type, %error, "transaction rejected");
        }
        result
    }

    fn try_execute(&mut self, tx_type: &str, mut payload: Value) -> Result<Execution, KernelError> {
        if self.sealed {
            return Err(KernelError::KernelSealed);
        }
        validate_type(tx_type)?;
        validate_payload(tx_type, &payload, &self.rules)?;

        let fabric = self.state.fabric().clone();
        fabric.emit(
            Category::Kernel,
            "transaction.pre",
            json!({
                "type": tx_type,
                "stateHash": self.state.state_hash(),
                "transactionCount": self.state.transaction_count(),
            }),
            EmitOptions::priority(Priority::Critical),
        )?;

        let nonce = self.nonces.generate();
        if self.config.replay_protection && self.state.has_nonce(&nonce) {
            return Err(KernelError::ReplayAttack { nonce });
        }
        let pulse = self.clock.now();

        if tx_type == LEDGER_APPEND {
            let entry = LedgerEntry::create(
                self.identity.as_ref(),
                payload["action"].as_str().unwrap_or_default(),
                payload["data"].clone(),
                pulse,
            )?;
            let entry = serde_json::to_value(&entry)
                .map_err(|e| KernelError::Serialization(e.to_string()))?;
            if let Value::Object(map) = &mut payload {
                map.insert("entry".into(), entry);
            }
        }

        let mut tx = Transaction::new(tx_type, payload, nonce, pulse)?;
        if self.config.sign_transactions {
            tx = tx.sign(self.identity.as_ref())?;
        }
        let size = tx.canonical_size()?;
        if size > self.config.max_transaction_bytes {
            return Err(KernelError::TransactionTooLarge {
                size,
                max: self.config.max_transaction_bytes,
            });
        }

        let next = Arc::new(apply_transaction(&self.state, &tx, &self.rules)?);
        self.state = Arc::clone(&next);
        self.log.push(tx.clone());
        debug!(
            tx_type,
            hash = tx.hash(),
            count = next.transaction_count(),
            "transaction applied"
        );

        self.publish(
            Category::Kernel,
            "transaction.applied",
            json!({
                "type": tx_type,
                "hash": tx.hash(),
                "stateHash": next.state_hash(),
                "transactionCount": next.transaction_count(),
            }),
        );
        if let Some(event) = self.domain_event(&tx, &next) {
            self.publish(event.category, &event.event_type, event.payload);
        }

        Ok(Execution {
            receipt: TransactionReceipt {
                success: true,
                transaction: tx,
                state_hash: next.state_hash().to_string(),
                transaction_count: next.transaction_count(),
            },
            snapshot: next,
        })
    }

    /// Event describing what a just-applied transaction did.
    fn domain_event(&self, tx: &Transaction, state: &KernelState) -> Option<DomainEvent> {
        match tx.tx_type() {
            LEDGER_APPEND => {
                let entry = state.ledger().latest()?;
                Some(DomainEvent {
                    category: Category::Ledger,
                    event_type: "entry.appended".into(),
                    payload: json!({
                        "hash": entry.hash(),
                        "action": entry.action(),
                        "signer": entry.signer_did(),
                        "ledgerSize": state.ledger().len(),
                    }),
                })
            }
            ROUTER_REGISTER => Some(DomainEvent {
                category: Category::Federation,
                event_type: "route.registered".into(),
                payload: json!({
                    "did": tx.payload()["did"],
                    "endpoint": tx.payload()["endpoint"],
                }),
            }),
            other => self.rules.handlers.get(other)?.event(tx),
        }
    }

    /// Emit after a transaction has been installed. Failures are logged; the
    /// transaction stands.
    fn publish(&self, category: Category, event_type: &str, payload: Value) {
        if let Err(error) =
            self.state
                .fabric()
                .emit(category, event_type, payload, EmitOptions::default())
        {
            warn!(%category, event_type, %error, "failed to publish kernel event");
        }
    }

    /// Fold `log` over the boot snapshot.
    ///
    /// Transactions that fail to apply are skipped and reported, so the
    /// resulting hash diverges instead of the replay aborting.
    pub fn replay(&self, log: &[Transaction]) -> ReplayReport {
        let mut state = (*self.genesis).clone();
        let mut applied = 0;
        let mut failures = Vec::new();
        for (index, tx) in log.iter().enumerate() {
            match apply_transaction(&state, tx, &self.rules) {
                Ok(next) => {
                    state = next;
                    applied += 1;
                }
                Err(error) => {
                    warn!(index, hash = tx.hash(), %error, "replay skipped transaction");
                    failures.push(ReplayFailure {
                        index,
                        hash: tx.hash().to_string(),
                        error: error.to_string(),
                    });
                }
            }
        }
        ReplayReport {
            state,
            applied,
            failures,
        }
    }

    /// Replay the log and audit the ledger. Never fails; problems show up in
    /// the report.
    pub fn verify_integrity(&self) -> IntegrityReport {
        let replay = self.replay(&self.log);
        let ledger_audit = self.state.ledger().verify_all();
        let state_hash_match = replay.state.state_hash() == self.state.state_hash();
        let report = IntegrityReport {
            valid: state_hash_match && ledger_audit.all_valid && replay.failures.is_empty(),
            state_hash_match,
            ledger_all_valid: ledger_audit.all_valid,
            transaction_count: self.state.transaction_count(),
            expected_state_hash: self.state.state_hash().to_string(),
            replayed_state_hash: replay.state.state_hash().to_string(),
            replay_failures: replay.failures,
            ledger_audit,
        };
        if report.valid {
            debug!(count = report.transaction_count, "integrity verified");
        } else {
            warn!(
                expected = report.expected_state_hash,
                replayed = report.replayed_state_hash,
                "integrity check failed"
            );
        }
        report
    }

    /// Refuse every further transaction. Idempotent.
    pub fn seal(&mut self) {
        if self.sealed {
            return;
        }
        self.sealed = true;
        self.publish(
            Category::Kernel,
            "sealed",
            json!({
                "stateHash": self.state.state_hash(),
                "transactionCount": self.state.transaction_count(),
            }),
        );
        info!(state_hash = self.state.state_hash(), "kernel sealed");
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Register a custom transaction type.
    pub fn register_handler(
        &mut self,
        tx_type: &str,
        handler: Arc<dyn TransactionHandler>,
    ) -> Result<(), KernelError> {
        if self.sealed {
            return Err(KernelError::KernelSealed);
        }
        validate_type(tx_type)?;
        if tx_type == LEDGER_APPEND || tx_type == ROUTER_REGISTER {
            return Err(KernelError::InvalidType(format!("{tx_type} is built in")));
        }
        self.rules.handlers.insert(tx_type.to_string(), handler);
        debug!(tx_type, "transaction handler registered");
        Ok(())
    }

    pub fn state(&self) -> &Arc<KernelState> {
        &self.state
    }

    pub fn genesis(&self) -> &Arc<KernelState> {
        &self.genesis
    }

    pub fn transaction_log(&self) -> &[Transaction] {
        &self.log
    }

    pub fn fabric(&self) -> &EventFabric {
        self.state.fabric()
    }

    pub fn did(&self) -> Did {
        self.identity.did()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn export(&self) -> KernelExport {
        KernelExport {
            version: KERNEL_VERSION.to_string(),
            state: ExportedState {
                identity: self.state.identity().clone(),
                genesis: GenesisRef {
                    pulse: self.genesis.pulse(),
                    state_hash: self.genesis.state_hash().to_string(),
                },
                ledger_export: self.state.ledger().export(),
                transaction_count: self.state.transaction_count(),
                pulse: self.state.pulse(),
                state_hash: self.state.state_hash().to_string(),
                fabric_export: self.fabric().export(),
            },
            transactions: self.log.clone(),
            exported: self.clock.now(),
        }
    }

    /// Rebuild a kernel from an export by replaying its transactions.
    pub fn import(
        export: KernelExport,
        identity: Arc<dyn Signer>,
        clock: Arc<dyn Clock>,
        nonces: Arc<dyn NonceSource>,
        fabric: EventFabric,
        config: KernelConfig,
    ) -> Result<Self, KernelError> {
        Self::import_with_handlers(
            export,
            identity,
            clock,
            nonces,
            fabric,
            config,
            BTreeMap::new(),
        )
    }

    /// [`Kernel::import`] for exports that contain custom transaction types.
    #[allow(clippy::too_many_arguments)]
    pub fn import_with_handlers(
        export: KernelExport,
        identity: Arc<dyn Signer>,
        clock: Arc<dyn Clock>,
        nonces: Arc<dyn NonceSource>,
        fabric: EventFabric,
        config: KernelConfig,
        handlers: BTreeMap<String, Arc<dyn TransactionHandler>>,
    ) -> Result<Self, KernelError> {
        if export.version != KERNEL_VERSION {
            return Err(KernelError::VersionMismatch {
                expected: KERNEL_VERSION.to_string(),
                found: export.version,
            });
        }
        let exported = export.state;
        if identity.did() != exported.identity.did {
            return Err(KernelError::IdentityMismatch {
                expected: exported.identity.did,
                found: identity.did(),
            });
        }

        let genesis = Arc::new(KernelState::genesis(
            IdentityRef::of(identity.as_ref()),
            fabric.clone(),
            exported.genesis.pulse,
        )?);
        if genesis.state_hash() != exported.genesis.state_hash {
            return Err(KernelError::InvariantViolation(
                "rebuilt genesis does not match exported genesis".into(),
            ));
        }

        let rules = TransitionRules {
            replay_protection: config.replay_protection,
            handlers,
        };
        let mut state = (*genesis).clone();
        for tx in &export.transactions {
            state = apply_transaction(&state, tx, &rules)?;
        }
        if state.state_hash() != exported.state_hash {
            return Err(KernelError::InvariantViolation(format!(
                "replayed state hash {} does not match exported {}",
                state.state_hash(),
                exported.state_hash
            )));
        }
        if exported.transaction_count != state.transaction_count()
            || exported.pulse != state.pulse()
        {
            return Err(KernelError::InvariantViolation(format!(
                "exported count {} at pulse {} does not match replayed count {} at pulse {}",
                exported.transaction_count,
                exported.pulse,
                state.transaction_count(),
                state.pulse()
            )));
        }
        let ledger = Ledger::import(exported.ledger_export)?;
        if ledger.compute_hash() != state.ledger().compute_hash() {
            return Err(KernelError::InvariantViolation(
                "exported ledger does not match replayed ledger".into(),
            ));
        }

        fabric.import(exported.fabric_export)?;
        if config.start_fabric {
            fabric.start();
        }
        info!(
            transactions = export.transactions.len(),
            state_hash = state.state_hash(),
            "kernel imported"
        );
        Ok(Self {
            identity,
            clock,
            nonces,
            config,
            rules,
            genesis,
            state: Arc::new(state),
            log: export.transactions,
            sealed: false,
        })
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("did", &self.did())
            .field("transactions", &self.log.len())
            .field("state_hash", &self.state.state_hash())
            .field("sealed", &self.sealed)
            .finish()
    }
}
