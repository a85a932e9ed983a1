use std::sync::Arc;

use serde::{Deserialize, Serialize};

use resub_crypto::{canonical, CanonicalError, PublicKey, Signer};
use resub_fabric::EventFabric;
use resub_ledger::Ledger;
use resub_types::{Did, Pulse};

use crate::router::RouteTable;
use crate::transaction::Transaction;

/// Version tag folded into every state hash.
pub const STATE_VERSION: &str = "resub-kernel/1";

/// Public half of the kernel identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    pub did: Did,
    pub public_key: PublicKey,
}

impl IdentityRef {
    pub fn of(signer: &dyn Signer) -> Self {
        Self {
            did: signer.did(),
            public_key: signer.public_key(),
        }
    }
}

/// Immutable kernel snapshot.
///
/// The ledger and routes are shared behind `Arc`s and the nonce set is a
/// persistent set, so deriving the next snapshot never copies history.
#[derive(Clone, Debug)]
pub struct KernelState {
    version: &'static str,
    identity: IdentityRef,
    ledger: Arc<Ledger>,
    router: Arc<RouteTable>,
    fabric: EventFabric,
    transaction_count: u64,
    pulse: Pulse,
    nonces: im::OrdSet<String>,
    state_hash: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StateDigest<'a> {
    version: &'a str,
    did: &'a Did,
    ledger_hash: &'a str,
    transaction_count: u64,
    pulse: Pulse,
    nonce_count: usize,
}

impl KernelState {
    /// Boot snapshot: no transactions, empty ledger and routes.
    pub fn genesis(
        identity: IdentityRef,
        fabric: EventFabric,
        pulse: Pulse,
    ) -> Result<Self, CanonicalError> {
        let mut state = Self {
            version: STATE_VERSION,
            identity,
            ledger: Arc::new(Ledger::new()),
            router: Arc::new(RouteTable::new()),
            fabric,
            transaction_count: 0,
            pulse,
            nonces: im::OrdSet::new(),
            state_hash: String::new(),
        };
        state.state_hash = state.compute_hash()?;
        Ok(state)
    }

    /// Snapshot after `tx`, with the given ledger and routes.
    pub(crate) fn advance(
        &self,
        ledger: Arc<Ledger>,
        router: Arc<RouteTable>,
        tx: &Transaction,
    ) -> Result<Self, CanonicalError> {
        let mut nonces = self.nonces.clone();
        nonces.insert(tx.nonce().to_string());
        let mut next = Self {
            version: self.version,
            identity: self.identity.clone(),
            ledger,
            router,
            fabric: self.fabric.clone(),
            transaction_count: self.transaction_count + 1,
            pulse: tx.pulse(),
            nonces,
            state_hash: String::new(),
        };
        next.state_hash = next.compute_hash()?;
        Ok(next)
    }

    /// Hash over version, DID, ledger hash, transaction count, pulse, and
    /// nonce count. Nothing else feeds it.
    pub fn compute_hash(&self) -> Result<String, CanonicalError> {
        canonical::hash(&StateDigest {
            version: self.version,
            did: &self.identity.did,
            ledger_hash: &self.ledger.compute_hash(),
            transaction_count: self.transaction_count,
            pulse: self.pulse,
            nonce_count: self.nonces.len(),
        })
    }

    pub fn version(&self) -> &str {
        self.version
    }

    pub fn identity(&self) -> &IdentityRef {
        &self.identity
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn router(&self) -> &Arc<RouteTable> {
        &self.router
    }

    pub fn fabric(&self) -> &EventFabric {
        &self.fabric
    }

    pub fn transaction_count(&self) -> u64 {
        self.transaction_count
    }

    pub fn pulse(&self) -> Pulse {
        self.pulse
    }

    pub fn has_nonce(&self, nonce: &str) -> bool {
        self.nonces.contains(nonce)
    }

    pub fn nonce_count(&self) -> usize {
        self.nonces.len()
    }

    pub fn state_hash(&self) -> &str {
        &self.state_hash
    }
}

#[cfg(test)]
mod tests {
    use resub_crypto::Ed25519Identity;
    use resub_fabric::FabricConfig;
    use resub_types::{ManualClock, SequenceNonce};
    use serde_json::json;

    use super::*;

    fn genesis(seed: u8, pulse: Pulse) -> KernelState {
        let fabric = EventFabric::new(
            Arc::new(ManualClock::new(0)),
            Arc::new(SequenceNonce::default()),
            FabricConfig::default(),
        );
        let identity = Ed25519Identity::from_seed([seed; 32]);
        KernelState::genesis(IdentityRef::of(&identity), fabric, pulse).unwrap()
    }

    #[test]
    fn genesis_hash_is_reproducible() {
        assert_eq!(genesis(1, 5).state_hash(), genesis(1, 5).state_hash());
        assert_ne!(genesis(1, 5).state_hash(), genesis(1, 6).state_hash());
        assert_ne!(genesis(1, 5).state_hash(), genesis(2, 5).state_hash());
    }

    #[test]
    fn advance_records_nonce_and_leaves_parent() {
        let parent = genesis(1, 0);
        let tx = Transaction::new("router.register", json!({}), "n0", 3).unwrap();
        let child = parent
            .advance(parent.ledger().clone(), parent.router().clone(), &tx)
            .unwrap();

        assert_eq!(child.transaction_count(), 1);
        assert_eq!(child.pulse(), 3);
        assert!(child.has_nonce("n0"));
        assert!(!parent.has_nonce("n0"));
        assert_eq!(parent.transaction_count(), 0);
        assert_ne!(child.state_hash(), parent.state_hash());
        assert_eq!(child.compute_hash().unwrap(), child.state_hash());
    }

    #[test]
    fn long_chains_share_nonce_history() {
        let mut state = genesis(1, 0);
        let mut snapshots = Vec::new();
        for i in 0..500 {
            let tx = Transaction::new("router.register", json!({}), format!("n{i}"), i).unwrap();
            let next = state
                .advance(state.ledger().clone(), state.router().clone(), &tx)
                .unwrap();
            snapshots.push(state);
            state = next;
        }
        assert_eq!(state.nonce_count(), 500);
        assert!(state.has_nonce("n499"));
        assert_eq!(snapshots[10].nonce_count(), 10);
        assert!(!snapshots[10].has_nonce("n10"));
        assert!(snapshots[10].has_nonce("n9"));
    }

    #[test]
    fn route_changes_do_not_affect_hash() {
        let parent = genesis(1, 0);
        let tx = Transaction::new("router.register", json!({}), "n0", 3).unwrap();
        let plain = parent
            .advance(parent.ledger().clone(), parent.router().clone(), &tx)
            .unwrap();
        let routed = parent
            .advance(
                parent.ledger().clone(),
                Arc::new(parent.router().with_route("did:x", "e", 3)),
                &tx,
            )
            .unwrap();
        assert_eq!(plain.state_hash(), routed.state_hash());
    }
}
