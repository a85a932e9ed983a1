//! End-to-end scenarios: a kernel booted on a manual clock and scripted
//! nonces, driven through its public API only.

use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use serde_json::{json, Value};

use resub_crypto::{Ed25519Identity, Signer};
use resub_fabric::{EventFabric, FabricConfig, Priority, SubscribeOptions};
use resub_ledger::LedgerError;
use resub_kernel::{
    Kernel, KernelConfig, KernelError, KernelExport, Transaction, LEDGER_APPEND, ROUTER_REGISTER,
};
use resub_types::{ManualClock, NonceSource, ScriptedNonce, SequenceNonce};

const SEED: [u8; 32] = [42; 32];

fn identity() -> Arc<dyn Signer> {
    Arc::new(Ed25519Identity::from_seed(SEED))
}

fn fabric(clock: &ManualClock) -> EventFabric {
    EventFabric::new(
        Arc::new(clock.clone()),
        Arc::new(SequenceNonce::new("evt")),
        FabricConfig::default(),
    )
    .with_identity(identity())
}

fn boot_at(clock: &ManualClock, nonces: Arc<dyn NonceSource>) -> Kernel {
    Kernel::boot(
        identity(),
        Arc::new(clock.clone()),
        nonces,
        fabric(clock),
        KernelConfig::default(),
    )
    .expect("boot")
}

fn boot() -> (Kernel, ManualClock) {
    let clock = ManualClock::new(0);
    let kernel = boot_at(&clock, Arc::new(SequenceNonce::new("n")));
    (kernel, clock)
}

fn import(export: KernelExport) -> Result<Kernel, KernelError> {
    let clock = ManualClock::new(0);
    Kernel::import(
        export,
        identity(),
        Arc::new(clock.clone()),
        Arc::new(SequenceNonce::new("m")),
        fabric(&clock),
        KernelConfig::default(),
    )
}

#[test]
fn upload_scenario_delivers_entry_event_before_return() {
    let (mut kernel, _clock) = boot();
    let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
    let sink = Arc::clone(&seen);
    kernel
        .fabric()
        .subscribe(
            "ledger.entry.appended",
            move |event, delivery| {
                assert!(!delivery.is_replay);
                sink.lock().unwrap().push(event.payload().clone());
                Ok(())
            },
            SubscribeOptions::default(),
        )
        .unwrap();

    let execution = kernel
        .execute_transaction(
            LEDGER_APPEND,
            json!({"action": "upload", "data": {"id": 1}}),
        )
        .unwrap();

    assert_eq!(execution.receipt.transaction_count, 1);
    assert_eq!(execution.receipt.transaction.nonce(), "n0");
    assert_eq!(kernel.state().transaction_count(), 1);
    assert_eq!(kernel.state().ledger().len(), 1);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["ledgerSize"], json!(1));
    assert_eq!(seen[0]["action"], json!("upload"));
}

#[test]
fn replay_matches_live_state() {
    let (mut kernel, clock) = boot();
    for i in 0..5 {
        clock.advance(3);
        kernel
            .execute_transaction(LEDGER_APPEND, json!({"action": "rate", "data": {"i": i}}))
            .unwrap();
        kernel
            .execute_transaction(
                ROUTER_REGISTER,
                json!({"did": format!("did:resub:{i}"), "endpoint": "mem://peer"}),
            )
            .unwrap();
    }
    let report = kernel.replay(kernel.transaction_log());
    assert_eq!(report.applied, 10);
    assert!(report.failures.is_empty());
    assert_eq!(report.state.state_hash(), kernel.state().state_hash());
    assert_eq!(report.state.ledger().len(), 5);
    assert!(kernel.verify_integrity().valid);
}

fn tamper(tx: &Transaction, edit: impl FnOnce(&mut Value)) -> Transaction {
    let mut value = serde_json::to_value(tx).unwrap();
    edit(&mut value["payload"]["entry"]);
    serde_json::from_value(value).unwrap()
}

#[test]
fn tampering_any_entry_field_diverges_replay() {
    let (mut kernel, _clock) = boot();
    kernel
        .execute_transaction(LEDGER_APPEND, json!({"action": "upload", "data": {"id": 1}}))
        .unwrap();
    let live = kernel.state().state_hash().to_string();
    let original = kernel.transaction_log()[0].clone();

    let edits: Vec<Box<dyn FnOnce(&mut Value)>> = vec![
        Box::new(|e: &mut Value| e["action"] = json!("delete")),
        Box::new(|e: &mut Value| e["data"] = json!({"id": 2})),
        Box::new(|e: &mut Value| e["pulse"] = json!(99)),
        Box::new(|e: &mut Value| e["signature"] = json!("00".repeat(64))),
        Box::new(|e: &mut Value| e["publicKey"] = json!(hex_key(7))),
        Box::new(|e: &mut Value| e["hash"] = json!("ab".repeat(32))),
    ];
    for edit in edits {
        let report = kernel.replay(&[tamper(&original, edit)]);
        assert_eq!(report.failures.len(), 1);
        assert_ne!(report.state.state_hash(), live);
    }
}

fn hex_key(seed: u8) -> String {
    Ed25519Identity::from_seed([seed; 32]).public_key().to_hex()
}

#[test]
fn reused_nonce_is_rejected_without_side_effects() {
    let clock = ManualClock::new(0);
    let mut kernel = boot_at(&clock, Arc::new(ScriptedNonce::new(["a", "b", "b"])));
    for action in ["one", "two"] {
        kernel
            .execute_transaction(LEDGER_APPEND, json!({"action": action, "data": null}))
            .unwrap();
    }
    let hash = kernel.state().state_hash().to_string();

    let err = kernel
        .execute_transaction(LEDGER_APPEND, json!({"action": "three", "data": null}))
        .unwrap_err();
    assert!(matches!(err, KernelError::ReplayAttack { ref nonce } if nonce == "b"));
    assert_eq!(kernel.state().transaction_count(), 2);
    assert_eq!(kernel.state().state_hash(), hash);
    assert_eq!(kernel.transaction_log().len(), 2);
}

#[test]
fn replay_protection_can_be_disabled() {
    let clock = ManualClock::new(0);
    let mut kernel = Kernel::boot(
        identity(),
        Arc::new(clock.clone()),
        Arc::new(ScriptedNonce::new(["same"])),
        fabric(&clock),
        KernelConfig {
            replay_protection: false,
            ..Default::default()
        },
    )
    .unwrap();
    for _ in 0..2 {
        clock.advance(1);
        kernel
            .execute_transaction(ROUTER_REGISTER, json!({"did": "d", "endpoint": "e"}))
            .unwrap();
    }
    assert_eq!(kernel.state().transaction_count(), 2);
}

#[test]
fn pre_event_follows_schema_validation() {
    let (mut kernel, _clock) = boot();
    let pre = |kernel: &Kernel| {
        kernel
            .fabric()
            .events_matching("kernel.transaction.pre")
            .unwrap()
    };

    assert!(kernel
        .execute_transaction(ROUTER_REGISTER, json!({"did": "d"}))
        .is_err());
    assert!(kernel.execute_transaction("Not Valid", json!({})).is_err());
    assert!(pre(&kernel).is_empty());

    kernel
        .execute_transaction(ROUTER_REGISTER, json!({"did": "d", "endpoint": "e"}))
        .unwrap();
    let events = pre(&kernel);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].priority(), Priority::Critical);
    assert_eq!(events[0].payload()["type"], json!(ROUTER_REGISTER));
}

#[test]
fn sealed_kernel_refuses_work() {
    let (mut kernel, _clock) = boot();
    kernel
        .execute_transaction(LEDGER_APPEND, json!({"action": "a", "data": 1}))
        .unwrap();
    kernel.seal();
    let err = kernel
        .execute_transaction(LEDGER_APPEND, json!({"action": "b", "data": 2}))
        .unwrap_err();
    assert!(matches!(err, KernelError::KernelSealed));
    assert_eq!(kernel.state().transaction_count(), 1);
}

#[test]
fn size_limit_is_enforced() {
    let clock = ManualClock::new(0);
    let mut kernel = Kernel::boot(
        identity(),
        Arc::new(clock.clone()),
        Arc::new(SequenceNonce::default()),
        fabric(&clock),
        KernelConfig {
            max_transaction_bytes: 1024,
            ..Default::default()
        },
    )
    .unwrap();
    kernel
        .execute_transaction(LEDGER_APPEND, json!({"action": "small", "data": "x"}))
        .unwrap();
    let err = kernel
        .execute_transaction(
            LEDGER_APPEND,
            json!({"action": "big", "data": "x".repeat(2048)}),
        )
        .unwrap_err();
    assert!(matches!(err, KernelError::TransactionTooLarge { max: 1024, .. }));
    assert_eq!(kernel.state().ledger().len(), 1);
}

#[test]
fn export_survives_json_roundtrip_and_import() {
    let (mut kernel, clock) = boot();
    for action in ["a", "b"] {
        clock.advance(2);
        kernel
            .execute_transaction(LEDGER_APPEND, json!({"action": action, "data": {}}))
            .unwrap();
    }
    let text = serde_json::to_string_pretty(&kernel.export()).unwrap();
    let export: KernelExport = serde_json::from_str(&text).unwrap();
    let restored = import(export).unwrap();

    assert_eq!(restored.state().state_hash(), kernel.state().state_hash());
    assert_eq!(restored.genesis().state_hash(), kernel.genesis().state_hash());
    assert_eq!(restored.state().ledger().len(), 2);
    assert_eq!(
        restored.fabric().events().len(),
        kernel.fabric().events().len()
    );
    assert!(restored.verify_integrity().valid);
}

#[test]
fn tampered_exports_are_rejected() {
    let (mut kernel, _clock) = boot();
    kernel
        .execute_transaction(LEDGER_APPEND, json!({"action": "a", "data": {"n": 1}}))
        .unwrap();

    let mut export = kernel.export();
    export.state.state_hash = "00".repeat(32);
    assert!(matches!(
        import(export),
        Err(KernelError::InvariantViolation(_))
    ));

    let mut export = kernel.export();
    export.state.genesis.pulse += 1;
    assert!(matches!(
        import(export),
        Err(KernelError::InvariantViolation(_))
    ));

    let export = kernel.export();
    let mut value = serde_json::to_value(&export).unwrap();
    value["transactions"][0]["payload"]["data"] = json!({"n": 2});
    let export: KernelExport = serde_json::from_value(value).unwrap();
    assert!(matches!(
        import(export),
        Err(KernelError::InvariantViolation(_))
    ));

    let mut export = kernel.export();
    export.version = "resub-kernel/2".into();
    assert!(matches!(
        import(export),
        Err(KernelError::VersionMismatch { .. })
    ));

    let mut export = kernel.export();
    export.state.fabric_export.version = "resub-fabric/0".into();
    assert!(matches!(import(export), Err(KernelError::Fabric(_))));
}

#[test]
fn exported_snapshot_must_agree_with_replay() {
    let (mut kernel, clock) = boot();
    clock.advance(4);
    kernel
        .execute_transaction(LEDGER_APPEND, json!({"action": "a", "data": {"n": 1}}))
        .unwrap();
    assert!(import(kernel.export()).is_ok());

    let mut export = kernel.export();
    export.state.ledger_export.entries.clear();
    export.state.ledger_export.count = 999;
    export.state.transaction_count = 77;
    assert!(import(export).is_err());

    let mut export = kernel.export();
    export.state.ledger_export.entries.clear();
    export.state.ledger_export.count = 0;
    assert!(matches!(
        import(export),
        Err(KernelError::InvariantViolation(_))
    ));

    let mut export = kernel.export();
    export.state.transaction_count = 77;
    assert!(matches!(
        import(export),
        Err(KernelError::InvariantViolation(_))
    ));

    let mut export = kernel.export();
    export.state.pulse += 1;
    assert!(matches!(
        import(export),
        Err(KernelError::InvariantViolation(_))
    ));

    let mut export = kernel.export();
    export.state.ledger_export.count = 2;
    assert!(matches!(
        import(export),
        Err(KernelError::Ledger(LedgerError::CountMismatch { .. }))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn replay_is_deterministic(
        steps in prop::collection::vec((any::<bool>(), "[a-z]{1,8}", 0u64..5), 1..12)
    ) {
        let (mut kernel, clock) = boot();
        for (step, (is_append, word, gap)) in steps.iter().enumerate() {
            clock.advance(*gap);
            let (tx_type, payload) = if *is_append {
                (LEDGER_APPEND, json!({"action": word, "data": {"word": word, "step": step}}))
            } else {
                (ROUTER_REGISTER, json!({"did": word, "endpoint": format!("mem://{word}")}))
            };
            kernel.execute_transaction(tx_type, payload).unwrap();
        }

        let report = kernel.replay(kernel.transaction_log());
        prop_assert!(report.failures.is_empty());
        prop_assert_eq!(report.applied, steps.len());
        prop_assert_eq!(report.state.state_hash(), kernel.state().state_hash());
    }
}
