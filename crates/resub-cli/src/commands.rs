use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use resub_crypto::{Ed25519Identity, Signer};
use resub_fabric::EventFabric;
use resub_kernel::{IntegrityReport, Kernel, KernelConfig, KernelExport, TransactionReceipt};
use resub_types::{Did, SequenceNonce, TickingClock};

use crate::cli::*;

/// Identity used when no `--seed` is given.
const DEFAULT_SEED: [u8; 32] = [0; 32];

#[derive(Debug, Deserialize)]
struct Step {
    #[serde(rename = "type")]
    tx_type: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Rejection {
    step: usize,
    #[serde(rename = "type")]
    tx_type: String,
    error: String,
}

struct RunOutcome {
    kernel: Kernel,
    receipts: Vec<TransactionReceipt>,
    rejections: Vec<Rejection>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    version: String,
    did: Did,
    transaction_count: u64,
    state_hash: String,
    transactions: BTreeMap<String, usize>,
    ledger_actions: BTreeMap<String, usize>,
    event_categories: BTreeMap<String, usize>,
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args, cli.format),
        Command::Verify(args) => cmd_verify(args, cli.format),
        Command::Inspect(args) => cmd_inspect(args, cli.format),
    }
}

fn cmd_run(args: RunArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let identity = identity_from(args.seed.as_deref())?;
    let steps: Vec<Step> = read_json(&args.script)?;
    let outcome = run_script(identity, config, steps)?;

    if let Some(path) = &args.export {
        write_export(path, &outcome.kernel.export())?;
    }

    let state = outcome.kernel.state();
    match format {
        OutputFormat::Json => print_json(&json!({
            "did": outcome.kernel.did(),
            "receipts": outcome.receipts,
            "rejected": outcome.rejections,
            "stateHash": state.state_hash(),
            "transactionCount": state.transaction_count(),
        }))?,
        OutputFormat::Text => {
            println!("Kernel {}", outcome.kernel.did().to_string().cyan());
            for receipt in &outcome.receipts {
                println!(
                    "  {} #{} {} {}",
                    "✓".green().bold(),
                    receipt.transaction_count,
                    receipt.transaction.tx_type().yellow(),
                    short(receipt.transaction.hash()).dimmed()
                );
            }
            for rejection in &outcome.rejections {
                println!(
                    "  {} step {} {}: {}",
                    "✗".red().bold(),
                    rejection.step,
                    rejection.tx_type.yellow(),
                    rejection.error
                );
            }
            println!(
                "State: {} transactions, {} ledger entries, {} events",
                state.transaction_count().to_string().bold(),
                state.ledger().len(),
                outcome.kernel.fabric().events().len()
            );
            println!("State hash: {}", state.state_hash().cyan());
            if let Some(path) = &args.export {
                println!("Export written to {}", path.display().to_string().bold());
            }
        }
    }

    if !outcome.rejections.is_empty() {
        bail!(
            "{} of {} steps rejected",
            outcome.rejections.len(),
            outcome.rejections.len() + outcome.receipts.len()
        );
    }
    Ok(())
}

fn cmd_verify(args: VerifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let identity = identity_from(args.seed.as_deref())?;
    let export: KernelExport = read_json(&args.export)?;
    let report = verify_export(export, identity, config)?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            let mark = |ok: bool| if ok { "valid".green() } else { "INVALID".red() };
            if report.valid {
                println!("{} Integrity verified", "✓".green().bold());
            } else {
                println!("{} Integrity check failed", "✗".red().bold());
            }
            println!("  Transactions: {}", report.transaction_count);
            println!("  State hash: {}", mark(report.state_hash_match));
            println!("  Ledger signatures: {}", mark(report.ledger_all_valid));
            println!("  Expected: {}", report.expected_state_hash.dimmed());
            println!("  Replayed: {}", report.replayed_state_hash.dimmed());
            for failure in &report.replay_failures {
                println!(
                    "  {} #{} {}: {}",
                    "✗".red(),
                    failure.index,
                    short(&failure.hash),
                    failure.error
                );
            }
        }
    }

    if !report.valid {
        bail!("integrity check failed");
    }
    Ok(())
}

fn cmd_inspect(args: InspectArgs, format: OutputFormat) -> anyhow::Result<()> {
    let export: KernelExport = read_json(&args.export)?;
    let summary = summarize(&export);

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => {
            println!("Export {} ({})", summary.version.bold(), summary.did.to_string().cyan());
            println!(
                "  {} transactions, state hash {}",
                summary.transaction_count,
                short(&summary.state_hash).dimmed()
            );
            print_counts("Transactions", &summary.transactions);
            print_counts("Ledger actions", &summary.ledger_actions);
            print_counts("Event categories", &summary.event_categories);
        }
    }
    Ok(())
}

fn run_script(
    identity: Arc<dyn Signer>,
    config: KernelConfig,
    steps: Vec<Step>,
) -> anyhow::Result<RunOutcome> {
    let mut kernel = boot(identity, config)?;
    let mut receipts = Vec::new();
    let mut rejections = Vec::new();
    for (step, Step { tx_type, payload }) in steps.into_iter().enumerate() {
        match kernel.execute_transaction(&tx_type, payload) {
            Ok(execution) => receipts.push(execution.receipt),
            Err(error) => rejections.push(Rejection {
                step,
                tx_type,
                error: error.to_string(),
            }),
        }
    }
    Ok(RunOutcome {
        kernel,
        receipts,
        rejections,
    })
}

fn verify_export(
    export: KernelExport,
    identity: Arc<dyn Signer>,
    config: KernelConfig,
) -> anyhow::Result<IntegrityReport> {
    let clock = Arc::new(TickingClock::new(export.exported));
    let fabric = EventFabric::new(
        clock.clone(),
        Arc::new(SequenceNonce::new("evt")),
        config.fabric.clone(),
    )
    .with_identity(Arc::clone(&identity));
    let kernel = Kernel::import(
        export,
        identity,
        clock,
        Arc::new(SequenceNonce::new("tx")),
        fabric,
        config,
    )
    .context("export failed to import")?;
    Ok(kernel.verify_integrity())
}

fn boot(identity: Arc<dyn Signer>, config: KernelConfig) -> anyhow::Result<Kernel> {
    let clock = Arc::new(TickingClock::new(0));
    let fabric = EventFabric::new(
        clock.clone(),
        Arc::new(SequenceNonce::new("evt")),
        config.fabric.clone(),
    )
    .with_identity(Arc::clone(&identity));
    Ok(Kernel::boot(
        identity,
        clock,
        Arc::new(SequenceNonce::new("tx")),
        fabric,
        config,
    )?)
}

fn summarize(export: &KernelExport) -> Summary {
    let mut transactions = BTreeMap::new();
    for tx in &export.transactions {
        *transactions.entry(tx.tx_type().to_string()).or_insert(0) += 1;
    }
    let mut ledger_actions = BTreeMap::new();
    for entry in &export.state.ledger_export.entries {
        *ledger_actions.entry(entry.action().to_string()).or_insert(0) += 1;
    }
    let mut event_categories = BTreeMap::new();
    for event in &export.state.fabric_export.events {
        *event_categories
            .entry(event.category().to_string())
            .or_insert(0) += 1;
    }
    Summary {
        version: export.version.clone(),
        did: export.state.identity.did.clone(),
        transaction_count: export.state.transaction_count,
        state_hash: export.state.state_hash.clone(),
        transactions,
        ledger_actions,
        event_categories,
    }
}

fn identity_from(seed: Option<&str>) -> anyhow::Result<Arc<dyn Signer>> {
    let seed = match seed {
        None => DEFAULT_SEED,
        Some(hex_seed) => {
            let bytes = hex::decode(hex_seed).context("seed is not valid hex")?;
            match <[u8; 32]>::try_from(bytes.as_slice()) {
                Ok(seed) => seed,
                Err(_) => bail!("seed must be 32 bytes, got {}", bytes.len()),
            }
        }
    };
    Ok(Arc::new(Ed25519Identity::from_seed(seed)))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<KernelConfig> {
    match path {
        Some(path) => Ok(KernelConfig::load(path)?),
        None => Ok(KernelConfig::default()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn write_export(path: &Path, export: &KernelExport) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(export)?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_counts(label: &str, counts: &BTreeMap<String, usize>) {
    println!("{label}:");
    if counts.is_empty() {
        println!("  (none)");
    }
    for (name, count) in counts {
        println!("  {:>5}  {}", count, name.yellow());
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
