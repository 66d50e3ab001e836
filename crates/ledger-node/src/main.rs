//! ledger — the append-only audit ledger node binary.
//!
//! Startup sequence for `run`:
//!   1. Open the durable store, replay the log (or load `registry.snap`) to
//!      rebuild the validator/principal registries
//!   2. Load local principal/validator keys from `keys/`
//!   3. Start the replication network (libp2p)
//!   4. Start the JSON-RPC 2.0 server
//!   5. Drive the network event loop, the rollup scheduler, and the pull-sync
//!      ticker as background tasks until shutdown

mod config;
mod keystore;
mod node;
mod verify;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use config::{Cli, Command};
use ledger_core::constants::DEFAULT_T_PROP_SECS;
use ledger_core::record::RecordKind;
use ledger_core::types::{PrincipalId, RecordId, ValidatorId};
use ledger_crypto::KeyPair;
use ledger_rpc::{RpcServer, RpcServerState};

/// Carries a specific process exit code (§6 "Exit codes") through an
/// `anyhow::Error` chain so `main` can report it without every fallible
/// step needing its own bespoke error type.
#[derive(Debug)]
struct CliExit(u8);

impl std::fmt::Display for CliExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exit code {}", self.0)
    }
}
impl std::error::Error for CliExit {}

fn exit_with(code: u8, context: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(CliExit(code)).context(context.into())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ledger=debug".parse().unwrap()),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(64);
        }
    };

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            let code = e.downcast_ref::<CliExit>().map(|c| c.0).unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let dir = expand_tilde(&cli.dir);

    match cli.command {
        Command::Keygen { name } => cmd_keygen(&dir, &name),
        Command::GenesisBuild { params, out, quorum_mode } => cmd_genesis_build(&dir, &params, &out, quorum_mode),
        Command::Init { genesis } => cmd_init(&dir, &genesis),
        Command::Verify {} => cmd_verify(&dir),
        Command::Dump { from, to, kind } => cmd_dump(&dir, from, to, kind),
        Command::Proof { id } => cmd_proof(&dir, &id),
        Command::Run { bind, peers, p2p_bind, clock_skew_ms } => {
            cmd_run(dir, bind, peers, p2p_bind, clock_skew_ms).await
        }
    }
}

fn cmd_keygen(dir: &Path, name: &str) -> anyhow::Result<u8> {
    let keypair = KeyPair::generate();
    keystore::save_keypair(dir, name, &keypair)
        .map_err(|e| exit_with(2, format!("writing key for {name}: {e}")))?;
    info!(name, public_key = %keypair.public_key.to_hex(), "generated keypair");
    println!("{}", keypair.public_key.to_hex());
    Ok(0)
}

fn cmd_genesis_build(
    dir: &Path,
    params_path: &Path,
    out_path: &Path,
    quorum_mode_override: Option<String>,
) -> anyhow::Result<u8> {
    let text = std::fs::read_to_string(params_path)
        .with_context(|| format!("reading genesis params from {}", params_path.display()))
        .map_err(|e| exit_with(3, e.to_string()))?;
    let mut params: ledger_genesis::GenesisParams =
        serde_json::from_str(&text).context("parsing genesis params JSON").map_err(|e| exit_with(3, e.to_string()))?;
    if let Some(mode) = quorum_mode_override {
        params.quorum_mode = mode;
    }

    let mut keypairs: BTreeMap<ValidatorId, KeyPair> = BTreeMap::new();
    for v in &params.founding_validators {
        match keystore::load_keypair(dir, &v.validator_id.0) {
            Ok(kp) => {
                keypairs.insert(v.validator_id.clone(), kp);
            }
            Err(_) => warn!(validator = %v.validator_id, "no local key found for founding validator, skipping co-signature"),
        }
    }

    let now = ledger_consensus::now_ns();
    let record = ledger_genesis::build_genesis_record(&params, now, &keypairs)
        .context("building genesis record")
        .map_err(|e| exit_with(1, e.to_string()))?;

    keystore::save_genesis_record(out_path, &record)
        .map_err(|e| exit_with(2, format!("writing genesis record: {e}")))?;
    info!(out = %out_path.display(), id = %record.id, "built genesis record");
    Ok(0)
}

fn cmd_init(dir: &Path, genesis_path: &Path) -> anyhow::Result<u8> {
    let record = keystore::load_genesis_record(genesis_path)
        .map_err(|e| exit_with(2, format!("reading genesis record: {e}")))?;
    let payload = ledger_genesis::verify_genesis_record(&record)
        .context("genesis record failed self-validation")
        .map_err(|e| exit_with(1, e.to_string()))?;

    let mut store = ledger_store::RecordStore::open(dir).map_err(|e| exit_with(2, e.to_string()))?;
    if store.height().map_err(|e| exit_with(2, e.to_string()))? != 0 {
        return Err(exit_with(3, format!("{} is already initialised (non-empty log)", dir.display())));
    }
    store.append(&record).map_err(|e| exit_with(1, format!("appending genesis: {e}")))?;

    let mut registry = ledger_consensus::ValidatorRegistry::new();
    registry.apply_genesis(record.created_at, &payload);
    let snapshot = registry.snapshot(1);
    let snap_bytes = serde_json::to_vec(&snapshot).context("encoding registry snapshot")?;
    std::fs::write(dir.join("registry.snap"), snap_bytes).map_err(|e| exit_with(2, e.to_string()))?;

    info!(dir = %dir.display(), validators = payload.founding_validators.len(), "ledger initialised");
    Ok(0)
}

fn cmd_verify(dir: &Path) -> anyhow::Result<u8> {
    match verify::verify_chain(dir) {
        verify::VerifyOutcome::Ok(report) => {
            println!(
                "ok: {} records ({} pages, {} rollups)",
                report.records_checked, report.pages, report.rollups
            );
            Ok(0)
        }
        verify::VerifyOutcome::Invariant(e) => {
            eprintln!("invariant violation: {e:#}");
            Ok(1)
        }
        verify::VerifyOutcome::Io(e) => Err(exit_with(2, e.to_string())),
    }
}

fn cmd_dump(dir: &Path, from: i64, to: i64, kind: Option<String>) -> anyhow::Result<u8> {
    let store = ledger_store::RecordStore::open(dir).map_err(|e| exit_with(2, e.to_string()))?;
    let records = match kind {
        Some(k) => {
            let kind = RecordKind::from_str(&k).map_err(|e| exit_with(64, e.to_string()))?;
            store
                .scan_kind(kind, Some(from), Some(to))
                .map_err(|e| exit_with(1, e.to_string()))?
        }
        None => store
            .replay()
            .map_err(|e| exit_with(1, e.to_string()))?
            .into_iter()
            .filter(|r| r.created_at >= from && r.created_at < to)
            .collect(),
    };
    use std::io::Write;
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    for record in &records {
        let rpc_record = ledger_rpc::RpcRecord::from(record);
        serde_json::to_writer(&mut lock, &rpc_record).map_err(|e| exit_with(1, e.to_string()))?;
        writeln!(lock).ok();
    }
    Ok(0)
}

fn cmd_proof(dir: &Path, id_hex: &str) -> anyhow::Result<u8> {
    let id = RecordId::from_hex(id_hex).map_err(|e| exit_with(64, format!("invalid id: {e}")))?;
    let store = ledger_store::RecordStore::open(dir).map_err(|e| exit_with(2, e.to_string()))?;
    let proof = ledger_rollup::build_inclusion_proof(&store, &id).map_err(|e| exit_with(1, e.to_string()))?;
    let rpc_proof = ledger_rpc::RpcInclusionProof::from(&proof);
    println!("{}", serde_json::to_string_pretty(&rpc_proof).context("encoding proof")?);
    Ok(0)
}

async fn cmd_run(
    dir: PathBuf,
    bind: std::net::SocketAddr,
    peers_path: Option<PathBuf>,
    p2p_bind: String,
    clock_skew_ms: Option<i64>,
) -> anyhow::Result<u8> {
    if let Some(ms) = clock_skew_ms {
        info!(ms, "LEDGER_CLOCK_SKEW_MS set (informational — the enforced tolerance is a build-time constant)");
    }

    let store = ledger_store::RecordStore::open(&dir).map_err(|e| exit_with(2, e.to_string()))?;
    let height = store.height().map_err(|e| exit_with(2, e.to_string()))?;
    if height == 0 {
        return Err(exit_with(3, format!("{} has not been initialised; run `ledger init --genesis <path>` first", dir.display())));
    }

    let snap_path = dir.join("registry.snap");
    let mut registry = None;
    if let Ok(bytes) = std::fs::read(&snap_path) {
        if let Ok(snap) = serde_json::from_slice::<ledger_consensus::RegistrySnapshot>(&bytes) {
            if snap.replayed_height == height {
                registry = Some(ledger_consensus::ValidatorRegistry::from_snapshot(snap));
            }
        }
    }
    let (registry, principals) = match registry {
        Some(r) => {
            let mut principals = ledger_consensus::PrincipalRegistry::new();
            for record in store.replay().map_err(|e| exit_with(2, e.to_string()))? {
                principals.apply_record(&record);
            }
            (r, principals)
        }
        None => {
            info!("rebuilding registry and principal state from the log");
            let records = store.replay().map_err(|e| exit_with(2, e.to_string()))?;
            let mut registry = ledger_consensus::ValidatorRegistry::new();
            let mut principals = ledger_consensus::PrincipalRegistry::new();
            for record in &records {
                registry.apply_record(record);
                principals.apply_record(record);
            }
            if let Ok(bytes) = serde_json::to_vec(&registry.snapshot(height)) {
                let _ = std::fs::write(&snap_path, bytes);
            }
            (registry, principals)
        }
    };

    let principal_keys = keystore::load_all_principal_keys(&dir).map_err(|e| exit_with(2, e.to_string()))?;

    let validator_identity = registry
        .ranked_by_id()
        .into_iter()
        .find_map(|v| match keystore::load_keypair(&dir, &v.id.0) {
            Ok(kp) if kp.public_key == v.public_key => Some(node::ValidatorIdentity {
                validator_id: v.id.clone(),
                keypair: kp,
            }),
            _ => None,
        });
    if let Some(identity) = &validator_identity {
        info!(validator_id = %identity.validator_id, "running with validator identity");
    } else {
        info!("running as a non-validating observer node (no matching local validator key)");
    }

    let replication_config = ledger_replication::ReplicationConfig {
        listen_addr: p2p_bind,
        bootstrap_peers: match &peers_path {
            Some(p) => keystore::load_peers_list(p).map_err(|e| exit_with(2, e.to_string()))?,
            None => Vec::new(),
        },
        ..Default::default()
    };
    let (network, handle) = ledger_replication::ReplicationNetwork::new(&replication_config)
        .map_err(|e| exit_with(4, format!("starting replication network: {e}")))?;
    info!(peer_id = %handle.local_peer_id, "replication identity");

    let ledger = node::LedgerNode::new(
        store,
        registry,
        principals,
        principal_keys,
        validator_identity,
        Duration::from_secs(DEFAULT_T_PROP_SECS),
        &handle,
    );

    // Network event loop: drains inbound gossip/requests/responses and
    // dispatches them into the ledger.
    {
        let ledger = Arc::clone(&ledger);
        let mut inbound_rx = handle.inbound_rx;
        tokio::spawn(async move {
            while let Some(event) = inbound_rx.recv().await {
                match event {
                    ledger_replication::NetworkEvent::Gossip(peer, msg) => ledger.handle_gossip(peer, msg),
                    ledger_replication::NetworkEvent::Request { peer, request, channel } => {
                        ledger.handle_request(peer, request, channel).await
                    }
                    ledger_replication::NetworkEvent::Response { peer, response } => {
                        ledger.handle_response(peer, response)
                    }
                    ledger_replication::NetworkEvent::PeerDiscovered { peer, address } => {
                        ledger.learn_peer(peer, address.to_string());
                        ledger.say_hello(peer).await;
                    }
                }
            }
        });
    }
    tokio::spawn(network.run());

    // Pull-sync ticker (`T_sync`).
    {
        let ledger = Arc::clone(&ledger);
        let period = Duration::from_secs(replication_config.t_sync_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                ledger.sync_tick().await;
            }
        });
    }

    // Rollup scheduler: a no-op if this node holds no matching validator key.
    spawn_rollup_scheduler(Arc::clone(&ledger), &dir).map_err(|e| exit_with(2, e.to_string()))?;

    let rpc_state = Arc::new(RpcServerState {
        ledger: Arc::clone(&ledger) as Arc<dyn ledger_core::api::LedgerApi + Send + Sync>,
        node_version: env!("CARGO_PKG_VERSION").to_string(),
        protocol_version: replication_config.protocol_version.clone(),
    });
    let _rpc_handle = RpcServer::new(rpc_state)
        .start(bind)
        .await
        .map_err(|e| exit_with(4, format!("starting RPC server: {e}")))?;

    info!(%bind, "ledger node ready");
    std::future::pending::<()>().await;
    Ok(0)
}

/// Re-derive this node's own validator keypair (if any) and spin up the
/// rollup scheduler background task. Split out of `cmd_run` only because
/// the scheduler needs its own `RecordStore` handle for `sync_from_store`
/// rather than reaching through the shared `LedgerNode`'s lock on every
/// tick.
fn spawn_rollup_scheduler(ledger: Arc<node::LedgerNode>, dir: &Path) -> anyhow::Result<()> {
    let snapshot = ledger.registry_snapshot();
    let Some(identity) = snapshot
        .validators
        .iter()
        .find_map(|v| match keystore::load_keypair(dir, &v.id.0) {
            Ok(kp) if kp.public_key == v.public_key => Some((v.id.clone(), kp)),
            _ => None,
        })
    else {
        return Ok(());
    };
    let (validator_id, keypair) = identity;
    let author = PrincipalId(validator_id.0.clone());
    let dir = dir.to_path_buf();

    tokio::spawn(async move {
        let store = match ledger_store::RecordStore::open(&dir) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "rollup scheduler could not open its own store handle");
                return;
            }
        };
        let mut scheduler = ledger_rollup::RollupScheduler::new(validator_id, author, keypair);
        if let Err(e) = scheduler.sync_from_store(&store) {
            warn!(error = %e, "rollup scheduler failed to sync from store on startup");
        }

        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let now_secs = chrono::Utc::now().timestamp();
            let registry_snapshot = ledger.registry_snapshot();
            let registry = ledger_consensus::ValidatorRegistry::from_snapshot(registry_snapshot);
            match scheduler.tick(&store, &registry, now_secs) {
                Ok(due) if !due.is_empty() => ledger.propose_rollups(due),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "rollup scheduler tick failed"),
            }
        }
    });
    Ok(())
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
