//! Shared process/RPC/fixture plumbing for the integration tests in this
//! crate. Not a test module itself — each test file pulls this in with
//! `mod common;`.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use ledger_core::record::{GenesisValidator, Record};
use ledger_core::types::{PrincipalId, ValidatorId};
use ledger_crypto::KeyPair;
use ledger_genesis::GenesisParams;

/// Find a free TCP port on loopback, for both the RPC bind and the libp2p
/// bind (libp2p takes a multiaddr but still needs a concrete port).
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn node_bin() -> &'static str {
    env!("CARGO_BIN_EXE_ledger")
}

/// Kills the child and removes its data directory on drop, regardless of
/// how the test exits.
pub struct NodeGuard {
    pub child: Child,
    pub dir: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// A fresh scratch directory under the OS temp dir, unique to this test
/// process and an in-process counter (several tests in the same binary
/// each need their own).
pub fn scratch_dir(label: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("ledger_it_{}_{}_{}", std::process::id(), label, n));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write `kp` to `<dir>/keys/<name>.priv`, the same on-disk shape the
/// node's own keystore module writes (plain JSON, no secret-sharing).
pub fn install_key(dir: &Path, name: &str, kp: &KeyPair) {
    let keys_dir = dir.join("keys");
    std::fs::create_dir_all(&keys_dir).unwrap();
    std::fs::write(
        keys_dir.join(format!("{name}.priv")),
        serde_json::to_vec_pretty(kp).unwrap(),
    )
    .unwrap();
}

/// A genesis ceremony's output: the record itself plus every founding
/// validator's keypair, so a caller can install whichever keys a given
/// node should hold.
pub struct Ceremony {
    pub record: Record,
    pub keypairs: BTreeMap<ValidatorId, KeyPair>,
}

/// Build a genesis record naming `validators` (id, weight pairs — each
/// gets a freshly generated keypair) under majority quorum, with
/// `principals` pre-named in the founding document.
pub fn build_genesis(validators: &[(&str, u64)], principals: &[&str]) -> Ceremony {
    let mut keypairs = BTreeMap::new();
    let mut founding = Vec::new();
    for (id, weight) in validators {
        let kp = KeyPair::generate();
        founding.push(GenesisValidator {
            validator_id: ValidatorId((*id).to_string()),
            public_key: kp.public_key.clone(),
            weight: *weight,
        });
        keypairs.insert(ValidatorId((*id).to_string()), kp);
    }
    let params = GenesisParams {
        founding_validators: founding,
        quorum_mode: "majority".into(),
        genesis_principals: principals.iter().map(|p| PrincipalId((*p).to_string())).collect(),
    };
    let record = ledger_genesis::build_genesis_record(&params, ledger_consensus::now_ns(), &keypairs)
        .expect("building genesis record for a test fixture");
    Ceremony { record, keypairs }
}

pub fn write_genesis_file(dir: &Path, record: &Record) -> PathBuf {
    let path = dir.join("genesis.rec");
    std::fs::write(&path, record.encode()).unwrap();
    path
}

/// Run `ledger --dir <dir> init --genesis <path>` to completion, panicking
/// if it doesn't exit 0.
pub fn run_init(dir: &Path, genesis_path: &Path) {
    let status = Command::new(node_bin())
        .args(["--dir", dir.to_str().unwrap(), "init", "--genesis", genesis_path.to_str().unwrap()])
        .status()
        .expect("failed to spawn `ledger init`");
    assert!(status.success(), "ledger init exited with {status}");
}

/// Run `ledger --dir <dir> verify`, returning its exit code.
pub fn run_verify(dir: &Path) -> i32 {
    let status = Command::new(node_bin())
        .args(["--dir", dir.to_str().unwrap(), "verify"])
        .status()
        .expect("failed to spawn `ledger verify`");
    status.code().unwrap_or(-1)
}

/// Spawn `ledger run` against `dir`, with stdout piped to a background
/// thread that feeds matching lines to `on_line` as they arrive — used to
/// scrape the replication identity's peer id out of the startup log, since
/// no RPC method exposes it.
pub fn spawn_run(
    dir: &Path,
    rpc_bind: &str,
    p2p_bind: &str,
    peers_file: Option<&Path>,
    on_line: impl Fn(&str) + Send + 'static,
) -> Child {
    let mut cmd = Command::new(node_bin());
    cmd.args([
        "--dir", dir.to_str().unwrap(),
        "run",
        "--bind", rpc_bind,
        "--p2p-bind", p2p_bind,
    ]);
    if let Some(p) = peers_file {
        cmd.args(["--peers", p.to_str().unwrap()]);
    }
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn `ledger run`");
    let stdout = child.stdout.take().expect("piped stdout");
    std::thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines().map_while(Result::ok) {
            on_line(&line);
        }
    });
    child
}

/// Extract the `peer_id=<id>` token logged once at replication startup.
pub fn parse_peer_id(line: &str) -> Option<String> {
    let idx = line.find("peer_id=")?;
    let rest = &line[idx + "peer_id=".len()..];
    rest.split_whitespace().next().map(str::to_string)
}

// ── RPC client ───────────────────────────────────────────────────────────

/// Call `ledger_<method>` over HTTP JSON-RPC 2.0, panicking on a transport
/// or RPC-level error and returning the decoded `result` field.
pub async fn rpc_call(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": format!("ledger_{method}"),
        "params": params,
        "id": 1,
    });
    let resp = client
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap_or_else(|e| panic!("RPC call {method} failed: {e}"));
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    if let Some(err) = json.get("error") {
        panic!("RPC error from {method}: {err}");
    }
    json["result"].clone()
}

/// Same as `rpc_call` but returns `None` instead of panicking on an
/// RPC-level error, for callers that expect failures (e.g. equivocation).
pub async fn rpc_call_fallible(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value, serde_json::Value> {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": format!("ledger_{method}"),
        "params": params,
        "id": 1,
    });
    let resp = client.post(url).json(&body).send().await.expect("RPC transport failure");
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    match json.get("error") {
        Some(err) => Err(err.clone()),
        None => Ok(json["result"].clone()),
    }
}

pub async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if rpc_call_fallible(client, url, "getVersion", serde_json::json!([])).await.is_ok() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    false
}

pub async fn append_page(
    client: &reqwest::Client,
    url: &str,
    kind: &str,
    payload: &[u8],
    author: &str,
) -> serde_json::Value {
    rpc_call(client, url, "append", serde_json::json!([kind, hex::encode(payload), author])).await
}

pub async fn get_record(client: &reqwest::Client, url: &str, id_hex: &str) -> serde_json::Value {
    rpc_call(client, url, "get", serde_json::json!([id_hex])).await
}
