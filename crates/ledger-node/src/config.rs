//! CLI argument + environment-variable resolution (§6 "Environment
//! variables"), mirroring the teacher's `Args` struct with `--data-dir`
//! pattern: clap derive carries the primary surface, `env = "..."` fields
//! let ops override without touching the invocation.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ledger",
    version,
    about = "Append-only audit ledger node — quorum-signed pages rolling up into chapter/book/part/series summaries"
)]
pub struct Cli {
    /// Node's root data directory (`ledger.log`, `ledger.idx/`, `keys/`, ...).
    #[arg(long, env = "LEDGER_DIR", default_value = ".", global = true)]
    pub dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bootstrap a fresh node from a genesis record.
    Init {
        /// Path to a genesis record, built by `genesis-build`.
        #[arg(long)]
        genesis: PathBuf,
    },

    /// Start the node: RPC server, replication network, submission
    /// pipeline, and rollup scheduler.
    Run {
        /// JSON-RPC listen address.
        #[arg(long, env = "LEDGER_BIND", default_value = "127.0.0.1:8645")]
        bind: SocketAddr,

        /// Path to a newline-delimited list of bootstrap peer multiaddrs.
        #[arg(long, env = "LEDGER_PEERS")]
        peers: Option<PathBuf>,

        /// libp2p listen multiaddr for the replication layer.
        #[arg(long, default_value = "/ip4/0.0.0.0/tcp/7777")]
        p2p_bind: String,

        /// Informational only: logged at startup so an operator can see
        /// what clock skew they're running with. The enforced bound
        /// (`CLOCK_SKEW_TOLERANCE_SECS` in ledger-core) is a protocol
        /// constant, not something a single node gets to relax.
        #[arg(long, env = "LEDGER_CLOCK_SKEW_MS")]
        clock_skew_ms: Option<i64>,
    },

    /// Full chain re-verification. Exits 0 on success, 1 on any invariant
    /// violation, 2 on I/O error.
    Verify {},

    /// Stream records matching a time range (and optional kind) as JSON
    /// lines on stdout.
    Dump {
        #[arg(long)]
        from: i64,
        #[arg(long)]
        to: i64,
        #[arg(long)]
        kind: Option<String>,
    },

    /// Emit an inclusion proof for a record, as JSON.
    Proof {
        /// Hex-encoded record id.
        id: String,
    },

    /// Operational tooling: generate a Dilithium2 keypair and write it to
    /// `<dir>/keys/<name>.priv` with 0600 permissions. Not part of the
    /// documented end-user CLI surface — a key ceremony needs some way to
    /// actually produce keys, and the pack carried no retrievable
    /// `keygen` source file to imitate, so this is folded into the main
    /// binary rather than shipped as its own.
    Keygen {
        /// Principal or validator id the key is for; also the file stem.
        #[arg(long)]
        name: String,
    },

    /// Operational tooling: assemble a genesis record from a
    /// `GenesisParams` JSON file plus the keys a ceremony produced under
    /// `<dir>/keys/`.
    GenesisBuild {
        /// Path to a `GenesisParams` JSON document.
        #[arg(long)]
        params: PathBuf,

        /// Where to write the resulting genesis record (canonical bytes).
        #[arg(long)]
        out: PathBuf,

        /// Quorum mode override (`majority` | `weighted`); falls back to
        /// `LEDGER_QUORUM_MODE`, then the value already in `params`.
        #[arg(long, env = "LEDGER_QUORUM_MODE")]
        quorum_mode: Option<String>,
    },
}
