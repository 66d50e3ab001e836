//! ledger-rpc
//!
//! External JSON-RPC 2.0 facade for ledger nodes (§4.7, C7).
//!
//! Namespace: "ledger"
//! Methods:
//!   ledger_append      — submit a new page, blocks until durable
//!   ledger_get         — fetch a record by id
//!   ledger_query       — fetch records matching a filter
//!   ledger_tipOf       — most recent record id by an author
//!   ledger_rollupAt    — the rollup record covering a timestamp at a tier
//!   ledger_prove       — build an inclusion proof
//!   ledger_verify      — verify an inclusion proof
//!   ledger_getVersion  — node/protocol version info
//!   ledger_subscribe   — live-tail subscription over a filter

pub mod api;
pub mod server;
pub mod types;

pub use api::{LedgerRpcApiClient, LedgerRpcApiServer};
pub use server::{RpcServer, RpcServerState};
pub use types::{RpcFilter, RpcInclusionProof, RpcProofStep, RpcQuorumSig, RpcRecord, RpcVersionInfo};
