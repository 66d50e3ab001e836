use jsonrpsee::core::{RpcResult, SubscriptionResult};
use jsonrpsee::proc_macros::rpc;

use crate::types::{RpcFilter, RpcInclusionProof, RpcRecord, RpcVersionInfo};

/// Ledger JSON-RPC 2.0 API definition (§4.7).
///
/// All method names are prefixed with "ledger_" via `namespace = "ledger"`.
#[rpc(server, client, namespace = "ledger")]
pub trait LedgerRpcApi {
    /// Submit a new page. `payload_hex` is hex-encoded canonical bytes.
    /// Blocks until the record is durable (quorum-signed and appended) and
    /// returns its id as hex.
    #[method(name = "append")]
    async fn append(&self, kind: String, payload_hex: String, author: String) -> RpcResult<String>;

    /// Fetch a single record by id (hex).
    #[method(name = "get")]
    async fn get(&self, id: String) -> RpcResult<Option<RpcRecord>>;

    /// Fetch records matching a filter.
    #[method(name = "query")]
    async fn query(&self, filter: RpcFilter) -> RpcResult<Vec<RpcRecord>>;

    /// The id of the most recent record authored by `author`, if any.
    #[method(name = "tipOf")]
    async fn tip_of(&self, author: String) -> RpcResult<Option<String>>;

    /// The rollup record covering `at`, at the given tier, if produced yet.
    #[method(name = "rollupAt")]
    async fn rollup_at(&self, tier: String, at: i64) -> RpcResult<Option<RpcRecord>>;

    /// Build an inclusion proof for a record.
    #[method(name = "prove")]
    async fn prove(&self, id: String) -> RpcResult<RpcInclusionProof>;

    /// Verify a previously built inclusion proof.
    #[method(name = "verify")]
    async fn verify(&self, proof: RpcInclusionProof) -> RpcResult<bool>;

    /// Node / protocol version information.
    #[method(name = "getVersion")]
    async fn get_version(&self) -> RpcResult<RpcVersionInfo>;

    /// Live-tail subscription: pushes every future durable record matching
    /// `filter`, at least once, in store-append order.
    #[subscription(name = "subscribe" => "subscription", item = RpcRecord)]
    async fn subscribe(&self, filter: RpcFilter) -> SubscriptionResult;
}
