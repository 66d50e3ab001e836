use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult, SubscriptionResult};
use jsonrpsee::server::{PendingSubscriptionSink, Server, ServerHandle, SubscriptionMessage};
use jsonrpsee::types::ErrorObject;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use ledger_core::api::{LedgerApi, RecordSink};
use ledger_core::record::{Record, RecordKind};
use ledger_core::types::{PrincipalId, RecordId, Timestamp};

use crate::api::LedgerRpcApiServer;
use crate::types::{tier_from_str, RpcFilter, RpcInclusionProof, RpcRecord, RpcVersionInfo};

fn bad_request(msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(-32602, msg.into(), None::<()>)
}

fn internal(msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(-32603, msg.into(), None::<()>)
}

/// Shared state passed to the RPC server: the in-process facade it
/// delegates every call to, plus version strings for `getVersion`.
pub struct RpcServerState {
    pub ledger: Arc<dyn LedgerApi + Send + Sync>,
    pub node_version: String,
    pub protocol_version: String,
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers. Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }
}

/// Bridges `LedgerApi::subscribe`'s push-style `RecordSink` callback to an
/// async channel a subscription task can `.await` on.
struct ChannelSink(tokio::sync::mpsc::UnboundedSender<Record>);

impl RecordSink for ChannelSink {
    fn deliver(&self, record: Record) {
        let _ = self.0.send(record);
    }
}

#[async_trait]
impl LedgerRpcApiServer for RpcServer {
    async fn append(&self, kind: String, payload_hex: String, author: String) -> RpcResult<String> {
        let kind = RecordKind::from_str(&kind).map_err(|e| bad_request(e.to_string()))?;
        let payload =
            hex::decode(&payload_hex).map_err(|e| bad_request(format!("invalid hex: {e}")))?;

        // `append` blocks the calling thread until quorum is reached (up to
        // T_prop); run it off the async runtime so a slow quorum round
        // doesn't stall every other in-flight RPC on this worker thread.
        let ledger = self.state.ledger.clone();
        let id = tokio::task::spawn_blocking(move || ledger.append(kind, payload, &PrincipalId(author)))
            .await
            .map_err(|e| internal(format!("append task panicked: {e}")))?
            .map_err(|e| internal(e.to_string()))?;

        Ok(id.to_hex())
    }

    async fn get(&self, id: String) -> RpcResult<Option<RpcRecord>> {
        let id = RecordId::from_hex(&id).map_err(|e| bad_request(format!("invalid id: {e}")))?;
        let record = self.state.ledger.get(&id).map_err(|e| internal(e.to_string()))?;
        Ok(record.as_ref().map(RpcRecord::from))
    }

    async fn query(&self, filter: RpcFilter) -> RpcResult<Vec<RpcRecord>> {
        let filter = filter.into_domain().map_err(bad_request)?;
        let records = self.state.ledger.query(filter).map_err(|e| internal(e.to_string()))?;
        Ok(records.iter().map(RpcRecord::from).collect())
    }

    async fn tip_of(&self, author: String) -> RpcResult<Option<String>> {
        let tip = self
            .state
            .ledger
            .tip_of(&PrincipalId(author))
            .map_err(|e| internal(e.to_string()))?;
        Ok(tip.map(|id| id.to_hex()))
    }

    async fn rollup_at(&self, tier: String, at: Timestamp) -> RpcResult<Option<RpcRecord>> {
        let tier = tier_from_str(&tier).ok_or_else(|| bad_request(format!("unknown tier: {tier}")))?;
        let record = self
            .state
            .ledger
            .rollup_at(tier, at)
            .map_err(|e| internal(e.to_string()))?;
        Ok(record.as_ref().map(RpcRecord::from))
    }

    async fn prove(&self, id: String) -> RpcResult<RpcInclusionProof> {
        let id = RecordId::from_hex(&id).map_err(|e| bad_request(format!("invalid id: {e}")))?;
        let proof = self.state.ledger.prove(&id).map_err(|e| internal(e.to_string()))?;
        Ok(RpcInclusionProof::from(&proof))
    }

    async fn verify(&self, proof: RpcInclusionProof) -> RpcResult<bool> {
        let proof = proof.into_domain().map_err(bad_request)?;
        self.state.ledger.verify(&proof).map_err(|e| internal(e.to_string()))
    }

    async fn get_version(&self) -> RpcResult<RpcVersionInfo> {
        Ok(RpcVersionInfo {
            node_version: self.state.node_version.clone(),
            protocol_version: self.state.protocol_version.clone(),
        })
    }

    async fn subscribe(
        &self,
        pending: PendingSubscriptionSink,
        filter: RpcFilter,
    ) -> SubscriptionResult {
        let filter = match filter.into_domain() {
            Ok(f) => f,
            Err(e) => {
                pending.reject(bad_request(e)).await;
                return Ok(());
            }
        };

        let sink = pending.accept().await?;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let record_sink = Arc::new(ChannelSink(tx));

        let subscription_id = match self.state.ledger.subscribe(filter, record_sink) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "subscribe rejected by ledger facade");
                return Ok(());
            }
        };

        while let Some(record) = rx.recv().await {
            let rpc_record = RpcRecord::from(&record);
            let msg = match SubscriptionMessage::from_json(&rpc_record) {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "failed to encode subscription message");
                    continue;
                }
            };
            if sink.send(msg).await.is_err() {
                break;
            }
        }

        let _ = self.state.ledger.unsubscribe(subscription_id);
        Ok(())
    }
}
