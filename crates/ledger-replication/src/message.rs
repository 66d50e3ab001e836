//! Wire messages for the two channels replication uses over the shared
//! libp2p swarm: GossipSub broadcast of proposals, and request/response
//! RPCs for the pull-sync and health operations (§4.6).

use ledger_core::record::Record;
use ledger_core::types::{RecordId, Signature, ValidatorId};
use serde::{Deserialize, Serialize};

/// Broadcast over GossipSub on the proposal topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    /// A peer is broadcasting a freshly author-signed, possibly
    /// not-yet-quorum-complete proposal.
    SubmitProposal { record: Record },
    /// An active validator is gossiping its co-signature back after
    /// verifying a proposal (§4.4: "Peers that are active validators
    /// verify, sign, and gossip their signature back").
    CoSign {
        record_id: RecordId,
        validator_id: ValidatorId,
        signature: Signature,
    },
    /// A peer is broadcasting a record that has already reached quorum —
    /// the fast path for propagating a just-finalized record to peers who
    /// don't need to re-gather signatures.
    Finalized { record: Record },
}

impl GossipMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("GossipMessage serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// One request over the request/response behaviour. `Hello` must be the
/// first message a connection sends; the responder checks its signature
/// against the registry before serving `SubmitProposal`, or any RPC
/// beyond the three read-only ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplicationRequest {
    /// Mutual authentication (§4.6 "Security"): `signature` is the
    /// claimed validator's key over its own libp2p `PeerId` bytes,
    /// layered above noise's transport-level peer authentication.
    Hello {
        validator_id: ValidatorId,
        signature: Signature,
    },
    Head,
    GetRange { from_height: u64, limit: u32 },
    GetById { ids: Vec<RecordId> },
    Health,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadInfo {
    pub height: u64,
    pub latest_id: Option<RecordId>,
    pub active_validator_digest: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    pub version: u32,
    pub height: u64,
    pub uptime_secs: u64,
    pub registry_epoch: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplicationResponse {
    HelloAck,
    Head(HeadInfo),
    Records(Vec<Record>),
    Health(HealthInfo),
    /// The request was well-formed but refused: failed `Hello` auth, or a
    /// write-class RPC from an unauthenticated peer.
    Rejected { reason: String },
}
