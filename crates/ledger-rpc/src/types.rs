//! JSON-serializable DTOs for the external RPC surface (§4.7). Wire
//! values that are raw bytes elsewhere (ids, keys, signatures, payload)
//! are hex-encoded; everything else maps to the domain type directly.

use ledger_core::record::{Record, RecordKind, Tier};
use ledger_core::types::{PrincipalId, RecordId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcQuorumSig {
    pub validator_id: String,
    pub signature: String,
}

/// A durable record, JSON-flattened for RPC transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRecord {
    pub id: String,
    pub kind: String,
    pub author: String,
    pub tier: String,
    pub created_at: i64,
    pub prev: Option<String>,
    pub payload_hex: String,
    pub author_sig: String,
    pub quorum_sigs: Vec<RpcQuorumSig>,
    pub covers: Vec<String>,
}

impl From<&Record> for RpcRecord {
    fn from(r: &Record) -> Self {
        Self {
            id: r.id.to_hex(),
            kind: r.kind.as_str().to_string(),
            author: r.author.0.clone(),
            tier: tier_to_str(r.tier).to_string(),
            created_at: r.created_at,
            prev: r.prev.map(|p| p.to_hex()),
            payload_hex: hex::encode(&r.payload),
            author_sig: hex::encode(&r.author_sig.0),
            quorum_sigs: r
                .quorum_sigs
                .iter()
                .map(|q| RpcQuorumSig {
                    validator_id: q.validator_id.0.clone(),
                    signature: hex::encode(&q.signature.0),
                })
                .collect(),
            covers: r.covers.iter().map(|c| c.to_hex()).collect(),
        }
    }
}

pub fn tier_to_str(tier: Tier) -> &'static str {
    match tier {
        Tier::Page => "page",
        Tier::Chapter => "chapter",
        Tier::Book => "book",
        Tier::Part => "part",
        Tier::Series => "series",
        Tier::Genesis => "genesis",
    }
}

pub fn tier_from_str(s: &str) -> Option<Tier> {
    match s {
        "page" => Some(Tier::Page),
        "chapter" => Some(Tier::Chapter),
        "book" => Some(Tier::Book),
        "part" => Some(Tier::Part),
        "series" => Some(Tier::Series),
        "genesis" => Some(Tier::Genesis),
        _ => None,
    }
}

/// Mirrors `ledger_core::api::RecordFilter`, stringly-typed for JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcFilter {
    pub kind: Option<String>,
    pub author: Option<String>,
    pub tier: Option<String>,
    pub since: Option<i64>,
    pub until: Option<i64>,
}

impl RpcFilter {
    pub fn into_domain(self) -> Result<ledger_core::api::RecordFilter, String> {
        let kind = self
            .kind
            .map(|k| RecordKind::from_str(&k).map_err(|e| e.to_string()))
            .transpose()?;
        let tier = self
            .tier
            .map(|t| tier_from_str(&t).ok_or_else(|| format!("unknown tier: {t}")))
            .transpose()?;
        Ok(ledger_core::api::RecordFilter {
            kind,
            author: self.author.map(PrincipalId),
            tier,
            since: self.since,
            until: self.until,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcProofStep {
    pub tier: String,
    pub rollup_id: String,
    pub siblings: Vec<String>,
    pub index: usize,
    pub summary_root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcInclusionProof {
    pub record_id: String,
    pub steps: Vec<RpcProofStep>,
}

impl From<&ledger_core::api::InclusionProof> for RpcInclusionProof {
    fn from(p: &ledger_core::api::InclusionProof) -> Self {
        Self {
            record_id: p.record_id.to_hex(),
            steps: p
                .steps
                .iter()
                .map(|s| RpcProofStep {
                    tier: tier_to_str(s.tier).to_string(),
                    rollup_id: s.rollup_id.to_hex(),
                    siblings: s.siblings.iter().map(|id| id.to_hex()).collect(),
                    index: s.index,
                    summary_root: hex::encode(s.summary_root),
                })
                .collect(),
        }
    }
}

impl RpcInclusionProof {
    pub fn into_domain(self) -> Result<ledger_core::api::InclusionProof, String> {
        let record_id = RecordId::from_hex(&self.record_id).map_err(|e| e.to_string())?;
        let mut steps = Vec::with_capacity(self.steps.len());
        for s in self.steps {
            let tier = tier_from_str(&s.tier).ok_or_else(|| format!("unknown tier: {}", s.tier))?;
            let rollup_id = RecordId::from_hex(&s.rollup_id).map_err(|e| e.to_string())?;
            let siblings = s
                .siblings
                .iter()
                .map(|id| RecordId::from_hex(id).map_err(|e| e.to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            let summary_root_bytes = hex::decode(&s.summary_root).map_err(|e| e.to_string())?;
            let mut summary_root = [0u8; 32];
            if summary_root_bytes.len() != 32 {
                return Err("summary_root must be 32 bytes".to_string());
            }
            summary_root.copy_from_slice(&summary_root_bytes);
            steps.push(ledger_core::api::ProofStep {
                tier,
                rollup_id,
                siblings,
                index: s.index,
                summary_root,
            });
        }
        Ok(ledger_core::api::InclusionProof { record_id, steps })
    }
}

/// Node / protocol version information returned by `ledger_getVersion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcVersionInfo {
    pub node_version: String,
    pub protocol_version: String,
}

