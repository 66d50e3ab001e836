//! In-process facade trait (C7) for callers living in the same process as a
//! node — other governance subsystems embedding the ledger directly, as
//! opposed to external callers which go through `ledger-rpc`.

use crate::error::LedgerResult;
use crate::record::{Record, RecordKind, Tier};
use crate::types::{PrincipalId, RecordId, Timestamp};

/// A filter over `query`. All fields are optional; `None` means unconstrained.
#[derive(Clone, Debug, Default)]
pub struct RecordFilter {
    pub kind: Option<RecordKind>,
    pub author: Option<PrincipalId>,
    pub tier: Option<Tier>,
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
}

/// One link in an inclusion proof chain: `rollup_id` is the rollup record
/// (at `tier`) that covers the previous step's id, `siblings` is its full
/// `covers` list in canonical order, `index` locates the previous step's id
/// within that list, and `summary_root` is the value the rollup record
/// itself declares — recomputing `H(H(child_1) || … )` over `siblings` and
/// comparing against `summary_root` is what makes the step tamper-evident.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofStep {
    pub tier: Tier,
    pub rollup_id: RecordId,
    pub siblings: Vec<RecordId>,
    pub index: usize,
    pub summary_root: [u8; 32],
}

/// An inclusion proof for a record: the chain of rollup steps from the
/// record up through chapter -> book -> part -> series. Self-contained —
/// `verify` needs no store access, only the proof itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InclusionProof {
    pub record_id: RecordId,
    pub steps: Vec<ProofStep>,
}

/// Minimum interface a live-tail subscriber must implement to receive
/// `subscribe`'s at-least-once delivery. Callers that only need a
/// synchronous snapshot should use `query`; `subscribe` is for tailing.
pub trait RecordSink {
    /// Delivers one durable record. Must be idempotent by `record.id` —
    /// delivery is at-least-once, never exactly-once.
    fn deliver(&self, record: Record);
}

pub trait LedgerApi {
    /// Submit a new page authored by `author_identity`. Returns the new
    /// record's id once it is durable (i.e. quorum-signed and appended).
    fn append(&self, kind: RecordKind, payload: Vec<u8>, author: &PrincipalId) -> LedgerResult<RecordId>;

    fn get(&self, id: &RecordId) -> LedgerResult<Option<Record>>;

    fn query(&self, filter: RecordFilter) -> LedgerResult<Vec<Record>>;

    /// Register `sink` to receive every future durable record matching
    /// `filter`, at least once, in store-append order. Returns a
    /// subscription id that can be used to unsubscribe.
    fn subscribe(&self, filter: RecordFilter, sink: std::sync::Arc<dyn RecordSink + Send + Sync>) -> LedgerResult<u64>;

    fn unsubscribe(&self, subscription_id: u64) -> LedgerResult<()>;

    /// The id of the most recent record authored by `author`, if any.
    fn tip_of(&self, author: &PrincipalId) -> LedgerResult<Option<RecordId>>;

    /// The rollup record covering `at`, at the given tier, if one has been
    /// produced yet.
    fn rollup_at(&self, tier: Tier, at: Timestamp) -> LedgerResult<Option<Record>>;

    fn prove(&self, id: &RecordId) -> LedgerResult<InclusionProof>;

    fn verify(&self, proof: &InclusionProof) -> LedgerResult<bool>;
}
