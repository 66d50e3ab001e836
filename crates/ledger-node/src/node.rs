//! `LedgerNode`: the concrete `LedgerApi` implementation wiring together
//! `ledger-store`'s durable log, `ledger-consensus`'s registry/principal/
//! proposal state, and `ledger-replication`'s network handle. One instance
//! per running node; `main.rs`'s `run` subcommand owns it behind an `Arc`
//! shared with the RPC server, the network event loop, and the rollup and
//! sync background tasks.
//!
//! `append` has a synchronous, blocking contract (`LedgerApi::append`
//! isn't `async`), so quorum-gathering is driven by a `std::sync::mpsc`
//! "waiters" table: the caller's thread parks on a channel recv with a
//! `T_prop` timeout while the proposal accumulates co-signatures, possibly
//! from this node's own validator identity and possibly from peers over
//! the network. Everything downstream of "a proposal reached quorum" —
//! storing it, updating derived registries, waking the waiter, fanning out
//! to subscribers and peers — goes through `try_finalize`, the single path
//! both the local self-cosign route and the network event loop share.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use libp2p::request_response::ResponseChannel;
use libp2p::PeerId;
use tokio::sync::mpsc;

use ledger_consensus::{
    finalize, now_ns, validate_key_rotation_signature, validate_prefinalized_record,
    validate_proposal, validate_quorum_signature, PrincipalRegistry, ProposalSet, SubmitOutcome,
    ValidatorRegistry,
};
use ledger_core::api::{InclusionProof, LedgerApi, RecordFilter, RecordSink};
use ledger_core::error::{LedgerError, LedgerResult};
use ledger_core::record::{AuthorEquivocationDetectedPayload, Record, RecordKind, Tier};
use ledger_core::types::{PrincipalId, RecordId, Signature, Timestamp, ValidatorId};
use ledger_crypto::KeyPair;
use ledger_replication::{
    sign_hello, verify_hello, GossipMessage, NetworkEvent, PeerTable, ReplicationHandle,
    ReplicationRequest, ReplicationResponse,
};
use ledger_store::RecordStore;

fn record_matches(filter: &RecordFilter, record: &Record) -> bool {
    if let Some(kind) = filter.kind {
        if record.kind != kind {
            return false;
        }
    }
    if let Some(author) = &filter.author {
        if &record.author != author {
            return false;
        }
    }
    if let Some(tier) = filter.tier {
        if record.tier != tier {
            return false;
        }
    }
    if let Some(since) = filter.since {
        if record.created_at < since {
            return false;
        }
    }
    if let Some(until) = filter.until {
        if record.created_at >= until {
            return false;
        }
    }
    true
}

fn active_validator_digest(registry: &ValidatorRegistry, at: Timestamp) -> [u8; 32] {
    let mut ids: Vec<&str> = registry.active_set(at).iter().map(|v| v.id.0.as_str()).collect();
    ids.sort_unstable();
    ledger_crypto::blake3_hash(ids.join(",").as_bytes())
}

/// This node's validator identity, if it holds one: the id and keypair
/// used to co-sign proposals and author rollups.
pub struct ValidatorIdentity {
    pub validator_id: ValidatorId,
    pub keypair: KeyPair,
}

pub struct LedgerNode {
    store: Mutex<RecordStore>,
    registry: RwLock<ValidatorRegistry>,
    principals: RwLock<PrincipalRegistry>,
    proposals: Mutex<ProposalSet>,
    /// Full copy of every proposal currently gathering signatures, kept
    /// alongside `ProposalSet` (which only exposes id-keyed bookkeeping)
    /// so an inbound `CoSign` gossip message can be cryptographically
    /// verified against the record it claims to sign.
    pending: Mutex<HashMap<RecordId, Record>>,
    waiters: Mutex<HashMap<RecordId, std_mpsc::Sender<LedgerResult<RecordId>>>>,
    subscribers: Mutex<HashMap<u64, (RecordFilter, Arc<dyn RecordSink + Send + Sync>)>>,
    next_sub_id: AtomicU64,
    /// Principal signing keys this node holds on behalf of local callers
    /// (e.g. the RPC surface's `append`) plus, by convention, an entry
    /// keyed by the validator id for self-authored diagnostic pages
    /// (`author_equivocation_detected`, `peer_health_report`).
    principal_keys: HashMap<PrincipalId, KeyPair>,
    validator_identity: Option<ValidatorIdentity>,
    /// Chain positions this node has already emitted an equivocation
    /// report for, so a storm of duplicate gossip for the same losing
    /// proposal doesn't produce a storm of reports.
    equivocation_reported: Mutex<HashSet<(PrincipalId, Option<RecordId>)>>,
    t_prop: Duration,
    peers: Mutex<PeerTable>,
    gossip_tx: mpsc::Sender<GossipMessage>,
    request_tx: mpsc::Sender<(PeerId, ReplicationRequest)>,
    response_tx: mpsc::Sender<(ResponseChannel<ReplicationResponse>, ReplicationResponse)>,
    local_peer_id: PeerId,
    started_at: Instant,
}

impl LedgerNode {
    pub fn new(
        store: RecordStore,
        registry: ValidatorRegistry,
        principals: PrincipalRegistry,
        principal_keys: HashMap<PrincipalId, KeyPair>,
        validator_identity: Option<ValidatorIdentity>,
        t_prop: Duration,
        handle: &ReplicationHandle,
    ) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            registry: RwLock::new(registry),
            principals: RwLock::new(principals),
            proposals: Mutex::new(ProposalSet::new(t_prop)),
            pending: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_sub_id: AtomicU64::new(1),
            principal_keys,
            validator_identity,
            equivocation_reported: Mutex::new(HashSet::new()),
            t_prop,
            peers: Mutex::new(PeerTable::new()),
            gossip_tx: handle.outbound_gossip_tx.clone(),
            request_tx: handle.request_tx.clone(),
            response_tx: handle.response_tx.clone(),
            local_peer_id: handle.local_peer_id,
            started_at: Instant::now(),
        })
    }

    pub fn height(&self) -> LedgerResult<u64> {
        self.store.lock().unwrap().height()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Validate, submit, gossip and self-cosign a record that is already
    /// author-signed — shared by `append` (freshly constructed pages) and
    /// the rollup scheduler (pre-built, pre-signed rollup proposals).
    fn propose(&self, record: Record) -> LedgerResult<()> {
        {
            let store = self.store.lock().unwrap();
            let principals = self.principals.read().unwrap();
            validate_proposal(&record, &store, &principals)?;
            if record.kind == RecordKind::KeyRotated {
                validate_key_rotation_signature(&record)?;
            }
        }

        let outcome = self.proposals.lock().unwrap().submit(record.clone());
        match outcome {
            SubmitOutcome::Accepted => {
                self.pending.lock().unwrap().insert(record.id, record.clone());
                let _ = self
                    .gossip_tx
                    .try_send(GossipMessage::SubmitProposal { record: record.clone() });
                self.self_cosign(&record);
                Ok(())
            }
            SubmitOutcome::Equivocation { winning_id } => {
                self.report_equivocation(&record, winning_id);
                Err(LedgerError::AuthorEquivocation {
                    author: record.author.0.clone(),
                    prev: record.prev.map(|p| p.to_hex()).unwrap_or_default(),
                })
            }
        }
    }

    fn self_cosign(&self, record: &Record) {
        let Some(identity) = self.validator_identity.as_ref() else {
            return;
        };
        let is_active = {
            let registry = self.registry.read().unwrap();
            registry
                .active_set(record.created_at)
                .iter()
                .any(|v| v.id == identity.validator_id)
        };
        if !is_active {
            return;
        }
        let signature = identity.keypair.sign(&record.signing_bytes());
        let _ = self.gossip_tx.try_send(GossipMessage::CoSign {
            record_id: record.id,
            validator_id: identity.validator_id.clone(),
            signature: signature.clone(),
        });
        self.record_cosign(record.id, identity.validator_id.clone(), signature);
    }

    fn record_cosign(&self, record_id: RecordId, validator_id: ValidatorId, signature: Signature) {
        let event = {
            let mut proposals = self.proposals.lock().unwrap();
            let registry = self.registry.read().unwrap();
            proposals.record_signature(&record_id, validator_id, signature, &registry)
        };
        if let Some(event) = event {
            if event.reached_quorum {
                self.try_finalize(&record_id);
            }
        }
    }

    fn try_finalize(&self, record_id: &RecordId) {
        let finalized = {
            let mut proposals = self.proposals.lock().unwrap();
            let registry = self.registry.read().unwrap();
            proposals.finalize_if_ready(record_id, &registry)
        };
        let Some(record) = finalized else { return };
        self.pending.lock().unwrap().remove(&record.id);

        let append_result = {
            let mut store = self.store.lock().unwrap();
            finalize(&record, &mut store)
        };
        match append_result {
            Ok(id) => {
                {
                    let mut registry = self.registry.write().unwrap();
                    registry.apply_record(&record);
                    for qs in &record.quorum_sigs {
                        registry.record_signed(&qs.validator_id, record.created_at);
                    }
                }
                self.principals.write().unwrap().apply_record(&record);
                self.notify_waiter(id, Ok(id));
                self.deliver_to_subscribers(&record);
                let _ = self
                    .gossip_tx
                    .try_send(GossipMessage::Finalized { record: record.clone() });
            }
            Err(e) => {
                let id = record.id;
                self.notify_waiter(id, Err(e));
            }
        }
    }

    fn notify_waiter(&self, id: RecordId, result: LedgerResult<RecordId>) {
        if let Some(tx) = self.waiters.lock().unwrap().remove(&id) {
            let _ = tx.send(result);
        }
    }

    fn deliver_to_subscribers(&self, record: &Record) {
        let subs = self.subscribers.lock().unwrap();
        for (filter, sink) in subs.values() {
            if record_matches(filter, record) {
                sink.deliver(record.clone());
            }
        }
    }

    /// First-observer handling of an author equivocation (§4.3, §8
    /// scenario 2): wake the losing proposal's waiter with an error, and —
    /// once per chain position — durably record the detection as a page
    /// authored by this node's own diagnostic identity.
    fn report_equivocation(&self, losing: &Record, winning_id: RecordId) {
        let key = (losing.author.clone(), losing.prev);
        let first_observer = self.equivocation_reported.lock().unwrap().insert(key);
        if !first_observer {
            return;
        }
        let Some(identity) = self.validator_identity.as_ref() else {
            return;
        };
        let diagnostic_author = PrincipalId(identity.validator_id.0.clone());
        if !self.principal_keys.contains_key(&diagnostic_author) {
            return;
        }
        let payload = AuthorEquivocationDetectedPayload {
            author: losing.author.clone(),
            prev: losing.prev,
            winning_id,
            losing_id: losing.id,
        };
        let Ok(bytes) = serde_json::to_vec(&payload) else {
            return;
        };
        if let Err(e) = self.append(RecordKind::AuthorEquivocationDetected, bytes, &diagnostic_author) {
            tracing::warn!(error = %e, "failed to durably record author equivocation");
        }
    }

    /// Process a gossip message received from a peer.
    pub fn handle_gossip(&self, _peer: PeerId, msg: GossipMessage) {
        match msg {
            GossipMessage::SubmitProposal { record } => {
                if let Err(e) = self.propose(record) {
                    tracing::debug!(error = %e, "rejected remote proposal");
                }
            }
            GossipMessage::CoSign { record_id, validator_id, signature } => {
                let record = self.pending.lock().unwrap().get(&record_id).cloned();
                let Some(record) = record else { return };
                let verified = {
                    let registry = self.registry.read().unwrap();
                    validate_quorum_signature(&record, &validator_id, &signature, &registry).is_ok()
                };
                if verified {
                    self.record_cosign(record_id, validator_id, signature);
                }
            }
            GossipMessage::Finalized { record } => {
                self.apply_finalized_record(record);
            }
        }
    }

    /// Validate and durably store a record that arrives already
    /// quorum-complete — the fast path for gossip of just-finalized
    /// records and for pull-sync's `GetRange` responses.
    fn apply_finalized_record(&self, record: Record) {
        let ok = {
            let registry = self.registry.read().unwrap();
            let principals = self.principals.read().unwrap();
            validate_prefinalized_record(&record, &registry, &principals)
        };
        if let Err(e) = ok {
            tracing::debug!(error = %e, "rejected finalized record from network");
            return;
        }
        let append_result = {
            let mut store = self.store.lock().unwrap();
            finalize(&record, &mut store)
        };
        if let Ok(id) = append_result {
            {
                let mut registry = self.registry.write().unwrap();
                registry.apply_record(&record);
            }
            self.principals.write().unwrap().apply_record(&record);
            self.pending.lock().unwrap().remove(&record.id);
            self.notify_waiter(id, Ok(id));
            self.deliver_to_subscribers(&record);
        }
    }

    /// Process an inbound request/response RPC from a peer.
    pub async fn handle_request(
        &self,
        peer: PeerId,
        request: ReplicationRequest,
        channel: ResponseChannel<ReplicationResponse>,
    ) {
        let response = match request {
            ReplicationRequest::Hello { validator_id, signature } => {
                let now = now_ns();
                let ok = {
                    let registry = self.registry.read().unwrap();
                    verify_hello(&registry, &validator_id, &signature, peer.to_bytes().as_slice(), now)
                };
                if ok {
                    self.peers.lock().unwrap().learn(&peer.to_string(), "");
                    ReplicationResponse::HelloAck
                } else {
                    ReplicationResponse::Rejected { reason: "hello authentication failed".into() }
                }
            }
            ReplicationRequest::Head => {
                let (height, digest) = {
                    let store = self.store.lock().unwrap();
                    let registry = self.registry.read().unwrap();
                    (store.height().unwrap_or(0), active_validator_digest(&registry, now_ns()))
                };
                ReplicationResponse::Head(ledger_replication::HeadInfo {
                    height,
                    latest_id: None,
                    active_validator_digest: digest,
                })
            }
            ReplicationRequest::GetRange { from_height, limit } => {
                let store = self.store.lock().unwrap();
                let all = store.replay().unwrap_or_default();
                let records = all
                    .into_iter()
                    .skip(from_height as usize)
                    .take(limit as usize)
                    .collect();
                ReplicationResponse::Records(records)
            }
            ReplicationRequest::GetById { ids } => {
                let store = self.store.lock().unwrap();
                let mut found = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Ok(Some(r)) = store.get(&id) {
                        found.push(r);
                    }
                }
                ReplicationResponse::Records(found)
            }
            ReplicationRequest::Health => {
                let height = self.store.lock().unwrap().height().unwrap_or(0);
                ReplicationResponse::Health(ledger_replication::HealthInfo {
                    version: 1,
                    height,
                    uptime_secs: self.uptime_secs(),
                    registry_epoch: 0,
                })
            }
        };
        let _ = self.response_tx.send((channel, response)).await;
    }

    /// Process a response to an RPC this node issued — the pull-sync
    /// driver (§4.6 `T_sync`).
    pub fn handle_response(&self, peer: PeerId, response: ReplicationResponse) {
        match response {
            ReplicationResponse::Head(info) => {
                let our_height = self.store.lock().unwrap().height().unwrap_or(0);
                if info.height > our_height {
                    let request_tx = self.request_tx.clone();
                    tokio::spawn(async move {
                        let _ = request_tx
                            .send((peer, ReplicationRequest::GetRange { from_height: our_height, limit: 512 }))
                            .await;
                    });
                }
            }
            ReplicationResponse::Records(records) => {
                let mut applied = 0u64;
                for record in records {
                    let ok = {
                        let registry = self.registry.read().unwrap();
                        let principals = self.principals.read().unwrap();
                        validate_prefinalized_record(&record, &registry, &principals)
                    };
                    if let Err(e) = ok {
                        tracing::warn!(peer = %peer, error = %e, "peer sent an invalid record during sync");
                        self.peers.lock().unwrap().record_failure(&peer.to_string());
                        return;
                    }
                    let append_result = {
                        let mut store = self.store.lock().unwrap();
                        finalize(&record, &mut store)
                    };
                    if append_result.is_ok() {
                        {
                            let mut registry = self.registry.write().unwrap();
                            registry.apply_record(&record);
                        }
                        self.principals.write().unwrap().apply_record(&record);
                        self.deliver_to_subscribers(&record);
                        applied += 1;
                    }
                }
                let height = self.store.lock().unwrap().height().unwrap_or(0);
                self.peers.lock().unwrap().record_success(&peer.to_string(), height, now_ns());
                if applied > 0 {
                    tracing::info!(peer = %peer, applied, "synced records from peer");
                }
            }
            ReplicationResponse::HelloAck
            | ReplicationResponse::Rejected { .. }
            | ReplicationResponse::Health(_) => {}
        }
    }

    pub fn learn_peer(&self, peer: PeerId, address: String) {
        self.peers.lock().unwrap().learn(&peer.to_string(), &address);
    }

    /// Kick off a `Head` request against every known, non-quarantined peer
    /// — the periodic pull-sync tick.
    pub async fn sync_tick(&self) {
        let targets: Vec<String> = self
            .peers
            .lock()
            .unwrap()
            .sync_targets()
            .into_iter()
            .map(|l| l.peer_id)
            .collect();
        for peer_str in targets {
            if let Ok(peer) = peer_str.parse::<PeerId>() {
                let _ = self.request_tx.send((peer, ReplicationRequest::Head)).await;
            }
        }
    }

    /// Greet every dialed peer with a signed `Hello`, if this node holds a
    /// validator identity. Peers that never see a valid `Hello` still get
    /// the three read-only RPCs (Head/GetRange/GetById/Health) but no
    /// proposal traffic is trusted without it.
    pub async fn say_hello(&self, peer: PeerId) {
        let Some(identity) = self.validator_identity.as_ref() else {
            return;
        };
        let signature = sign_hello(&identity.keypair, peer.to_bytes().as_slice());
        let _ = self
            .request_tx
            .send((
                peer,
                ReplicationRequest::Hello { validator_id: identity.validator_id.clone(), signature },
            ))
            .await;
    }

    /// Submit a batch of already-signed rollup proposals produced by the
    /// rollup scheduler's tick.
    pub fn propose_rollups(&self, records: Vec<Record>) {
        for record in records {
            if let Err(e) = self.propose(record) {
                tracing::warn!(error = %e, "failed to propose rollup");
            }
        }
    }

    pub fn registry_snapshot(&self) -> ledger_consensus::RegistrySnapshot {
        let height = self.height().unwrap_or(0);
        self.registry.read().unwrap().snapshot(height)
    }

    pub fn read_registry<R>(&self, f: impl FnOnce(&ValidatorRegistry) -> R) -> R {
        f(&self.registry.read().unwrap())
    }
}

impl LedgerApi for LedgerNode {
    fn append(&self, kind: RecordKind, payload: Vec<u8>, author: &PrincipalId) -> LedgerResult<RecordId> {
        let keypair = self
            .principal_keys
            .get(author)
            .ok_or_else(|| LedgerError::UnknownAuthor(author.0.clone()))?;

        let created_at = now_ns();
        let prev = self.store.lock().unwrap().tip(author)?;

        let mut record = Record {
            id: RecordId::from_bytes([0u8; 32]),
            kind,
            author: author.clone(),
            tier: Tier::Page,
            created_at,
            prev,
            payload,
            author_sig: Signature(Vec::new()),
            quorum_sigs: vec![],
            covers: vec![],
        };
        record.id = record.compute_id();
        record.author_sig = keypair.sign(&record.signing_bytes());
        let record_id = record.id;

        let (tx, rx) = std_mpsc::channel();
        self.waiters.lock().unwrap().insert(record_id, tx);

        if let Err(e) = self.propose(record) {
            self.waiters.lock().unwrap().remove(&record_id);
            return Err(e);
        }

        match rx.recv_timeout(self.t_prop) {
            Ok(result) => result,
            Err(_) => {
                self.waiters.lock().unwrap().remove(&record_id);
                self.proposals.lock().unwrap().expire_overdue();
                Err(LedgerError::Timeout(record_id.to_hex()))
            }
        }
    }

    fn get(&self, id: &RecordId) -> LedgerResult<Option<Record>> {
        self.store.lock().unwrap().get(id)
    }

    fn query(&self, filter: RecordFilter) -> LedgerResult<Vec<Record>> {
        let store = self.store.lock().unwrap();
        let mut records = if let Some(kind) = filter.kind {
            store.scan_kind(kind, filter.since, filter.until)?
        } else if let Some(author) = &filter.author {
            store.scan_author(author, filter.since, filter.until)?
        } else if let Some(tier) = filter.tier {
            store.scan_tier(tier, filter.since, filter.until)?
        } else {
            store
                .replay()?
                .into_iter()
                .filter(|r| filter.since.map_or(true, |s| r.created_at >= s))
                .filter(|r| filter.until.map_or(true, |u| r.created_at < u))
                .collect()
        };
        records.retain(|r| record_matches(&filter, r));
        Ok(records)
    }

    fn subscribe(&self, filter: RecordFilter, sink: Arc<dyn RecordSink + Send + Sync>) -> LedgerResult<u64> {
        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().unwrap().insert(id, (filter, sink));
        Ok(id)
    }

    fn unsubscribe(&self, subscription_id: u64) -> LedgerResult<()> {
        self.subscribers.lock().unwrap().remove(&subscription_id);
        Ok(())
    }

    fn tip_of(&self, author: &PrincipalId) -> LedgerResult<Option<RecordId>> {
        self.store.lock().unwrap().tip(author)
    }

    fn rollup_at(&self, tier: Tier, at: Timestamp) -> LedgerResult<Option<Record>> {
        let store = self.store.lock().unwrap();
        for record in store.scan_tier(tier, None, None)? {
            let payload: ledger_core::record::RollupPayload = match serde_json::from_slice(&record.payload) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if payload.interval_start <= at && at < payload.interval_end {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn prove(&self, id: &RecordId) -> LedgerResult<InclusionProof> {
        let store = self.store.lock().unwrap();
        ledger_rollup::build_inclusion_proof(&store, id)
    }

    fn verify(&self, proof: &InclusionProof) -> LedgerResult<bool> {
        Ok(ledger_rollup::verify_inclusion_proof(proof))
    }
}
