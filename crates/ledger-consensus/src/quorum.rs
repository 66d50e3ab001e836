//! Signing / Consensus (C4): the proposal set that accumulates validator
//! co-signatures for a record until it meets the weighted-majority quorum
//! rule, or until `T_prop` expires, plus author-equivocation detection.
//! The direct ancestor of this module's shape is a finality tracker
//! that accumulates per-id confirmation votes against a threshold computed
//! from the live validator set — generalized here to gate against the
//! registry's time-travelled `active_set(created_at)` instead of a live
//! online flag, and extended with a deadline and an equivocation guard.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ledger_core::record::{QuorumSig, Record};
use ledger_core::types::{PrincipalId, RecordId, Signature, Timestamp, ValidatorId};

use crate::registry::ValidatorRegistry;

/// Emitted when a validator's signature is recorded against a proposal.
#[derive(Debug, Clone)]
pub struct SignatureEvent {
    pub record_id: RecordId,
    pub signer: ValidatorId,
    pub collected: usize,
    pub needed: usize,
    pub reached_quorum: bool,
}

/// Outcome of submitting a brand-new proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted into the proposal set; gathering signatures.
    Accepted,
    /// Rejected: another proposal from the same author with the same
    /// `prev` already reached quorum first (the equivocation tie-break).
    Equivocation { winning_id: RecordId },
}

struct Proposal {
    record: Record,
    signers: HashMap<ValidatorId, Signature>,
    deadline: Instant,
}

/// Accumulates co-signatures for proposed-but-not-yet-durable records and
/// detects author equivocation. One instance per node (a bounded,
/// fair-queued proposal set per author" — fairness/bounding is left to the
/// caller's enqueue discipline; this tracks accumulation and deadlines).
pub struct ProposalSet {
    t_prop: Duration,
    proposals: HashMap<RecordId, Proposal>,
    /// `(author, prev)` -> first-seen proposal id. Used to detect a second,
    /// distinct proposal at the same chain position (equivocation).
    chain_position: HashMap<(PrincipalId, Option<RecordId>), RecordId>,
}

impl ProposalSet {
    pub fn new(t_prop: Duration) -> Self {
        Self {
            t_prop,
            proposals: HashMap::new(),
            chain_position: HashMap::new(),
        }
    }

    /// Register a freshly author-signed record for quorum gathering.
    /// Returns `Equivocation` if a different proposal already occupies this
    /// author's chain position; the caller must reject the record and,
    /// if it is the first validator to observe it, emit an
    /// `author_equivocation_detected` page.
    pub fn submit(&mut self, record: Record) -> SubmitOutcome {
        let key = (record.author.clone(), record.prev);
        if let Some(existing_id) = self.chain_position.get(&key) {
            if *existing_id != record.id {
                return SubmitOutcome::Equivocation {
                    winning_id: *existing_id,
                };
            }
        } else {
            self.chain_position.insert(key, record.id);
        }

        self.proposals.entry(record.id).or_insert_with(|| Proposal {
            record,
            signers: HashMap::new(),
            deadline: Instant::now() + self.t_prop,
        });
        SubmitOutcome::Accepted
    }

    /// Record a validator's quorum signature against a pending proposal.
    /// Returns `None` if the proposal is unknown, the signer isn't active
    /// at the record's `created_at`, or the signer already signed.
    pub fn record_signature(
        &mut self,
        record_id: &RecordId,
        validator_id: ValidatorId,
        signature: Signature,
        registry: &ValidatorRegistry,
    ) -> Option<SignatureEvent> {
        let proposal = self.proposals.get_mut(record_id)?;
        let created_at = proposal.record.created_at;

        if !registry
            .active_set(created_at)
            .iter()
            .any(|v| v.id == validator_id)
        {
            return None;
        }
        if proposal.signers.contains_key(&validator_id) {
            return None;
        }
        proposal.signers.insert(validator_id.clone(), signature);

        let needed = registry.quorum_size(created_at);
        let collected = signed_weight(&proposal.signers, registry, created_at);
        Some(SignatureEvent {
            record_id: *record_id,
            signer: validator_id,
            collected,
            needed,
            reached_quorum: collected >= needed,
        })
    }

    /// If the proposal at `record_id` has reached quorum, remove it from
    /// the set and return the finished record with `quorum_sigs` attached
    /// in validator-id order (deterministic wire encoding).
    pub fn finalize_if_ready(&mut self, record_id: &RecordId, registry: &ValidatorRegistry) -> Option<Record> {
        let proposal = self.proposals.get(record_id)?;
        let needed = registry.quorum_size(proposal.record.created_at);
        let collected = signed_weight(&proposal.signers, registry, proposal.record.created_at);
        if collected < needed {
            return None;
        }
        let proposal = self.proposals.remove(record_id)?;
        let mut sigs: Vec<QuorumSig> = proposal
            .signers
            .into_iter()
            .map(|(validator_id, signature)| QuorumSig {
                validator_id,
                signature,
            })
            .collect();
        sigs.sort_by(|a, b| a.validator_id.0.cmp(&b.validator_id.0));

        // `chain_position` keeps mapping this author/prev pair to the
        // winning id even after finalization, so a late-arriving
        // equivocating proposal at the same position is still rejected.
        let mut record = proposal.record;
        record.quorum_sigs = sigs;
        Some(record)
    }

    /// Drop every proposal whose deadline has elapsed, returning their ids
    /// so the caller can report `Timeout` to each proposal's author (the
    /// step 7: "proposals that do not reach quorum within T_prop are
    /// dropped and reported to the author").
    pub fn expire_overdue(&mut self) -> Vec<RecordId> {
        let now = Instant::now();
        let overdue: Vec<RecordId> = self
            .proposals
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &overdue {
            if let Some(p) = self.proposals.remove(id) {
                let key = (p.record.author.clone(), p.record.prev);
                if self.chain_position.get(&key) == Some(id) {
                    self.chain_position.remove(&key);
                }
            }
        }
        overdue
    }

    pub fn pending_count(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_pending(&self, record_id: &RecordId) -> bool {
        self.proposals.contains_key(record_id)
    }
}

/// Sum the `weight` of every signer in `signers` that is active at `at`,
/// the same rule `quorum_size` itself is computed under — mirrors how
/// `submission::validate_prefinalized_record` re-derives weight for an
/// already quorum-signed record arriving via catch-up sync. A signer who
/// left the active set between signing and now (paused/revoked) no longer
/// contributes, matching the time-travelled nature of `quorum_size`.
fn signed_weight(
    signers: &HashMap<ValidatorId, Signature>,
    registry: &ValidatorRegistry,
    at: Timestamp,
) -> usize {
    let active = registry.active_set(at);
    signers
        .keys()
        .filter_map(|id| active.iter().find(|v| v.id == *id).map(|v| v.weight as usize))
        .sum()
}

/// Compute the timestamp a second-to-observe-it validator must embed in the
/// `author_equivocation_detected` page it emits, given the node's local
/// clock — kept as a free function since it has no state to share with
/// `ProposalSet`.
pub fn equivocation_detected_at(now: Timestamp) -> Timestamp {
    now
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::record::{GenesisPayload, GenesisValidator, RecordKind, Tier};
    use ledger_core::types::PublicKey;

    fn registry_with(n: usize) -> ValidatorRegistry {
        let mut reg = ValidatorRegistry::new();
        reg.apply_genesis(
            0,
            &GenesisPayload {
                founding_validators: (0..n)
                    .map(|i| GenesisValidator {
                        validator_id: ValidatorId(format!("v{i}")),
                        public_key: PublicKey(vec![i as u8; 8]),
                        weight: 1,
                    })
                    .collect(),
                quorum_mode: "majority".into(),
                genesis_principals: vec![],
            },
        );
        reg
    }

    fn make_record(author: &str, nonce: u8) -> Record {
        let mut r = Record {
            id: RecordId::from_bytes([0u8; 32]),
            kind: RecordKind::VoteCast,
            author: PrincipalId(author.into()),
            tier: Tier::Page,
            created_at: 1_000 + nonce as i64,
            prev: None,
            payload: vec![nonce],
            author_sig: Signature(vec![1]),
            quorum_sigs: vec![],
            covers: vec![],
        };
        r.id = r.compute_id();
        r
    }

    #[test]
    fn reaches_quorum_and_finalizes() {
        let registry = registry_with(2);
        let mut set = ProposalSet::new(Duration::from_secs(60));
        let r = make_record("p1", 1);
        let id = r.id;
        assert_eq!(set.submit(r), SubmitOutcome::Accepted);

        let e1 = set
            .record_signature(&id, ValidatorId("v0".into()), Signature(vec![1]), &registry)
            .unwrap();
        assert!(!e1.reached_quorum);
        assert!(set.finalize_if_ready(&id, &registry).is_none());

        let e2 = set
            .record_signature(&id, ValidatorId("v1".into()), Signature(vec![2]), &registry)
            .unwrap();
        assert!(e2.reached_quorum);
        let finalized = set.finalize_if_ready(&id, &registry).unwrap();
        assert_eq!(finalized.quorum_sigs.len(), 2);
    }

    #[test]
    fn second_proposal_at_same_chain_position_is_equivocation() {
        let mut set = ProposalSet::new(Duration::from_secs(60));
        let r1 = make_record("p1", 1);
        let mut r2 = make_record("p1", 1);
        r2.payload = vec![99];
        r2.id = r2.compute_id();
        assert_ne!(r1.id, r2.id);

        assert_eq!(set.submit(r1.clone()), SubmitOutcome::Accepted);
        assert_eq!(
            set.submit(r2),
            SubmitOutcome::Equivocation { winning_id: r1.id }
        );
    }

    #[test]
    fn expired_proposals_are_dropped() {
        let registry = registry_with(1);
        let mut set = ProposalSet::new(Duration::from_millis(0));
        let r = make_record("p1", 1);
        let id = r.id;
        set.submit(r);
        std::thread::sleep(Duration::from_millis(5));
        let overdue = set.expire_overdue();
        assert_eq!(overdue, vec![id]);
        assert!(!set.is_pending(&id));
        let _ = &registry;
    }

    #[test]
    fn revoked_validator_signature_after_revocation_does_not_count() {
        let mut registry = registry_with(2);
        registry.apply_validator_revoked(500, &ValidatorId("v1".into()));
        let mut set = ProposalSet::new(Duration::from_secs(60));
        let r = make_record("p1", 1); // created_at = 1001, after revocation
        let id = r.id;
        set.submit(r);
        let event = set.record_signature(&id, ValidatorId("v1".into()), Signature(vec![9]), &registry);
        assert!(event.is_none());
    }
}
