//! The rollup scheduler (§4.5 step 1 and §5's "idle most of the time, wakes
//! on boundaries" concurrency note): a per-node task woken by
//! `tokio::time::interval`, that determines which rollup tiers have a
//! freshly closed interval, whether this node is the effective leader for
//! it, and if so builds and signs the rollup proposal. Submitting the
//! signed proposal into the quorum-gathering pipeline and onward to the
//! network is left to the caller — this module only decides *whether* and
//! *what* to propose.

use std::collections::HashMap;

use ledger_consensus::ValidatorRegistry;
use ledger_core::constants::{CLOCK_SKEW_TOLERANCE_SECS, DEFAULT_T_PROP_SECS};
use ledger_core::error::LedgerResult;
use ledger_core::record::{Record, RecordKind, Tier};
use ledger_core::types::{PrincipalId, Timestamp, ValidatorId};
use ledger_crypto::KeyPair;
use ledger_store::RecordStore;

use crate::engine::build_rollup;
use crate::leader::effective_leader;
use crate::tiers::interval_for;

const ROLLUP_TIERS: [Tier; 4] = [Tier::Chapter, Tier::Book, Tier::Part, Tier::Series];

fn kind_for(tier: Tier) -> RecordKind {
    match tier {
        Tier::Chapter => RecordKind::RollupChapter,
        Tier::Book => RecordKind::RollupBook,
        Tier::Part => RecordKind::RollupPart,
        Tier::Series => RecordKind::RollupSeries,
        Tier::Page | Tier::Genesis => unreachable!("not a rollup tier"),
    }
}

fn ns_to_secs(ts: Timestamp) -> i64 {
    ts.div_euclid(1_000_000_000)
}

/// Tracks, per tier, the `interval_end` of the most recently emitted rollup
/// — whether emitted by this node or observed from another validator's
/// record already in the store — so a restarted node doesn't re-propose an
/// interval that already has a rollup.
pub struct RollupScheduler {
    validator_id: ValidatorId,
    author: PrincipalId,
    keypair: KeyPair,
    t_prop_secs: u64,
    last_emitted: HashMap<Tier, Timestamp>,
}

impl RollupScheduler {
    pub fn new(validator_id: ValidatorId, author: PrincipalId, keypair: KeyPair) -> Self {
        Self {
            validator_id,
            author,
            keypair,
            t_prop_secs: DEFAULT_T_PROP_SECS,
            last_emitted: HashMap::new(),
        }
    }

    pub fn with_t_prop_secs(mut self, t_prop_secs: u64) -> Self {
        self.t_prop_secs = t_prop_secs;
        self
    }

    /// Prime `last_emitted` from whatever rollups are already durable, so a
    /// node that restarts mid-interval doesn't re-propose work another
    /// validator already finished.
    pub fn sync_from_store(&mut self, store: &RecordStore) -> LedgerResult<()> {
        for tier in ROLLUP_TIERS {
            let existing = store.scan_tier(tier, None, None)?;
            if let Some(latest) = existing.iter().map(|r| r.created_at).max() {
                let (_, end) = interval_for(tier, latest)?;
                let entry = self.last_emitted.entry(tier).or_insert(Timestamp::MIN);
                if end > *entry {
                    *entry = end;
                }
            }
        }
        Ok(())
    }

    /// Check every rollup tier against `now_secs`: for each tier whose most
    /// recently completed interval hasn't been rolled up yet and whose
    /// grace period (`CLOCK_SKEW_TOLERANCE_SECS + T_prop`) has elapsed since
    /// that interval closed, decide the effective leader and, if it's this
    /// node, build and sign the proposal. One call may return proposals for
    /// more than one tier if several boundaries closed since the last tick.
    pub fn tick(
        &mut self,
        store: &RecordStore,
        registry: &ValidatorRegistry,
        now_secs: i64,
    ) -> LedgerResult<Vec<Record>> {
        let mut due = Vec::new();
        let now_ns = now_secs * 1_000_000_000;
        let grace = CLOCK_SKEW_TOLERANCE_SECS as u64 + self.t_prop_secs;

        for tier in ROLLUP_TIERS {
            let (cur_start, _cur_end) = interval_for(tier, now_ns)?;
            let (prev_start, prev_end) = interval_for(tier, cur_start - 1)?;
            let prev_end_secs = ns_to_secs(prev_end);

            if now_secs - prev_end_secs < grace as i64 {
                continue; // boundary hasn't cleared its grace period yet
            }
            if self.last_emitted.get(&tier).copied().unwrap_or(Timestamp::MIN) >= prev_end {
                continue; // already rolled up
            }

            let leader = effective_leader(registry, prev_end, now_secs, prev_end_secs, self.t_prop_secs);
            if leader.as_ref() != Some(&self.validator_id) {
                continue; // not our turn (yet)
            }

            let (payload, covers) = build_rollup(store, tier, prev_start, prev_end)?;
            let prev = store.tip(&self.author)?;
            let mut record = Record {
                id: ledger_core::types::RecordId::from_bytes([0u8; 32]),
                kind: kind_for(tier),
                author: self.author.clone(),
                tier,
                created_at: now_ns,
                prev,
                payload: serde_json::to_vec(&payload).map_err(|e| {
                    ledger_core::error::LedgerError::Serialization(e.to_string())
                })?,
                author_sig: ledger_core::types::Signature(Vec::new()),
                quorum_sigs: vec![],
                covers,
            };
            record.id = record.compute_id();
            record.author_sig = self.keypair.sign(&record.signing_bytes());

            self.last_emitted.insert(tier, prev_end);
            due.push(record);
        }

        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::record::{GenesisPayload, GenesisValidator};
    use ledger_core::types::PublicKey;

    fn registry_with(ids: &[&str]) -> ValidatorRegistry {
        let mut reg = ValidatorRegistry::new();
        reg.apply_genesis(
            0,
            &GenesisPayload {
                founding_validators: ids
                    .iter()
                    .map(|id| GenesisValidator {
                        validator_id: ValidatorId((*id).into()),
                        public_key: PublicKey(vec![0; 8]),
                        weight: 1,
                    })
                    .collect(),
                quorum_mode: "majority".into(),
                genesis_principals: vec![],
            },
        );
        reg
    }

    #[test]
    fn leader_proposes_after_grace_period_non_leader_does_not() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let registry = registry_with(&["v1", "v2"]);

        let keypair = KeyPair::generate();
        let mut leader_sched =
            RollupScheduler::new(ValidatorId("v1".into()), PrincipalId("v1".into()), keypair)
                .with_t_prop_secs(10);

        // Pick a now_secs comfortably past a chapter boundary with grace elapsed.
        let now_secs = 24 * 3600 + 100;
        let due = leader_sched.tick(&store, &registry, now_secs).unwrap();
        assert!(due.iter().any(|r| r.kind == RecordKind::RollupChapter));

        let keypair2 = KeyPair::generate();
        let mut non_leader_sched =
            RollupScheduler::new(ValidatorId("v2".into()), PrincipalId("v2".into()), keypair2)
                .with_t_prop_secs(10);
        let due2 = non_leader_sched.tick(&store, &registry, now_secs).unwrap();
        assert!(due2.is_empty());
    }

    #[test]
    fn does_not_double_propose_same_interval() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let registry = registry_with(&["v1"]);
        let keypair = KeyPair::generate();
        let mut sched =
            RollupScheduler::new(ValidatorId("v1".into()), PrincipalId("v1".into()), keypair)
                .with_t_prop_secs(10);

        let now_secs = 24 * 3600 + 100;
        let first = sched.tick(&store, &registry, now_secs).unwrap();
        assert!(!first.is_empty());
        let second = sched.tick(&store, &registry, now_secs + 5).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn grace_period_not_yet_elapsed_skips_tier() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let registry = registry_with(&["v1"]);
        let keypair = KeyPair::generate();
        let mut sched =
            RollupScheduler::new(ValidatorId("v1".into()), PrincipalId("v1".into()), keypair)
                .with_t_prop_secs(10);

        // Barely past the chapter boundary, before the grace period clears.
        let now_secs = 24 * 3600 + 1;
        let due = sched.tick(&store, &registry, now_secs).unwrap();
        assert!(due.is_empty());
    }
}
