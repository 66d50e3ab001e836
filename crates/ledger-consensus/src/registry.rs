//! Validator Registry (C3): the set of authorised signers, derived entirely
//! by replaying `genesis`/`validator_*` records — there is no side-channel
//! admin API. Unlike a flat "online: bool" validator set, quorum
//! validity must be evaluated at a record's `created_at`, so every status
//! change is kept with the timestamp it took effect, and `active_set`/
//! `quorum_size`/`verify_member` all take an explicit instant to evaluate at.

use std::collections::HashMap;

use ledger_core::record::{GenesisPayload, RecordKind, ValidatorAddedPayload};
use ledger_core::types::{PublicKey, Timestamp, ValidatorId};
use serde::{Deserialize, Serialize};

/// A validator's status at a point in time. Mirrors the lifecycle in
/// Lifecycle: `Candidate -> Active <-> Paused -> Revoked`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorStatus {
    Active,
    Paused,
    Revoked,
}

/// One validator's full history: current material plus every status
/// transition it has gone through, in order. Kept as a vec rather than a
/// single current flag because quorum checks are retroactive — a record
/// signed while a validator was active must still count after the
/// validator is later revoked ("revocation invalidates *future*
/// use of the key but never retroactively invalidates records it already
/// signed").
#[derive(Clone, Debug)]
pub struct ValidatorRecord {
    pub id: ValidatorId,
    pub public_key: PublicKey,
    pub weight: u64,
    pub added_at: Timestamp,
    /// `(effective_at, status)`, sorted by `effective_at` ascending. The
    /// first entry is always `(added_at, Active)`.
    status_history: Vec<(Timestamp, ValidatorStatus)>,
    pub signed_count: u64,
    pub last_seen: Option<Timestamp>,
}

impl ValidatorRecord {
    fn new(id: ValidatorId, public_key: PublicKey, weight: u64, added_at: Timestamp) -> Self {
        Self {
            id,
            public_key,
            weight,
            added_at,
            status_history: vec![(added_at, ValidatorStatus::Active)],
            signed_count: 0,
            last_seen: None,
        }
    }

    /// The status in effect at `at`. Validators added after `at` are not yet
    /// known at that instant; callers filter those out before calling this.
    pub fn status_at(&self, at: Timestamp) -> ValidatorStatus {
        self.status_history
            .iter()
            .rev()
            .find(|(ts, _)| *ts <= at)
            .map(|(_, s)| *s)
            .unwrap_or(ValidatorStatus::Active)
    }

    fn push_transition(&mut self, at: Timestamp, status: ValidatorStatus) {
        self.status_history.push((at, status));
    }
}

/// The validator registry, rebuilt by replaying every `genesis` and
/// `validator_*` record in `created_at` order. Checkpointed to
/// `registry.snap` for fast startup; the checkpoint is
/// just a cache of this struct, never the source of truth.
#[derive(Clone, Debug, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<ValidatorId, ValidatorRecord>,
    /// "majority" or "weighted" from the genesis payload — recorded for
    /// diagnostics; the quorum arithmetic itself is weighted-majority in
    /// both modes (weight defaults to 1 per
    /// validator, so "majority" and "weighted" coincide unless a
    /// `validator_added` payload sets a non-default weight).
    pub quorum_mode: String,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry from the genesis record's founding validator set.
    pub fn apply_genesis(&mut self, genesis_at: Timestamp, payload: &GenesisPayload) {
        self.quorum_mode = payload.quorum_mode.clone();
        for v in &payload.founding_validators {
            self.validators.insert(
                v.validator_id.clone(),
                ValidatorRecord::new(
                    v.validator_id.clone(),
                    v.public_key.clone(),
                    v.weight,
                    genesis_at,
                ),
            );
        }
    }

    pub fn apply_validator_added(&mut self, at: Timestamp, payload: &ValidatorAddedPayload) {
        self.validators.insert(
            payload.validator_id.clone(),
            ValidatorRecord::new(
                payload.validator_id.clone(),
                payload.public_key.clone(),
                payload.weight,
                at,
            ),
        );
    }

    pub fn apply_validator_paused(&mut self, at: Timestamp, validator_id: &ValidatorId) {
        if let Some(v) = self.validators.get_mut(validator_id) {
            v.push_transition(at, ValidatorStatus::Paused);
        }
    }

    pub fn apply_validator_revoked(&mut self, at: Timestamp, validator_id: &ValidatorId) {
        if let Some(v) = self.validators.get_mut(validator_id) {
            v.push_transition(at, ValidatorStatus::Revoked);
        }
    }

    /// Replay any record affecting the registry — `genesis`,
    /// `validator_added`, `validator_paused`, `validator_revoked`. Other
    /// kinds are ignored; payload decoding failures are ignored here because
    /// `ledger-store` has already validated `kind`/schema conformance
    /// before a record is durable.
    pub fn apply_record(&mut self, record: &ledger_core::record::Record) {
        match record.kind {
            RecordKind::Genesis => {
                if let Ok(payload) = serde_json::from_slice::<GenesisPayload>(&record.payload) {
                    self.apply_genesis(record.created_at, &payload);
                }
            }
            RecordKind::ValidatorAdded => {
                if let Ok(payload) =
                    serde_json::from_slice::<ValidatorAddedPayload>(&record.payload)
                {
                    self.apply_validator_added(record.created_at, &payload);
                }
            }
            RecordKind::ValidatorPaused => {
                if let Ok(payload) = serde_json::from_slice::<
                    ledger_core::record::ValidatorPausedPayload,
                >(&record.payload)
                {
                    self.apply_validator_paused(record.created_at, &payload.validator_id);
                }
            }
            RecordKind::ValidatorRevoked => {
                if let Ok(payload) = serde_json::from_slice::<
                    ledger_core::record::ValidatorRevokedPayload,
                >(&record.payload)
                {
                    self.apply_validator_revoked(record.created_at, &payload.validator_id);
                }
            }
            _ => {}
        }
    }

    /// The set of validators whose status was `Active` at `at`, excluding
    /// ones not yet added. This is the "time travel" the spec requires:
    /// quorum validity for a record is evaluated at that record's
    /// `created_at`, not at now.
    pub fn active_set(&self, at: Timestamp) -> Vec<&ValidatorRecord> {
        self.validators
            .values()
            .filter(|v| v.added_at <= at && v.status_at(at) == ValidatorStatus::Active)
            .collect()
    }

    /// `floor(sum_of_weights / 2) + 1` over the active set at `at`
    /// for quorum purposes.
    pub fn quorum_size(&self, at: Timestamp) -> usize {
        let total_weight: u64 = self.active_set(at).iter().map(|v| v.weight).sum();
        (total_weight / 2 + 1) as usize
    }

    /// Whether `validator_id` was an active validator at `at` and its
    /// registered public key matches `public_key`.
    pub fn verify_member(&self, validator_id: &ValidatorId, public_key: &PublicKey, at: Timestamp) -> bool {
        match self.validators.get(validator_id) {
            Some(v) => {
                v.added_at <= at
                    && v.status_at(at) == ValidatorStatus::Active
                    && &v.public_key == public_key
            }
            None => false,
        }
    }

    pub fn get(&self, validator_id: &ValidatorId) -> Option<&ValidatorRecord> {
        self.validators.get(validator_id)
    }

    /// All validators ranked by id ascending — the deterministic order the
    /// rollup leader election and `validator_revoked`/`_paused`
    /// lookups rely on.
    pub fn ranked_by_id(&self) -> Vec<&ValidatorRecord> {
        let mut list: Vec<_> = self.validators.values().collect();
        list.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        list
    }

    pub fn record_signed(&mut self, validator_id: &ValidatorId, at: Timestamp) {
        if let Some(v) = self.validators.get_mut(validator_id) {
            v.signed_count += 1;
            v.last_seen = Some(at);
        }
    }

    /// Snapshot the whole registry for `registry.snap` (§6 on-disk layout).
    /// `replayed_height` is the log height this snapshot reflects, so a
    /// reopened node can tell whether the snapshot is still current or
    /// needs a handful of trailing records replayed on top of it.
    pub fn snapshot(&self, replayed_height: u64) -> RegistrySnapshot {
        let validators = self
            .validators
            .values()
            .map(|v| ValidatorSnapshotEntry {
                id: v.id.clone(),
                public_key: v.public_key.clone(),
                weight: v.weight,
                added_at: v.added_at,
                status_history: v.status_history.clone(),
                signed_count: v.signed_count,
                last_seen: v.last_seen,
            })
            .collect();
        RegistrySnapshot {
            validators,
            quorum_mode: self.quorum_mode.clone(),
            replayed_height,
        }
    }

    pub fn from_snapshot(snap: RegistrySnapshot) -> Self {
        let validators = snap
            .validators
            .into_iter()
            .map(|e| {
                (
                    e.id.clone(),
                    ValidatorRecord {
                        id: e.id,
                        public_key: e.public_key,
                        weight: e.weight,
                        added_at: e.added_at,
                        status_history: e.status_history,
                        signed_count: e.signed_count,
                        last_seen: e.last_seen,
                    },
                )
            })
            .collect();
        Self {
            validators,
            quorum_mode: snap.quorum_mode,
        }
    }
}

/// On-disk form of `ValidatorRegistry`, written to `registry.snap`. A pure
/// cache: if absent or its `replayed_height` lags the log, the caller
/// rebuilds by replaying from the log instead of trusting it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub validators: Vec<ValidatorSnapshotEntry>,
    pub quorum_mode: String,
    pub replayed_height: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatorSnapshotEntry {
    pub id: ValidatorId,
    pub public_key: PublicKey,
    pub weight: u64,
    pub added_at: Timestamp,
    pub status_history: Vec<(Timestamp, ValidatorStatus)>,
    pub signed_count: u64,
    pub last_seen: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::record::GenesisValidator;

    fn genesis_payload(n: usize) -> GenesisPayload {
        GenesisPayload {
            founding_validators: (0..n)
                .map(|i| GenesisValidator {
                    validator_id: ValidatorId(format!("v{i}")),
                    public_key: PublicKey(vec![i as u8; 8]),
                    weight: 1,
                })
                .collect(),
            quorum_mode: "majority".into(),
            genesis_principals: vec![],
        }
    }

    #[test]
    fn quorum_size_is_weighted_majority() {
        let mut reg = ValidatorRegistry::new();
        reg.apply_genesis(0, &genesis_payload(2));
        assert_eq!(reg.quorum_size(100), 2);

        let mut reg3 = ValidatorRegistry::new();
        reg3.apply_genesis(0, &genesis_payload(3));
        assert_eq!(reg3.quorum_size(100), 2);
    }

    #[test]
    fn revocation_does_not_affect_past_membership() {
        let mut reg = ValidatorRegistry::new();
        reg.apply_genesis(0, &genesis_payload(2));
        reg.apply_validator_revoked(1_000, &ValidatorId("v0".into()));

        let pk = PublicKey(vec![0u8; 8]);
        assert!(reg.verify_member(&ValidatorId("v0".into()), &pk, 500));
        assert!(!reg.verify_member(&ValidatorId("v0".into()), &pk, 1_500));
    }

    #[test]
    fn active_set_excludes_not_yet_added_validators() {
        let mut reg = ValidatorRegistry::new();
        reg.apply_genesis(0, &genesis_payload(1));
        reg.apply_validator_added(
            2_000,
            &ValidatorAddedPayload {
                validator_id: ValidatorId("v1".into()),
                public_key: PublicKey(vec![9; 8]),
                weight: 1,
            },
        );
        assert_eq!(reg.active_set(1_000).len(), 1);
        assert_eq!(reg.active_set(3_000).len(), 2);
    }
}
