//! Rollup construction (§4.5 steps 2-3): enumerate covered records in
//! `(created_at, id)` order, build the Merkle-style summary, and produce the
//! unsigned rollup record ready to enter the normal submission pipeline.
//! Grounded in `StateDb::iter_timelocks_for_recipient`'s "scan tree, filter,
//! collect into Vec" shape — generalized here to "scan a tier's pages since
//! the last rollup, sorted".

use std::collections::BTreeMap;

use ledger_core::constants::MAX_COVERS_PER_ROLLUP;
use ledger_core::error::{LedgerError, LedgerResult};
use ledger_core::record::{Record, RecordKind, RollupPayload, Tier};
use ledger_core::types::{RecordId, Timestamp};
use ledger_store::RecordStore;

/// The sentinel summary root for a rollup with zero covered children
/// (§4.5 edge case: "a chapter whose interval contains zero pages still
/// emits a rollup record with empty `covers` and a zero-child summary_root").
pub fn empty_summary_root() -> [u8; 32] {
    ledger_crypto::blake3_hash(&[])
}

/// Sort `records` into the canonical covers order: `created_at` ascending,
/// ties broken by `id` lexicographically (invariant 6).
fn canonical_order(mut records: Vec<Record>) -> Vec<Record> {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    records
}

/// The immediately subordinate tier's records that fall within
/// `[interval_start, interval_end)` and have not yet been covered by another
/// rollup at `tier`. For `Tier::Chapter` this scans pages directly; for
/// higher tiers it scans the rollup records of the tier immediately below.
pub fn covered_records(
    store: &RecordStore,
    tier: Tier,
    interval_start: Timestamp,
    interval_end: Timestamp,
) -> LedgerResult<Vec<Record>> {
    let child_tier = match tier {
        Tier::Chapter => None, // scans raw pages, not a rollup tier
        Tier::Book => Some(Tier::Chapter),
        Tier::Part => Some(Tier::Book),
        Tier::Series => Some(Tier::Part),
        Tier::Page | Tier::Genesis => {
            return Err(LedgerError::BadRollupCoverage(format!("{tier:?} is not a rollup tier")))
        }
    };

    let records = match child_tier {
        None => {
            // Chapter: cover every page (Tier::Page) in the interval, across
            // every kind — genesis and rollup records are never covered by a
            // chapter (they sit at their own tiers).
            let mut by_kind: BTreeMap<&'static str, Vec<Record>> = BTreeMap::new();
            let kinds = [
                RecordKind::UserRegistered,
                RecordKind::VoteCast,
                RecordKind::FlagRaised,
                RecordKind::ModerationDecided,
                RecordKind::ValidatorAdded,
                RecordKind::ValidatorPaused,
                RecordKind::ValidatorRevoked,
                RecordKind::KeyRotated,
                RecordKind::AmendmentProposed,
                RecordKind::TokenAwarded,
                RecordKind::AuthorEquivocationDetected,
                RecordKind::PeerHealthReport,
            ];
            let mut all = Vec::new();
            for kind in kinds {
                let found = store.scan_kind(kind, Some(interval_start), Some(interval_end))?;
                by_kind.insert(kind.as_str(), found.clone());
                all.extend(found);
            }
            all
        }
        Some(child_tier) => store.scan_tier(child_tier, Some(interval_start), Some(interval_end))?,
    };

    if records.len() > MAX_COVERS_PER_ROLLUP {
        return Err(LedgerError::BadRollupCoverage(format!(
            "{} covered records exceeds max {}",
            records.len(),
            MAX_COVERS_PER_ROLLUP
        )));
    }

    Ok(canonical_order(records))
}

/// Per-kind counts over `records`, for the rollup payload's diagnostic field.
fn counts_by_kind(records: &[Record]) -> Vec<(String, u64)> {
    let mut counts: BTreeMap<&'static str, u64> = BTreeMap::new();
    for r in records {
        *counts.entry(r.kind.as_str()).or_insert(0) += 1;
    }
    counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// A digest of the covered id list itself (order-sensitive), distinct from
/// `summary_root` — lets a verifier confirm the exact covered set without
/// recomputing the Merkle-style root.
fn covered_ids_digest(ids: &[RecordId]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(ids.len() * 32);
    for id in ids {
        buf.extend_from_slice(id.as_bytes());
    }
    ledger_crypto::blake3_hash(&buf)
}

/// Build the rollup payload and covered-id list for `tier`'s interval
/// `[interval_start, interval_end)`. Does not sign or append anything —
/// the caller (the rollup scheduler, running as the elected leader) still
/// has to submit the resulting unsigned record through the normal
/// quorum-gathering path.
pub fn build_rollup(
    store: &RecordStore,
    tier: Tier,
    interval_start: Timestamp,
    interval_end: Timestamp,
) -> LedgerResult<(RollupPayload, Vec<RecordId>)> {
    let records = covered_records(store, tier, interval_start, interval_end)?;
    let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();

    let summary_root = if ids.is_empty() {
        empty_summary_root()
    } else {
        let hashes: Vec<[u8; 32]> = ids.iter().map(|id| *id.as_bytes()).collect();
        ledger_crypto::merkle_summary_root(&hashes)
    };

    let payload = RollupPayload {
        interval_start,
        interval_end,
        summary_root,
        counts_by_kind: counts_by_kind(&records),
        covered_ids_digest: covered_ids_digest(&ids),
    };
    Ok((payload, ids))
}

/// Recompute a rollup's summary root from a covers list an independent
/// follower already has, and check it against the root the leader's
/// proposal claims (§4.5 step 4: "followers independently recompute the
/// summary; their signatures implicitly attest to the aggregation").
pub fn verify_summary_root(covers: &[RecordId], claimed_root: &[u8; 32]) -> bool {
    let root = if covers.is_empty() {
        empty_summary_root()
    } else {
        let hashes: Vec<[u8; 32]> = covers.iter().map(|id| *id.as_bytes()).collect();
        ledger_crypto::merkle_summary_root(&hashes)
    };
    &root == claimed_root
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::record::{QuorumSig, Record};
    use ledger_core::types::{PrincipalId, Signature, ValidatorId};

    fn make_page(author: &str, created_at: Timestamp, kind: RecordKind) -> Record {
        let mut r = Record {
            id: RecordId::from_bytes([0u8; 32]),
            kind,
            author: PrincipalId(author.into()),
            tier: Tier::Page,
            created_at,
            prev: None,
            payload: b"{}".to_vec(),
            author_sig: Signature(vec![1]),
            quorum_sigs: vec![QuorumSig {
                validator_id: ValidatorId("v1".into()),
                signature: Signature(vec![2]),
            }],
            covers: vec![],
        };
        r.id = r.compute_id();
        r
    }

    #[test]
    fn empty_interval_yields_sentinel_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let (payload, ids) = build_rollup(&store, Tier::Chapter, 0, 1_000_000_000_000).unwrap();
        assert!(ids.is_empty());
        assert_eq!(payload.summary_root, empty_summary_root());
    }

    #[test]
    fn covers_are_ordered_by_created_at_then_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::open(dir.path()).unwrap();
        // Use distinct authors/kinds since append enforces per-author chains
        // and this test only cares about cross-author time ordering.
        let r1 = make_page("alice", 100, RecordKind::VoteCast);
        let r2 = make_page("bob", 50, RecordKind::FlagRaised);
        let r3 = make_page("carol", 100, RecordKind::FlagRaised);
        store.append(&r1).unwrap();
        store.append(&r2).unwrap();
        store.append(&r3).unwrap();

        let (payload, ids) = build_rollup(&store, Tier::Chapter, 0, 1_000).unwrap();
        // r2 (ts=50) first, then r1/r3 (ts=100) ordered by id.
        assert_eq!(ids[0], r2.id);
        let (a, b) = if r1.id < r3.id { (r1.id, r3.id) } else { (r3.id, r1.id) };
        assert_eq!(ids[1], a);
        assert_eq!(ids[2], b);
        assert!(verify_summary_root(&ids, &payload.summary_root));
    }
}
