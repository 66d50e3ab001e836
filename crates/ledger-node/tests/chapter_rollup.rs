//! The rollup scheduler, exercised the way `cmd_run`'s background task
//! drives it, over a populated store: a chapter's worth of pages rolls up
//! into a single quorum-eligible `rollup_chapter` record once the interval's
//! grace period has cleared, and a second tick for the same interval is a
//! no-op.

use ledger_consensus::ValidatorRegistry;
use ledger_core::record::{GenesisPayload, GenesisValidator, QuorumSig, Record, RecordKind, Tier, VoteCastPayload};
use ledger_core::types::{PrincipalId, PublicKey, RecordId, Signature, ValidatorId};
use ledger_crypto::KeyPair;
use ledger_rollup::RollupScheduler;
use ledger_store::RecordStore;

fn make_page(author: &str, created_at: i64) -> Record {
    let payload = serde_json::to_vec(&VoteCastPayload {
        proposal_id: "prop-1".into(),
        choice: "yes".into(),
    })
    .unwrap();
    let mut r = Record {
        id: RecordId::from_bytes([0u8; 32]),
        kind: RecordKind::VoteCast,
        author: PrincipalId(author.into()),
        tier: Tier::Page,
        created_at,
        prev: None,
        payload,
        author_sig: Signature(vec![1, 2, 3]),
        quorum_sigs: vec![QuorumSig {
            validator_id: ValidatorId("v1".into()),
            signature: Signature(vec![4, 5, 6]),
        }],
        covers: vec![],
    };
    r.id = r.compute_id();
    r
}

fn single_validator_registry() -> ValidatorRegistry {
    let mut reg = ValidatorRegistry::new();
    reg.apply_genesis(
        0,
        &GenesisPayload {
            founding_validators: vec![GenesisValidator {
                validator_id: ValidatorId("v1".into()),
                public_key: PublicKey(vec![0; 8]),
                weight: 1,
            }],
            quorum_mode: "majority".into(),
            genesis_principals: vec![],
        },
    );
    reg
}

#[test]
fn a_days_worth_of_pages_rolls_up_into_one_chapter() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RecordStore::open(dir.path()).unwrap();

    // 100 pages spread across the chapter's 24h interval, one author each
    // (per-author chains only need one page apiece here).
    let mut expected_ids = Vec::new();
    for i in 0..100 {
        let created_at_secs = i * 800; // spread evenly across ~22.2h
        let page = make_page(&format!("author_{i}"), created_at_secs * 1_000_000_000);
        store.append(&page).unwrap();
        expected_ids.push(page.id);
    }

    let registry = single_validator_registry();
    let keypair = KeyPair::generate();
    let mut scheduler =
        RollupScheduler::new(ValidatorId("v1".into()), PrincipalId("v1".into()), keypair).with_t_prop_secs(10);

    // Early epoch timestamps mean the book/part/series calendar tiers may
    // also have a closed (empty) prior interval due alongside the chapter —
    // this test only cares about the chapter tier's behavior.
    let now_secs = 24 * 3600 + 100; // past the chapter boundary and its grace period
    let due = scheduler.tick(&store, &registry, now_secs).unwrap();
    let chapter = due
        .iter()
        .find(|r| r.kind == RecordKind::RollupChapter)
        .expect("expected the chapter tier to be due");
    assert_eq!(chapter.covers.len(), expected_ids.len());

    let mut covered: Vec<RecordId> = chapter.covers.clone();
    covered.sort();
    let mut expected_sorted = expected_ids.clone();
    expected_sorted.sort();
    assert_eq!(covered, expected_sorted);

    let payload: ledger_core::record::RollupPayload = serde_json::from_slice(&chapter.payload).unwrap();
    assert!(ledger_rollup::verify_summary_root(&chapter.covers, &payload.summary_root));

    // The scheduler's own submission path still needs these records to pass
    // through the normal quorum pipeline before they're durable — with one
    // validator at weight 1, self-cosigning alone satisfies quorum, so
    // appending each due record directly mirrors what `propose_rollups`
    // would end up doing. Every closed interval across all four tiers
    // becomes due together this early in the epoch, not just the chapter.
    for record in &due {
        store.append(record).unwrap();
    }

    // A later tick for the same interval must not re-propose it.
    let second = scheduler.tick(&store, &registry, now_secs + 5).unwrap();
    assert!(second.is_empty(), "the same chapter interval should not be rolled up twice");

    // A freshly started scheduler (as on node restart) should prime itself
    // from the durable rollup and also skip it.
    let keypair2 = KeyPair::generate();
    let mut restarted =
        RollupScheduler::new(ValidatorId("v1".into()), PrincipalId("v1".into()), keypair2).with_t_prop_secs(10);
    restarted.sync_from_store(&store).unwrap();
    let after_restart = restarted.tick(&store, &registry, now_secs + 10).unwrap();
    assert!(after_restart.is_empty(), "a restarted scheduler should not redo work already on disk");
}
