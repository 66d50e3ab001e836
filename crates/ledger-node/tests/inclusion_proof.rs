//! A record's full covering chain (chapter -> book -> part -> series) is
//! built directly against the store so the test doesn't have to wait out
//! real rollup boundaries, then a live node is pointed at that store and
//! proves/verifies the chain over its actual JSON-RPC and CLI surfaces.

mod common;

use std::time::Duration;

use ledger_core::record::{QuorumSig, Record, RecordKind, RollupPayload, Tier};
use ledger_core::types::{PrincipalId, RecordId, Signature, Timestamp, ValidatorId};
use ledger_store::RecordStore;

fn make_page(author: &str, created_at: Timestamp) -> Record {
    let mut r = Record {
        id: RecordId::from_bytes([0u8; 32]),
        kind: RecordKind::VoteCast,
        author: PrincipalId(author.into()),
        tier: Tier::Page,
        created_at,
        prev: None,
        payload: b"{\"proposal_id\":\"p\",\"choice\":\"yes\"}".to_vec(),
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

fn make_rollup(tier: Tier, created_at: Timestamp, covers: Vec<RecordId>, root: [u8; 32]) -> Record {
    let kind = match tier {
        Tier::Chapter => RecordKind::RollupChapter,
        Tier::Book => RecordKind::RollupBook,
        Tier::Part => RecordKind::RollupPart,
        Tier::Series => RecordKind::RollupSeries,
        _ => unreachable!(),
    };
    let payload = RollupPayload {
        interval_start: 0,
        interval_end: created_at + 1,
        summary_root: root,
        counts_by_kind: vec![],
        covered_ids_digest: [0u8; 32],
    };
    let mut r = Record {
        id: RecordId::from_bytes([0u8; 32]),
        kind,
        author: PrincipalId("leader".into()),
        tier,
        created_at,
        prev: None,
        payload: serde_json::to_vec(&payload).unwrap(),
        author_sig: Signature(vec![1]),
        quorum_sigs: vec![QuorumSig {
            validator_id: ValidatorId("v1".into()),
            signature: Signature(vec![2]),
        }],
        covers,
    };
    r.id = r.compute_id();
    r
}

#[tokio::test]
async fn live_node_proves_and_verifies_a_full_covering_chain() {
    let ceremony = common::build_genesis(&[("v1", 1)], &[]);
    let dir = common::scratch_dir("inclusion_proof");
    common::run_init(&dir, &common::write_genesis_file(&dir, &ceremony.record));

    // Build the covering chain directly against the store — waiting out
    // four real calendar rollup boundaries isn't practical in a test.
    let page = make_page("alice", 10);
    let page_id = page.id;
    {
        let mut store = RecordStore::open(&dir).unwrap();
        store.append(&page).unwrap();

        let chapter_root = ledger_crypto::merkle_summary_root(&[*page.id.as_bytes()]);
        let chapter = make_rollup(Tier::Chapter, 20, vec![page.id], chapter_root);
        store.append(&chapter).unwrap();

        let book_root = ledger_crypto::merkle_summary_root(&[*chapter.id.as_bytes()]);
        let book = make_rollup(Tier::Book, 30, vec![chapter.id], book_root);
        store.append(&book).unwrap();

        let part_root = ledger_crypto::merkle_summary_root(&[*book.id.as_bytes()]);
        let part = make_rollup(Tier::Part, 40, vec![book.id], part_root);
        store.append(&part).unwrap();

        let series_root = ledger_crypto::merkle_summary_root(&[*part.id.as_bytes()]);
        let series = make_rollup(Tier::Series, 50, vec![part.id], series_root);
        store.append(&series).unwrap();
    }

    // `ledger proof` opens its own store handle, so run it before the node
    // (which holds the store open for its whole lifetime) starts.
    let output = std::process::Command::new(common::node_bin())
        .args(["--dir", dir.to_str().unwrap(), "proof", &page_id.to_hex()])
        .output()
        .expect("failed to run `ledger proof`");
    assert!(output.status.success(), "ledger proof exited with {:?}", output.status);
    let cli_proof: serde_json::Value = serde_json::from_slice(&output.stdout).expect("ledger proof prints JSON");
    assert_eq!(cli_proof["steps"].as_array().unwrap().len(), 4);

    let rpc = format!("127.0.0.1:{}", common::free_port());
    let p2p_bind = format!("/ip4/127.0.0.1/tcp/{}", common::free_port());
    let child = common::spawn_run(&dir, &rpc, &p2p_bind, None, |_| {});
    let _guard = common::NodeGuard { child, dir: dir.clone() };

    let http = reqwest::Client::new();
    let url = format!("http://{rpc}");
    assert!(common::wait_for_rpc(&http, &url, Duration::from_secs(20)).await);

    let proof = common::rpc_call(&http, &url, "prove", serde_json::json!([page_id.to_hex()])).await;
    assert_eq!(proof["steps"].as_array().unwrap().len(), 4);
    assert_eq!(proof["record_id"].as_str().unwrap(), page_id.to_hex());

    let verified = common::rpc_call(&http, &url, "verify", serde_json::json!([proof.clone()])).await;
    assert_eq!(verified.as_bool(), Some(true));

    // A single corrupted sibling must fail verification.
    let mut tampered = proof.clone();
    tampered["steps"][0]["siblings"][0] = serde_json::json!(RecordId::from_bytes([0xffu8; 32]).to_hex());
    let tampered_verified = common::rpc_call(&http, &url, "verify", serde_json::json!([tampered])).await;
    assert_eq!(tampered_verified.as_bool(), Some(false));
}
