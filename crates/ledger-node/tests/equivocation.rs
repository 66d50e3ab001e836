//! Two distinct pages racing for the same `(author, prev)` chain position:
//! `LedgerNode::append` reads the author's current tip and only later
//! completes the quorum round trip, so two concurrent `append` calls for the
//! same author can genuinely observe the same tip. Exactly one must become
//! durable; the other must be rejected as an equivocation, and the node
//! should durably record the detection.

mod common;

use std::time::Duration;

use ledger_core::record::{UserRegisteredPayload, VoteCastPayload};
use ledger_core::types::ValidatorId;

#[tokio::test]
async fn concurrent_pages_at_the_same_chain_position_yield_exactly_one_survivor() {
    let ceremony = common::build_genesis(&[("v1", 1)], &["p1"]);
    let dir = common::scratch_dir("equivocation");
    common::run_init(&dir, &common::write_genesis_file(&dir, &ceremony.record));
    common::install_key(&dir, "v1", &ceremony.keypairs[&ValidatorId("v1".into())]);

    let p1_key = ledger_crypto::KeyPair::generate();
    common::install_key(&dir, "p1", &p1_key);

    let rpc = format!("127.0.0.1:{}", common::free_port());
    let p2p_bind = format!("/ip4/127.0.0.1/tcp/{}", common::free_port());
    let child = common::spawn_run(&dir, &rpc, &p2p_bind, None, |_| {});
    let _guard = common::NodeGuard { child, dir: dir.clone() };

    let http = reqwest::Client::new();
    let url = format!("http://{rpc}");
    assert!(common::wait_for_rpc(&http, &url, Duration::from_secs(20)).await, "RPC server never came up");

    // Establish p1's chain with an uncontested first page.
    let reg_payload = serde_json::to_vec(&UserRegisteredPayload {
        name: "Alice".into(),
        public_key: p1_key.public_key.clone(),
    })
    .unwrap();
    let first = common::append_page(&http, &url, "user_registered", &reg_payload, "p1").await;
    assert!(first.is_string());

    // Two distinct pages racing for `prev = tip(p1)`.
    let yes_payload = serde_json::to_vec(&VoteCastPayload {
        proposal_id: "prop-1".into(),
        choice: "yes".into(),
    })
    .unwrap();
    let no_payload = serde_json::to_vec(&VoteCastPayload {
        proposal_id: "prop-1".into(),
        choice: "no".into(),
    })
    .unwrap();

    let (yes_result, no_result) = tokio::join!(
        common::rpc_call_fallible(
            &http,
            &url,
            "append",
            serde_json::json!(["vote_cast", hex::encode(&yes_payload), "p1"]),
        ),
        common::rpc_call_fallible(
            &http,
            &url,
            "append",
            serde_json::json!(["vote_cast", hex::encode(&no_payload), "p1"]),
        ),
    );

    let outcomes = [yes_result, no_result];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let failures = outcomes.iter().filter(|r| r.is_err()).count();
    assert_eq!(successes, 1, "exactly one of the two racing pages should become durable");
    assert_eq!(failures, 1, "the loser should come back as an equivocation rejection");

    // Give the winner's report_equivocation-triggered diagnostic page a
    // moment to append.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let diagnostics = common::rpc_call(
        &http,
        &url,
        "query",
        serde_json::json!([{ "kind": "author_equivocation_detected" }]),
    )
    .await;
    assert_eq!(
        diagnostics.as_array().unwrap().len(),
        1,
        "expected exactly one durable equivocation report"
    );

    // p1's tip must be the surviving page, not a phantom fork.
    let tip = common::rpc_call(&http, &url, "tipOf", serde_json::json!(["p1"])).await;
    assert!(tip.as_str().is_some());
}
