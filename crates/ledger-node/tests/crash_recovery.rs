//! A crash mid-append looks like a valid log prefix followed by a corrupt
//! trailing frame (truncated length/body/CRC): `ledger verify` must still
//! pass against the surviving prefix, the lost record must come back as
//! gone, and the node must accept a fresh append and resume durably.

mod common;

use std::time::Duration;

use ledger_core::record::UserRegisteredPayload;
use ledger_core::types::ValidatorId;

#[tokio::test]
async fn truncated_trailing_frame_recovers_cleanly() {
    let ceremony = common::build_genesis(&[("v1", 1)], &["p1"]);
    let dir = common::scratch_dir("crash_recovery");
    common::run_init(&dir, &common::write_genesis_file(&dir, &ceremony.record));
    common::install_key(&dir, "v1", &ceremony.keypairs[&ValidatorId("v1".into())]);

    let p1_key = ledger_crypto::KeyPair::generate();
    common::install_key(&dir, "p1", &p1_key);

    let http = reqwest::Client::new();

    // First run: append one page, then kill the process (simulating a
    // crash right after the frame hit disk, before this test corrupts it).
    let rpc1 = format!("127.0.0.1:{}", common::free_port());
    let p2p1 = format!("/ip4/127.0.0.1/tcp/{}", common::free_port());
    let mut child1 = common::spawn_run(&dir, &rpc1, &p2p1, None, |_| {});
    let url1 = format!("http://{rpc1}");
    assert!(common::wait_for_rpc(&http, &url1, Duration::from_secs(20)).await);

    let payload = serde_json::to_vec(&UserRegisteredPayload {
        name: "Alice".into(),
        public_key: p1_key.public_key.clone(),
    })
    .unwrap();
    let lost_id = common::append_page(&http, &url1, "user_registered", &payload, "p1")
        .await
        .as_str()
        .unwrap()
        .to_string();

    let _ = child1.kill();
    let _ = child1.wait();

    // Corrupt the trailing CRC of the last frame — the same shape a torn
    // write mid-append leaves behind.
    let log_path = dir.join("ledger.log");
    let mut bytes = std::fs::read(&log_path).unwrap();
    let original_len = bytes.len();
    bytes.truncate(original_len - 2);
    std::fs::write(&log_path, &bytes).unwrap();

    // `ledger verify` must exit 0 against the now-shorter, still internally
    // consistent prefix (genesis only — the lost page's frame is gone
    // entirely, not just truncated mid-byte).
    let exit_code = common::run_verify(&dir);
    assert_eq!(exit_code, 0, "verify should pass against the recovered valid prefix");

    // Restart: the lost page must not reappear.
    let rpc2 = format!("127.0.0.1:{}", common::free_port());
    let p2p2 = format!("/ip4/127.0.0.1/tcp/{}", common::free_port());
    let mut child2 = common::spawn_run(&dir, &rpc2, &p2p2, None, |_| {});
    let url2 = format!("http://{rpc2}");
    assert!(common::wait_for_rpc(&http, &url2, Duration::from_secs(20)).await);

    let record = common::get_record(&http, &url2, &lost_id).await;
    assert!(record.is_null(), "the torn-write page should not have survived recovery");
    let tip = common::rpc_call(&http, &url2, "tipOf", serde_json::json!(["p1"])).await;
    assert!(tip.is_null(), "p1 should have no tip after losing its only page");

    // A fresh append for the same author at the same chain position must
    // now succeed durably.
    let retry_id = common::append_page(&http, &url2, "user_registered", &payload, "p1")
        .await
        .as_str()
        .unwrap()
        .to_string();
    let retried = common::get_record(&http, &url2, &retry_id).await;
    assert!(!retried.is_null());

    let _ = child2.kill();
    let _ = child2.wait();

    let final_exit = common::run_verify(&dir);
    assert_eq!(final_exit, 0, "verify should pass after the retried append");

    let _ = std::fs::remove_dir_all(&dir);
}
