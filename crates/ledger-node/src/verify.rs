//! `ledger verify` (§6, §8): full re-verification of every durable record
//! against the time-travelled registry/principal state as of when each
//! one was appended, independent of whatever `ledger-store`'s own
//! append-time checks already enforced.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};

use ledger_consensus::{validate_author_signature, validate_prefinalized_record, PrincipalRegistry, ValidatorRegistry};
use ledger_core::record::{RecordKind, RollupPayload, Tier};
use ledger_core::types::{PrincipalId, RecordId, Timestamp};
use ledger_store::RecordStore;

pub struct VerifyReport {
    pub records_checked: u64,
    pub pages: u64,
    pub rollups: u64,
}

/// Distinguishes I/O failures (exit 2) from invariant violations (exit 1)
/// per §6's exit code table.
pub enum VerifyOutcome {
    Ok(VerifyReport),
    Invariant(anyhow::Error),
    Io(anyhow::Error),
}

pub fn verify_chain(dir: &Path) -> VerifyOutcome {
    let store = match RecordStore::open(dir).context("opening store") {
        Ok(s) => s,
        Err(e) => return VerifyOutcome::Io(e),
    };
    let records = match store.replay().context("replaying log") {
        Ok(r) => r,
        Err(e) => return VerifyOutcome::Io(e),
    };

    match verify_records(&records) {
        Ok(report) => VerifyOutcome::Ok(report),
        Err(e) => VerifyOutcome::Invariant(e),
    }
}

fn verify_records(records: &[ledger_core::record::Record]) -> anyhow::Result<VerifyReport> {
    let mut registry = ValidatorRegistry::new();
    let mut principals = PrincipalRegistry::new();
    let mut tips: HashMap<PrincipalId, RecordId> = HashMap::new();
    let mut last_ts: HashMap<PrincipalId, Timestamp> = HashMap::new();
    let mut pages = 0u64;
    let mut rollups = 0u64;

    for (i, record) in records.iter().enumerate() {
        if record.compute_id() != record.id {
            bail!("record at position {i} has a declared id that does not match its canonical hash");
        }

        if record.kind == RecordKind::Genesis {
            if i != 0 {
                bail!("genesis record {} is not the first frame in the log", record.id);
            }
            let payload = ledger_genesis::verify_genesis_record(record)
                .with_context(|| format!("genesis record {} failed self-validation", record.id))?;
            registry.apply_genesis(record.created_at, &payload);
            registry.apply_record(record);
            principals.apply_record(record);
            continue;
        }

        let expected_prev = tips.get(&record.author).copied();
        if record.prev != expected_prev {
            bail!(
                "broken chain for author {}: expected prev {:?}, record {} declares {:?}",
                record.author,
                expected_prev,
                record.id,
                record.prev
            );
        }
        if let Some(prev_ts) = last_ts.get(&record.author) {
            if record.created_at <= *prev_ts {
                bail!(
                    "non-monotonic timestamp for author {} at record {}: {} <= {}",
                    record.author,
                    record.id,
                    record.created_at,
                    prev_ts
                );
            }
        }

        validate_author_signature(record, &principals)
            .with_context(|| format!("bad author signature on record {}", record.id))?;

        if let Some(_tier) = record.kind.rollup_tier() {
            let payload: RollupPayload = serde_json::from_slice(&record.payload)
                .with_context(|| format!("bad rollup payload on {}", record.id))?;
            if !ledger_rollup::verify_summary_root(&record.covers, &payload.summary_root) {
                bail!("rollup {} summary_root does not match its covers", record.id);
            }
            rollups += 1;
        } else if record.tier == Tier::Page {
            pages += 1;
        }

        validate_prefinalized_record(record, &registry, &principals)
            .with_context(|| format!("quorum verification failed for record {}", record.id))?;

        registry.apply_record(record);
        principals.apply_record(record);
        tips.insert(record.author.clone(), record.id);
        last_ts.insert(record.author.clone(), record.created_at);
    }

    Ok(VerifyReport {
        records_checked: records.len() as u64,
        pages,
        rollups,
    })
}
