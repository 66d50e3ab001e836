//! Inclusion proofs (§4.7 `prove`/`verify`, §8 scenario 6): a self-contained
//! chain of rollup steps from a page up through chapter -> book -> part ->
//! series, letting a third party confirm the page is covered by the latest
//! series root without touching the store.

use ledger_core::api::{InclusionProof, ProofStep};
use ledger_core::error::{LedgerError, LedgerResult};
use ledger_core::record::{RollupPayload, Tier};
use ledger_core::types::RecordId;
use ledger_store::RecordStore;

use crate::tiers::parent_tier;

/// Build the inclusion proof for `id`: walk up the covering chain
/// (chapter, then book, then part, then series), recording each rollup's
/// full `covers` list and the target's position within it.
///
/// Returns `NotFound`-style `LedgerError::Malformed` if `id` isn't durable,
/// or if any tier in the chain hasn't been rolled up yet — a proof can only
/// be produced once the covering chain reaches `Series`.
pub fn build_inclusion_proof(store: &RecordStore, id: &RecordId) -> LedgerResult<InclusionProof> {
    let record = store
        .get(id)?
        .ok_or_else(|| LedgerError::Malformed(format!("no such record {id}")))?;

    let mut steps = Vec::new();
    let mut cur_id = *id;
    let mut cur_tier = record.tier;

    loop {
        let next_tier = match parent_tier(cur_tier) {
            Some(t) => t,
            None => break,
        };
        let rollup = store.find_covering(next_tier, &cur_id)?.ok_or_else(|| {
            LedgerError::Malformed(format!(
                "record {cur_id} not yet covered by a {next_tier:?} rollup"
            ))
        })?;
        let payload: RollupPayload = serde_json::from_slice(&rollup.payload)
            .map_err(|e| LedgerError::Malformed(e.to_string()))?;
        let index = rollup
            .covers
            .iter()
            .position(|c| *c == cur_id)
            .ok_or_else(|| LedgerError::Malformed("id missing from its own covering rollup".into()))?;

        steps.push(ProofStep {
            tier: next_tier,
            rollup_id: rollup.id,
            siblings: rollup.covers.clone(),
            index,
            summary_root: payload.summary_root,
        });

        cur_id = rollup.id;
        cur_tier = next_tier;
        if next_tier == Tier::Series {
            break;
        }
    }

    Ok(InclusionProof { record_id: *id, steps })
}

/// Recompute every step's summary root from its sibling list and confirm
/// each step's claimed child position actually holds the previous step's
/// id — tamper-evident against corruption of any single byte, since
/// changing any sibling id changes the recomputed root.
pub fn verify_inclusion_proof(proof: &InclusionProof) -> bool {
    let mut cur_id = proof.record_id;
    for step in &proof.steps {
        if step.index >= step.siblings.len() || step.siblings[step.index] != cur_id {
            return false;
        }
        let hashes: Vec<[u8; 32]> = step.siblings.iter().map(|id| *id.as_bytes()).collect();
        let recomputed = ledger_crypto::merkle_summary_root(&hashes);
        if recomputed != step.summary_root {
            return false;
        }
        cur_id = step.rollup_id;
    }
    !proof.steps.is_empty() && proof.steps.last().map(|s| s.tier) == Some(Tier::Series)
}
