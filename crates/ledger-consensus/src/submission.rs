//! The submission pipeline: local validation of a freshly author-signed
//! proposal — content addressing, chain continuity, monotone timestamps,
//! payload schema conformance, and author signature — plus signature
//! verification for both the author and each quorum co-signer. This sits
//! between `ledger-core`'s pure record type and `ledger-store`'s storage
//! concerns — `ledger_store::RecordStore::append` only re-checks what it can
//! cheaply verify itself (duplicate id, clock skew, payload size); every
//! consensus-dependent check (chain continuity, signatures, quorum
//! membership) happens here first.

use ledger_core::error::{LedgerError, LedgerResult};
use ledger_core::record::{
    AmendmentProposedPayload, FlagRaisedPayload, GenesisPayload, KeyRotatedPayload,
    ModerationDecidedPayload, Record, RecordKind, TokenAwardedPayload, UserRegisteredPayload,
    ValidatorAddedPayload, ValidatorPausedPayload, ValidatorRevokedPayload, VoteCastPayload,
};
use ledger_core::types::{RecordId, Signature, Timestamp, ValidatorId};
use ledger_store::RecordStore;

use crate::principals::PrincipalRegistry;
use crate::registry::ValidatorRegistry;

/// Check that `payload` decodes under the schema bound to `kind`. Rollup
/// payloads are validated by `ledger-rollup`, which constructs them
/// directly rather than accepting them from an external proposer.
pub fn validate_payload_schema(kind: RecordKind, payload: &[u8]) -> LedgerResult<()> {
    let ok = match kind {
        RecordKind::Genesis => serde_json::from_slice::<GenesisPayload>(payload).is_ok(),
        RecordKind::UserRegistered => serde_json::from_slice::<UserRegisteredPayload>(payload).is_ok(),
        RecordKind::VoteCast => serde_json::from_slice::<VoteCastPayload>(payload).is_ok(),
        RecordKind::FlagRaised => serde_json::from_slice::<FlagRaisedPayload>(payload).is_ok(),
        RecordKind::ModerationDecided => {
            serde_json::from_slice::<ModerationDecidedPayload>(payload).is_ok()
        }
        RecordKind::ValidatorAdded => serde_json::from_slice::<ValidatorAddedPayload>(payload).is_ok(),
        RecordKind::ValidatorPaused => serde_json::from_slice::<ValidatorPausedPayload>(payload).is_ok(),
        RecordKind::ValidatorRevoked => {
            serde_json::from_slice::<ValidatorRevokedPayload>(payload).is_ok()
        }
        RecordKind::KeyRotated => serde_json::from_slice::<KeyRotatedPayload>(payload).is_ok(),
        RecordKind::AmendmentProposed => {
            serde_json::from_slice::<AmendmentProposedPayload>(payload).is_ok()
        }
        RecordKind::TokenAwarded => serde_json::from_slice::<TokenAwardedPayload>(payload).is_ok(),
        RecordKind::RollupChapter
        | RecordKind::RollupBook
        | RecordKind::RollupPart
        | RecordKind::RollupSeries => {
            serde_json::from_slice::<ledger_core::record::RollupPayload>(payload).is_ok()
        }
        RecordKind::AuthorEquivocationDetected => serde_json::from_slice::<
            ledger_core::record::AuthorEquivocationDetectedPayload,
        >(payload)
        .is_ok(),
        RecordKind::PeerHealthReport => {
            serde_json::from_slice::<ledger_core::record::PeerHealthReportPayload>(payload).is_ok()
        }
    };
    if ok {
        Ok(())
    } else {
        Err(LedgerError::Malformed(format!(
            "payload does not conform to schema for kind {}",
            kind.as_str()
        )))
    }
}

/// Local validation of a freshly proposed (not-yet-quorum-signed) record:
/// everything except quorum membership, which is the `ProposalSet`'s job.
/// Genesis is validated separately by `ledger-genesis`, since it has no
/// prior chain to check against.
pub fn validate_proposal(
    record: &Record,
    store: &RecordStore,
    principals: &PrincipalRegistry,
) -> LedgerResult<()> {
    // Content addressing: the declared id must match the canonical hash.
    let expected_id = record.compute_id();
    if expected_id != record.id {
        return Err(LedgerError::Malformed(format!(
            "id mismatch: declared {}, computed {}",
            record.id, expected_id
        )));
    }

    // Kind/payload conformance.
    validate_payload_schema(record.kind, &record.payload)?;

    // Per-author chain continuity and monotone timestamps.
    let tip = store.tip(&record.author)?;
    if record.prev != tip {
        return Err(LedgerError::BrokenChain {
            expected: tip.map(|id| id.to_hex()),
            got: record.prev.map(|id| id.to_hex()),
        });
    }
    if let Some(prev_id) = record.prev {
        if let Some(prev_record) = store.get(&prev_id)? {
            if record.created_at <= prev_record.created_at {
                return Err(LedgerError::NonMonotonicTimestamp {
                    author: record.author.0.clone(),
                    ts: record.created_at,
                    prev_ts: prev_record.created_at,
                });
            }
        }
    }

    // Author signature. `key_rotated` is signed by the *old* key and
    // `user_registered` is signed by the key it is itself introducing —
    // neither author has an entry in `principals` yet at the point their
    // own page is being validated, so both are checked against the key
    // carried in their own payload rather than the registry.
    validate_author_signature(record, principals)?;

    Ok(())
}

/// Verify `record.author_sig` against the appropriate key for `record.kind`:
/// the payload's own key for the two kinds that introduce a principal's key
/// (`user_registered`) or change it (`key_rotated`, checked against the
/// *old* key), and the principal registry's currently-known key otherwise.
pub fn validate_author_signature(record: &Record, principals: &PrincipalRegistry) -> LedgerResult<()> {
    match record.kind {
        RecordKind::KeyRotated => return validate_key_rotation_signature(record),
        RecordKind::UserRegistered => {
            let payload: UserRegisteredPayload = serde_json::from_slice(&record.payload)
                .map_err(|e| LedgerError::Malformed(e.to_string()))?;
            return ledger_crypto::verify_signature(
                &payload.public_key,
                &record.signing_bytes(),
                &record.author_sig,
            )
            .map_err(|_| LedgerError::BadSignature);
        }
        _ => {}
    }
    let key = principals
        .key_of(&record.author)
        .ok_or_else(|| LedgerError::UnknownAuthor(record.author.0.clone()))?;
    ledger_crypto::verify_signature(key, &record.signing_bytes(), &record.author_sig)
        .map_err(|_| LedgerError::BadSignature)
}

/// Verify a `key_rotated` proposal's author signature against the *old* key
/// carried in its own payload.
pub fn validate_key_rotation_signature(record: &Record) -> LedgerResult<()> {
    let payload: KeyRotatedPayload = serde_json::from_slice(&record.payload)
        .map_err(|e| LedgerError::Malformed(e.to_string()))?;
    ledger_crypto::verify_signature(
        &payload.old_public_key,
        &record.signing_bytes(),
        &record.author_sig,
    )
    .map_err(|_| LedgerError::BadSignature)
}

/// Verify one quorum co-signature: the signer must be an active validator
/// at `record`'s `created_at`, and the signature must verify under its
/// registered key.
pub fn validate_quorum_signature(
    record: &Record,
    validator_id: &ValidatorId,
    signature: &Signature,
    registry: &ValidatorRegistry,
) -> LedgerResult<()> {
    let validator = registry
        .get(validator_id)
        .ok_or_else(|| LedgerError::UnknownValidator(validator_id.0.clone()))?;
    if !registry.verify_member(validator_id, &validator.public_key, record.created_at) {
        return Err(LedgerError::BadQuorum {
            need: registry.quorum_size(record.created_at),
            got: 0,
        });
    }
    ledger_crypto::verify_signature(&validator.public_key, &record.signing_bytes(), signature)
        .map_err(|_| LedgerError::BadSignature)
}

/// Re-verify every signature on a record that arrives *already*
/// quorum-signed (catch-up sync's fast path), end to end, and
/// confirm the collected signatures actually meet the quorum rule at the
/// record's `created_at`.
pub fn validate_prefinalized_record(
    record: &Record,
    registry: &ValidatorRegistry,
    principals: &PrincipalRegistry,
) -> LedgerResult<()> {
    validate_author_signature(record, principals)?;

    let active = registry.active_set(record.created_at);
    let mut weight = 0u64;
    for qs in &record.quorum_sigs {
        validate_quorum_signature(record, &qs.validator_id, &qs.signature, registry)?;
        if let Some(v) = active.iter().find(|v| v.id == qs.validator_id) {
            weight += v.weight;
        }
    }
    let needed = registry.quorum_size(record.created_at);
    if (weight as usize) < needed {
        return Err(LedgerError::BadQuorum {
            need: needed,
            got: weight as usize,
        });
    }
    Ok(())
}

/// Clock-skew-checked "now" in the nanosecond resolution records use,
/// shared by proposal construction and deadline bookkeeping.
pub fn now_ns() -> Timestamp {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i64
}

/// Append an already-validated, quorum-complete record to the store.
/// `DuplicateId` is treated as idempotent success.
pub fn finalize(record: &Record, store: &mut RecordStore) -> LedgerResult<RecordId> {
    match store.append(record) {
        Ok(id) => Ok(id),
        Err(LedgerError::DuplicateId(_)) => Ok(record.id),
        Err(e) => Err(e),
    }
}
