//! Genesis (invariant 7): builds and validates the one `tier=genesis`
//! record — self-referential (`prev=None`), naming the founding validator
//! set and quorum rule. Genesis predates any registry, so it can't be
//! checked against one: its own payload is both the thing being attested
//! and the key material used to attest it. Authored by the founding
//! validator with the lowest id (the same deterministic tie-break
//! `ledger-rollup`'s leader election uses), and co-signed by as many
//! founding validators as a key ceremony gathers.

pub mod params;

pub use params::GenesisParams;

use std::collections::{BTreeMap, HashSet};

use ledger_core::error::{LedgerError, LedgerResult};
use ledger_core::record::{GenesisPayload, QuorumSig, Record, RecordKind, Tier};
use ledger_core::types::{PrincipalId, RecordId, Signature, Timestamp, ValidatorId};
use ledger_crypto::KeyPair;
use tracing::info;

/// Build the genesis record from `params`, signed by `keypairs` — a map
/// from founding validator id to the keypair a key ceremony produced for
/// it. At minimum this must cover the author (the lowest-id validator)
/// and enough others to meet the weighted-majority quorum over the
/// founding set's own weights; anything short of that is rejected here
/// rather than producing a record nobody else can durably accept.
pub fn build_genesis_record(
    params: &GenesisParams,
    created_at: Timestamp,
    keypairs: &BTreeMap<ValidatorId, KeyPair>,
) -> LedgerResult<Record> {
    if params.founding_validators.is_empty() {
        return Err(LedgerError::InvalidGenesis("no founding validators named".into()));
    }

    let author_id = params
        .founding_validators
        .iter()
        .map(|v| v.validator_id.clone())
        .min()
        .expect("checked non-empty above");
    let author_keypair = keypairs.get(&author_id).ok_or_else(|| {
        LedgerError::InvalidGenesis(format!("missing signing key for genesis author {author_id}"))
    })?;

    let payload = GenesisPayload {
        founding_validators: params.founding_validators.clone(),
        quorum_mode: params.quorum_mode.clone(),
        genesis_principals: params.genesis_principals.clone(),
    };
    let payload_bytes =
        serde_json::to_vec(&payload).map_err(|e| LedgerError::Serialization(e.to_string()))?;

    let mut record = Record {
        id: RecordId::from_bytes([0u8; 32]),
        kind: RecordKind::Genesis,
        author: PrincipalId(author_id.0.clone()),
        tier: Tier::Genesis,
        created_at,
        prev: None,
        payload: payload_bytes,
        author_sig: Signature(Vec::new()),
        quorum_sigs: vec![],
        covers: vec![],
    };
    record.id = record.compute_id();

    let signing_bytes = record.signing_bytes();
    record.author_sig = author_keypair.sign(&signing_bytes);

    let mut sigs: Vec<QuorumSig> = params
        .founding_validators
        .iter()
        .filter_map(|v| keypairs.get(&v.validator_id).map(|kp| (v, kp)))
        .map(|(v, kp)| QuorumSig {
            validator_id: v.validator_id.clone(),
            signature: kp.sign(&signing_bytes),
        })
        .collect();
    sigs.sort_by(|a, b| a.validator_id.0.cmp(&b.validator_id.0));

    let total_weight: u64 = params.founding_validators.iter().map(|v| v.weight).sum();
    let needed = total_weight / 2 + 1;
    let signed_weight: u64 = sigs
        .iter()
        .filter_map(|s| {
            params
                .founding_validators
                .iter()
                .find(|v| v.validator_id == s.validator_id)
        })
        .map(|v| v.weight)
        .sum();
    if signed_weight < needed {
        return Err(LedgerError::InvalidGenesis(format!(
            "insufficient genesis co-signatures: have weight {signed_weight}, need {needed}"
        )));
    }

    record.quorum_sigs = sigs;
    info!(
        validators = params.founding_validators.len(),
        principals = params.genesis_principals.len(),
        author = %author_id,
        "built genesis record"
    );
    Ok(record)
}

/// Validate a genesis record entirely against its own payload (invariant
/// 7 plus signature well-formedness) and return the decoded payload for
/// the caller to seed the validator registry from. Run this in place of
/// `ledger_consensus::submission::validate_prefinalized_record` for the
/// one record at `tier=genesis` — every other kind is checked against a
/// registry genesis itself hasn't populated yet.
pub fn verify_genesis_record(record: &Record) -> LedgerResult<GenesisPayload> {
    if record.tier != Tier::Genesis || record.kind != RecordKind::Genesis {
        return Err(LedgerError::InvalidGenesis("not a genesis record".into()));
    }
    if record.prev.is_some() {
        return Err(LedgerError::InvalidGenesis(
            "genesis must be self-referential (prev=None)".into(),
        ));
    }
    if record.compute_id() != record.id {
        return Err(LedgerError::InvalidGenesis(
            "declared id does not match its canonical hash".into(),
        ));
    }

    let payload: GenesisPayload = serde_json::from_slice(&record.payload)
        .map_err(|e| LedgerError::InvalidGenesis(format!("bad genesis payload: {e}")))?;
    if payload.founding_validators.is_empty() {
        return Err(LedgerError::InvalidGenesis("genesis payload names no validators".into()));
    }

    let author = payload
        .founding_validators
        .iter()
        .find(|v| v.validator_id.0 == record.author.0)
        .ok_or_else(|| LedgerError::InvalidGenesis("author is not a named founding validator".into()))?;

    let signing_bytes = record.signing_bytes();
    ledger_crypto::verify_signature(&author.public_key, &signing_bytes, &record.author_sig)
        .map_err(|_| LedgerError::BadSignature)?;

    let mut seen = HashSet::new();
    let mut signed_weight: u64 = 0;
    for qs in &record.quorum_sigs {
        let v = payload
            .founding_validators
            .iter()
            .find(|v| v.validator_id == qs.validator_id)
            .ok_or_else(|| LedgerError::UnknownValidator(qs.validator_id.0.clone()))?;
        ledger_crypto::verify_signature(&v.public_key, &signing_bytes, &qs.signature)
            .map_err(|_| LedgerError::BadSignature)?;
        if seen.insert(qs.validator_id.clone()) {
            signed_weight += v.weight;
        }
    }

    let total_weight: u64 = payload.founding_validators.iter().map(|v| v.weight).sum();
    let needed = total_weight / 2 + 1;
    if signed_weight < needed {
        return Err(LedgerError::BadQuorum {
            need: needed as usize,
            got: signed_weight as usize,
        });
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::record::GenesisValidator;

    fn two_validator_params() -> (GenesisParams, BTreeMap<ValidatorId, KeyPair>) {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::generate();
        let params = GenesisParams {
            founding_validators: vec![
                GenesisValidator {
                    validator_id: ValidatorId("v1".into()),
                    public_key: kp1.public_key.clone(),
                    weight: 1,
                },
                GenesisValidator {
                    validator_id: ValidatorId("v2".into()),
                    public_key: kp2.public_key.clone(),
                    weight: 1,
                },
            ],
            quorum_mode: "majority".into(),
            genesis_principals: vec![PrincipalId("p1".into())],
        };
        let mut keys = BTreeMap::new();
        keys.insert(ValidatorId("v1".into()), kp1);
        keys.insert(ValidatorId("v2".into()), kp2);
        (params, keys)
    }

    #[test]
    fn builds_and_verifies_round_trip() {
        let (params, keys) = two_validator_params();
        let record = build_genesis_record(&params, 0, &keys).unwrap();
        assert_eq!(record.tier, Tier::Genesis);
        assert_eq!(record.prev, None);
        assert_eq!(record.author.0, "v1"); // lowest id

        let payload = verify_genesis_record(&record).unwrap();
        assert_eq!(payload.founding_validators.len(), 2);
    }

    #[test]
    fn missing_author_key_is_rejected() {
        let (params, mut keys) = two_validator_params();
        keys.remove(&ValidatorId("v1".into()));
        let err = build_genesis_record(&params, 0, &keys).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidGenesis(_)));
    }

    #[test]
    fn insufficient_cosigners_is_rejected() {
        let (params, mut keys) = two_validator_params();
        keys.remove(&ValidatorId("v2".into()));
        // Only v1 (weight 1 of 2) signs; needed = floor(2/2)+1 = 2.
        let err = build_genesis_record(&params, 0, &keys).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidGenesis(_)));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let (params, keys) = two_validator_params();
        let mut record = build_genesis_record(&params, 0, &keys).unwrap();
        record.payload = b"{}".to_vec();
        assert!(verify_genesis_record(&record).is_err());
    }
}
