//! `Hello` handshake signing/verification (§4.6 "Security"): mutual
//! authentication layered above noise's transport-level peer auth. A
//! validator proves control of its registry key by signing its own
//! libp2p `PeerId` bytes.

use ledger_consensus::ValidatorRegistry;
use ledger_core::types::{Signature, Timestamp, ValidatorId};
use ledger_crypto::KeyPair;

pub fn sign_hello(keypair: &KeyPair, local_peer_id_bytes: &[u8]) -> Signature {
    keypair.sign(local_peer_id_bytes)
}

/// Verifies a peer's `Hello { validator_id, signature }` against the
/// registry as of `at`. `remote_peer_id_bytes` must be the *responder's*
/// view of the connecting peer's `PeerId`, since that's what the sender
/// signed.
pub fn verify_hello(
    registry: &ValidatorRegistry,
    validator_id: &ValidatorId,
    signature: &Signature,
    remote_peer_id_bytes: &[u8],
    at: Timestamp,
) -> bool {
    match registry.get(validator_id) {
        Some(record) => {
            registry.verify_member(validator_id, &record.public_key, at)
                && ledger_crypto::verify_signature(&record.public_key, remote_peer_id_bytes, signature).is_ok()
        }
        None => false,
    }
}
