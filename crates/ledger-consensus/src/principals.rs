//! Principal key registry: tracks the currently-registered signing key for
//! every author, derived by replaying `user_registered`/`key_rotated`
//! records and the genesis principal list.
//!
//! This is what `author_sig` is checked against — distinct from
//! `ValidatorRegistry`, which governs `quorum_sigs`.

use std::collections::HashMap;

use ledger_core::record::{KeyRotatedPayload, Record, RecordKind, UserRegisteredPayload};
use ledger_core::types::{PrincipalId, PublicKey};

#[derive(Clone, Debug, Default)]
pub struct PrincipalRegistry {
    keys: HashMap<PrincipalId, PublicKey>,
}

impl PrincipalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, principal: PrincipalId, public_key: PublicKey) {
        self.keys.insert(principal, public_key);
    }

    /// Look up the registered key for `principal`, if any. A principal's
    /// first `user_registered` page (and a `key_rotated` page's old key)
    /// has no prior entry here by construction — those two kinds are
    /// verified against the key carried in their own payload instead
    /// (`submission::validate_author_signature`), never through this
    /// lookup.
    pub fn key_of(&self, principal: &PrincipalId) -> Option<&PublicKey> {
        self.keys.get(principal)
    }

    /// Apply a durable record's effect on principal keys. Only
    /// `user_registered` and `key_rotated` records mutate this registry.
    pub fn apply_record(&mut self, record: &Record) {
        match record.kind {
            RecordKind::UserRegistered => {
                if let Ok(payload) = serde_json::from_slice::<UserRegisteredPayload>(&record.payload) {
                    self.register(record.author.clone(), payload.public_key);
                }
            }
            RecordKind::KeyRotated => {
                if let Ok(payload) = serde_json::from_slice::<KeyRotatedPayload>(&record.payload) {
                    self.register(record.author.clone(), payload.new_public_key);
                }
            }
            _ => {}
        }
    }
}
