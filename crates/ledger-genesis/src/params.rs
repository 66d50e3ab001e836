use ledger_core::record::GenesisValidator;
use ledger_core::types::PrincipalId;
use serde::{Deserialize, Serialize};

/// Input to `build_genesis`: the founding validator set, quorum mode, and
/// the principals pre-registered in the founding document.
///
/// In production these are produced by a key ceremony and distributed to
/// every founding validator ahead of time; in tests fresh keypairs are
/// generated (see `ledger-node`'s `ledger init --genesis` flow).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisParams {
    pub founding_validators: Vec<GenesisValidator>,
    /// "majority" | "weighted" — this implementation treats both as
    /// weighted-majority over `weight`, recorded here only for
    /// operator-facing diagnostics.
    pub quorum_mode: String,
    pub genesis_principals: Vec<PrincipalId>,
}
