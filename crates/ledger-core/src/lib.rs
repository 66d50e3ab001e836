pub mod api;
pub mod canonical;
pub mod constants;
pub mod error;
pub mod record;
pub mod types;

pub use api::{InclusionProof, LedgerApi, ProofStep, RecordFilter, RecordSink};
pub use constants::*;
pub use error::{LedgerError, LedgerResult};
pub use record::{
    AmendmentProposedPayload, AuthorEquivocationDetectedPayload, FlagRaisedPayload,
    GenesisPayload, GenesisValidator, KeyRotatedPayload, ModerationDecidedPayload,
    PeerHealthEntry, PeerHealthReportPayload, QuorumSig, Record, RecordKind, RollupPayload, Tier,
    TokenAwardedPayload, UserRegisteredPayload, ValidatorAddedPayload, ValidatorPausedPayload,
    ValidatorRevokedPayload, VoteCastPayload,
};
pub use types::{PrincipalId, PublicKey, RecordId, Signature, Timestamp, ValidatorId};
