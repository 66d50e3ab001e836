pub mod principals;
pub mod quorum;
pub mod registry;
pub mod submission;

pub use principals::PrincipalRegistry;
pub use quorum::{ProposalSet, SignatureEvent, SubmitOutcome};
pub use registry::{
    RegistrySnapshot, ValidatorRecord, ValidatorRegistry, ValidatorSnapshotEntry, ValidatorStatus,
};
pub use submission::{
    finalize, now_ns, validate_author_signature, validate_key_rotation_signature,
    validate_payload_schema, validate_prefinalized_record, validate_proposal,
    validate_quorum_signature,
};
