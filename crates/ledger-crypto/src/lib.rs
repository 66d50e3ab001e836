pub mod dilithium;
pub mod hash;
pub mod keypair;

pub use dilithium::{verify_signature, Signer};
pub use hash::{blake3_hash, merkle_summary_root};
pub use keypair::KeyPair;
