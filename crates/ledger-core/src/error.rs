use thiserror::Error;

/// Error kinds surfaced to callers of `append` and the validation pipeline.
///
/// Matches the append outcomes a submitting client or peer needs to
/// distinguish: which ones are safe to retry, which are idempotent, and which
/// indicate the local node itself is unhealthy.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("bad signature")]
    BadSignature,

    #[error("quorum not satisfied: need {need}, got {got}")]
    BadQuorum { need: usize, got: usize },

    #[error("duplicate record id: {0}")]
    DuplicateId(String),

    #[error("author equivocation detected for {author} at prev {prev}")]
    AuthorEquivocation { author: String, prev: String },

    #[error("backpressure: {0}")]
    Backpressure(String),

    #[error("timed out waiting for quorum on {0}")]
    Timeout(String),

    #[error("io error: {0}")]
    IoError(String),

    #[error("protocol version mismatch: local {local}, peer {peer}")]
    ProtocolVersionMismatch { local: u32, peer: u32 },

    #[error("unknown validator: {0}")]
    UnknownValidator(String),

    #[error("unknown author: {0}")]
    UnknownAuthor(String),

    #[error("clock skew: record timestamp {ts} is more than {tolerance_secs}s ahead of local clock")]
    ClockSkew { ts: i64, tolerance_secs: i64 },

    #[error("payload too large: {size} bytes, max {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("broken chain: expected prev {expected:?}, got {got:?}")]
    BrokenChain {
        expected: Option<String>,
        got: Option<String>,
    },

    #[error("non-monotonic timestamp for author {author}: {ts} <= previous {prev_ts}")]
    NonMonotonicTimestamp {
        author: String,
        ts: i64,
        prev_ts: i64,
    },

    #[error("bad rollup coverage: {0}")]
    BadRollupCoverage(String),

    #[error("genesis record invalid: {0}")]
    InvalidGenesis(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
