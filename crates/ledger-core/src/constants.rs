//! Protocol constants: rollup tier periods, consensus timeouts, and
//! validation limits.

// ── Rollup tiers ─────────────────────────────────────────────────────────────

/// Chapter boundary: every 24h at 00:00 UTC.
pub const CHAPTER_PERIOD_SECS: i64 = 24 * 3600;

/// Book and part boundaries are calendar-month / calendar-year, computed from
/// the UTC calendar rather than a fixed duration (months and years vary in
/// length); see `ledger-rollup::tiers` for the boundary arithmetic.
///
/// Series boundary: one decade (ten calendar years), same caveat.
pub const SERIES_PERIOD_YEARS: u32 = 10;

// ── Consensus timing ─────────────────────────────────────────────────────────

/// Default proposal deadline: a proposal not reaching quorum within this
/// window times out.
pub const DEFAULT_T_PROP_SECS: u64 = 60;

/// Default peer pull-sync interval.
pub const DEFAULT_T_SYNC_SECS: u64 = 30;

/// Rollup-leader failover: if the elected leader hasn't produced a rollup
/// record within `T_LEADER_MULTIPLE * T_prop`, the next-ranked validator
/// takes over.
pub const T_LEADER_MULTIPLE: u64 = 5;

pub fn t_leader_secs(t_prop_secs: u64) -> u64 {
    T_LEADER_MULTIPLE * t_prop_secs
}

// ── Clock / validation limits ────────────────────────────────────────────────

/// Records timestamped more than this far in the future (relative to the
/// accepting node's clock) are rejected.
pub const CLOCK_SKEW_TOLERANCE_SECS: i64 = 30;

/// Maximum payload size, in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Maximum number of covered record ids in a single rollup record.
pub const MAX_COVERS_PER_ROLLUP: usize = 100_000;

// ── Replication ───────────────────────────────────────────────────────────────

/// `GetRange` page size cap, in bytes, per pull-sync round.
pub const MAX_SYNC_PAGE_BYTES: usize = 1024 * 1024;

/// Consecutive validation failures from a peer before it is quarantined
/// (excluded from future pulls until it re-validates).
pub const PEER_FAILURE_QUARANTINE_THRESHOLD: u64 = 5;
