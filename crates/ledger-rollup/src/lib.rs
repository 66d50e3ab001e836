//! Rollup Engine (C5): deterministic periodic aggregation of durable
//! records into chapter/book/part/series summaries, each a Merkle-style
//! digest over its children in canonical order. No side-channel admin API —
//! every rollup is itself a quorum-signed record, produced by whichever
//! validator is the deterministic leader for that interval.

pub mod engine;
pub mod leader;
pub mod proof;
pub mod scheduler;
pub mod tiers;

pub use engine::{build_rollup, covered_records, empty_summary_root, verify_summary_root};
pub use leader::{effective_leader, leader_at};
pub use proof::{build_inclusion_proof, verify_inclusion_proof};
pub use scheduler::RollupScheduler;
pub use tiers::{boundary_after, interval_for, parent_tier};
