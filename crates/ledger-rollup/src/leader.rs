//! Rollup-leader election (§4.5 step 1, and the leader-failover edge case).
//! Direct descendant of `ValidatorSet::ranked()` — deterministic ordering by
//! a field over the active set — generalized from "highest stake" to
//! "lowest id" and extended with a failover rule: if the elected leader
//! hasn't produced the expected rollup within `T_leader = 5 * T_prop` of the
//! boundary, the next-ranked validator takes over.

use ledger_consensus::ValidatorRegistry;
use ledger_core::constants::t_leader_secs;
use ledger_core::types::{Timestamp, ValidatorId};

/// The validator responsible for emitting the rollup record at boundary
/// `at`, assuming no failover has occurred yet: the active validator with
/// the lowest id, active-set membership evaluated at `at`.
pub fn leader_at(registry: &ValidatorRegistry, at: Timestamp) -> Option<ValidatorId> {
    registry
        .active_set(at)
        .into_iter()
        .map(|v| v.id.clone())
        .min()
}

fn active_ranked(registry: &ValidatorRegistry, at: Timestamp) -> Vec<ValidatorId> {
    let active: std::collections::HashSet<ValidatorId> =
        registry.active_set(at).into_iter().map(|v| v.id.clone()).collect();
    registry
        .ranked_by_id()
        .into_iter()
        .filter(|v| active.contains(&v.id))
        .map(|v| v.id.clone())
        .collect()
}

/// The validator that should actually emit the rollup for boundary `at`,
/// given the current time `now` and `t_prop_secs`: the primary leader until
/// `T_leader` elapses past the boundary without a rollup appearing, then the
/// next-ranked active validator, and so on — one failover step per
/// additional `T_leader` window elapsed.
pub fn effective_leader(
    registry: &ValidatorRegistry,
    at: Timestamp,
    now_secs: i64,
    boundary_secs: i64,
    t_prop_secs: u64,
) -> Option<ValidatorId> {
    let ranked = active_ranked(registry, at);
    if ranked.is_empty() {
        return None;
    }
    let elapsed = (now_secs - boundary_secs).max(0) as u64;
    let t_leader = t_leader_secs(t_prop_secs).max(1);
    let failovers = (elapsed / t_leader) as usize;
    ranked.into_iter().nth(failovers.min(usize::MAX))
        .or_else(|| None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::record::{GenesisPayload, GenesisValidator};
    use ledger_core::types::PublicKey;

    fn registry_with(ids: &[&str]) -> ValidatorRegistry {
        let mut reg = ValidatorRegistry::new();
        reg.apply_genesis(
            0,
            &GenesisPayload {
                founding_validators: ids
                    .iter()
                    .map(|id| GenesisValidator {
                        validator_id: ValidatorId((*id).into()),
                        public_key: PublicKey(vec![0; 8]),
                        weight: 1,
                    })
                    .collect(),
                quorum_mode: "majority".into(),
                genesis_principals: vec![],
            },
        );
        reg
    }

    #[test]
    fn leader_is_lowest_id() {
        let reg = registry_with(&["v3", "v1", "v2"]);
        assert_eq!(leader_at(&reg, 100), Some(ValidatorId("v1".into())));
    }

    #[test]
    fn failover_promotes_next_ranked_after_t_leader() {
        let reg = registry_with(&["v1", "v2", "v3"]);
        // Within the first T_leader window, v1 (lowest) is still responsible.
        let leader = effective_leader(&reg, 100, 1_000, 1_000, 60);
        assert_eq!(leader, Some(ValidatorId("v1".into())));

        // One T_leader window (5*60=300s) past the boundary: v2 takes over.
        let leader = effective_leader(&reg, 100, 1_000 + 300, 1_000, 60);
        assert_eq!(leader, Some(ValidatorId("v2".into())));

        // Two windows past: v3.
        let leader = effective_leader(&reg, 100, 1_000 + 600, 1_000, 60);
        assert_eq!(leader, Some(ValidatorId("v3".into())));
    }

    #[test]
    fn empty_active_set_has_no_leader() {
        let reg = ValidatorRegistry::new();
        assert_eq!(leader_at(&reg, 100), None);
    }
}
