//! `PeerLink` bookkeeping (§3 data model). Kept in memory per node and
//! periodically folded into a `peer_health_report` page — there is no
//! separate peers-database; the ledger's own log is where operational
//! health becomes durable (§7: "the ledger itself documents operational
//! health").

use std::collections::HashMap;

use ledger_core::constants::PEER_FAILURE_QUARANTINE_THRESHOLD;
use ledger_core::record::{PeerHealthEntry, PeerHealthReportPayload};
use ledger_core::types::Timestamp;

#[derive(Debug, Clone)]
pub struct PeerLink {
    pub peer_id: String,
    pub address: String,
    pub last_healthy_at: Option<Timestamp>,
    pub height_seen: u64,
    pub failure_count: u64,
    pub quarantined: bool,
}

impl PeerLink {
    fn new(peer_id: String, address: String) -> Self {
        Self {
            peer_id,
            address,
            last_healthy_at: None,
            height_seen: 0,
            failure_count: 0,
            quarantined: false,
        }
    }
}

/// All known peers, keyed by peer id string (libp2p `PeerId::to_string()`).
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<String, PeerLink>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn learn(&mut self, peer_id: &str, address: &str) {
        self.peers
            .entry(peer_id.to_string())
            .or_insert_with(|| PeerLink::new(peer_id.to_string(), address.to_string()));
    }

    /// A successful `Head`/`GetRange` round: clears the failure streak and
    /// records the peer's reported height.
    pub fn record_success(&mut self, peer_id: &str, height: u64, at: Timestamp) {
        if let Some(link) = self.peers.get_mut(peer_id) {
            link.failure_count = 0;
            link.height_seen = height;
            link.last_healthy_at = Some(at);
            link.quarantined = false;
        }
    }

    /// A record from this peer failed local validation. Quarantines the
    /// peer once `failure_count` crosses the threshold (§4.6: "a peer
    /// exceeding a failure threshold is quarantined").
    pub fn record_failure(&mut self, peer_id: &str) {
        if let Some(link) = self.peers.get_mut(peer_id) {
            link.failure_count += 1;
            if link.failure_count >= PEER_FAILURE_QUARANTINE_THRESHOLD {
                link.quarantined = true;
            }
        }
    }

    /// Lift quarantine after the peer re-validates (serves a clean
    /// `GetRange`/`Head` round).
    pub fn unquarantine(&mut self, peer_id: &str) {
        if let Some(link) = self.peers.get_mut(peer_id) {
            link.quarantined = false;
            link.failure_count = 0;
        }
    }

    pub fn is_quarantined(&self, peer_id: &str) -> bool {
        self.peers.get(peer_id).map(|l| l.quarantined).unwrap_or(false)
    }

    /// Peers eligible for the next pull-sync round (known, not quarantined).
    pub fn sync_targets(&self) -> Vec<PeerLink> {
        self.peers.values().filter(|l| !l.quarantined).cloned().collect()
    }

    /// Fold current peer state into a `peer_health_report` payload, ready
    /// to submit as a page through the normal proposal pipeline.
    pub fn to_health_report_payload(&self) -> PeerHealthReportPayload {
        let mut peer_reports: Vec<PeerHealthEntry> = self
            .peers
            .values()
            .map(|l| PeerHealthEntry {
                peer_id: l.peer_id.clone(),
                failure_count: l.failure_count,
                quarantined: l.quarantined,
            })
            .collect();
        peer_reports.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        PeerHealthReportPayload { peer_reports }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarantines_after_threshold_failures() {
        let mut table = PeerTable::new();
        table.learn("peerA", "/ip4/127.0.0.1/tcp/1");
        for _ in 0..PEER_FAILURE_QUARANTINE_THRESHOLD {
            table.record_failure("peerA");
        }
        assert!(table.is_quarantined("peerA"));
        assert!(table.sync_targets().is_empty());
    }

    #[test]
    fn success_clears_failure_streak() {
        let mut table = PeerTable::new();
        table.learn("peerA", "/ip4/127.0.0.1/tcp/1");
        table.record_failure("peerA");
        table.record_success("peerA", 10, 1_000);
        assert_eq!(table.sync_targets()[0].failure_count, 0);
    }

    #[test]
    fn health_report_is_sorted_by_peer_id() {
        let mut table = PeerTable::new();
        table.learn("zzz", "/ip4/0.0.0.0/tcp/1");
        table.learn("aaa", "/ip4/0.0.0.0/tcp/2");
        let report = table.to_health_report_payload();
        assert_eq!(report.peer_reports[0].peer_id, "aaa");
        assert_eq!(report.peer_reports[1].peer_id, "zzz");
    }
}
