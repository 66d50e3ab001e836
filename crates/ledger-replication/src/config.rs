use ledger_core::constants::DEFAULT_T_SYNC_SECS;

/// Configuration for a node's replication layer.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Local listen address (e.g. "/ip4/0.0.0.0/tcp/7777").
    pub listen_addr: String,
    /// Bootstrap peer multiaddresses.
    pub bootstrap_peers: Vec<String>,
    /// Protocol version string advertised to peers; a mismatch on the
    /// `Hello` handshake closes the connection.
    pub protocol_version: String,
    /// GossipSub topic name for `SubmitProposal` broadcast.
    pub proposal_topic: String,
    /// Pull-sync interval (`T_sync`, §4.6).
    pub t_sync_secs: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/7777".into(),
            bootstrap_peers: Vec::new(),
            protocol_version: "/ledger/1.0.0".into(),
            proposal_topic: "ledger-proposals".into(),
            t_sync_secs: DEFAULT_T_SYNC_SECS,
        }
    }
}
