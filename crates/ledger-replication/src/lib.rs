//! ledger-replication
//!
//! Peer-to-peer replication layer (§4.6): libp2p networking, the
//! `Hello` mutual-auth handshake, and in-memory peer health bookkeeping
//! that gets folded into `peer_health_report` pages.
//!
//! GossipSub broadcasts proposals and freshly finalized records.
//! Kademlia DHT handles peer discovery and bootstrap.
//! Identify and Ping maintain connection metadata and liveness.
//! A CBOR request/response protocol drives the pull-sync (`Head` +
//! `GetRange`) and `Health` RPCs.

pub mod auth;
pub mod config;
pub mod message;
pub mod network;
pub mod peer;

pub use auth::{sign_hello, verify_hello};
pub use config::ReplicationConfig;
pub use message::{GossipMessage, HeadInfo, HealthInfo, ReplicationRequest, ReplicationResponse};
pub use network::{NetworkEvent, ReplicationHandle, ReplicationNetwork};
pub use peer::{PeerLink, PeerTable};
