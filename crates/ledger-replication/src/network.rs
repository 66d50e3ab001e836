//! Combined libp2p network behaviour (§4.6): GossipSub for proposal/
//! finalized broadcast, Kademlia for peer discovery, Identify/Ping for
//! liveness, and a CBOR request/response protocol for the pull-sync and
//! health RPCs.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use futures::StreamExt;
use libp2p::{
    gossipsub, identify, kad, noise, ping, request_response, tcp, yamux,
    swarm::SwarmEvent,
    Multiaddr, PeerId, Swarm,
};
use libp2p_swarm::NetworkBehaviour;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ReplicationConfig;
use crate::message::{GossipMessage, ReplicationRequest, ReplicationResponse};

const RPC_PROTOCOL: &str = "/ledger/rpc/1.0.0";

/// Combined libp2p network behaviour. The `#[derive(NetworkBehaviour)]`
/// macro auto-generates a `ReplicationBehaviourEvent` enum with one
/// variant per field.
#[derive(NetworkBehaviour)]
pub struct ReplicationBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    pub rpc: request_response::cbor::Behaviour<ReplicationRequest, ReplicationResponse>,
}

/// An event surfaced to the application layer (ledger-node).
pub enum NetworkEvent {
    Gossip(PeerId, GossipMessage),
    Request {
        peer: PeerId,
        request: ReplicationRequest,
        channel: request_response::ResponseChannel<ReplicationResponse>,
    },
    Response {
        peer: PeerId,
        response: ReplicationResponse,
    },
    PeerDiscovered {
        peer: PeerId,
        address: Multiaddr,
    },
}

/// Application-facing handle returned from `ReplicationNetwork::new()`.
pub struct ReplicationHandle {
    /// Send here to broadcast a message to all gossip peers.
    pub outbound_gossip_tx: mpsc::Sender<GossipMessage>,
    /// Send here to issue an outbound request/response RPC.
    pub request_tx: mpsc::Sender<(PeerId, ReplicationRequest)>,
    /// Send here to answer an inbound request surfaced via
    /// `NetworkEvent::Request`.
    pub response_tx: mpsc::Sender<(request_response::ResponseChannel<ReplicationResponse>, ReplicationResponse)>,
    /// Receive here to consume events arriving from peers.
    pub inbound_rx: mpsc::Receiver<NetworkEvent>,
    /// Local libp2p peer identity.
    pub local_peer_id: PeerId,
}

/// Owns the libp2p Swarm. Pass to `tokio::spawn(network.run())`.
pub struct ReplicationNetwork {
    swarm: Swarm<ReplicationBehaviour>,
    topic: gossipsub::IdentTopic,
    outbound_gossip_rx: mpsc::Receiver<GossipMessage>,
    request_rx: mpsc::Receiver<(PeerId, ReplicationRequest)>,
    response_rx: mpsc::Receiver<(request_response::ResponseChannel<ReplicationResponse>, ReplicationResponse)>,
    inbound_tx: mpsc::Sender<NetworkEvent>,
}

impl ReplicationNetwork {
    /// Build the network and return `(ReplicationNetwork, ReplicationHandle)`.
    pub fn new(
        config: &ReplicationConfig,
    ) -> Result<(Self, ReplicationHandle), Box<dyn std::error::Error + Send + Sync>> {
        let topic = gossipsub::IdentTopic::new(&config.proposal_topic);

        let mut swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )?
            .with_behaviour(|key: &libp2p::identity::Keypair| {
                let message_id_fn = |msg: &gossipsub::Message| {
                    let mut s = DefaultHasher::new();
                    msg.data.hash(&mut s);
                    gossipsub::MessageId::from(s.finish().to_string())
                };

                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .message_id_fn(message_id_fn)
                    .build()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let store = kad::store::MemoryStore::new(key.public().to_peer_id());
                let kademlia = kad::Behaviour::new(key.public().to_peer_id(), store);

                let identify = identify::Behaviour::new(identify::Config::new(
                    config.protocol_version.clone(),
                    key.public(),
                ));

                let ping = ping::Behaviour::default();

                let rpc = request_response::cbor::Behaviour::new(
                    [(
                        libp2p::StreamProtocol::new(RPC_PROTOCOL),
                        request_response::ProtocolSupport::Full,
                    )],
                    request_response::Config::default(),
                );

                Ok(ReplicationBehaviour { gossipsub, kademlia, identify, ping, rpc })
            })?
            .build();

        swarm.behaviour_mut().gossipsub.subscribe(&topic)?;

        let listen_addr: Multiaddr = config.listen_addr.parse()?;
        swarm.listen_on(listen_addr)?;

        for addr_str in &config.bootstrap_peers {
            if let Ok(addr) = addr_str.parse::<Multiaddr>() {
                if let Some(libp2p::multiaddr::Protocol::P2p(peer_id)) = addr.iter().last() {
                    swarm.behaviour_mut().kademlia.add_address(&peer_id, addr.clone());
                    debug!(peer = %peer_id, "added bootstrap peer");
                }
                if let Err(e) = swarm.dial(addr.clone()) {
                    warn!(%addr, error = %e, "failed to dial bootstrap peer");
                }
            }
        }

        let local_peer_id = *swarm.local_peer_id();
        let (outbound_gossip_tx, outbound_gossip_rx) = mpsc::channel(256);
        let (request_tx, request_rx) = mpsc::channel(256);
        let (response_tx, response_rx) = mpsc::channel(256);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let network = ReplicationNetwork {
            swarm,
            topic,
            outbound_gossip_rx,
            request_rx,
            response_rx,
            inbound_tx,
        };
        let handle = ReplicationHandle {
            outbound_gossip_tx,
            request_tx,
            response_tx,
            inbound_rx,
            local_peer_id,
        };

        Ok((network, handle))
    }

    /// Drive the replication event loop. Run in a dedicated tokio task.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(msg) = self.outbound_gossip_rx.recv() => {
                    let data = msg.to_bytes();
                    if let Err(e) = self.swarm
                        .behaviour_mut()
                        .gossipsub
                        .publish(self.topic.clone(), data)
                    {
                        warn!(error = %e, "gossipsub publish failed");
                    }
                }

                Some((peer, request)) = self.request_rx.recv() => {
                    self.swarm.behaviour_mut().rpc.send_request(&peer, request);
                }

                Some((channel, response)) = self.response_rx.recv() => {
                    if self.swarm.behaviour_mut().rpc.send_response(channel, response).is_err() {
                        debug!("response channel closed before it could be answered");
                    }
                }

                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event).await;
                }
            }
        }
    }

    async fn handle_swarm_event(&mut self, event: SwarmEvent<ReplicationBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(addr = %address, "replication layer listening on");
            }
            SwarmEvent::Behaviour(ReplicationBehaviourEvent::Gossipsub(
                gossipsub::Event::Message { propagation_source, message, .. },
            )) => match GossipMessage::from_bytes(&message.data) {
                Ok(msg) => {
                    let _ = self.inbound_tx.send(NetworkEvent::Gossip(propagation_source, msg)).await;
                }
                Err(e) => debug!(error = %e, "failed to decode gossip message"),
            },
            SwarmEvent::Behaviour(ReplicationBehaviourEvent::Identify(
                identify::Event::Received { peer_id, info, .. },
            )) => {
                for addr in info.listen_addrs {
                    self.swarm.behaviour_mut().kademlia.add_address(&peer_id, addr.clone());
                    let _ = self.inbound_tx.send(NetworkEvent::PeerDiscovered { peer: peer_id, address: addr }).await;
                }
            }
            SwarmEvent::Behaviour(ReplicationBehaviourEvent::Rpc(request_response::Event::Message {
                peer,
                message,
                ..
            })) => match message {
                request_response::Message::Request { request, channel, .. } => {
                    let _ = self.inbound_tx.send(NetworkEvent::Request { peer, request, channel }).await;
                }
                request_response::Message::Response { response, .. } => {
                    let _ = self.inbound_tx.send(NetworkEvent::Response { peer, response }).await;
                }
            },
            SwarmEvent::Behaviour(ReplicationBehaviourEvent::Rpc(request_response::Event::OutboundFailure {
                peer, error, ..
            })) => {
                warn!(peer = %peer, error = %error, "outbound replication RPC failed");
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                debug!(peer = %peer_id, "connection established");
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                debug!(peer = %peer_id, "connection closed");
            }
            _ => {}
        }
    }
}
