//! # Gossip Overlay
//!
//! Topic-based publish/subscribe over libp2p gossipsub, with mDNS LAN
//! discovery and a short-lived unicast channel (`/reply`) for one-to-one
//! replies to solicitations.
//!
//! The swarm runs on one background task. The [`GossipOverlay`] handle
//! talks to it over a command channel; subscriptions come back as plain
//! tokio channels carrying decoded [`Message`] envelopes. Messages this
//! node originated are never delivered back to it.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use libp2p::swarm::{NetworkBehaviour, Swarm, SwarmEvent};
use libp2p::{gossipsub, mdns, noise, request_response, tcp, yamux, PeerId, StreamProtocol};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config;
use crate::error::{CoreError, Result as CoreResult};
use crate::network::message::{Message, Topic, REQUEST};

/// Acknowledgement sent back on the reply stream. Carries nothing — the
/// reply channel is fire-and-forget, the ack just closes the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyAck;

// ---------------------------------------------------------------------------
// Behaviour
// ---------------------------------------------------------------------------

#[derive(NetworkBehaviour)]
struct OverlayBehaviour {
    gossipsub: gossipsub::Behaviour,
    mdns: mdns::tokio::Behaviour,
    reply: request_response::json::Behaviour<Message, ReplyAck>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

enum Command {
    Publish { topic: Topic, payload: String },
    Reply { peer: String, message: Message },
    Subscribe { topic: Topic, sender: mpsc::UnboundedSender<Message> },
    Close,
}

// ---------------------------------------------------------------------------
// GossipOverlay
// ---------------------------------------------------------------------------

/// Handle to the overlay. Cheap to share behind an `Arc`; dropped
/// receivers simply stop the corresponding forwarding.
pub struct GossipOverlay {
    peer_id: String,
    commands: mpsc::UnboundedSender<Command>,
    replies: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    peers: Arc<AtomicUsize>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl GossipOverlay {
    /// Brings up the swarm: TCP transport with noise + yamux, gossipsub,
    /// mDNS discovery, and the `/reply` protocol, listening on `port`
    /// (0 picks a free port).
    pub async fn start(port: u16) -> CoreResult<Self> {
        let mut swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| CoreError::Transport(e.to_string()))?
            .with_behaviour(|key| {
                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .build()
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )?;

                let mdns =
                    mdns::tokio::Behaviour::new(mdns::Config::default(), key.public().to_peer_id())?;

                let reply = request_response::json::Behaviour::new(
                    [(
                        StreamProtocol::new(config::REPLY_PROTOCOL),
                        request_response::ProtocolSupport::Full,
                    )],
                    request_response::Config::default(),
                );

                Ok(OverlayBehaviour {
                    gossipsub,
                    mdns,
                    reply,
                })
            })
            .map_err(|e| CoreError::Transport(e.to_string()))?
            .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(600)))
            .build();

        let address = format!("/ip4/0.0.0.0/tcp/{port}")
            .parse()
            .map_err(|e: libp2p::multiaddr::Error| CoreError::Transport(e.to_string()))?;
        swarm
            .listen_on(address)
            .map_err(|e| CoreError::Transport(e.to_string()))?;

        let peer_id = swarm.local_peer_id().to_string();
        let peers = Arc::new(AtomicUsize::new(0));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let driver = tokio::spawn(drive(
            swarm,
            peer_id.clone(),
            command_rx,
            reply_tx,
            Arc::clone(&peers),
        ));

        info!(peer = %peer_id, port, "overlay started");

        Ok(Self {
            peer_id,
            commands: command_tx,
            replies: Mutex::new(Some(reply_rx)),
            peers,
            driver: Mutex::new(Some(driver)),
        })
    }

    /// This node's stable peer identifier.
    pub fn id(&self) -> &str {
        &self.peer_id
    }

    /// Broadcasts a payload on a topic.
    pub fn publish(&self, topic: Topic, payload: String) {
        let _ = self.commands.send(Command::Publish { topic, payload });
    }

    /// Broadcasts a reply solicitation on a topic.
    pub fn request(&self, topic: Topic) {
        self.publish(topic, REQUEST.to_string());
    }

    /// Sends a single message to one peer over the `/reply` channel.
    pub fn reply(&self, peer: &str, topic: Topic, payload: String) {
        let message = Message::new(self.peer_id.clone(), topic, payload);
        let _ = self.commands.send(Command::Reply {
            peer: peer.to_string(),
            message,
        });
    }

    /// Subscribes to a topic. Delivered messages exclude those this node
    /// originated.
    pub fn subscribe(&self, topic: Topic) -> mpsc::UnboundedReceiver<Message> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = self.commands.send(Command::Subscribe { topic, sender });
        receiver
    }

    /// Takes the stream of inbound `/reply` messages. Yields `None` after
    /// the first call — there is exactly one demultiplexer.
    pub fn take_replies(&self) -> Option<mpsc::UnboundedReceiver<Message>> {
        self.replies.lock().take()
    }

    /// Number of currently connected peers.
    pub fn connected_peers(&self) -> usize {
        self.peers.load(Ordering::Relaxed)
    }

    /// Shuts the swarm down and waits for the driver task to finish.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close);
        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!(peer = %self.peer_id, "overlay closed");
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// The swarm task: multiplexes network events and handle commands until
/// closed.
async fn drive(
    mut swarm: Swarm<OverlayBehaviour>,
    self_id: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    replies: mpsc::UnboundedSender<Message>,
    peers: Arc<AtomicUsize>,
) {
    let mut subscribers: HashMap<Topic, mpsc::UnboundedSender<Message>> = HashMap::new();

    loop {
        tokio::select! {
            event = swarm.select_next_some() => {
                handle_event(&mut swarm, &self_id, event, &subscribers, &replies, &peers);
            }
            command = commands.recv() => match command {
                Some(Command::Publish { topic, payload }) => {
                    let message = Message::new(self_id.clone(), topic, payload);
                    match serde_json::to_vec(&message) {
                        Ok(data) => {
                            let gossip_topic = gossipsub::IdentTopic::new(topic.as_str());
                            if let Err(e) = swarm.behaviour_mut().gossipsub.publish(gossip_topic, data) {
                                debug!(%topic, error = %e, "publish did not reach any peer");
                            }
                        }
                        Err(e) => warn!(%topic, error = %e, "could not encode message"),
                    }
                }
                Some(Command::Reply { peer, message }) => match peer.parse::<PeerId>() {
                    Ok(peer) => {
                        swarm.behaviour_mut().reply.send_request(&peer, message);
                    }
                    Err(e) => warn!(%peer, error = %e, "reply target is not a peer id"),
                },
                Some(Command::Subscribe { topic, sender }) => {
                    let gossip_topic = gossipsub::IdentTopic::new(topic.as_str());
                    if let Err(e) = swarm.behaviour_mut().gossipsub.subscribe(&gossip_topic) {
                        warn!(%topic, error = %e, "subscription failed");
                    }
                    subscribers.insert(topic, sender);
                }
                Some(Command::Close) | None => break,
            }
        }
    }
}

fn handle_event(
    swarm: &mut Swarm<OverlayBehaviour>,
    self_id: &str,
    event: SwarmEvent<OverlayBehaviourEvent>,
    subscribers: &HashMap<Topic, mpsc::UnboundedSender<Message>>,
    replies: &mpsc::UnboundedSender<Message>,
    peers: &AtomicUsize,
) {
    match event {
        SwarmEvent::NewListenAddr { address, .. } => {
            debug!(%address, "listening");
        }
        SwarmEvent::ConnectionEstablished { peer_id, .. } => {
            peers.fetch_add(1, Ordering::Relaxed);
            debug!(peer = %peer_id, "peer connected");
        }
        SwarmEvent::ConnectionClosed { peer_id, .. } => {
            peers.fetch_sub(1, Ordering::Relaxed);
            debug!(peer = %peer_id, "peer disconnected");
        }
        SwarmEvent::Behaviour(OverlayBehaviourEvent::Mdns(mdns::Event::Discovered(found))) => {
            for (peer, address) in found {
                debug!(%peer, %address, "peer discovered");
                swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer);
                if let Err(e) = swarm.dial(address) {
                    debug!(%peer, error = %e, "dial failed");
                }
            }
        }
        SwarmEvent::Behaviour(OverlayBehaviourEvent::Mdns(mdns::Event::Expired(expired))) => {
            for (peer, _) in expired {
                swarm.behaviour_mut().gossipsub.remove_explicit_peer(&peer);
            }
        }
        SwarmEvent::Behaviour(OverlayBehaviourEvent::Gossipsub(gossipsub::Event::Message {
            message,
            ..
        })) => match serde_json::from_slice::<Message>(&message.data) {
            Ok(message) => {
                if message.peer == self_id {
                    return;
                }
                if let Some(sender) = subscribers.get(&message.topic) {
                    let _ = sender.send(message);
                }
            }
            Err(e) => debug!(error = %e, "dropping undecodable gossip message"),
        },
        SwarmEvent::Behaviour(OverlayBehaviourEvent::Reply(request_response::Event::Message {
            message: request_response::Message::Request { request, channel, .. },
            ..
        })) => {
            let _ = swarm.behaviour_mut().reply.send_response(channel, ReplyAck);
            let _ = replies.send(request);
        }
        SwarmEvent::Behaviour(OverlayBehaviourEvent::Reply(
            request_response::Event::OutboundFailure { peer, error, .. },
        )) => {
            debug!(%peer, %error, "reply delivery failed");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_publish_close() {
        let overlay = GossipOverlay::start(0).await.expect("overlay start");

        // The peer id is a real libp2p identity.
        assert!(overlay.id().parse::<PeerId>().is_ok());

        let mut messages = overlay.subscribe(Topic::Block);

        // Publishing must not error without peers, and own messages are
        // never delivered back.
        overlay.publish(Topic::Block, "request".into());
        overlay.request(Topic::Block);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(messages.try_recv().is_err());

        // The reply stream can be taken exactly once.
        assert!(overlay.take_replies().is_some());
        assert!(overlay.take_replies().is_none());

        overlay.close().await;
    }
}
