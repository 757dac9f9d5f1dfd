//! The peer-to-peer side of the node: the wire envelope, the gossip
//! overlay, and the orchestrator that drives bootstrap, forging and
//! shutdown.

pub mod message;
pub mod node;
pub mod overlay;

pub use message::{Message, Payload, Topic};
pub use node::{Node, NodeConfig};
pub use overlay::GossipOverlay;
