//! Virtual Cord Protocol: a self-organizing ring overlay for broadcast radio nodes
//!
//! Nodes that can only hear their physical neighbors arrange themselves on a
//! virtual cord spanning the interval `[0.0, 1.0]`. Each node listens for a
//! few cycles, picks a position between neighbors that are already adjacent
//! on the cord, and from then on announces itself and forwards data greedily
//! toward the position it is addressed to.
//!
//! The crate is split into:
//!
//! - [`core`]: identifiers, positions, configuration and errors
//! - [`protocol`]: wire format, neighbor table, join and routing rules and
//!   the per-node state machine
//! - [`network`]: transport contract, bounded queues, outbound dispatch and
//!   an in-memory radio medium
//! - [`node`]: the runtime wiring a state machine to a transport

pub mod core;
pub mod network;
pub mod node;
pub mod protocol;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Config, CordPosition, Destination, Error, NodeId, Result};
pub use crate::network::{MediumTransport, RadioMedium, Transport};
pub use crate::node::{Node, NodeHandle};
pub use crate::protocol::{Delivery, StateInfo};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
