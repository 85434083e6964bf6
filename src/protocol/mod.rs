//! Protocol implementation module
//!
//! This module defines the cord messages and their wire format, the
//! neighbor table, the join and routing rules and the per-node state
//! machine tying them together.

pub mod codec;
pub mod integrity;
pub mod join;
pub mod message;
pub mod neighbors;
pub mod routing;
pub mod state;

pub use self::codec::{FrameCodec, MAX_DATA_PAYLOAD};
pub use self::integrity::{Disabled, Fletcher16, IntegrityCheck};
pub use self::join::{JoinCase, JoinPlan};
pub use self::message::{Frame, Message, TransmitKind};
pub use self::neighbors::{Neighbor, NeighborTable};
pub use self::routing::NextHop;
pub use self::state::{Delivery, NodeState, ProtocolConfig, ProtocolState, ProtocolStats, StateInfo};
