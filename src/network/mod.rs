//! Radio plumbing around the state machine
//!
//! This module holds the transport contract, the bounded queues connecting
//! the transport to the state machine, the outbound dispatcher and an
//! in-memory radio medium for simulations.

pub mod dispatch;
pub mod inbound;
pub mod medium;
pub mod transport;

pub use self::dispatch::{
    DispatchConfig, DispatchHandle, Dispatcher, ErrorQueue, OutboundFrame, SendFailure, SendStatusSink,
};
pub use self::inbound::{InboundFrame, InboundQueue, InboundSink};
pub use self::medium::{MediumTransport, RadioMedium};
pub use self::transport::{Transport, TransportHooks};
