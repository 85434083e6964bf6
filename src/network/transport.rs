//! Transport abstraction for the radio link.
//!
//! The core never touches the radio directly. A transport carries encoded
//! frames to a single neighbor or to everyone in range, and hands received
//! frames and delayed send results back through the hooks registered at
//! startup:
//!
//! - **ESP-NOW style radios**: `send` returns once the frame is queued, the
//!   link-layer acknowledgement arrives later on the status hook
//! - **[`MediumTransport`](super::MediumTransport)**: in-memory medium used
//!   by tests and demos

use async_trait::async_trait;
use bytes::Bytes;

use super::dispatch::SendStatusSink;
use super::inbound::InboundSink;
use crate::core::{Destination, TransportError};

/// Callbacks a transport invokes on its own schedule
#[derive(Debug, Clone)]
pub struct TransportHooks {
    /// Receives every frame heard on the air, with its signal strength
    pub on_receive: InboundSink,
    /// Receives the final outcome of each transmission
    pub on_send_status: SendStatusSink,
}

/// Abstract frame transport.
///
/// Frames are opaque bytes at this level; the node encodes and decodes
/// them. Delivery is best effort: a broadcast is never acknowledged, a
/// unicast may report `NoAck` through the status hook.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queues `frame` for transmission to `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not even be handed to the radio.
    /// Failures that happen after hand-off are reported on the status hook.
    async fn send(&self, destination: Destination, frame: Bytes) -> Result<(), TransportError>;

    /// Installs the receive and send-status hooks.
    ///
    /// Called once by the node before any frame is sent.
    fn register(&mut self, hooks: TransportHooks) -> Result<(), TransportError>;
}
