//! Inbound frame queue between the transport and the state machine.
//!
//! The transport's receive hook only copies the frame into a bounded queue
//! and returns. Decoding and table updates happen later on the state
//! machine task.

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

use crate::core::{Error, NodeId, Result, TransportError};

/// A raw frame as heard on the air
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// Physical sender
    pub source: NodeId,
    /// Undecoded frame bytes
    pub bytes: Bytes,
    /// Received signal strength in dBm
    pub signal_strength: i8,
}

/// Producer side, handed to the transport as its receive hook
#[derive(Debug, Clone)]
pub struct InboundSink {
    tx: mpsc::Sender<InboundFrame>,
}

/// Consumer side, owned by the state machine task
#[derive(Debug)]
pub struct InboundQueue {
    rx: mpsc::Receiver<InboundFrame>,
}

/// Creates a bounded inbound queue
pub fn channel(capacity: usize) -> (InboundSink, InboundQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    (InboundSink { tx }, InboundQueue { rx })
}

impl InboundSink {
    /// Copies a received frame into the queue without blocking.
    ///
    /// Empty frames are refused. When the queue is full the new frame is
    /// dropped.
    pub fn deliver(&self, source: NodeId, bytes: &[u8], signal_strength: i8) -> Result<()> {
        if bytes.is_empty() {
            warn!(from = %source, "empty frame refused");
            return Err(Error::protocol("empty frame"));
        }

        let frame = InboundFrame {
            source,
            bytes: Bytes::copy_from_slice(bytes),
            signal_strength,
        };
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(frame)) => {
                warn!(from = %frame.source, len = frame.bytes.len(), "receive queue full, frame dropped");
                Err(Error::queue_full("receive"))
            }
            Err(TrySendError::Closed(frame)) => {
                trace!(from = %frame.source, "node stopped, frame dropped");
                Err(Error::Transport(TransportError::Closed))
            }
        }
    }
}

impl InboundQueue {
    /// Takes every frame queued at the time of the call.
    ///
    /// Frames that arrive while the returned batch is being processed stay
    /// queued for the next call.
    pub fn drain_pending(&mut self) -> Vec<InboundFrame> {
        let pending = self.rx.len();
        let mut frames = Vec::with_capacity(pending);
        for _ in 0..pending {
            match self.rx.try_recv() {
                Ok(frame) => frames.push(frame),
                Err(_) => break,
            }
        }
        frames
    }

    /// Waits for the next frame
    pub async fn recv(&mut self) -> Option<InboundFrame> {
        self.rx.recv().await
    }
}
