//! Outbound dispatch.
//!
//! Encoded frames wait in a bounded send queue. The dispatcher wakes after a
//! fixed sending delay, takes one frame and hands it to the transport.
//! Failures, whether returned by `send` or reported later by the radio, go
//! to a bounded error queue that the state machine drains every tick.
//!
//! Every push is bounded: the send queue waits up to the queue timeout, the
//! error queue not at all. A full queue drops the newest item and logs.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{
    self,
    error::{SendTimeoutError, TrySendError},
};
use tracing::{debug, trace, warn};

use super::transport::Transport;
use crate::core::{Config, Destination, Error, Result, TransportError};

/// Encoded frame ready for the air
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundFrame {
    /// Receiver, or broadcast
    pub destination: Destination,
    /// Encoded frame
    pub bytes: Bytes,
}

/// Transmission that did not reach its destination
#[derive(Debug, Clone, PartialEq)]
pub struct SendFailure {
    /// Intended receiver
    pub destination: Destination,
    /// What went wrong
    pub error: TransportError,
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Send queue capacity
    pub send_queue_capacity: usize,
    /// Error queue capacity
    pub error_queue_capacity: usize,
    /// How long an enqueue may wait for space
    pub queue_timeout: Duration,
    /// Pause before each transmission
    pub sending_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig::from(&Config::default())
    }
}

impl From<&Config> for DispatchConfig {
    fn from(config: &Config) -> Self {
        DispatchConfig {
            send_queue_capacity: config.send_queue_capacity,
            error_queue_capacity: config.error_queue_capacity,
            queue_timeout: config.queue_timeout,
            sending_delay: config.sending_delay,
        }
    }
}

/// Handle for queueing frames on the dispatcher
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<OutboundFrame>,
    timeout: Duration,
}

impl DispatchHandle {
    /// Queues a frame, waiting at most the queue timeout for space
    pub async fn enqueue(&self, frame: OutboundFrame) -> Result<()> {
        match self.tx.send_timeout(frame, self.timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(frame)) => {
                warn!(destination = %frame.destination, "send queue full, frame dropped");
                Err(Error::queue_full("send"))
            }
            Err(SendTimeoutError::Closed(_)) => Err(Error::network("dispatcher stopped")),
        }
    }
}

/// Send-status hook handed to the transport
#[derive(Debug, Clone)]
pub struct SendStatusSink {
    tx: mpsc::Sender<SendFailure>,
}

impl SendStatusSink {
    /// Records the outcome of a transmission; successes are not queued
    pub fn report(&self, destination: Destination, status: std::result::Result<(), TransportError>) {
        let Err(error) = status else {
            trace!(%destination, "frame acknowledged");
            return;
        };

        match self.tx.try_send(SendFailure { destination, error }) {
            Ok(()) => {}
            Err(TrySendError::Full(failure)) => {
                warn!(
                    destination = %failure.destination,
                    error = %failure.error,
                    "error queue full, failure dropped"
                );
            }
            Err(TrySendError::Closed(_)) => {
                trace!(%destination, "node stopped, failure dropped");
            }
        }
    }
}

/// Consumer side of the error queue
#[derive(Debug)]
pub struct ErrorQueue {
    rx: mpsc::Receiver<SendFailure>,
}

impl ErrorQueue {
    /// Takes every queued failure
    pub fn drain(&mut self) -> Vec<SendFailure> {
        let mut failures = Vec::new();
        while let Ok(failure) = self.rx.try_recv() {
            failures.push(failure);
        }
        failures
    }
}

/// Creates the bounded error queue
pub fn error_channel(capacity: usize) -> (SendStatusSink, ErrorQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    (SendStatusSink { tx }, ErrorQueue { rx })
}

/// Loop moving queued frames to the transport, one per wake
pub struct Dispatcher<T: Transport> {
    transport: Arc<T>,
    rx: mpsc::Receiver<OutboundFrame>,
    status: SendStatusSink,
    sending_delay: Duration,
}

impl<T: Transport> Dispatcher<T> {
    /// Creates a dispatcher and the handle used to feed it
    pub fn new(
        config: &DispatchConfig,
        transport: Arc<T>,
        status: SendStatusSink,
    ) -> (Self, DispatchHandle) {
        let (tx, rx) = mpsc::channel(config.send_queue_capacity);
        let dispatcher = Dispatcher {
            transport,
            rx,
            status,
            sending_delay: config.sending_delay,
        };
        let handle = DispatchHandle {
            tx,
            timeout: config.queue_timeout,
        };
        (dispatcher, handle)
    }

    /// Runs until every [`DispatchHandle`] is dropped
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::time::sleep(self.sending_delay).await;

            let Some(frame) = self.rx.recv().await else {
                debug!("send queue closed, dispatcher stopping");
                return Ok(());
            };

            trace!(destination = %frame.destination, len = frame.bytes.len(), "sending frame");
            if let Err(error) = self.transport.send(frame.destination, frame.bytes).await {
                self.status.report(frame.destination, Err(error));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeId;
    use crate::network::transport::TransportHooks;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::{timeout, Instant};
    use tokio_test::assert_ok;

    /// Records every frame and fails unicasts to one blocked node
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundFrame>>,
        blocked: Option<NodeId>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, destination: Destination, frame: Bytes) -> std::result::Result<(), TransportError> {
            if self.blocked.map(Destination::Unicast) == Some(destination) {
                return Err(TransportError::NoAck);
            }
            self.sent
                .lock()
                .map_err(|_| TransportError::Io("poisoned".into()))?
                .push(OutboundFrame { destination, bytes: frame });
            Ok(())
        }

        fn register(&mut self, _hooks: TransportHooks) -> std::result::Result<(), TransportError> {
            Ok(())
        }
    }

    fn frame(destination: Destination, byte: u8) -> OutboundFrame {
        OutboundFrame { destination, bytes: Bytes::from(vec![byte]) }
    }

    fn config(capacity: usize, timeout: Duration) -> DispatchConfig {
        DispatchConfig {
            send_queue_capacity: capacity,
            error_queue_capacity: 2,
            queue_timeout: timeout,
            sending_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_backpressure_drops_one_frame() {
        let transport = Arc::new(RecordingTransport::default());
        let (status, _errors) = error_channel(2);
        let queue_timeout = Duration::from_millis(50);
        let (_dispatcher, handle) = Dispatcher::new(&config(3, queue_timeout), transport, status);

        for n in 0..3 {
            assert_ok!(handle.enqueue(frame(Destination::Broadcast, n)).await);
        }

        let started = Instant::now();
        let result = handle.enqueue(frame(Destination::Broadcast, 3)).await;
        let waited = started.elapsed();

        assert!(matches!(result, Err(Error::QueueFull { queue: "send" })));
        assert!(waited >= queue_timeout);
        assert!(waited < queue_timeout * 10);
    }

    #[tokio::test]
    async fn test_dispatcher_sends_in_order() {
        let transport = Arc::new(RecordingTransport::default());
        let (status, _errors) = error_channel(2);
        let (dispatcher, handle) =
            Dispatcher::new(&config(4, Duration::from_millis(50)), transport.clone(), status);

        let peer = Destination::Unicast(NodeId([2, 0, 0, 0, 0, 1]));
        assert_ok!(handle.enqueue(frame(Destination::Broadcast, 1)).await);
        assert_ok!(handle.enqueue(frame(peer, 2)).await);
        drop(handle);

        let result = timeout(Duration::from_secs(1), dispatcher.run()).await;
        assert!(matches!(result, Ok(Ok(()))));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(*sent, vec![frame(Destination::Broadcast, 1), frame(peer, 2)]);
    }

    #[tokio::test]
    async fn test_failures_reach_error_queue() {
        let blocked = NodeId([2, 0, 0, 0, 0, 9]);
        let transport = Arc::new(RecordingTransport { blocked: Some(blocked), ..Default::default() });
        let (status, mut errors) = error_channel(2);
        let (dispatcher, handle) =
            Dispatcher::new(&config(4, Duration::from_millis(50)), transport, status);

        assert_ok!(handle.enqueue(frame(Destination::Unicast(blocked), 1)).await);
        assert_ok!(handle.enqueue(frame(Destination::Broadcast, 2)).await);
        drop(handle);
        assert!(timeout(Duration::from_secs(1), dispatcher.run()).await.is_ok());

        let failures = errors.drain();
        assert_eq!(
            failures,
            vec![SendFailure { destination: Destination::Unicast(blocked), error: TransportError::NoAck }]
        );
        assert!(errors.drain().is_empty());
    }

    #[test]
    fn test_error_queue_drops_newest() {
        let (status, mut errors) = error_channel(2);
        let peer = Destination::Unicast(NodeId([2, 0, 0, 0, 0, 1]));

        status.report(peer, Ok(()));
        status.report(peer, Err(TransportError::NoAck));
        status.report(peer, Err(TransportError::Io("first".into())));
        status.report(peer, Err(TransportError::Closed));

        let failures = errors.drain();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].error, TransportError::NoAck);
        assert_eq!(failures[1].error, TransportError::Io("first".into()));
    }

    #[test]
    fn test_config_from_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.send_queue_capacity, 10);
        assert_eq!(config.error_queue_capacity, 5);
        assert_eq!(config.queue_timeout, Duration::from_millis(512));
        assert_eq!(config.sending_delay, Duration::from_millis(100));
    }
}
