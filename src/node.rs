//! Node runtime.
//!
//! A node runs two tasks around a transport. The dispatch task moves encoded
//! frames from the send queue to the radio. The state machine task owns the
//! [`ProtocolState`] and is the only place it is mutated. Every tick it
//! processes the frames queued before the tick started, drains the error
//! queue, advances the phase machine, and only then queues the frames the
//! tick produced. Applications talk to it through a [`NodeHandle`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::core::{Config, CordPosition, Error, NodeId, Result};
use crate::network::{
    dispatch, inbound, DispatchConfig, DispatchHandle, Dispatcher, ErrorQueue, InboundFrame,
    InboundQueue, OutboundFrame, Transport, TransportHooks,
};
use crate::protocol::{integrity, Delivery, FrameCodec, ProtocolConfig, ProtocolState, StateInfo};

const COMMAND_QUEUE_CAPACITY: usize = 16;

enum Command {
    SendData {
        target: CordPosition,
        payload: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    StateInfo {
        reply: oneshot::Sender<StateInfo>,
    },
    Shutdown,
}

struct StateMachine {
    state: ProtocolState,
    codec: FrameCodec,
    inbound: InboundQueue,
    errors: ErrorQueue,
    outbound: DispatchHandle,
    commands: mpsc::Receiver<Command>,
    deliveries: mpsc::Sender<Delivery>,
    tick_interval: Duration,
}

impl StateMachine {
    async fn run(mut self) -> Result<()> {
        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,

                command = self.commands.recv() => match command {
                    Some(Command::SendData { target, payload, reply }) => {
                        let result = self.state.send_data(target, payload);
                        self.flush().await;
                        let _ = reply.send(result);
                    }
                    Some(Command::StateInfo { reply }) => {
                        let _ = reply.send(self.state.state_info());
                    }
                    Some(Command::Shutdown) | None => {
                        info!(position = %self.state.position(), "node stopping");
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn tick(&mut self) {
        for frame in self.inbound.drain_pending() {
            self.handle_inbound(frame);
        }
        for failure in self.errors.drain() {
            self.state.on_send_failure(failure.destination, &failure.error);
        }
        self.state.tick(Instant::now());
        self.flush().await;
    }

    fn handle_inbound(&mut self, frame: InboundFrame) {
        match self.codec.decode_frame(&frame.bytes) {
            Ok(decoded) => {
                if let Err(e) = self.state.handle_frame(frame.source, decoded, frame.signal_strength) {
                    debug!(from = %frame.source, error = %e, "message not handled");
                }
            }
            Err(e) => self.state.on_decode_error(frame.source, &e),
        }
    }

    async fn flush(&mut self) {
        for frame in self.state.take_outbox() {
            let destination = frame.target();
            let bytes = match self.codec.encode_frame(&frame) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(%destination, error = %e, "frame not encodable, dropped");
                    continue;
                }
            };

            // Full send queues are logged by the dispatcher handle
            if let Err(e) = self.outbound.enqueue(OutboundFrame { destination, bytes }).await {
                if !matches!(e, Error::QueueFull { .. }) {
                    warn!(%destination, error = %e, "frame not queued");
                }
            }
        }

        for delivery in self.state.take_deliveries() {
            match self.deliveries.try_send(delivery) {
                Ok(()) => {}
                Err(TrySendError::Full(delivery)) => {
                    warn!(
                        from = %delivery.source,
                        len = delivery.payload.len(),
                        "delivery queue full, data dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => debug!("no data receiver, delivery dropped"),
            }
        }
    }
}

/// Entry point for starting a cord node
pub struct Node;

impl Node {
    /// Starts a node on `transport` and returns its handle.
    ///
    /// Validates the configuration, registers the transport hooks and spawns
    /// the dispatch and state machine tasks on the current tokio runtime.
    pub fn spawn<T: Transport>(id: NodeId, config: Config, mut transport: T) -> Result<NodeHandle> {
        config.validate()?;

        let (on_receive, inbound) = inbound::channel(config.receive_queue_capacity);
        let (on_send_status, errors) = dispatch::error_channel(config.error_queue_capacity);
        transport.register(TransportHooks {
            on_receive,
            on_send_status: on_send_status.clone(),
        })?;

        let (dispatcher, outbound) =
            Dispatcher::new(&DispatchConfig::from(&config), Arc::new(transport), on_send_status);
        let (command_tx, commands) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (delivery_tx, deliveries) = mpsc::channel(config.delivery_queue_capacity);

        let machine = StateMachine {
            state: ProtocolState::new(id, ProtocolConfig::from(&config)),
            codec: FrameCodec::new(id, integrity::from_mode(config.integrity)),
            inbound,
            errors,
            outbound,
            commands,
            deliveries: delivery_tx,
            tick_interval: config.tick_interval,
        };

        let span = info_span!("node", id = %id);
        let dispatch_task = tokio::spawn(dispatcher.run().instrument(span.clone()));
        let state_task = tokio::spawn(machine.run().instrument(span));
        info!(node = %id, "node started");

        Ok(NodeHandle {
            id,
            commands: command_tx,
            deliveries,
            state_task,
            dispatch_task,
        })
    }
}

/// Handle to a running node.
///
/// Dropping the handle stops the node without waiting for its tasks.
pub struct NodeHandle {
    id: NodeId,
    commands: mpsc::Sender<Command>,
    deliveries: mpsc::Receiver<Delivery>,
    state_task: JoinHandle<Result<()>>,
    dispatch_task: JoinHandle<Result<()>>,
}

fn stopped() -> Error {
    Error::network("node stopped")
}

impl NodeHandle {
    /// Node's physical address
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Sends application data to a cord position
    pub async fn send_data(&self, target: CordPosition, payload: impl Into<Bytes>) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::SendData {
                target,
                payload: payload.into(),
                reply,
            })
            .await
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())?
    }

    /// Gets a snapshot of the node's protocol state
    pub async fn state_info(&self) -> Result<StateInfo> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::StateInfo { reply })
            .await
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())
    }

    /// Waits for the next payload delivered to this node
    pub async fn recv_data(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }

    /// Returns a delivered payload if one is waiting
    pub fn try_recv_data(&mut self) -> Option<Delivery> {
        self.deliveries.try_recv().ok()
    }

    /// Stops the node and waits for both tasks to finish
    pub async fn shutdown(self) -> Result<()> {
        // The state machine may already be gone; the join below reports why
        let _ = self.commands.send(Command::Shutdown).await;

        let NodeHandle {
            state_task,
            dispatch_task,
            ..
        } = self;

        tokio::try_join!(
            async {
                state_task
                    .await
                    .map_err(|e| Error::network(format!("State machine task failed: {}", e)))??;
                Ok::<_, Error>(())
            },
            async {
                dispatch_task
                    .await
                    .map_err(|e| Error::network(format!("Dispatch task failed: {}", e)))??;
                Ok::<_, Error>(())
            }
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Destination, IntegrityMode};
    use crate::network::{dispatch::error_channel, RadioMedium};
    use crate::protocol::{integrity::Fletcher16, Frame, Message, TransmitKind};
    use tokio::time::{sleep, timeout};
    use tokio_test::assert_ok;

    fn id(n: u8) -> NodeId {
        NodeId([0x02, 0, 0, 0, 0, n])
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn fast_config() -> Config {
        Config {
            tick_interval: ms(20),
            hello_period: ms(20),
            sending_delay: ms(1),
            queue_timeout: ms(50),
            discovery_cycles: 2,
            ..Config::default()
        }
    }

    async fn wait_until(node: &NodeHandle, condition: impl Fn(&StateInfo) -> bool) -> StateInfo {
        timeout(Duration::from_secs(5), async {
            loop {
                let info = node.state_info().await.unwrap();
                if condition(&info) {
                    return info;
                }
                sleep(ms(10)).await;
            }
        })
        .await
        .expect("condition not reached in time")
    }

    /// Waits for a frame heard by a raw test station that matches `wanted`
    async fn wait_for_frame(
        queue: &mut InboundQueue,
        codec: &FrameCodec,
        wanted: impl Fn(&Frame) -> bool,
    ) -> Frame {
        timeout(Duration::from_secs(5), async {
            loop {
                let raw = queue.recv().await.expect("station queue closed");
                if let Ok(frame) = codec.decode_frame(&raw.bytes) {
                    if wanted(&frame) {
                        return frame;
                    }
                }
            }
        })
        .await
        .expect("frame not heard in time")
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let medium = RadioMedium::new();
        let config = Config {
            interval_fraction: 1.5,
            ..fast_config()
        };
        let result = Node::spawn(id(1), config, medium.transport(id(1)));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_lonely_node_delivers_to_itself() {
        let medium = RadioMedium::new();
        let mut node = Node::spawn(id(1), fast_config(), medium.transport(id(1))).unwrap();

        let info = wait_until(&node, |info| info.state_type == "Active").await;
        assert_eq!(info.position, CordPosition::START);
        assert!(info.successor.is_none());
        assert!(info.predecessor.is_none());

        assert_ok!(node.send_data(CordPosition::START, &b"hello"[..]).await);
        let delivery = timeout(Duration::from_secs(1), node.recv_data())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.source, id(1));
        assert_eq!(&delivery.payload[..], b"hello");

        assert_ok!(node.shutdown().await);
    }

    #[tokio::test]
    async fn test_send_before_join_fails() {
        let medium = RadioMedium::new();
        let config = Config {
            discovery_cycles: 1000,
            ..fast_config()
        };
        let node = Node::spawn(id(1), config, medium.transport(id(1))).unwrap();

        let result = node.send_data(CordPosition::new(0.5), Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
        assert_ok!(node.shutdown().await);
    }

    #[tokio::test]
    async fn test_join_and_route_against_raw_station() {
        let medium = RadioMedium::new();
        let anchor = id(9);
        let codec = FrameCodec::new(anchor, Arc::new(Fletcher16));

        // A hand-driven station sitting at the START of the cord
        let mut station = medium.transport(anchor);
        let (on_receive, mut heard) = inbound::channel(32);
        let (on_send_status, _errors) = error_channel(4);
        station.register(TransportHooks { on_receive, on_send_status }).unwrap();

        let mut node = Node::spawn(id(1), fast_config(), medium.transport(id(1))).unwrap();

        let hello = Message::Hello {
            position: CordPosition::START,
            successor: CordPosition::END,
            predecessor: CordPosition::UNASSIGNED,
        };
        let bytes = codec.encode_frame(&Frame::new(Destination::Broadcast, 0, hello)).unwrap();
        assert_ok!(station.send(Destination::Broadcast, bytes).await);

        let info = wait_until(&node, |info| info.state_type == "Active").await;
        assert_eq!(info.position, CordPosition::new(0.5));
        assert_eq!(info.predecessor, Some((anchor, CordPosition::START)));

        let update = wait_for_frame(&mut heard, &codec, |frame| {
            matches!(frame.message, Message::UpdatePredecessor { .. })
        })
        .await;
        assert_eq!(update.kind, TransmitKind::Unicast);
        assert_eq!(update.message, Message::UpdatePredecessor { new_position: CordPosition::new(0.5) });

        // Data for the node's own position is delivered locally
        let data = Message::Data {
            target: CordPosition::new(0.5),
            payload: Bytes::from_static(b"for you"),
        };
        let bytes = codec.encode_frame(&Frame::new(Destination::Unicast(id(1)), 0, data)).unwrap();
        assert_ok!(station.send(Destination::Unicast(id(1)), bytes).await);

        let delivery = timeout(Duration::from_secs(1), node.recv_data())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.source, anchor);
        assert_eq!(&delivery.payload[..], b"for you");

        // Data below the node's position goes back down to its predecessor
        heard.drain_pending();
        let data = Message::Data {
            target: CordPosition::new(0.2),
            payload: Bytes::from_static(b"back"),
        };
        let bytes = codec.encode_frame(&Frame::new(Destination::Unicast(id(1)), 1, data)).unwrap();
        assert_ok!(station.send(Destination::Unicast(id(1)), bytes).await);

        let forwarded = wait_for_frame(&mut heard, &codec, |frame| {
            matches!(frame.message, Message::Data { .. })
        })
        .await;
        assert_eq!(forwarded.kind, TransmitKind::Unicast);
        assert_eq!(
            forwarded.message,
            Message::Data {
                target: CordPosition::new(0.2),
                payload: Bytes::from_static(b"back"),
            }
        );

        let info = node.state_info().await.unwrap();
        assert_eq!(info.stats.delivered, 1);
        assert_eq!(info.stats.forwarded, 1);
        assert_ok!(node.shutdown().await);
    }

    #[tokio::test]
    async fn test_second_node_joins_next_to_anchor() {
        let medium = RadioMedium::new();
        let a = Node::spawn(id(1), fast_config(), medium.transport(id(1))).unwrap();
        wait_until(&a, |info| info.state_type == "Active").await;

        // Listen long enough to hear several of A's hellos
        let config = Config {
            discovery_cycles: 5,
            ..fast_config()
        };
        let b = Node::spawn(id(2), config, medium.transport(id(2))).unwrap();
        let info = wait_until(&b, |info| info.state_type == "Active").await;
        assert_eq!(info.position, CordPosition::new(0.5));
        assert_eq!(info.predecessor.map(|(n, _)| n), Some(id(1)));

        let info = wait_until(&a, |info| info.predecessor.map(|(n, _)| n) == Some(id(2))).await;
        assert_eq!(info.neighbor_count, 1);

        assert_ok!(b.shutdown().await);
        assert_ok!(a.shutdown().await);
    }

    #[tokio::test]
    async fn test_integrity_mismatch_discards_frames() {
        let medium = RadioMedium::new();
        let unchecked = Config {
            integrity: IntegrityMode::Disabled,
            ..fast_config()
        };
        let listening = Config {
            discovery_cycles: 1000,
            ..fast_config()
        };

        let a = Node::spawn(id(1), unchecked, medium.transport(id(1))).unwrap();
        let b = Node::spawn(id(2), listening, medium.transport(id(2))).unwrap();

        let info = wait_until(&b, |info| info.stats.decode_errors > 0).await;
        assert_eq!(info.neighbor_count, 0);
        assert_eq!(info.state_type, "Discovering");

        assert_ok!(a.shutdown().await);
        assert_ok!(b.shutdown().await);
    }
}
