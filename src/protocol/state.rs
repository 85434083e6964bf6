use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::codec::{DATA_HEADER_LEN, FRAME_HEADER_LEN, MAX_DATA_PAYLOAD};
use super::join::{plan_join, JoinCase};
use super::message::{Frame, Message, TransmitKind};
use super::neighbors::{Neighbor, NeighborTable};
use super::routing::{next_hop, NextHop};
use crate::core::{
    Config, CordPosition, DecodeError, Destination, Error, NodeId, Result, TransportError,
    MAX_FRAME_SIZE,
};

/// Phase of a node's life on the cord
#[derive(Debug, Clone, PartialEq)]
pub enum NodeState {
    /// Listening to Hello traffic without transmitting
    Discovering {
        /// Listen-only ticks left
        remaining: u32,
    },

    /// Looking for a place on the cord
    Joining {
        /// Join attempts made so far
        attempts: u32,
    },

    /// Holding a position, announcing it and routing data
    Active {
        /// Join rule that placed the node
        joined_by: JoinCase,
    },
}

impl NodeState {
    /// Short name of the phase
    pub fn name(&self) -> &'static str {
        match self {
            NodeState::Discovering { .. } => "Discovering",
            NodeState::Joining { .. } => "Joining",
            NodeState::Active { .. } => "Active",
        }
    }
}

/// State machine configuration
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Listen-only ticks before the first join attempt
    pub discovery_cycles: u32,
    /// Minimum time between two Hello broadcasts
    pub hello_period: Duration,
    /// Split point used when placing the node inside an interval
    pub interval_fraction: f32,
    /// Neighbor table capacity
    pub neighbor_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig::from(&Config::default())
    }
}

impl From<&Config> for ProtocolConfig {
    fn from(config: &Config) -> Self {
        ProtocolConfig {
            discovery_cycles: config.discovery_cycles,
            hello_period: config.hello_period,
            interval_fraction: config.interval_fraction,
            neighbor_capacity: config.neighbor_capacity,
        }
    }
}

/// Data that reached its target position on this node
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Physical neighbor the data arrived from (self for local sends)
    pub source: NodeId,
    /// Target position carried by the data
    pub target: CordPosition,
    /// Application payload
    pub payload: Bytes,
}

/// Counters kept by the state machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolStats {
    pub frames_received: u64,
    pub decode_errors: u64,
    pub hellos_sent: u64,
    pub join_attempts: u64,
    pub delivered: u64,
    pub forwarded: u64,
    pub undeliverable: u64,
    pub send_failures: u64,
}

/// Snapshot of the protocol state
#[derive(Debug, Clone)]
pub struct StateInfo {
    /// Current phase name
    pub state_type: &'static str,
    /// Own position
    pub position: CordPosition,
    /// Successor address and announced position
    pub successor: Option<(NodeId, CordPosition)>,
    /// Predecessor address and announced position
    pub predecessor: Option<(NodeId, CordPosition)>,
    /// Number of known neighbors
    pub neighbor_count: usize,
    /// Counters
    pub stats: ProtocolStats,
}

/// Per-node cord state machine.
///
/// Owns the local position, the successor and predecessor references and
/// the neighbor table. It performs no I/O: handlers queue outbound frames
/// and local deliveries, which the runtime collects with
/// [`take_outbox`](Self::take_outbox) and
/// [`take_deliveries`](Self::take_deliveries).
pub struct ProtocolState {
    /// Node's physical address
    node_id: NodeId,
    /// Current phase
    state: NodeState,
    /// Own cord position
    position: CordPosition,
    /// Successor as an index into `neighbors`
    successor: Option<usize>,
    /// Predecessor as an index into `neighbors`
    predecessor: Option<usize>,
    /// Known physical neighbors
    neighbors: NeighborTable,
    /// Configuration
    config: ProtocolConfig,
    /// Frames produced since the last flush
    outbox: Vec<Frame>,
    /// Data delivered since the last flush
    deliveries: Vec<Delivery>,
    /// Next sequence number per transmit kind
    sequences: [u16; 2],
    /// Time of the last Hello broadcast
    last_hello: Option<Instant>,
    /// Counters
    stats: ProtocolStats,
}

impl ProtocolState {
    /// Creates a new protocol state machine
    pub fn new(node_id: NodeId, config: ProtocolConfig) -> Self {
        ProtocolState {
            node_id,
            state: NodeState::Discovering {
                remaining: config.discovery_cycles,
            },
            position: CordPosition::UNASSIGNED,
            successor: None,
            predecessor: None,
            neighbors: NeighborTable::new(config.neighbor_capacity),
            config,
            outbox: Vec::new(),
            deliveries: Vec::new(),
            sequences: [0; 2],
            last_hello: None,
            stats: ProtocolStats::default(),
        }
    }

    /// Node's physical address
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Current phase
    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Whether the node holds a position on the cord
    pub fn is_active(&self) -> bool {
        matches!(self.state, NodeState::Active { .. })
    }

    /// Own cord position
    pub fn position(&self) -> CordPosition {
        self.position
    }

    /// Current successor entry
    pub fn successor(&self) -> Option<&Neighbor> {
        self.successor.and_then(|i| self.neighbors.get(i))
    }

    /// Current predecessor entry
    pub fn predecessor(&self) -> Option<&Neighbor> {
        self.predecessor.and_then(|i| self.neighbors.get(i))
    }

    /// Known neighbors
    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// Counters
    pub fn stats(&self) -> &ProtocolStats {
        &self.stats
    }

    /// Gets information about the current state
    pub fn state_info(&self) -> StateInfo {
        StateInfo {
            state_type: self.state.name(),
            position: self.position,
            successor: self.successor().map(|n| (n.id, n.position)),
            predecessor: self.predecessor().map(|n| (n.id, n.position)),
            neighbor_count: self.neighbors.len(),
            stats: self.stats.clone(),
        }
    }

    /// Takes the frames produced since the last call
    pub fn take_outbox(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.outbox)
    }

    /// Takes the local deliveries produced since the last call
    pub fn take_deliveries(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.deliveries)
    }

    /// Advances the phase machine by one tick.
    ///
    /// Discovering counts down its listen-only ticks, Joining runs the join
    /// algorithm, Active broadcasts a Hello once the hello period elapsed.
    /// A node that joins during this tick announces itself right away.
    pub fn tick(&mut self, now: Instant) {
        if let NodeState::Discovering { remaining } = &mut self.state {
            if *remaining > 0 {
                *remaining -= 1;
                trace!(remaining = *remaining, "listening");
                return;
            }
            info!(neighbors = self.neighbors.len(), "discovery finished, joining cord");
            self.state = NodeState::Joining { attempts: 0 };
        }

        if let NodeState::Joining { .. } = self.state {
            if !self.try_join() {
                return;
            }
        }

        self.maybe_send_hello(now);
    }

    /// Handles a decoded frame received from `source`
    pub fn handle_frame(&mut self, source: NodeId, frame: Frame, rssi: i8) -> Result<()> {
        if source == self.node_id {
            trace!("ignoring own frame");
            return Ok(());
        }

        self.stats.frames_received += 1;
        trace!(
            from = %source,
            kind = ?frame.kind,
            seq = frame.sequence,
            message = frame.message.name(),
            "frame received"
        );

        let result = self.handle_message(source, frame.message);
        if let Some(index) = self.neighbors.find_by_id(&source) {
            self.neighbors.note_signal(index, rssi);
        }
        result
    }

    /// Handles an incoming message.
    ///
    /// Every phase folds Hello and Update messages into the neighbor table;
    /// only an Active node moves its position, binds references or routes
    /// data.
    pub fn handle_message(&mut self, source: NodeId, message: Message) -> Result<()> {
        match message {
            Message::Hello { position, successor, predecessor } => {
                self.neighbors.upsert(source, position, successor, predecessor)?;
                Ok(())
            }

            Message::UpdateSuccessor { new_position } => {
                let index = self.neighbors.ensure(source)?;
                if self.is_active() {
                    info!(from = %source, position = %new_position, "successor updated");
                    self.position = new_position;
                    self.successor = Some(index);
                } else {
                    debug!(from = %source, "update_successor before joining, table only");
                }
                Ok(())
            }

            Message::UpdatePredecessor { new_position } => {
                let index = self.neighbors.ensure(source)?;
                if self.is_active() {
                    info!(from = %source, position = %new_position, "predecessor updated");
                    self.position = new_position;
                    self.predecessor = Some(index);
                } else {
                    debug!(from = %source, "update_predecessor before joining, table only");
                }
                Ok(())
            }

            Message::Data { target, payload } => {
                if !self.is_active() {
                    warn!(from = %source, %target, state = self.state.name(), "data before joining, dropped");
                    return Err(Error::invalid_state(format!(
                        "data for {} received while {}",
                        target,
                        self.state.name()
                    )));
                }
                self.route_data(source, target, payload)
            }

            Message::Ack => {
                debug!(from = %source, "ack received");
                Ok(())
            }

            Message::Error => {
                warn!(from = %source, "peer reported an error");
                Ok(())
            }

            Message::CreateVirtualNode { body } => {
                warn!(from = %source, len = body.len(), "virtual nodes are not implemented, ignoring");
                Ok(())
            }
        }
    }

    /// Sends application data to a cord position
    pub fn send_data(&mut self, target: CordPosition, payload: Bytes) -> Result<()> {
        if !self.is_active() {
            return Err(Error::invalid_state(format!(
                "cannot send data while {}",
                self.state.name()
            )));
        }
        if payload.len() > MAX_DATA_PAYLOAD {
            return Err(Error::FrameTooLarge {
                len: FRAME_HEADER_LEN + DATA_HEADER_LEN + payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        self.route_data(self.node_id, target, payload)
    }

    /// Records a failed transmission reported by the dispatcher or transport
    pub fn on_send_failure(&mut self, destination: Destination, error: &TransportError) {
        self.stats.send_failures += 1;
        warn!(%destination, %error, "send failed");
    }

    /// Records a received frame that failed to decode
    pub fn on_decode_error(&mut self, source: NodeId, error: &DecodeError) {
        self.stats.decode_errors += 1;
        warn!(from = %source, %error, "frame discarded");
    }

    fn route_data(&mut self, source: NodeId, target: CordPosition, payload: Bytes) -> Result<()> {
        let hop = next_hop(
            target,
            self.position,
            &self.neighbors,
            self.successor,
            self.predecessor,
        );

        match hop {
            Ok(NextHop::Local) => {
                info!(from = %source, len = payload.len(), "data delivered");
                self.stats.delivered += 1;
                self.deliveries.push(Delivery { source, target, payload });
                Ok(())
            }
            Ok(hop) => {
                let next = hop
                    .neighbor()
                    .and_then(|n| self.neighbors.get(n))
                    .map(|n| n.id)
                    .ok_or_else(|| Error::invalid_state("routing produced a stale neighbor index"))?;
                debug!(%target, next = %next, ?hop, "forwarding data");
                self.stats.forwarded += 1;
                self.push(Destination::Unicast(next), Message::Data { target, payload });
                Ok(())
            }
            Err(e) => {
                self.stats.undeliverable += 1;
                warn!(%target, own = %self.position, "data undeliverable, dropped");
                Err(e)
            }
        }
    }

    fn try_join(&mut self) -> bool {
        if let NodeState::Joining { attempts } = &mut self.state {
            *attempts += 1;
        }
        self.stats.join_attempts += 1;

        let Some(plan) = plan_join(&self.neighbors, self.config.interval_fraction) else {
            debug!(neighbors = self.neighbors.len(), "no join target yet, staying unjoined");
            return false;
        };

        self.position = plan.position;
        self.successor = plan.successor;
        self.predecessor = plan.predecessor;
        for (index, message) in plan.notifications {
            if let Some(neighbor) = self.neighbors.get(index) {
                let to = neighbor.id;
                self.push(Destination::Unicast(to), message);
            }
        }

        info!(position = %self.position, case = ?plan.case, "joined cord");
        self.state = NodeState::Active { joined_by: plan.case };
        true
    }

    fn maybe_send_hello(&mut self, now: Instant) {
        let due = self
            .last_hello
            .map_or(true, |last| now.saturating_duration_since(last) >= self.config.hello_period);
        if !due {
            return;
        }

        let hello = Message::Hello {
            position: self.position,
            successor: self.successor().map(|n| n.position).into(),
            predecessor: self.predecessor().map(|n| n.position).into(),
        };
        self.push(Destination::Broadcast, hello);
        self.last_hello = Some(now);
        self.stats.hellos_sent += 1;
    }

    fn push(&mut self, destination: Destination, message: Message) {
        let kind = match destination {
            Destination::Broadcast => TransmitKind::Broadcast,
            Destination::Unicast(_) => TransmitKind::Unicast,
        };
        let sequence = self.sequences[kind.index()];
        self.sequences[kind.index()] = sequence.wrapping_add(1);
        self.outbox.push(Frame::new(destination, sequence, message));
    }
}
