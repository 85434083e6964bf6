use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Physical address of a node on the radio medium (a 6-byte MAC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub [u8; NodeId::LEN]);

impl NodeId {
    /// Length of a physical address in bytes
    pub const LEN: usize = 6;

    /// The all-ones broadcast address
    pub const BROADCAST: NodeId = NodeId([0xFF; NodeId::LEN]);

    /// Generates a new random, locally administered unicast address
    pub fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; NodeId::LEN];
        rng.fill(&mut bytes);
        // Locally administered, unicast
        bytes[0] = (bytes[0] | 0x02) & !0x01;
        NodeId(bytes)
    }

    /// Returns whether this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == NodeId::BROADCAST
    }
}

impl From<[u8; NodeId::LEN]> for NodeId {
    fn from(bytes: [u8; NodeId::LEN]) -> Self {
        NodeId(bytes)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Where an outbound frame goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Every node in radio range
    Broadcast,
    /// A single physical neighbor
    Unicast(NodeId),
}

impl Destination {
    /// Returns the physical address this destination maps to
    pub fn node_id(&self) -> NodeId {
        match self {
            Destination::Broadcast => NodeId::BROADCAST,
            Destination::Unicast(id) => *id,
        }
    }
}

impl From<NodeId> for Destination {
    fn from(id: NodeId) -> Self {
        if id.is_broadcast() {
            Destination::Broadcast
        } else {
            Destination::Unicast(id)
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Broadcast => write!(f, "broadcast"),
            Destination::Unicast(id) => write!(f, "{}", id),
        }
    }
}

/// A location on the virtual cord.
///
/// Assigned positions lie in `[0.0, 1.0]`, where `START` and `END` are the
/// cord's anchors. `UNASSIGNED` marks a node (or an announced neighbor
/// pointer) that is not on the cord yet. Comparison is plain `f32`
/// comparison; exact equality is only relied on for identity routing and
/// anchor detection.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct CordPosition(f32);

impl CordPosition {
    /// Sentinel for "not yet joined"
    pub const UNASSIGNED: CordPosition = CordPosition(-1.0);
    /// Lower anchor of the cord
    pub const START: CordPosition = CordPosition(0.0);
    /// Upper anchor of the cord
    pub const END: CordPosition = CordPosition(1.0);

    /// Wraps a raw position value
    pub const fn new(value: f32) -> Self {
        CordPosition(value)
    }

    /// Returns the raw value
    pub fn value(&self) -> f32 {
        self.0
    }

    /// Returns whether this is a real position on the cord
    pub fn is_assigned(&self) -> bool {
        (0.0..=1.0).contains(&self.0)
    }

    /// Returns the position, or `None` for anything off the cord
    pub fn assigned(self) -> Option<Self> {
        self.is_assigned().then_some(self)
    }

    /// Returns a position between `self` and `other`.
    ///
    /// Computed as `self + fraction * (other - self)`; a fraction of `0.5`
    /// gives the true midpoint.
    pub fn between(self, other: CordPosition, fraction: f32) -> CordPosition {
        CordPosition(self.0 + fraction * (other.0 - self.0))
    }
}

impl Default for CordPosition {
    fn default() -> Self {
        CordPosition::UNASSIGNED
    }
}

impl From<Option<CordPosition>> for CordPosition {
    fn from(position: Option<CordPosition>) -> Self {
        position.unwrap_or(CordPosition::UNASSIGNED)
    }
}

impl fmt::Display for CordPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_assigned() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "unassigned")
        }
    }
}

/// Integrity check applied to every frame's message bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityMode {
    /// Fletcher-16 checksum
    Fletcher16,
    /// No check: frames carry zero and every frame is accepted
    Disabled,
}

/// Configuration for a virtual cord node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Capacity of the outbound frame queue
    pub send_queue_capacity: usize,
    /// Capacity of the inbound frame queue
    pub receive_queue_capacity: usize,
    /// Capacity of the send-failure queue
    pub error_queue_capacity: usize,
    /// Capacity of the local data delivery queue
    pub delivery_queue_capacity: usize,
    /// How long an outbound enqueue may wait for space
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub queue_timeout: Duration,
    /// Pause before each transmission attempt of the dispatch loop
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub sending_delay: Duration,
    /// Period of the state machine tick
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub tick_interval: Duration,
    /// Minimum time between two Hello broadcasts
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub hello_period: Duration,
    /// Number of listen-only ticks before the first join attempt
    pub discovery_cycles: u32,
    /// Fraction of an interval at which a joining node places itself
    pub interval_fraction: f32,
    /// Maximum number of physical neighbors tracked
    pub neighbor_capacity: usize,
    /// Integrity check used on the wire
    pub integrity: IntegrityMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            send_queue_capacity: 10,
            receive_queue_capacity: 5,
            error_queue_capacity: 5,
            delivery_queue_capacity: 16,
            queue_timeout: Duration::from_millis(512),
            sending_delay: Duration::from_millis(100),
            tick_interval: Duration::from_millis(1000),
            hello_period: Duration::from_millis(1000),
            discovery_cycles: super::DEFAULT_DISCOVERY_CYCLES,
            interval_fraction: super::DEFAULT_INTERVAL_FRACTION,
            neighbor_capacity: super::DEFAULT_NEIGHBOR_CAPACITY,
            integrity: IntegrityMode::Fletcher16,
        }
    }
}

impl Config {
    /// Checks that every tunable is usable
    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("send_queue_capacity", self.send_queue_capacity),
            ("receive_queue_capacity", self.receive_queue_capacity),
            ("error_queue_capacity", self.error_queue_capacity),
            ("delivery_queue_capacity", self.delivery_queue_capacity),
            ("neighbor_capacity", self.neighbor_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(Error::config(format!("{} must be greater than zero", name)));
            }
        }

        if self.tick_interval.is_zero() {
            return Err(Error::config("tick_interval must be greater than zero"));
        }

        if !(self.interval_fraction > 0.0 && self.interval_fraction < 1.0) {
            return Err(Error::config(format!(
                "interval_fraction must lie in (0, 1), got {}",
                self.interval_fraction
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_random() {
        let id1 = NodeId::random();
        let id2 = NodeId::random();
        assert_ne!(id1, id2);
        assert!(!id1.is_broadcast());
        assert_eq!(id1.0[0] & 0x01, 0);
    }

    #[test]
    fn test_node_id_display() {
        let id = NodeId([0x24, 0x0a, 0xc4, 0x00, 0x01, 0xff]);
        assert_eq!(id.to_string(), "24:0a:c4:00:01:ff");
        assert_eq!(Destination::from(NodeId::BROADCAST), Destination::Broadcast);
        assert_eq!(Destination::from(id), Destination::Unicast(id));
    }

    #[test]
    fn test_position_assignment() {
        assert!(!CordPosition::UNASSIGNED.is_assigned());
        assert!(CordPosition::START.is_assigned());
        assert!(CordPosition::END.is_assigned());
        assert_eq!(CordPosition::UNASSIGNED.assigned(), None);
        assert_eq!(CordPosition::from(None), CordPosition::UNASSIGNED);
        assert_eq!(CordPosition::UNASSIGNED.to_string(), "unassigned");
    }

    #[test]
    fn test_position_between() {
        let mid = CordPosition::START.between(CordPosition::END, 0.5);
        assert_eq!(mid, CordPosition::new(0.5));

        let near = CordPosition::new(0.2).between(CordPosition::new(0.6), 0.25);
        assert!((near.value() - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.send_queue_capacity = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.interval_fraction = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tick_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config {
            hello_period: Duration::from_millis(2500),
            integrity: IntegrityMode::Disabled,
            ..Default::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"hello_period\":2500"));
        assert!(json.contains("\"integrity\":\"disabled\""));

        let decoded: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.hello_period, Duration::from_millis(2500));
        assert_eq!(decoded.integrity, IntegrityMode::Disabled);
        assert_eq!(decoded.neighbor_capacity, config.neighbor_capacity);
    }
}
