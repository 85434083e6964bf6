//! Core types for the virtual cord protocol
//!
//! This module contains the fundamental building blocks used throughout the library:
//! physical addresses, cord positions, configuration and the error types.

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{DecodeError, Error, Result, TransportError};
pub use self::types::{Config, CordPosition, Destination, IntegrityMode, NodeId};

/// Maximum frame size accepted by the radio medium (ESP-NOW payload limit)
pub const MAX_FRAME_SIZE: usize = 250;

/// Default number of listen-only ticks before joining the cord
pub const DEFAULT_DISCOVERY_CYCLES: u32 = 3;

/// Default split point used when placing a node inside an interval
pub const DEFAULT_INTERVAL_FRACTION: f32 = 0.5;

/// Default neighbor table capacity
pub const DEFAULT_NEIGHBOR_CAPACITY: usize = 20;
