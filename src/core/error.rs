use std::io;
use thiserror::Error;

use super::types::CordPosition;

/// Custom error types for the virtual cord core
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Queue full: {queue}")]
    QueueFull {
        /// Name of the queue that refused the item
        queue: &'static str,
    },

    #[error("Neighbor table full ({capacity} entries)")]
    NeighborTableFull {
        /// Configured table capacity
        capacity: usize,
    },

    #[error("Data for position {target} is undeliverable: no route")]
    Undeliverable {
        /// Target cord position of the dropped data
        target: CordPosition,
    },

    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Encoded length
        len: usize,
        /// Maximum frame length accepted by the medium
        max: usize,
    },
}

/// Reasons a received frame could not be decoded.
///
/// None of these are fatal; the frame is discarded and the node carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("unknown message type 0x{0:02x}")]
    UnknownType(u8),

    #[error("unknown transmit kind 0x{0:02x}")]
    UnknownKind(u8),

    #[error("integrity check mismatch: frame carries 0x{carried:04x}, computed 0x{computed:04x}")]
    IntegrityMismatch { carried: u16, computed: u16 },
}

/// Failures reported by a transport, either from `send` directly or later
/// through the send-status hook.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("no acknowledgement from destination")]
    NoAck,

    #[error("transport hooks not registered")]
    NotRegistered,

    #[error("transport closed")]
    Closed,

    #[error("transport I/O failure: {0}")]
    Io(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Creates a queue full error for the named queue
    pub fn queue_full(queue: &'static str) -> Self {
        Error::QueueFull { queue }
    }
}
