use bytes::Bytes;

use crate::core::{CordPosition, Destination, NodeId};

/// Wire tags for each message type
pub mod tag {
    pub const HELLO: u8 = 0x00;
    pub const UPDATE_SUCCESSOR: u8 = 0x01;
    pub const UPDATE_PREDECESSOR: u8 = 0x02;
    pub const CREATE_VIRTUAL_NODE: u8 = 0x03;
    pub const DATA: u8 = 0x04;
    pub const ERROR: u8 = 0x05;
    pub const ACK: u8 = 0x06;
}

/// Protocol messages exchanged between cord nodes
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Periodic announcement of the sender's place on the cord
    Hello {
        /// Sender's own position
        position: CordPosition,
        /// Position of the sender's successor, or unassigned
        successor: CordPosition,
        /// Position of the sender's predecessor, or unassigned
        predecessor: CordPosition,
    },

    /// Sets the receiver's position and makes the sender its successor
    UpdateSuccessor {
        new_position: CordPosition,
    },

    /// Sets the receiver's position and makes the sender its predecessor
    UpdatePredecessor {
        new_position: CordPosition,
    },

    /// Reserved for virtual node creation; the body layout is undefined
    CreateVirtualNode {
        body: Bytes,
    },

    /// Application data addressed to a cord position
    Data {
        /// Position of the final recipient
        target: CordPosition,
        /// Opaque application payload
        payload: Bytes,
    },

    /// Single-byte acknowledgement
    Ack,

    /// Single-byte error indication
    Error,
}

impl Message {
    /// Returns the wire tag of this message
    pub fn tag(&self) -> u8 {
        match self {
            Message::Hello { .. } => tag::HELLO,
            Message::UpdateSuccessor { .. } => tag::UPDATE_SUCCESSOR,
            Message::UpdatePredecessor { .. } => tag::UPDATE_PREDECESSOR,
            Message::CreateVirtualNode { .. } => tag::CREATE_VIRTUAL_NODE,
            Message::Data { .. } => tag::DATA,
            Message::Error => tag::ERROR,
            Message::Ack => tag::ACK,
        }
    }

    /// Returns a short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "hello",
            Message::UpdateSuccessor { .. } => "update_successor",
            Message::UpdatePredecessor { .. } => "update_predecessor",
            Message::CreateVirtualNode { .. } => "create_virtual_node",
            Message::Data { .. } => "data",
            Message::Error => "error",
            Message::Ack => "ack",
        }
    }
}

/// How a frame is put on the air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransmitKind {
    Unicast = 0,
    Broadcast = 1,
}

impl TransmitKind {
    /// Index into per-kind counters
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Wire-level envelope around a single message
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Unicast or broadcast
    pub kind: TransmitKind,
    /// Intended receiver
    pub destination: NodeId,
    /// Per-kind sequence number of the sender
    pub sequence: u16,
    /// Integrity check over the encoded message
    pub integrity_check: u16,
    /// The carried message
    pub message: Message,
}

impl Frame {
    /// Creates a frame for `destination`; the integrity check is filled in
    /// by the codec when the frame is encoded.
    pub fn new(destination: Destination, sequence: u16, message: Message) -> Self {
        let kind = match destination {
            Destination::Broadcast => TransmitKind::Broadcast,
            Destination::Unicast(_) => TransmitKind::Unicast,
        };
        Frame {
            kind,
            destination: destination.node_id(),
            sequence,
            integrity_check: 0,
            message,
        }
    }

    /// Returns the destination as a routing target
    pub fn target(&self) -> Destination {
        match self.kind {
            TransmitKind::Broadcast => Destination::Broadcast,
            TransmitKind::Unicast => Destination::Unicast(self.destination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_tags() {
        let hello = Message::Hello {
            position: CordPosition::START,
            successor: CordPosition::UNASSIGNED,
            predecessor: CordPosition::UNASSIGNED,
        };
        assert_eq!(hello.tag(), tag::HELLO);
        assert_eq!(Message::Ack.tag(), tag::ACK);
        assert_eq!(Message::Error.tag(), tag::ERROR);
        assert_eq!(
            Message::Data {
                target: CordPosition::new(0.3),
                payload: Bytes::new(),
            }
            .name(),
            "data"
        );
    }

    #[test]
    fn test_frame_kind_follows_destination() {
        let frame = Frame::new(Destination::Broadcast, 7, Message::Ack);
        assert_eq!(frame.kind, TransmitKind::Broadcast);
        assert_eq!(frame.destination, NodeId::BROADCAST);
        assert_eq!(frame.target(), Destination::Broadcast);

        let peer = NodeId([1, 2, 3, 4, 5, 6]);
        let frame = Frame::new(Destination::Unicast(peer), 8, Message::Ack);
        assert_eq!(frame.kind, TransmitKind::Unicast);
        assert_eq!(frame.target(), Destination::Unicast(peer));
    }
}
