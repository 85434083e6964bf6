//! Bit-exact wire codec
//!
//! Message layout (first byte is always the type tag, floats are IEEE-754
//! binary32 little-endian):
//!
//! | Message            | Layout                          | Size  |
//! |--------------------|---------------------------------|-------|
//! | Hello              | tag + own + successor + pred.   | 13 B  |
//! | UpdateSuccessor    | tag + position                  | 5 B   |
//! | UpdatePredecessor  | tag + position                  | 5 B   |
//! | CreateVirtualNode  | tag + opaque body               | ≥1 B  |
//! | Data               | tag + target + payload          | ≥5 B  |
//! | Ack / Error        | tag                             | 1 B   |
//!
//! A frame prepends a 5-byte envelope: transmit kind (u8), sequence
//! (u16 LE) and the integrity check (u16 LE) over the message bytes.

use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::integrity::IntegrityCheck;
use super::message::{tag, Frame, Message, TransmitKind};
use crate::core::{CordPosition, DecodeError, Error, NodeId, MAX_FRAME_SIZE};

/// Size of the frame envelope preceding the message
pub const FRAME_HEADER_LEN: usize = 5;

/// Size of the fixed part of a Data message (tag + target)
pub const DATA_HEADER_LEN: usize = 5;

/// Largest Data payload that still fits in one frame
pub const MAX_DATA_PAYLOAD: usize = MAX_FRAME_SIZE - FRAME_HEADER_LEN - DATA_HEADER_LEN;

const HELLO_LEN: usize = 13;
const UPDATE_LEN: usize = 5;

/// Returns the encoded size of a message
pub fn encoded_len(message: &Message) -> usize {
    match message {
        Message::Hello { .. } => HELLO_LEN,
        Message::UpdateSuccessor { .. } | Message::UpdatePredecessor { .. } => UPDATE_LEN,
        Message::CreateVirtualNode { body } => 1 + body.len(),
        Message::Data { payload, .. } => DATA_HEADER_LEN + payload.len(),
        Message::Ack | Message::Error => 1,
    }
}

/// Appends the wire form of `message` to `dst`
pub fn encode_into(message: &Message, dst: &mut BytesMut) {
    dst.reserve(encoded_len(message));
    dst.put_u8(message.tag());
    match message {
        Message::Hello { position, successor, predecessor } => {
            dst.put_f32_le(position.value());
            dst.put_f32_le(successor.value());
            dst.put_f32_le(predecessor.value());
        }
        Message::UpdateSuccessor { new_position } | Message::UpdatePredecessor { new_position } => {
            dst.put_f32_le(new_position.value());
        }
        Message::CreateVirtualNode { body } => dst.extend_from_slice(body),
        Message::Data { target, payload } => {
            dst.put_f32_le(target.value());
            dst.extend_from_slice(payload);
        }
        Message::Ack | Message::Error => {}
    }
}

/// Encodes a message into a fresh buffer
pub fn encode(message: &Message) -> Bytes {
    let mut dst = BytesMut::with_capacity(encoded_len(message));
    encode_into(message, &mut dst);
    dst.freeze()
}

/// Decodes one message occupying the whole of `src`
pub fn decode(src: &[u8]) -> Result<Message, DecodeError> {
    let Some((&message_tag, mut body)) = src.split_first() else {
        return Err(DecodeError::Truncated { needed: 1, available: 0 });
    };

    let require = |needed: usize| {
        if src.len() < needed {
            Err(DecodeError::Truncated { needed, available: src.len() })
        } else {
            Ok(())
        }
    };

    let message = match message_tag {
        tag::HELLO => {
            require(HELLO_LEN)?;
            Message::Hello {
                position: CordPosition::new(body.get_f32_le()),
                successor: CordPosition::new(body.get_f32_le()),
                predecessor: CordPosition::new(body.get_f32_le()),
            }
        }
        tag::UPDATE_SUCCESSOR => {
            require(UPDATE_LEN)?;
            Message::UpdateSuccessor {
                new_position: CordPosition::new(body.get_f32_le()),
            }
        }
        tag::UPDATE_PREDECESSOR => {
            require(UPDATE_LEN)?;
            Message::UpdatePredecessor {
                new_position: CordPosition::new(body.get_f32_le()),
            }
        }
        tag::CREATE_VIRTUAL_NODE => Message::CreateVirtualNode {
            body: Bytes::copy_from_slice(body),
        },
        tag::DATA => {
            require(DATA_HEADER_LEN)?;
            let target = CordPosition::new(body.get_f32_le());
            Message::Data {
                target,
                payload: Bytes::copy_from_slice(body),
            }
        }
        tag::ERROR => Message::Error,
        tag::ACK => Message::Ack,
        other => return Err(DecodeError::UnknownType(other)),
    };

    Ok(message)
}

/// Frame codec for whole datagrams.
///
/// Unicast frames are reported as addressed to the local node, since the
/// medium only hands a node unicast frames meant for it.
#[derive(Clone)]
pub struct FrameCodec {
    local_id: NodeId,
    integrity: Arc<dyn IntegrityCheck>,
}

impl fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCodec")
            .field("local_id", &self.local_id)
            .field("integrity", &self.integrity)
            .finish()
    }
}

impl FrameCodec {
    /// Creates a new frame codec
    pub fn new(local_id: NodeId, integrity: Arc<dyn IntegrityCheck>) -> Self {
        FrameCodec { local_id, integrity }
    }

    /// Encodes a frame, stamping its integrity check
    pub fn encode_frame(&self, frame: &Frame) -> Result<Bytes, Error> {
        let len = FRAME_HEADER_LEN + encoded_len(&frame.message);
        if len > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge { len, max: MAX_FRAME_SIZE });
        }

        let mut dst = BytesMut::with_capacity(len);
        dst.put_u8(frame.kind as u8);
        dst.put_u16_le(frame.sequence);
        dst.put_u16_le(0);
        encode_into(&frame.message, &mut dst);

        let check = self.integrity.compute(&dst[FRAME_HEADER_LEN..]);
        dst[3..FRAME_HEADER_LEN].copy_from_slice(&check.to_le_bytes());
        Ok(dst.freeze())
    }

    /// Decodes a complete frame; `src` is never partially consumed
    pub fn decode_frame(&self, src: &[u8]) -> Result<Frame, DecodeError> {
        if src.len() < FRAME_HEADER_LEN + 1 {
            return Err(DecodeError::Truncated {
                needed: FRAME_HEADER_LEN + 1,
                available: src.len(),
            });
        }

        let mut header = &src[..FRAME_HEADER_LEN];
        let kind = match header.get_u8() {
            0 => TransmitKind::Unicast,
            1 => TransmitKind::Broadcast,
            other => return Err(DecodeError::UnknownKind(other)),
        };
        let sequence = header.get_u16_le();
        let carried = header.get_u16_le();

        let body = &src[FRAME_HEADER_LEN..];
        if !self.integrity.verify(body, carried) {
            return Err(DecodeError::IntegrityMismatch {
                carried,
                computed: self.integrity.compute(body),
            });
        }

        let message = decode(body)?;
        let destination = match kind {
            TransmitKind::Broadcast => NodeId::BROADCAST,
            TransmitKind::Unicast => self.local_id,
        };

        Ok(Frame {
            kind,
            destination,
            sequence,
            integrity_check: carried,
            message,
        })
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        // One datagram is one frame
        let frame = self.decode_frame(&src[..])?;
        src.clear();
        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = self.encode_frame(&item)?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}
