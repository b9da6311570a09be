use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Message header: magic (2) + length (4) + channel (2) + kind (1) + reserved (1).
pub const HEADER_SIZE: usize = 10;

/// Magic bytes: "AX" (0x41 0x58).
pub const MAGIC: [u8; 2] = [0x41, 0x58];

/// Default maximum payload size: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// What a message means to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Application payload for the channel.
    Data,
    /// The sender will send nothing more on the channel.
    Close,
    /// Acknowledges a [`MessageKind::Close`] received on the channel.
    CloseAck,
}

impl MessageKind {
    pub fn as_u8(self) -> u8 {
        match self {
            MessageKind::Data => 0,
            MessageKind::Close => 1,
            MessageKind::CloseAck => 2,
        }
    }

    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(MessageKind::Data),
            1 => Ok(MessageKind::Close),
            2 => Ok(MessageKind::CloseAck),
            other => Err(FrameError::UnknownKind(other)),
        }
    }

    /// True for kinds generated by the session rather than the application.
    pub fn is_control(self) -> bool {
        !matches!(self, MessageKind::Data)
    }
}

/// Header metadata of a framed message, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub channel: u16,
    pub kind: MessageKind,
    pub len: u32,
}

/// A framed message with channel routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The channel this message belongs to.
    pub channel: u16,
    /// Data or one of the control kinds.
    pub kind: MessageKind,
    /// The message payload.
    pub payload: Bytes,
}

impl Message {
    /// Create a data message.
    pub fn new(channel: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            kind: MessageKind::Data,
            payload: payload.into(),
        }
    }

    /// Create an empty control message.
    pub fn control(channel: u16, kind: MessageKind) -> Self {
        Self {
            channel,
            kind,
            payload: Bytes::new(),
        }
    }

    /// Header metadata; fails if the payload does not fit the 32-bit length field.
    pub fn header(&self) -> Result<MessageHeader> {
        let size = self.payload.len();
        let len = u32::try_from(size).map_err(|_| FrameError::PayloadTooLarge {
            size,
            max: u32::MAX as usize,
        })?;
        Ok(MessageHeader {
            channel: self.channel,
            kind: self.kind,
            len,
        })
    }

    /// The total wire size of this message (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a message into the wire format.
///
/// ```text
/// ┌────────────┬───────────┬───────────┬──────────┬──────────┬────────────────┐
/// │ Magic (2B) │ Length    │ Channel   │ Kind     │ Reserved │ Payload        │
/// │ 0x41 0x58  │ (4B LE)   │ (2B LE)   │ (1B)     │ (1B, 0)  │ (Length bytes) │
/// └────────────┴───────────┴───────────┴──────────┴──────────┴────────────────┘
/// ```
pub fn encode_message(message: &Message, dst: &mut BytesMut) -> Result<()> {
    let len = message.payload.len();
    if len > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + len);
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len as u32);
    dst.put_u16_le(message.channel);
    dst.put_u8(message.kind.as_u8());
    dst.put_u8(0);
    dst.put_slice(&message.payload);
    Ok(())
}

/// Parse and validate a header from the front of `src` without consuming it.
///
/// Returns `Ok(None)` until at least [`HEADER_SIZE`] bytes are buffered.
pub fn peek_header(src: &[u8], max_payload: usize) -> Result<Option<MessageHeader>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]);
    let channel = u16::from_le_bytes([src[6], src[7]]);
    let kind = MessageKind::from_u8(src[8])?;
    if src[9] != 0 {
        return Err(FrameError::ReservedBits(src[9]));
    }
    if len as usize > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: len as usize,
            max: max_payload,
        });
    }

    Ok(Some(MessageHeader { channel, kind, len }))
}

/// Decode a message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet;
/// the buffer is left untouched in that case. On success, consumes the
/// message bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, max_payload: usize) -> Result<Option<Message>> {
    let Some(header) = peek_header(&src[..], max_payload)? else {
        return Ok(None);
    };

    let total = HEADER_SIZE + header.len as usize;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(header.len as usize).freeze();

    Ok(Some(Message {
        channel: header.channel,
        kind: header.kind,
        payload,
    }))
}
