//! Length-prefixed, channel-tagged message framing.
//!
//! Every message on the wire carries a 10-byte header:
//! - a 2-byte magic number ("AX") for stream synchronization
//! - a 4-byte little-endian payload length
//! - a 2-byte little-endian channel ID
//! - a 1-byte message kind (data, close, close-ack)
//! - a reserved byte that must be zero
//!
//! [`FrameDecoder`] turns an arbitrary, possibly non-blocking byte source into
//! complete [`Message`]s; partial frames never escape it. [`FrameEncoder`]
//! stages outgoing messages and reports which ones the transport has fully
//! accepted.

pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use channel::{channel_name, is_special, FROM_PEER, NR_SPECIAL_CHANNELS, TO_PEER};
pub use codec::{
    decode_message, encode_message, peek_header, Message, MessageHeader, MessageKind,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
pub use reader::{FrameDecoder, FrameReader, ReadOutcome};
pub use writer::{FrameEncoder, FrameWriter, WriteProgress, WrittenMessage};
