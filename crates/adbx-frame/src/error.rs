/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x4158 \"AX\")")]
    InvalidMagic,

    /// The header names a message kind this implementation does not know.
    #[error("unknown message kind {0:#04x}")]
    UnknownKind(u8),

    /// The reserved header byte is not zero.
    #[error("reserved header bits set ({0:#04x})")]
    ReservedBits(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The stream ended in the middle of a frame.
    #[error("stream ended mid-frame ({pending} bytes pending)")]
    Truncated { pending: usize },

    /// The stream ended (blocking reads) or refused further bytes (writes).
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True for errors caused by malformed bytes on the wire rather than by
    /// the underlying transport.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidMagic
                | FrameError::UnknownKind(_)
                | FrameError::ReservedBits(_)
                | FrameError::PayloadTooLarge { .. }
                | FrameError::Truncated { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
