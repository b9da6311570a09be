use std::fmt;

use adbx_frame::{Message, MessageKind};
use adbx_transport::TransportError;

use crate::session::SessionState;

/// What brought a session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Malformed bytes from the peer (bad header, oversized length,
    /// truncated frame).
    Framing,
    /// The transport failed to read, write or wait.
    Transport,
    /// Well-formed frames that break session rules.
    Protocol,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::Framing => "framing",
            FaultKind::Transport => "transport",
            FaultKind::Protocol => "protocol",
        };
        f.write_str(name)
    }
}

/// A fatal condition recorded by the loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} fault: {detail}")]
pub struct SessionFault {
    pub kind: FaultKind,
    pub detail: String,
}

impl SessionFault {
    pub fn new(kind: FaultKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Errors returned by session operations.
///
/// Variants that carry a rejected message hand its ownership back to the
/// caller; see [`SessionError::into_message`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The target channel no longer accepts outgoing data.
    #[error("channel {channel} is not open")]
    ChannelClosed { channel: u16, message: Message },

    /// The payload can never fit under the configured limits.
    #[error("message of {size} bytes exceeds the outgoing limit of {max} bytes")]
    MessageTooLarge {
        size: usize,
        max: usize,
        message: Message,
    },

    /// The channel ID is outside the channel table.
    #[error("channel {channel} is outside the channel table (max {max})")]
    ChannelLimit {
        channel: u16,
        max: u16,
        message: Option<Message>,
    },

    /// No channel with this ID has been created.
    #[error("channel {0} does not exist")]
    UnknownChannel(u16),

    /// Every channel ID below the table limit is in use.
    #[error("channel table is full ({max} channels)")]
    TableFull { max: u16 },

    /// Control messages are produced by the session itself.
    #[error("{kind:?} messages cannot be queued by callers")]
    ReservedKind { kind: MessageKind, message: Message },

    /// The session terminated or failed while the operation was pending.
    #[error("session ended ({state})")]
    Ended {
        state: SessionState,
        message: Option<Message>,
    },

    /// A blocking wait made no progress for `rounds` consecutive rounds.
    #[error("no progress after {rounds} rounds")]
    Stalled {
        rounds: u32,
        message: Option<Message>,
    },

    /// The configuration was rejected at init.
    #[error("invalid session config: {0}")]
    Config(String),

    /// The transport could not be prepared at init.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// Recover the message a failed enqueue was given, if any.
    pub fn into_message(self) -> Option<Message> {
        match self {
            SessionError::ChannelClosed { message, .. }
            | SessionError::MessageTooLarge { message, .. }
            | SessionError::ReservedKind { message, .. } => Some(message),
            SessionError::ChannelLimit { message, .. }
            | SessionError::Ended { message, .. }
            | SessionError::Stalled { message, .. } => message,
            SessionError::UnknownChannel(_)
            | SessionError::TableFull { .. }
            | SessionError::Config(_)
            | SessionError::Transport(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
