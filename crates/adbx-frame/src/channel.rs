//! Reserved channel IDs.
//!
//! Every session has the two special channels below. Their data is handed to
//! the session's dispatch sink rather than buffered. IDs from
//! [`NR_SPECIAL_CHANNELS`] upward are application channels.

/// Data arriving from the peer side of the connection.
pub const FROM_PEER: u16 = 0;

/// Data addressed to the peer side of the connection.
pub const TO_PEER: u16 = 1;

/// Number of reserved channel IDs; the first application channel ID.
pub const NR_SPECIAL_CHANNELS: u16 = 2;

/// Returns a human-readable name for a channel ID.
pub fn channel_name(id: u16) -> &'static str {
    match id {
        FROM_PEER => "FROM_PEER",
        TO_PEER => "TO_PEER",
        _ => "APP",
    }
}

/// Returns true if the channel ID is one of the special channels.
pub fn is_special(id: u16) -> bool {
    id < NR_SPECIAL_CHANNELS
}
