use std::time::Duration;

use adbx_frame::{DEFAULT_MAX_PAYLOAD, NR_SPECIAL_CHANNELS};

use crate::error::{Result, SessionError};

/// How `max_outgoing_msg` is applied across channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressurePolicy {
    /// Every channel may have up to `max_outgoing_msg` bytes in flight.
    #[default]
    PerChannel,
    /// All channels together may have up to `max_outgoing_msg` bytes in flight.
    Aggregate,
}

/// Session configuration. Fixed for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Ceiling on payload bytes accepted but not yet written. Default: 64 KiB.
    pub max_outgoing_msg: usize,
    /// Whether the ceiling is per channel or shared. Default: per channel.
    pub backpressure: BackpressurePolicy,
    /// Largest payload accepted on the wire in either direction. Default: 1 MiB.
    pub max_payload_size: usize,
    /// Channels created at init, starting with the special ones. Default: 2.
    pub initial_channels: u16,
    /// Channel IDs at or above this are refused. Default: 256.
    pub max_channels: u16,
    /// Upper bound on a single readiness wait; `None` waits indefinitely.
    pub poll_timeout: Option<Duration>,
    /// Messages decoded per `do_io` before reading pauses. Default: 64.
    pub max_inbox: usize,
    /// Staging stops once this many encoded bytes await the transport.
    /// Default: 64 KiB.
    pub write_high_water: usize,
    /// Give up a blocking wait after this many consecutive rounds without
    /// progress. Default: never.
    pub stall_limit: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_outgoing_msg: 64 * 1024,
            backpressure: BackpressurePolicy::PerChannel,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            initial_channels: NR_SPECIAL_CHANNELS,
            max_channels: 256,
            poll_timeout: None,
            max_inbox: 64,
            write_high_water: 64 * 1024,
            stall_limit: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SessionError::Config(msg));

        if self.max_outgoing_msg == 0 {
            return invalid("max_outgoing_msg must be greater than zero".to_string());
        }
        if self.max_payload_size > u32::MAX as usize {
            return invalid(format!(
                "max_payload_size {} exceeds the wire limit {}",
                self.max_payload_size,
                u32::MAX
            ));
        }
        if self.initial_channels < NR_SPECIAL_CHANNELS {
            return invalid(format!(
                "initial_channels must include the {NR_SPECIAL_CHANNELS} special channels"
            ));
        }
        if self.initial_channels > self.max_channels {
            return invalid(format!(
                "initial_channels ({}) exceeds max_channels ({})",
                self.initial_channels, self.max_channels
            ));
        }
        if self.max_inbox == 0 || self.write_high_water == 0 {
            return invalid("max_inbox and write_high_water must be greater than zero".to_string());
        }
        if self.stall_limit == Some(0) {
            return invalid("stall_limit must be greater than zero when set".to_string());
        }
        Ok(())
    }
}
