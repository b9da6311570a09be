//! Cooperative multi-channel session over one framed transport.
//!
//! A [`Session`] owns the transport, the channel table and the dispatch
//! sink. Callers drive it with two steps:
//!
//! - [`Session::do_io`] waits once for transport readiness, then reads and
//!   writes whatever the transport allows without blocking;
//! - [`Session::pump`] advances state from what `do_io` produced: it delivers
//!   incoming messages, credits written bytes against backpressure, moves
//!   channels through their close handshake and stages outgoing frames.
//!
//! [`Session::pump_while`] combines both into a synchronous wait and
//! [`Session::queue_message_synchronous`] uses the same loop to block until a
//! channel has room under `max_outgoing_msg`.

pub mod channel;
pub mod config;
pub mod error;
pub mod session;
pub mod sink;

pub use channel::{Channel, ChannelState, ChannelTable, Routing};
pub use config::{BackpressurePolicy, SessionConfig};
pub use error::{FaultKind, Result, SessionError, SessionFault};
pub use session::{IoProgress, PumpReport, Session, SessionState};
pub use sink::{Delivery, Discard, MessageSink, SinkError};
