//! Multiplexed channel sessions over a single framed byte stream.
//!
//! A session carries several logical channels over one connection. Every
//! frame is tagged with a channel ID and a length; the session loop reads,
//! dispatches and writes frames cooperatively on one thread, holding
//! producers back once `max_outgoing_msg` bytes are in flight.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream transports (Unix sockets, in-memory) with
//!   readiness waits
//! - [`frame`]: wire format, incremental decoder and encoder
//! - [`session`]: channel table, dispatch sink and the `do_io`/`pump` loop
//!
//! ```no_run
//! use adbx::session::{Discard, Session, SessionConfig};
//! use adbx::transport::UnixDomainSocket;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = UnixDomainSocket::connect("/tmp/adbx.sock")?;
//! let mut session = Session::init(stream, SessionConfig::default(), Discard)?;
//! session.send(adbx::frame::TO_PEER, "hello")?;
//! session.shutdown();
//! session.pump_while(|s| !s.is_terminal())?;
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use adbx_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use adbx_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use adbx_session::*;
}

pub use adbx_session::{Session, SessionConfig, SessionError};
