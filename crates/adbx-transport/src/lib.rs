//! Byte-stream transports for the adbx multiplexer.
//!
//! A session needs three things from its transport: non-blocking reads,
//! non-blocking writes, and a single readiness wait that tells it which of
//! the two can make progress. [`Transport`] captures that seam.
//!
//! Provided implementations:
//! - [`IpcStream`] over Unix domain sockets (Linux/macOS)
//! - [`MemoryTransport`], a scripted in-memory double for tests and demos

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use traits::{Interest, IpcStream, Readiness, Transport};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
