use std::io::{Read, Write};
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Directions a caller wants to make progress in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub const NONE: Interest = Interest {
        read: false,
        write: false,
    };
    pub const READ: Interest = Interest {
        read: true,
        write: false,
    };
    pub const WRITE: Interest = Interest {
        read: false,
        write: true,
    };
    pub const READ_WRITE: Interest = Interest {
        read: true,
        write: true,
    };

    pub fn is_empty(self) -> bool {
        !self.read && !self.write
    }
}

/// Result of a readiness wait. Only directions present in the requested
/// [`Interest`] are ever reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

impl Readiness {
    pub fn is_empty(self) -> bool {
        !self.readable && !self.writable
    }
}

/// A connected, full-duplex byte stream driven by a cooperative loop.
///
/// Reads and writes follow `std::io` conventions once the transport is in
/// non-blocking mode: `Ok(0)` from `read` is end-of-stream and
/// `ErrorKind::WouldBlock` means "nothing right now". [`Transport::wait_ready`]
/// is the only call allowed to suspend the calling thread.
pub trait Transport: Read + Write {
    /// Switch the transport between blocking and non-blocking I/O.
    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()>;

    /// Wait once until the transport can make progress in a direction named
    /// by `interest`, or until `timeout` elapses (`None` waits indefinitely).
    ///
    /// An empty `interest` returns immediately with empty readiness.
    fn wait_ready(&mut self, interest: Interest, timeout: Option<Duration>) -> Result<Readiness>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str {
        "transport"
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()> {
        (**self).set_nonblocking(nonblocking)
    }

    fn wait_ready(&mut self, interest: Interest, timeout: Option<Duration>) -> Result<Readiness> {
        (**self).wait_ready(interest, timeout)
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}

/// A connected IPC stream implementing [`Transport`].
///
/// On Unix, this wraps a Unix domain socket stream.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl IpcStream {
    /// Create an IpcStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: IpcStreamInner::Unix(stream),
        }
    }

    /// A connected pair of streams, useful for in-process peers and tests.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    #[cfg(unix)]
    fn raw_fd(&self) -> std::os::fd::RawFd {
        use std::os::fd::AsRawFd;

        match &self.inner {
            IpcStreamInner::Unix(stream) => stream.as_raw_fd(),
        }
    }
}

#[cfg(unix)]
impl Transport for IpcStream {
    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()> {
        match &self.inner {
            IpcStreamInner::Unix(stream) => stream.set_nonblocking(nonblocking).map_err(Into::into),
        }
    }

    fn wait_ready(&mut self, interest: Interest, timeout: Option<Duration>) -> Result<Readiness> {
        if interest.is_empty() {
            return Ok(Readiness::default());
        }

        let mut events: libc::c_short = 0;
        if interest.read {
            events |= libc::POLLIN;
        }
        if interest.write {
            events |= libc::POLLOUT;
        }

        let mut pfd = libc::pollfd {
            fd: self.raw_fd(),
            events,
            revents: 0,
        };
        let timeout_ms = match timeout {
            None => -1,
            Some(timeout) => timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        };

        // SAFETY: `pfd` is a valid, exclusively borrowed pollfd and the count
        // passed is 1. The descriptor stays open for the duration of the call
        // because `self` owns it.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Readiness::default());
            }
            return Err(TransportError::Wait(err));
        }

        // Hang-ups and errors surface through the next read/write call.
        let broken = pfd.revents & (libc::POLLHUP | libc::POLLERR) != 0;
        Ok(Readiness {
            readable: interest.read && (pfd.revents & libc::POLLIN != 0 || broken),
            writable: interest.write && (pfd.revents & libc::POLLOUT != 0 || broken),
        })
    }

    fn transport_name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => f.debug_struct("IpcStream").field("type", &"unix").finish(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::ErrorKind;

    use super::*;

    #[test]
    fn pair_reports_writable_and_then_readable() {
        let (mut left, mut right) = IpcStream::pair().unwrap();
        left.set_nonblocking(true).unwrap();
        right.set_nonblocking(true).unwrap();

        let ready = left
            .wait_ready(Interest::WRITE, Some(Duration::from_millis(100)))
            .unwrap();
        assert!(ready.writable);
        assert!(!ready.readable);

        let idle = right
            .wait_ready(Interest::READ, Some(Duration::from_millis(10)))
            .unwrap();
        assert!(idle.is_empty());

        left.write_all(b"ping").unwrap();
        let ready = right
            .wait_ready(Interest::READ, Some(Duration::from_millis(500)))
            .unwrap();
        assert!(ready.readable);

        let mut buf = [0u8; 4];
        assert_eq!(right.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn nonblocking_read_reports_would_block() {
        let (_left, mut right) = IpcStream::pair().unwrap();
        right.set_nonblocking(true).unwrap();

        let mut buf = [0u8; 8];
        let err = right.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn hangup_is_reported_as_readable_eof() {
        let (left, mut right) = IpcStream::pair().unwrap();
        right.set_nonblocking(true).unwrap();
        drop(left);

        let ready = right
            .wait_ready(Interest::READ, Some(Duration::from_millis(500)))
            .unwrap();
        assert!(ready.readable);

        let mut buf = [0u8; 8];
        assert_eq!(right.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn empty_interest_returns_immediately() {
        let (mut left, _right) = IpcStream::pair().unwrap();
        let ready = left.wait_ready(Interest::NONE, None).unwrap();
        assert!(ready.is_empty());
        assert_eq!(left.transport_name(), "unix-domain-socket");
    }
}
