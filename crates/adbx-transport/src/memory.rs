use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::traits::{Interest, Readiness, Transport};

/// Scripted in-memory transport.
///
/// Inbound bytes are fed by the test (or by an in-process peer) and returned
/// by `read` in chunks of at most `read_chunk` bytes. Outbound bytes are
/// collected for inspection. With a write budget set, the transport accepts at
/// most that many bytes between two readiness waits, which models a peer that
/// drains a fixed amount per loop iteration.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inbound: VecDeque<u8>,
    inbound_closed: bool,
    read_chunk: Option<usize>,
    outbound: Vec<u8>,
    write_budget_per_wait: Option<usize>,
    write_budget: usize,
    write_failure: Option<ErrorKind>,
    nonblocking: bool,
    waits: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit every `read` call to at most `chunk` bytes.
    pub fn with_read_chunk(mut self, chunk: usize) -> Self {
        self.read_chunk = Some(chunk.max(1));
        self
    }

    /// Accept at most `budget` written bytes per readiness wait.
    pub fn with_write_budget(mut self, budget: usize) -> Self {
        self.write_budget_per_wait = Some(budget);
        self.write_budget = 0;
        self
    }

    /// Make bytes available to subsequent reads.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Signal end-of-stream once the fed bytes are consumed.
    pub fn close_inbound(&mut self) {
        self.inbound_closed = true;
    }

    /// Fail every subsequent write with `kind`.
    pub fn fail_writes(&mut self, kind: ErrorKind) {
        self.write_failure = Some(kind);
    }

    /// Everything written so far.
    pub fn written(&self) -> &[u8] {
        &self.outbound
    }

    /// Take everything written so far, leaving the outbound buffer empty.
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }

    /// Inbound bytes not yet read.
    pub fn unread(&self) -> usize {
        self.inbound.len()
    }

    /// Number of readiness waits performed.
    pub fn waits(&self) -> usize {
        self.waits
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    fn write_capacity(&self) -> Option<usize> {
        self.write_budget_per_wait.map(|_| self.write_budget)
    }
}

impl Read for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.inbound.is_empty() {
            if self.inbound_closed {
                return Ok(0);
            }
            return Err(std::io::Error::from(ErrorKind::WouldBlock));
        }

        let limit = self.read_chunk.unwrap_or(usize::MAX);
        let n = buf.len().min(limit).min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemoryTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(kind) = self.write_failure {
            return Err(std::io::Error::from(kind));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let n = match self.write_capacity() {
            Some(0) => return Err(std::io::Error::from(ErrorKind::WouldBlock)),
            Some(capacity) => capacity.min(buf.len()),
            None => buf.len(),
        };
        self.outbound.extend_from_slice(&buf[..n]);
        if self.write_budget_per_wait.is_some() {
            self.write_budget -= n;
        }
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()> {
        self.nonblocking = nonblocking;
        Ok(())
    }

    fn wait_ready(&mut self, interest: Interest, _timeout: Option<Duration>) -> Result<Readiness> {
        self.waits += 1;
        if let Some(budget) = self.write_budget_per_wait {
            self.write_budget = budget;
        }

        let writable = self.write_failure.is_some() || self.write_capacity() != Some(0);
        Ok(Readiness {
            readable: interest.read && (!self.inbound.is_empty() || self.inbound_closed),
            writable: interest.write && writable,
        })
    }

    fn transport_name(&self) -> &'static str {
        "memory"
    }
}
