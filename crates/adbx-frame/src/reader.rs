use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_message, Message, DEFAULT_MAX_PAYLOAD};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Result of polling a byte source for the next message.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete message.
    Message(Message),
    /// The source has no more bytes right now; partial input is retained.
    WouldBlock,
    /// The source ended on a frame boundary.
    Eof,
}

/// Incremental message decoder over any `Read` source.
///
/// Bytes that do not yet form a complete message stay buffered across calls,
/// so a source may be split at arbitrary points (including mid-header)
/// without changing the sequence of decoded messages.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_payload_size: usize,
    eof: bool,
}

impl FrameDecoder {
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_payload_size,
            eof: false,
        }
    }

    /// Return the next complete message from the buffer, reading from `src`
    /// only when the buffer holds no complete message.
    ///
    /// `WouldBlock` from the source is reported as [`ReadOutcome::WouldBlock`];
    /// `Interrupted` is retried. End-of-stream with buffered bytes is
    /// [`FrameError::Truncated`].
    pub fn poll_from<R: Read + ?Sized>(&mut self, src: &mut R) -> Result<ReadOutcome> {
        loop {
            if let Some(message) = decode_message(&mut self.buf, self.max_payload_size)? {
                return Ok(ReadOutcome::Message(message));
            }

            if self.eof {
                if self.buf.is_empty() {
                    return Ok(ReadOutcome::Eof);
                }
                return Err(FrameError::Truncated {
                    pending: self.buf.len(),
                });
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            match src.read(&mut chunk) {
                Ok(0) => {
                    trace!(pending = self.buf.len(), "source reached end of stream");
                    self.eof = true;
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(ReadOutcome::WouldBlock)
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Bytes buffered but not yet part of a complete message.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

/// Reads complete messages from an owned `Read` stream.
pub struct FrameReader<T> {
    inner: T,
    decoder: FrameDecoder,
}

impl<T: Read> FrameReader<T> {
    /// Create a new reader with the default payload limit.
    pub fn new(inner: T) -> Self {
        Self::with_decoder(inner, FrameDecoder::default())
    }

    pub fn with_decoder(inner: T, decoder: FrameDecoder) -> Self {
        Self { inner, decoder }
    }

    /// Poll for the next message without blocking on a non-blocking stream.
    pub fn poll_message(&mut self) -> Result<ReadOutcome> {
        self.decoder.poll_from(&mut self.inner)
    }

    /// Read the next complete message from a blocking stream.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached on a
    /// frame boundary. A `WouldBlock` from the stream is returned as an I/O
    /// error; use [`FrameReader::poll_message`] for non-blocking streams.
    pub fn read_message(&mut self) -> Result<Message> {
        match self.poll_message()? {
            ReadOutcome::Message(message) => Ok(message),
            ReadOutcome::Eof => Err(FrameError::ConnectionClosed),
            ReadOutcome::WouldBlock => Err(FrameError::Io(ErrorKind::WouldBlock.into())),
        }
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
