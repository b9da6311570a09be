use std::collections::VecDeque;
use std::io::{ErrorKind, Write};

use bytes::{Buf, BytesMut};

use crate::codec::{encode_message, Message, MessageKind, DEFAULT_MAX_PAYLOAD};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// A staged message whose last byte has been accepted by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenMessage {
    pub channel: u16,
    pub kind: MessageKind,
    pub payload_len: usize,
}

/// Outcome of one non-blocking write pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WriteProgress {
    /// Bytes accepted by the destination.
    pub bytes: usize,
    /// Messages fully written during this pass, in staging order.
    pub completed: Vec<WrittenMessage>,
    /// The destination reported `WouldBlock` with bytes still staged.
    pub blocked: bool,
}

#[derive(Debug)]
struct StagedFrame {
    message: WrittenMessage,
    remaining: usize,
}

/// Encodes messages into a write buffer and drains it into any `Write`
/// destination, tracking message boundaries across partial writes.
///
/// Frames leave the buffer strictly in staging order; a frame that has
/// started going out is always finished before the next one begins.
#[derive(Debug)]
pub struct FrameEncoder {
    buf: BytesMut,
    staged: VecDeque<StagedFrame>,
    max_payload_size: usize,
}

impl FrameEncoder {
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            staged: VecDeque::new(),
            max_payload_size,
        }
    }

    /// Append a message to the write buffer.
    pub fn stage(&mut self, message: &Message) -> Result<()> {
        if message.payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: message.payload.len(),
                max: self.max_payload_size,
            });
        }

        encode_message(message, &mut self.buf)?;
        self.staged.push_back(StagedFrame {
            message: WrittenMessage {
                channel: message.channel,
                kind: message.kind,
                payload_len: message.payload.len(),
            },
            remaining: message.wire_size(),
        });
        Ok(())
    }

    /// Write as much of the buffer as `dst` accepts without blocking.
    ///
    /// `Interrupted` is retried; `WouldBlock` ends the pass with
    /// [`WriteProgress::blocked`] set. A zero-length write means the
    /// destination is gone and yields [`FrameError::ConnectionClosed`].
    pub fn write_to<W: Write + ?Sized>(&mut self, dst: &mut W) -> Result<WriteProgress> {
        let mut progress = WriteProgress::default();

        while !self.buf.is_empty() {
            match dst.write(&self.buf) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.buf.advance(n);
                    progress.bytes += n;
                    self.retire(n, &mut progress.completed);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    progress.blocked = true;
                    return Ok(progress);
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        if progress.bytes > 0 {
            match dst.flush() {
                Ok(()) => {}
                Err(err)
                    if matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(progress)
    }

    fn retire(&mut self, mut written: usize, completed: &mut Vec<WrittenMessage>) {
        while written > 0 {
            let Some(front) = self.staged.front_mut() else {
                break;
            };
            let take = written.min(front.remaining);
            front.remaining -= take;
            written -= take;
            if front.remaining == 0 {
                if let Some(done) = self.staged.pop_front() {
                    completed.push(done.message);
                }
            }
        }
    }

    /// Encoded bytes not yet accepted by the destination.
    pub fn staged_bytes(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

/// Writes complete messages to an owned `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    encoder: FrameEncoder,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new writer with the default payload limit.
    pub fn new(inner: T) -> Self {
        Self::with_encoder(inner, FrameEncoder::default())
    }

    pub fn with_encoder(inner: T, encoder: FrameEncoder) -> Self {
        Self { inner, encoder }
    }

    /// Stage a message and write it out completely (blocking streams).
    ///
    /// A `WouldBlock` from the stream is returned as an I/O error with the
    /// unwritten bytes still staged; use [`FrameWriter::stage`] and
    /// [`FrameWriter::poll_write`] for non-blocking streams.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        self.encoder.stage(message)?;
        while !self.encoder.is_empty() {
            let progress = self.encoder.write_to(&mut self.inner)?;
            if progress.blocked {
                return Err(FrameError::Io(ErrorKind::WouldBlock.into()));
            }
        }
        Ok(())
    }

    pub fn stage(&mut self, message: &Message) -> Result<()> {
        self.encoder.stage(message)
    }

    /// Write whatever staged bytes the stream accepts right now.
    pub fn poll_write(&mut self) -> Result<WriteProgress> {
        self.encoder.write_to(&mut self.inner)
    }

    pub fn encoder(&self) -> &FrameEncoder {
        &self.encoder
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::{Bytes, BytesMut};

    use super::*;
    use crate::codec::{decode_message, HEADER_SIZE};

    fn decode_all(bytes: &[u8]) -> Vec<Message> {
        let mut wire = BytesMut::from(bytes);
        let mut out = Vec::new();
        while let Some(message) = decode_message(&mut wire, usize::MAX).unwrap() {
            out.push(message);
        }
        assert!(wire.is_empty(), "trailing partial frame");
        out
    }

    /// Accepts at most `per_call` bytes per write, and `WouldBlock`s after
    /// `calls_before_block` writes until unblocked.
    struct Trickle {
        data: Vec<u8>,
        per_call: usize,
        calls_before_block: usize,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.calls_before_block == 0 {
                return Err(ErrorKind::WouldBlock.into());
            }
            self.calls_before_block -= 1;
            let n = buf.len().min(self.per_call);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn send_writes_decodable_frames_in_order() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(&Message::new(1, Bytes::from_static(b"one"))).unwrap();
        writer.send(&Message::new(2, Bytes::from_static(b"two"))).unwrap();
        writer
            .send(&Message::control(2, MessageKind::Close))
            .unwrap();

        let messages = decode_all(&writer.into_inner().into_inner());
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].payload.as_ref(), b"one");
        assert_eq!(messages[1].payload.as_ref(), b"two");
        assert_eq!(messages[2].kind, MessageKind::Close);
    }

    #[test]
    fn payload_too_large_rejected_before_staging() {
        let mut encoder = FrameEncoder::new(4);
        let err = encoder
            .stage(&Message::new(1, Bytes::from_static(b"oversized")))
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 4 }));
        assert!(encoder.is_empty());
    }

    #[test]
    fn partial_writes_report_completion_at_frame_boundaries() {
        let mut encoder = FrameEncoder::default();
        encoder
            .stage(&Message::new(3, Bytes::from(vec![1u8; 30])))
            .unwrap();
        encoder
            .stage(&Message::new(4, Bytes::from(vec![2u8; 30])))
            .unwrap();
        assert_eq!(encoder.staged_bytes(), 2 * (HEADER_SIZE + 30));

        let mut dst = Trickle {
            data: Vec::new(),
            per_call: 30,
            calls_before_block: 1,
        };

        let first = encoder.write_to(&mut dst).unwrap();
        assert_eq!(first.bytes, 30);
        assert!(first.blocked);
        assert!(first.completed.is_empty());
        assert_eq!(encoder.staged_bytes(), 2 * (HEADER_SIZE + 30) - 30);

        dst.calls_before_block = 1;
        let second = encoder.write_to(&mut dst).unwrap();
        assert_eq!(second.bytes, 30);
        assert_eq!(
            second.completed,
            vec![WrittenMessage {
                channel: 3,
                kind: MessageKind::Data,
                payload_len: 30
            }]
        );

        dst.calls_before_block = usize::MAX;
        let rest = encoder.write_to(&mut dst).unwrap();
        assert!(!rest.blocked);
        assert_eq!(rest.completed.len(), 1);
        assert_eq!(rest.completed[0].channel, 4);
        assert!(encoder.is_empty());

        let messages = decode_all(&dst.data);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn send_surfaces_would_block_with_bytes_still_staged() {
        let dst = Trickle {
            data: Vec::new(),
            per_call: 4,
            calls_before_block: 1,
        };
        let mut writer = FrameWriter::new(dst);

        let err = writer
            .send(&Message::new(6, Bytes::from_static(b"retry")))
            .unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::WouldBlock));
        assert_eq!(writer.encoder().staged_bytes(), HEADER_SIZE + 5 - 4);

        writer.get_mut().calls_before_block = usize::MAX;
        let progress = writer.poll_write().unwrap();
        assert_eq!(progress.completed.len(), 1);
        assert_eq!(decode_all(&writer.into_inner().data).len(), 1);
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        struct ZeroWriter;

        impl Write for ZeroWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer
            .send(&Message::new(1, Bytes::from_static(b"x")))
            .unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn interrupted_write_is_retried_and_flush_runs() {
        #[derive(Default)]
        struct InterruptOnce {
            interrupted: bool,
            flushed: Arc<AtomicBool>,
            data: Vec<u8>,
        }

        impl Write for InterruptOnce {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if !self.interrupted {
                    self.interrupted = true;
                    return Err(ErrorKind::Interrupted.into());
                }
                self.data.extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                self.flushed.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        let sink = InterruptOnce::default();
        let flushed = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);
        writer
            .send(&Message::new(5, Bytes::from_static(b"retry")))
            .unwrap();

        assert!(flushed.load(Ordering::SeqCst));
        assert_eq!(decode_all(&writer.into_inner().data).len(), 1);
    }

    #[test]
    fn hard_write_error_propagates() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(ErrorKind::BrokenPipe.into())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut encoder = FrameEncoder::default();
        encoder
            .stage(&Message::new(1, Bytes::from_static(b"x")))
            .unwrap();
        let err = encoder.write_to(&mut Broken).unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::BrokenPipe));
    }
}
