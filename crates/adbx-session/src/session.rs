use std::collections::VecDeque;
use std::fmt;

use adbx_frame::{
    FrameDecoder, FrameEncoder, FrameError, Message, MessageKind, ReadOutcome, WrittenMessage,
};
use adbx_transport::{Interest, Transport};
use bytes::Bytes;
use tracing::{debug, error, info, trace, warn};

use crate::channel::{Channel, ChannelState, ChannelTable, Routing};
use crate::config::{BackpressurePolicy, SessionConfig};
use crate::error::{FaultKind, Result, SessionError, SessionFault};
use crate::sink::{Delivery, Discard, MessageSink};

/// Session-wide lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Normal operation.
    Idle,
    /// Shutting down: channels drain and close, nothing new is accepted.
    Closing,
    /// Every channel closed and every staged byte written.
    Terminated,
    /// A fatal fault ended the session; no further I/O happens.
    Failed(SessionFault),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminated | SessionState::Failed(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Closing => f.write_str("closing"),
            SessionState::Terminated => f.write_str("terminated"),
            SessionState::Failed(fault) => write!(f, "failed: {fault}"),
        }
    }
}

/// What one [`Session::do_io`] call moved across the transport.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoProgress {
    pub bytes_read: usize,
    pub bytes_written: usize,
    pub messages_read: usize,
}

impl IoProgress {
    pub fn is_idle(&self) -> bool {
        self.bytes_read == 0 && self.bytes_written == 0 && self.messages_read == 0
    }
}

/// What one [`Session::pump`] call advanced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpReport {
    /// Incoming messages processed (dispatched, buffered or handled as control).
    pub delivered: usize,
    /// Written frames retired from the encoder.
    pub written: usize,
    /// Frames moved into the encoder.
    pub staged: usize,
    /// Channel or session state changes.
    pub transitions: usize,
}

impl PumpReport {
    pub fn is_idle(&self) -> bool {
        self.delivered == 0 && self.written == 0 && self.staged == 0 && self.transitions == 0
    }
}

/// A multiplexed session over one transport.
///
/// The session exclusively owns the transport, every channel and the sink.
/// It never spawns threads; the only blocking point is the readiness wait
/// inside [`Session::do_io`].
pub struct Session<T, S = Discard> {
    transport: T,
    decoder: FrameDecoder,
    encoder: FrameEncoder,
    channels: ChannelTable,
    sink: S,
    config: SessionConfig,
    state: SessionState,
    inbox: VecDeque<Message>,
    written: Vec<WrittenMessage>,
    control_out: VecDeque<Message>,
    fault: Option<SessionFault>,
    peer_eof: bool,
    cursor: usize,
    idle_rounds: u32,
}

impl<T: Transport, S: MessageSink> Session<T, S> {
    /// Validate `config`, switch the transport to non-blocking mode and
    /// create the initial channels.
    pub fn init(mut transport: T, config: SessionConfig, sink: S) -> Result<Self> {
        config.validate()?;
        transport.set_nonblocking(true)?;

        let channels = ChannelTable::with_initial(config.initial_channels, config.max_channels);
        debug!(
            transport = transport.transport_name(),
            channels = config.initial_channels,
            max_outgoing = config.max_outgoing_msg,
            policy = ?config.backpressure,
            "session initialized"
        );

        Ok(Self {
            transport,
            decoder: FrameDecoder::new(config.max_payload_size),
            encoder: FrameEncoder::new(config.max_payload_size),
            channels,
            sink,
            config,
            state: SessionState::Idle,
            inbox: VecDeque::new(),
            written: Vec::new(),
            control_out: VecDeque::new(),
            fault: None,
            peer_eof: false,
            cursor: 0,
            idle_rounds: 0,
        })
    }

    /// One bounded I/O round: a single readiness wait, then every read and
    /// write the transport allows without blocking.
    ///
    /// Fatal conditions are recorded and applied by the next [`pump`](Self::pump).
    pub fn do_io(&mut self) -> IoProgress {
        let mut progress = IoProgress::default();
        if self.state.is_terminal() || self.fault.is_some() {
            return progress;
        }

        let interest = Interest {
            read: !self.peer_eof && self.inbox.len() < self.config.max_inbox,
            write: !self.encoder.is_empty(),
        };
        if interest.is_empty() {
            return progress;
        }

        let readiness = match self
            .transport
            .wait_ready(interest, self.config.poll_timeout)
        {
            Ok(readiness) => readiness,
            Err(err) => {
                self.record_fault(FaultKind::Transport, err.to_string());
                return progress;
            }
        };

        if readiness.readable {
            self.read_ready(&mut progress);
        }
        if readiness.writable && self.fault.is_none() {
            self.write_ready(&mut progress);
        }
        progress
    }

    fn read_ready(&mut self, progress: &mut IoProgress) {
        let pending_before = self.decoder.pending();
        let mut decoded = 0;

        while self.inbox.len() < self.config.max_inbox {
            match self.decoder.poll_from(&mut self.transport) {
                Ok(ReadOutcome::Message(message)) => {
                    trace!(
                        channel = message.channel,
                        kind = ?message.kind,
                        size = message.payload.len(),
                        "decoded message"
                    );
                    decoded += message.wire_size();
                    progress.messages_read += 1;
                    self.inbox.push_back(message);
                }
                Ok(ReadOutcome::WouldBlock) => break,
                Ok(ReadOutcome::Eof) => {
                    info!(
                        transport = self.transport.transport_name(),
                        "peer closed the connection"
                    );
                    self.peer_eof = true;
                    break;
                }
                Err(err) => {
                    let kind = if err.is_framing() {
                        FaultKind::Framing
                    } else {
                        FaultKind::Transport
                    };
                    self.record_fault(kind, err.to_string());
                    break;
                }
            }
        }

        progress.bytes_read += (self.decoder.pending() + decoded).saturating_sub(pending_before);
    }

    fn write_ready(&mut self, progress: &mut IoProgress) {
        match self.encoder.write_to(&mut self.transport) {
            Ok(write) => {
                if write.bytes > 0 {
                    trace!(
                        bytes = write.bytes,
                        remaining = self.encoder.staged_bytes(),
                        "wrote to transport"
                    );
                }
                progress.bytes_written += write.bytes;
                self.written.extend(write.completed);
            }
            Err(err) => self.record_fault(FaultKind::Transport, err.to_string()),
        }
    }

    fn record_fault(&mut self, kind: FaultKind, detail: String) {
        debug!(%kind, %detail, "recording session fault");
        if self.fault.is_none() {
            self.fault = Some(SessionFault::new(kind, detail));
        }
    }

    /// Advance session state from what [`do_io`](Self::do_io) produced.
    ///
    /// Never touches the transport.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        if self.state.is_terminal() {
            return report;
        }

        self.credit_written(&mut report);
        self.deliver_inbox(&mut report);
        if let Some(fault) = self.fault.take() {
            self.fail(fault, &mut report);
            return report;
        }

        self.advance_channels(&mut report);
        if let Err(err) = self.stage_outgoing(&mut report) {
            self.fail(SessionFault::new(FaultKind::Protocol, err.to_string()), &mut report);
            return report;
        }

        if self.channels.all_closed() && self.encoder.is_empty() && self.control_out.is_empty() {
            info!("session terminated");
            self.state = SessionState::Terminated;
            report.transitions += 1;
        }
        report
    }

    fn credit_written(&mut self, report: &mut PumpReport) {
        for done in self.written.drain(..) {
            report.written += 1;
            if done.kind != MessageKind::Data {
                continue;
            }
            if let Some(channel) = self.channels.get_mut(done.channel) {
                channel.complete(done.payload_len);
            }
        }
    }

    fn deliver_inbox(&mut self, report: &mut PumpReport) {
        while let Some(message) = self.inbox.pop_front() {
            if let Err(fault) = self.deliver(message, report) {
                self.inbox.clear();
                self.fault = Some(fault);
                return;
            }
        }
    }

    fn deliver(
        &mut self,
        message: Message,
        report: &mut PumpReport,
    ) -> std::result::Result<(), SessionFault> {
        let id = message.channel;
        let max = self.channels.max_channels();
        let known = self.channels.get(id).is_some();
        if !known && message.kind == MessageKind::CloseAck && self.channels.can_hold(id) {
            trace!(channel = id, "close ack for unknown channel");
            report.delivered += 1;
            return Ok(());
        }
        let accepting = self.state == SessionState::Idle;
        let Some(channel) = self.channels.get_or_create(id) else {
            return Err(SessionFault::new(
                FaultKind::Protocol,
                format!("peer used channel {id}, beyond the table limit of {max}"),
            ));
        };
        // Channels first seen while shutting down start out closing.
        if !known && !accepting && channel.begin_close() {
            debug!(channel = id, "peer opened channel during shutdown; closing it");
            report.transitions += 1;
        }
        report.delivered += 1;

        match message.kind {
            MessageKind::Data => {
                if channel.state() == ChannelState::Closed || channel.peer_closed() {
                    warn!(
                        channel = id,
                        size = message.payload.len(),
                        "dropping data for closed channel"
                    );
                    return Ok(());
                }
                match channel.routing() {
                    Routing::Dispatch => {
                        debug!(channel = id, size = message.payload.len(), "dispatching message");
                        let delivery = Delivery::new(message).map_err(|err| {
                            SessionFault::new(FaultKind::Protocol, err.to_string())
                        })?;
                        if let Err(err) = self.sink.on_control_message(delivery) {
                            warn!(channel = id, error = %err, "message sink failed");
                        }
                    }
                    Routing::Buffer => channel.push_incoming(message.payload),
                }
            }
            MessageKind::Close => {
                if channel.peer_closed() {
                    trace!(channel = id, "ignoring repeated close");
                    return Ok(());
                }
                let was_closed = channel.state() == ChannelState::Closed;
                let (messages, bytes) = channel.peer_close();
                if messages > 0 {
                    warn!(
                        channel = id,
                        messages, bytes, "peer closed channel; discarded queued data"
                    );
                }
                if !was_closed {
                    report.transitions += 1;
                }
                debug!(channel = id, "peer closed channel");
                self.control_out
                    .push_back(Message::control(id, MessageKind::CloseAck));
            }
            MessageKind::CloseAck => {
                if channel.state() == ChannelState::Closing && channel.close_sent() {
                    channel.mark_closed();
                    report.transitions += 1;
                    debug!(channel = id, "close acknowledged");
                } else {
                    trace!(channel = id, state = ?channel.state(), "unexpected close ack");
                }
            }
        }
        Ok(())
    }

    fn advance_channels(&mut self, report: &mut PumpReport) {
        if self.peer_eof && self.state == SessionState::Idle {
            debug!("peer finished; session closing");
            self.state = SessionState::Closing;
        }

        let peer_eof = self.peer_eof;
        for channel in self.channels.iter_mut() {
            if peer_eof && channel.begin_close() {
                report.transitions += 1;
            }
            if channel.state() != ChannelState::Closing {
                continue;
            }

            if peer_eof {
                if channel.is_drained() {
                    channel.mark_closed();
                    report.transitions += 1;
                    debug!(channel = channel.id(), "channel closed after peer EOF");
                }
            } else if !channel.close_sent() && !channel.has_outgoing() {
                channel.set_close_sent();
                self.control_out
                    .push_back(Message::control(channel.id(), MessageKind::Close));
                report.transitions += 1;
                debug!(channel = channel.id(), "sending close");
            }
        }
    }

    /// Control frames first, then one data frame per channel per pass,
    /// rotating the starting channel, until the write buffer reaches
    /// `write_high_water` or nothing is left.
    fn stage_outgoing(&mut self, report: &mut PumpReport) -> std::result::Result<(), FrameError> {
        while let Some(message) = self.control_out.pop_front() {
            trace!(channel = message.channel, kind = ?message.kind, "staging control frame");
            self.encoder.stage(&message)?;
            report.staged += 1;
        }

        let slots = self.channels.slot_count();
        if slots == 0 {
            return Ok(());
        }
        loop {
            let start = self.cursor;
            let mut staged = 0;
            for step in 0..slots {
                if self.encoder.staged_bytes() >= self.config.write_high_water {
                    return Ok(());
                }
                let idx = (start + step) % slots;
                let Some(message) = self.channels.slot_mut(idx).and_then(Channel::pop_outgoing)
                else {
                    continue;
                };
                trace!(channel = message.channel, size = message.payload.len(), "staging message");
                self.encoder.stage(&message)?;
                self.cursor = (idx + 1) % slots;
                staged += 1;
                report.staged += 1;
            }
            if staged == 0 {
                return Ok(());
            }
        }
    }

    fn fail(&mut self, fault: SessionFault, report: &mut PumpReport) {
        error!(kind = %fault.kind, detail = %fault.detail, "session failed");
        for channel in self.channels.iter_mut() {
            let (messages, _) = channel.discard_outgoing();
            if messages > 0 {
                warn!(channel = channel.id(), messages, "discarding queued messages");
            }
            if channel.mark_closed() {
                report.transitions += 1;
            }
        }
        self.inbox.clear();
        self.control_out.clear();
        self.written.clear();
        self.state = SessionState::Failed(fault);
        report.transitions += 1;
    }

    /// One `do_io` + `pump` round with stall accounting. `Err` carries the
    /// number of consecutive idle rounds once `stall_limit` is reached.
    fn round(&mut self) -> std::result::Result<(), u32> {
        let io = self.do_io();
        let report = self.pump();
        if io.is_idle() && report.is_idle() {
            self.idle_rounds += 1;
        } else {
            self.idle_rounds = 0;
        }
        match self.config.stall_limit {
            Some(limit) if self.idle_rounds >= limit => {
                warn!(rounds = self.idle_rounds, "session made no progress");
                Err(self.idle_rounds)
            }
            _ => Ok(()),
        }
    }

    fn has_capacity(&self, id: u16, size: usize) -> bool {
        let in_flight = match self.config.backpressure {
            BackpressurePolicy::PerChannel => self.channels.get(id).map_or(0, Channel::in_flight),
            BackpressurePolicy::Aggregate => self.channels.total_in_flight(),
        };
        in_flight + size <= self.config.max_outgoing_msg
    }

    /// Append `message` to its channel's outgoing queue, driving the I/O loop
    /// until the channel has room under `max_outgoing_msg`.
    ///
    /// Does not return with the message unqueued unless it returns an error,
    /// and every error variant that can carry the message hands it back.
    pub fn queue_message_synchronous(&mut self, message: Message) -> Result<()> {
        if message.kind.is_control() {
            return Err(SessionError::ReservedKind {
                kind: message.kind,
                message,
            });
        }
        let size = message.payload.len();
        let max = self.config.max_outgoing_msg.min(self.config.max_payload_size);
        if size > max {
            return Err(SessionError::MessageTooLarge { size, max, message });
        }
        let id = message.channel;
        if !self.channels.can_hold(id) {
            return Err(SessionError::ChannelLimit {
                channel: id,
                max: self.channels.max_channels(),
                message: Some(message),
            });
        }

        let mut pumped = false;
        self.idle_rounds = 0;
        loop {
            if self.state.is_terminal() {
                return Err(SessionError::Ended {
                    state: self.state.clone(),
                    message: Some(message),
                });
            }
            // New channels are only created while the session is idle.
            let channel = if self.state == SessionState::Idle {
                self.channels.get_or_create(id)
            } else {
                self.channels.get_mut(id)
            };
            let open = channel.is_some_and(|channel| channel.state() == ChannelState::Open);
            if !open {
                return Err(SessionError::ChannelClosed {
                    channel: id,
                    message,
                });
            }
            if self.has_capacity(id, size) {
                break;
            }

            if !pumped {
                trace!(
                    channel = id,
                    size,
                    in_flight = self.in_flight(id),
                    "waiting for outgoing capacity"
                );
                self.pump();
                pumped = true;
                continue;
            }
            if let Err(rounds) = self.round() {
                return Err(SessionError::Stalled {
                    rounds,
                    message: Some(message),
                });
            }
        }

        match self.channels.get_mut(id) {
            Some(channel) => {
                channel.push_outgoing(message);
                trace!(channel = id, size, in_flight = channel.in_flight(), "queued message");
                Ok(())
            }
            None => Err(SessionError::ChannelLimit {
                channel: id,
                max: self.channels.max_channels(),
                message: Some(message),
            }),
        }
    }

    /// Queue a data message on `channel`.
    pub fn send(&mut self, channel: u16, payload: impl Into<Bytes>) -> Result<()> {
        self.queue_message_synchronous(Message::new(channel, payload))
    }

    /// Pump once, then run `do_io` + `pump` rounds while `cond` holds.
    ///
    /// Fails with [`SessionError::Ended`] if the session terminates while
    /// `cond` still holds, and with [`SessionError::Stalled`] once
    /// `stall_limit` consecutive rounds make no progress.
    pub fn pump_while<F>(&mut self, mut cond: F) -> Result<()>
    where
        F: FnMut(&Self) -> bool,
    {
        self.pump();
        self.idle_rounds = 0;
        while cond(&*self) {
            if self.state.is_terminal() {
                return Err(SessionError::Ended {
                    state: self.state.clone(),
                    message: None,
                });
            }
            if let Err(rounds) = self.round() {
                return Err(SessionError::Stalled {
                    rounds,
                    message: None,
                });
            }
        }
        Ok(())
    }

    /// Stop accepting data on `id`. Queued data still drains; the channel
    /// closes once the peer acknowledges.
    pub fn close_channel(&mut self, id: u16) -> Result<()> {
        if !self.channels.can_hold(id) {
            return Err(SessionError::ChannelLimit {
                channel: id,
                max: self.channels.max_channels(),
                message: None,
            });
        }
        let Some(channel) = self.channels.get_mut(id) else {
            return Err(SessionError::UnknownChannel(id));
        };
        if channel.begin_close() {
            debug!(channel = id, queued = channel.queued(), "closing channel");
        }
        Ok(())
    }

    /// Close every channel and move the session to `Closing`.
    pub fn shutdown(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        for channel in self.channels.iter_mut() {
            if channel.begin_close() {
                debug!(channel = channel.id(), "closing channel");
            }
        }
        if self.state == SessionState::Idle {
            info!("session shutting down");
            self.state = SessionState::Closing;
        }
    }

    /// Create the lowest unused application channel.
    pub fn open_channel(&mut self) -> Result<u16> {
        if self.state.is_terminal() || self.state == SessionState::Closing {
            return Err(SessionError::Ended {
                state: self.state.clone(),
                message: None,
            });
        }
        match self.channels.allocate() {
            Some(id) => {
                debug!(channel = id, "opened channel");
                Ok(id)
            }
            None => Err(SessionError::TableFull {
                max: self.channels.max_channels(),
            }),
        }
    }

    /// Next buffered payload on a buffer-routed channel.
    pub fn recv(&mut self, id: u16) -> Option<Bytes> {
        self.channels.get_mut(id)?.pop_incoming()
    }

    pub fn channel(&self, id: u16) -> Option<&Channel> {
        self.channels.get(id)
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    pub fn channel_state(&self, id: u16) -> Option<ChannelState> {
        self.channels.get(id).map(Channel::state)
    }

    /// Payload bytes accepted on `id` and not yet written.
    pub fn in_flight(&self, id: u16) -> usize {
        self.channels.get(id).map_or(0, Channel::in_flight)
    }

    pub fn total_in_flight(&self) -> usize {
        self.channels.total_in_flight()
    }

    /// Messages on `id` that are queued or staged but not fully written.
    pub fn outgoing_pending(&self, id: u16) -> usize {
        self.channels.get(id).map_or(0, Channel::outgoing_pending)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give back the transport and the sink.
    pub fn into_parts(self) -> (T, S) {
        (self.transport, self.sink)
    }
}
