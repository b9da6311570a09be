use std::collections::VecDeque;

use adbx_frame::{is_special, Message, NR_SPECIAL_CHANNELS};
use bytes::Bytes;

/// Lifecycle of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    /// No new data is accepted; queued data still drains.
    Closing,
    Closed,
}

/// Where incoming data for a channel goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Handed to the session's [`MessageSink`](crate::MessageSink).
    Dispatch,
    /// Buffered on the channel until read with `Session::recv`.
    Buffer,
}

/// Per-channel state owned by the channel table.
#[derive(Debug)]
pub struct Channel {
    id: u16,
    state: ChannelState,
    routing: Routing,
    outgoing: VecDeque<Message>,
    in_flight: usize,
    staged: usize,
    incoming: VecDeque<Bytes>,
    close_sent: bool,
    peer_closed: bool,
}

impl Channel {
    fn new(id: u16) -> Self {
        let routing = if is_special(id) {
            Routing::Dispatch
        } else {
            Routing::Buffer
        };
        Self {
            id,
            state: ChannelState::Open,
            routing,
            outgoing: VecDeque::new(),
            in_flight: 0,
            staged: 0,
            incoming: VecDeque::new(),
            close_sent: false,
            peer_closed: false,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn routing(&self) -> Routing {
        self.routing
    }

    /// Payload bytes accepted for sending and not yet written to the transport.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Messages waiting to be staged.
    pub fn queued(&self) -> usize {
        self.outgoing.len()
    }

    /// Messages queued or staged but not yet fully written.
    pub fn outgoing_pending(&self) -> usize {
        self.outgoing.len() + self.staged
    }

    /// Incoming payloads waiting in the channel buffer.
    pub fn buffered(&self) -> usize {
        self.incoming.len()
    }

    pub(crate) fn push_outgoing(&mut self, message: Message) {
        self.in_flight += message.payload.len();
        self.outgoing.push_back(message);
    }

    pub(crate) fn pop_outgoing(&mut self) -> Option<Message> {
        let message = self.outgoing.pop_front()?;
        self.staged += 1;
        Some(message)
    }

    /// A staged data frame of `payload_len` bytes reached the transport.
    pub(crate) fn complete(&mut self, payload_len: usize) {
        self.in_flight = self.in_flight.saturating_sub(payload_len);
        self.staged = self.staged.saturating_sub(1);
    }

    pub(crate) fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.outgoing.is_empty() && self.staged == 0
    }

    /// Stop accepting data. Returns true if the state changed.
    pub(crate) fn begin_close(&mut self) -> bool {
        if self.state == ChannelState::Open {
            self.state = ChannelState::Closing;
            return true;
        }
        false
    }

    pub(crate) fn close_sent(&self) -> bool {
        self.close_sent
    }

    pub(crate) fn set_close_sent(&mut self) {
        self.close_sent = true;
    }

    pub(crate) fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Drop queued (not yet staged) messages; returns `(messages, bytes)`.
    pub(crate) fn discard_outgoing(&mut self) -> (usize, usize) {
        let count = self.outgoing.len();
        let bytes: usize = self.outgoing.drain(..).map(|m| m.payload.len()).sum();
        self.in_flight = self.in_flight.saturating_sub(bytes);
        (count, bytes)
    }

    pub(crate) fn mark_closed(&mut self) -> bool {
        let changed = self.state != ChannelState::Closed;
        self.state = ChannelState::Closed;
        changed
    }

    /// The peer closed its end; nothing queued here will be sent.
    pub(crate) fn peer_close(&mut self) -> (usize, usize) {
        self.peer_closed = true;
        let discarded = self.discard_outgoing();
        self.mark_closed();
        discarded
    }

    pub(crate) fn push_incoming(&mut self, payload: Bytes) {
        self.incoming.push_back(payload);
    }

    pub(crate) fn pop_incoming(&mut self) -> Option<Bytes> {
        self.incoming.pop_front()
    }
}

/// Indexed arena of channels. The slot index is the channel ID.
///
/// Slots for the special channels always exist; the rest are filled at init,
/// by explicit allocation, or on first reference, up to `max_channels`.
#[derive(Debug)]
pub struct ChannelTable {
    slots: Vec<Option<Channel>>,
    max_channels: u16,
}

impl ChannelTable {
    pub fn with_initial(initial: u16, max_channels: u16) -> Self {
        let initial = initial.max(NR_SPECIAL_CHANNELS).min(max_channels);
        let slots = (0..initial).map(|id| Some(Channel::new(id))).collect();
        Self {
            slots,
            max_channels,
        }
    }

    pub fn get(&self, id: u16) -> Option<&Channel> {
        self.slots.get(usize::from(id)).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut Channel> {
        self.slots.get_mut(usize::from(id)).and_then(Option::as_mut)
    }

    /// True if `id` is below the table limit.
    pub fn can_hold(&self, id: u16) -> bool {
        id < self.max_channels
    }

    /// Look up `id`, creating it if it is below the limit and unused.
    pub fn get_or_create(&mut self, id: u16) -> Option<&mut Channel> {
        if !self.can_hold(id) {
            return None;
        }
        let idx = usize::from(id);
        if self.slots.len() <= idx {
            self.slots.resize_with(idx + 1, || None);
        }
        Some(self.slots[idx].get_or_insert_with(|| Channel::new(id)))
    }

    /// Create the lowest unused application channel.
    pub fn allocate(&mut self) -> Option<u16> {
        let id = (NR_SPECIAL_CHANNELS..self.max_channels)
            .find(|&id| self.get(id).is_none())?;
        self.get_or_create(id).map(|channel| channel.id())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.slots.iter_mut().flatten()
    }

    pub(crate) fn slot_mut(&mut self, idx: usize) -> Option<&mut Channel> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn total_in_flight(&self) -> usize {
        self.iter().map(Channel::in_flight).sum()
    }

    pub fn all_closed(&self) -> bool {
        self.iter().all(|channel| channel.state() == ChannelState::Closed)
    }

    pub fn max_channels(&self) -> u16 {
        self.max_channels
    }
}

#[cfg(test)]
mod tests {
    use adbx_frame::{FROM_PEER, TO_PEER};

    use super::*;

    #[test]
    fn special_channels_dispatch_and_others_buffer() {
        let table = ChannelTable::with_initial(3, 8);
        assert_eq!(table.get(FROM_PEER).unwrap().routing(), Routing::Dispatch);
        assert_eq!(table.get(TO_PEER).unwrap().routing(), Routing::Dispatch);
        assert_eq!(table.get(2).unwrap().routing(), Routing::Buffer);
        assert!(table.get(3).is_none());
    }

    #[test]
    fn first_reference_creates_below_limit() {
        let mut table = ChannelTable::with_initial(2, 8);
        assert_eq!(table.get_or_create(6).unwrap().id(), 6);
        assert!(table.get(5).is_none());
        assert!(table.get_or_create(8).is_none());
        assert_eq!(table.iter().count(), 3);
    }

    #[test]
    fn allocate_fills_gaps_then_runs_out() {
        let mut table = ChannelTable::with_initial(2, 4);
        table.get_or_create(3);
        assert_eq!(table.allocate(), Some(2));
        assert_eq!(table.allocate(), None);
    }

    #[test]
    fn in_flight_follows_enqueue_and_completion() {
        let mut channel = Channel::new(TO_PEER);
        channel.push_outgoing(Message::new(TO_PEER, vec![0u8; 30]));
        channel.push_outgoing(Message::new(TO_PEER, vec![0u8; 20]));
        assert_eq!(channel.in_flight(), 50);
        assert_eq!(channel.outgoing_pending(), 2);

        let staged = channel.pop_outgoing().unwrap();
        assert_eq!(channel.outgoing_pending(), 2);
        channel.complete(staged.payload.len());
        assert_eq!(channel.in_flight(), 20);
        assert_eq!(channel.outgoing_pending(), 1);
        assert!(!channel.is_drained());
    }

    #[test]
    fn peer_close_discards_queue() {
        let mut channel = Channel::new(4);
        channel.push_outgoing(Message::new(4, vec![1u8; 10]));
        assert_eq!(channel.peer_close(), (1, 10));
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(channel.in_flight(), 0);
        assert!(!channel.begin_close());
    }
}
