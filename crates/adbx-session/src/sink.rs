use adbx_frame::{FrameError, Message, MessageHeader};
use bytes::Bytes;
use tracing::trace;

/// Error type sinks may return; the session logs it and keeps going.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// One incoming message handed to a [`MessageSink`].
///
/// The payload stays with the delivery unless the sink takes it with
/// [`Delivery::into_payload`].
#[derive(Debug)]
pub struct Delivery {
    header: MessageHeader,
    payload: Bytes,
}

impl Delivery {
    pub(crate) fn new(message: Message) -> Result<Self, FrameError> {
        Ok(Self {
            header: message.header()?,
            payload: message.payload,
        })
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn channel(&self) -> u16 {
        self.header.channel
    }

    /// Borrow the payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Receives every data message addressed to a dispatch-routed channel, in
/// arrival order.
pub trait MessageSink {
    fn on_control_message(&mut self, delivery: Delivery) -> Result<(), SinkError>;
}

impl<F> MessageSink for F
where
    F: FnMut(Delivery) -> Result<(), SinkError>,
{
    fn on_control_message(&mut self, delivery: Delivery) -> Result<(), SinkError> {
        self(delivery)
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl MessageSink for Discard {
    fn on_control_message(&mut self, delivery: Delivery) -> Result<(), SinkError> {
        trace!(
            channel = delivery.channel(),
            size = delivery.payload().len(),
            "discarding dispatched message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |delivery: Delivery| -> Result<(), SinkError> {
                seen.push((delivery.channel(), delivery.into_payload()));
                Ok(())
            };
            sink.on_control_message(Delivery::new(Message::new(1, Bytes::from_static(b"hi"))).unwrap())
                .unwrap();
        }
        assert_eq!(seen, vec![(1, Bytes::from_static(b"hi"))]);
    }

    #[test]
    fn delivery_exposes_header_before_payload() {
        let delivery = Delivery::new(Message::new(0, Bytes::from_static(b"abc"))).unwrap();
        assert_eq!(delivery.header().len, 3);
        assert_eq!(delivery.payload(), b"abc");
        Discard.on_control_message(delivery).unwrap();
    }
}
