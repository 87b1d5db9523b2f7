//! Test data builders for message streams and captures

use tracesink_rs::pipeline::nodes::CanFrame;
use tracesink_rs::pipeline::{ClockClass, EventMessage, FieldValue, MessageBody};

/// Builder for message streams
#[derive(Default)]
pub struct StreamBuilder {
    bodies: Vec<MessageBody>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(mut self) -> Self {
        self.bodies.push(MessageBody::StreamBeginning);
        self
    }

    pub fn end(mut self) -> Self {
        self.bodies.push(MessageBody::StreamEnd);
        self
    }

    pub fn event(self, ns: u64) -> Self {
        self.named_event("event", ns)
    }

    pub fn named_event(mut self, name: &str, ns: u64) -> Self {
        self.bodies.push(MessageBody::event_at(name, ns));
        self
    }

    /// An event with no clock snapshot, which the sink rejects.
    pub fn untimed_event(mut self) -> Self {
        self.bodies
            .push(MessageBody::Event(EventMessage::new("untimed")));
        self
    }

    pub fn packet(mut self) -> Self {
        self.bodies.push(MessageBody::PacketBeginning);
        self.bodies.push(MessageBody::PacketEnd);
        self
    }

    pub fn discarded_events(mut self, count: u64) -> Self {
        self.bodies
            .push(MessageBody::DiscardedEvents { count: Some(count) });
        self
    }

    /// A block request insert/complete pair on `(dev, sector)`.
    pub fn block_request(mut self, comm: &str, dev: u64, sector: u64, start: u64, end: u64) -> Self {
        let request = |name: &str, ns: u64| {
            MessageBody::Event(
                EventMessage::new(name)
                    .at(ClockClass::NANOSECONDS.snapshot(ns))
                    .with_field("dev", FieldValue::UInt(dev))
                    .with_field("sector", FieldValue::UInt(sector))
                    .with_field("comm", FieldValue::Str(comm.to_string())),
            )
        };
        self.bodies.push(request("block_rq_insert", start));
        self.bodies.push(request("block_rq_complete", end));
        self
    }

    pub fn build(self) -> Vec<MessageBody> {
        self.bodies
    }
}

/// The five-message reference stream.
pub fn scenario() -> Vec<MessageBody> {
    StreamBuilder::new()
        .begin()
        .event(100)
        .event(250)
        .discarded_events(4)
        .end()
        .build()
}

/// Builder for raw CAN captures
#[derive(Default)]
pub struct CanCaptureBuilder {
    bytes: Vec<u8>,
}

impl CanCaptureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(mut self, timestamp_ms: i32, frame_id: i32, data: [u8; 8]) -> Self {
        let frame = CanFrame {
            timestamp: timestamp_ms,
            frame_id,
            data,
        };
        self.bytes.extend_from_slice(&frame.to_bytes());
        self
    }

    /// Append bytes that do not form a whole record.
    pub fn garbage(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
