//! Trace messages and the batches that carry them.
//!
//! A `Message` is owned by whoever currently holds its batch. Releasing a
//! message is destroying it: `Message::release` consumes the value, and a
//! message dropped on any other path (early return, unwinding) is released by
//! its `Drop` impl. Ownership makes double release and use-after-release
//! unrepresentable.
//!
//! An optional [`ReleaseObserver`] is notified once per message when it is
//! released, which is how tests verify release order.

use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use thiserror::Error;

/// Nanoseconds per second.
pub const NS_PER_S: u64 = 1_000_000_000;

// ==================== Clocks ====================

/// Errors raised while converting a clock snapshot to nanoseconds.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("event has no default clock snapshot")]
    MissingSnapshot,

    #[error("clock frequency is zero")]
    ZeroFrequency,

    #[error("nanoseconds from origin overflow a signed 64-bit value")]
    Overflow,
}

/// Description of a clock: its frequency and its offset from the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockClass {
    pub frequency_hz: u64,
    /// Whole seconds between the origin and the clock's zero.
    pub offset_seconds: i64,
    /// Extra cycles between the origin and the clock's zero.
    pub offset_cycles: u64,
}

impl ClockClass {
    /// A 1 GHz clock whose cycles are nanoseconds from the origin.
    pub const NANOSECONDS: ClockClass = ClockClass::with_frequency(NS_PER_S);

    pub const fn with_frequency(frequency_hz: u64) -> Self {
        Self {
            frequency_hz,
            offset_seconds: 0,
            offset_cycles: 0,
        }
    }

    pub fn with_offset(mut self, seconds: i64, cycles: u64) -> Self {
        self.offset_seconds = seconds;
        self.offset_cycles = cycles;
        self
    }

    /// Snapshot of this clock at `cycles`.
    pub fn snapshot(self, cycles: u64) -> ClockSnapshot {
        ClockSnapshot { clock: self, cycles }
    }
}

/// A point in time on a given clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub clock: ClockClass,
    pub cycles: u64,
}

impl ClockSnapshot {
    /// Nanoseconds elapsed since the clock origin.
    pub fn ns_from_origin(&self) -> Result<i64, ClockError> {
        let freq = self.clock.frequency_hz;
        if freq == 0 {
            return Err(ClockError::ZeroFrequency);
        }

        let cycles = self.clock.offset_cycles as u128 + self.cycles as u128;
        let ns_from_cycles = if freq == NS_PER_S {
            cycles
        } else {
            cycles * NS_PER_S as u128 / freq as u128
        };

        let total = self.clock.offset_seconds as i128 * NS_PER_S as i128 + ns_from_cycles as i128;
        i64::try_from(total).map_err(|_| ClockError::Overflow)
    }
}

// ==================== Payload ====================

/// A single payload field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    UInt(u64),
    Real(f64),
    Str(String),
}

impl FieldValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::UInt(v) => Some(*v),
            FieldValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::Real(v) => write!(f, "{}", v),
            FieldValue::Str(v) => write!(f, "{}", v),
        }
    }
}

/// Body of an event message.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub name: String,
    pub clock_snapshot: Option<ClockSnapshot>,
    pub fields: Vec<(String, FieldValue)>,
}

impl EventMessage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clock_snapshot: None,
            fields: Vec::new(),
        }
    }

    pub fn at(mut self, snapshot: ClockSnapshot) -> Self {
        self.clock_snapshot = Some(snapshot);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    /// Look up a payload field by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Timestamp of the default clock snapshot in nanoseconds from origin.
    pub fn timestamp_ns(&self) -> Result<i64, ClockError> {
        self.clock_snapshot
            .as_ref()
            .ok_or(ClockError::MissingSnapshot)?
            .ns_from_origin()
    }
}

// ==================== Messages ====================

/// Classification of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Event,
    StreamBeginning,
    StreamEnd,
    PacketBeginning,
    PacketEnd,
    DiscardedEvents,
    DiscardedPackets,
    IteratorInactivity,
    Other,
}

impl MessageKind {
    /// Bracketed tag printed for non-event messages.
    pub fn tag(self) -> &'static str {
        match self {
            MessageKind::Event => "[Event message]",
            MessageKind::StreamBeginning => "[Stream beginning message]",
            MessageKind::StreamEnd => "[Stream end message]",
            MessageKind::PacketBeginning => "[Packet beginning message]",
            MessageKind::PacketEnd => "[Packet end message]",
            MessageKind::DiscardedEvents => "[Discarded events message]",
            MessageKind::DiscardedPackets => "[Discarded packets message]",
            MessageKind::IteratorInactivity => "[Message iterator inactivity message]",
            MessageKind::Other => "[Other message type]",
        }
    }
}

/// Content of a message, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Event(EventMessage),
    StreamBeginning,
    StreamEnd,
    PacketBeginning,
    PacketEnd,
    DiscardedEvents { count: Option<u64> },
    DiscardedPackets { count: Option<u64> },
    IteratorInactivity { clock_snapshot: ClockSnapshot },
    Other(String),
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Event(_) => MessageKind::Event,
            MessageBody::StreamBeginning => MessageKind::StreamBeginning,
            MessageBody::StreamEnd => MessageKind::StreamEnd,
            MessageBody::PacketBeginning => MessageKind::PacketBeginning,
            MessageBody::PacketEnd => MessageKind::PacketEnd,
            MessageBody::DiscardedEvents { .. } => MessageKind::DiscardedEvents,
            MessageBody::DiscardedPackets { .. } => MessageKind::DiscardedPackets,
            MessageBody::IteratorInactivity { .. } => MessageKind::IteratorInactivity,
            MessageBody::Other(_) => MessageKind::Other,
        }
    }

    /// Shorthand for an event at `ns` on a nanosecond clock.
    pub fn event_at(name: impl Into<String>, ns: u64) -> Self {
        MessageBody::Event(EventMessage::new(name).at(ClockClass::NANOSECONDS.snapshot(ns)))
    }
}

/// Notice sent to a [`ReleaseObserver`] when a message is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Released {
    pub seq: u64,
    pub kind: MessageKind,
}

/// Receives one [`Released`] notice per released message.
#[derive(Clone)]
pub struct ReleaseObserver {
    tx: Sender<Released>,
}

impl ReleaseObserver {
    /// Create an observer and the receiver that collects its notices.
    pub fn channel() -> (Self, Receiver<Released>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    fn notify(&self, released: Released) {
        // Nobody listening is fine.
        let _ = self.tx.send(released);
    }
}

impl fmt::Debug for ReleaseObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseObserver").finish_non_exhaustive()
    }
}

/// A trace message. Released exactly once, when it is dropped.
#[derive(Debug)]
pub struct Message {
    seq: u64,
    body: MessageBody,
    observer: Option<ReleaseObserver>,
}

impl Message {
    pub fn new(seq: u64, body: MessageBody) -> Self {
        Self {
            seq,
            body,
            observer: None,
        }
    }

    pub fn observed_by(mut self, observer: ReleaseObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Production sequence number within the source's stream.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[inline]
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    #[inline]
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn as_event(&self) -> Option<&EventMessage> {
        match &self.body {
            MessageBody::Event(event) => Some(event),
            _ => None,
        }
    }

    /// Release the message. Equivalent to dropping it.
    #[inline]
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.notify(Released {
                seq: self.seq,
                kind: self.body.kind(),
            });
        }
    }
}

/// Numbers messages in production order and attaches the release observer.
///
/// Every source owns one so sequence numbers are contiguous across batches.
#[derive(Debug, Default)]
pub struct MessageEmitter {
    next_seq: u64,
    observer: Option<ReleaseObserver>,
}

impl MessageEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_observer(&mut self, observer: ReleaseObserver) {
        self.observer = Some(observer);
    }

    pub fn emit(&mut self, body: MessageBody) -> Message {
        let seq = self.next_seq;
        self.next_seq += 1;
        let msg = Message::new(seq, body);
        match &self.observer {
            Some(observer) => msg.observed_by(observer.clone()),
            None => msg,
        }
    }

    /// Number of messages emitted so far.
    pub fn emitted(&self) -> u64 {
        self.next_seq
    }
}

// ==================== Batches ====================

/// Ordered group of messages returned by one pull.
#[derive(Debug, Default)]
pub struct Batch {
    messages: Vec<Message>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}

impl From<Vec<Message>> for Batch {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl FromIterator<Message> for Batch {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Batch {
    type Item = Message;
    type IntoIter = std::vec::IntoIter<Message>;

    /// Remaining messages are released in order if the iterator is dropped early.
    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}
