//! DmesgSource node: reads `dmesg`-formatted text.
//!
//! Each non-empty line becomes one `string` event whose `str` field holds the
//! message text. A leading `[seconds.fraction]` prefix is parsed into a
//! snapshot of a nanosecond clock. Lines without a prefix reuse the last
//! parsed timestamp; before the first one they carry no snapshot.
//! Lines are read as bytes and decoded lossily, so invalid UTF-8 never stops
//! the stream.
//!
//! The stream is framed by a stream-beginning and a stream-end message.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::message::{
    Batch, ClockClass, EventMessage, FieldValue, MessageBody, MessageEmitter, ReleaseObserver,
    NS_PER_S,
};
use crate::pipeline::port::{PortDescriptor, SOURCE_PORTS};
use crate::pipeline::source::{MessageSource, Pull};
use std::io::BufRead;

/// Event name for every dmesg line.
pub const DMESG_EVENT_NAME: &str = "string";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Beginning,
    Lines,
    Ended,
}

/// DmesgSource: one event per kernel log line.
pub struct DmesgSource {
    reader: Box<dyn BufRead + Send>,
    batch_size: usize,
    extract_timestamp: bool,
    last_timestamp_ns: Option<u64>,
    phase: Phase,
    line_buf: Vec<u8>,
    lines_read: u64,
    /// Read failure held back until the batch read before it is delivered.
    pending_error: Option<PipelineError>,
    emitter: MessageEmitter,
}

impl DmesgSource {
    pub fn new(reader: Box<dyn BufRead + Send>, batch_size: usize) -> Self {
        Self {
            reader,
            batch_size: batch_size.max(1),
            extract_timestamp: true,
            last_timestamp_ns: None,
            phase: Phase::Beginning,
            line_buf: Vec::new(),
            lines_read: 0,
            pending_error: None,
            emitter: MessageEmitter::new(),
        }
    }

    /// Keep the whole line as the payload and attach no clock snapshot.
    pub fn without_timestamps(mut self) -> Self {
        self.extract_timestamp = false;
        self
    }

    pub fn observed_by(mut self, observer: ReleaseObserver) -> Self {
        self.emitter.set_observer(observer);
        self
    }

    pub fn name(&self) -> &'static str {
        "src.text.dmesg"
    }

    pub fn ports(&self) -> &'static [PortDescriptor] {
        SOURCE_PORTS
    }

    pub fn next_batch(&mut self) -> PipelineResult<Pull> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        if self.phase == Phase::Ended {
            return Ok(Pull::End);
        }

        let mut batch = Batch::with_capacity(self.batch_size.min(1024));

        if self.phase == Phase::Beginning {
            batch.push(self.emitter.emit(MessageBody::StreamBeginning));
            self.phase = Phase::Lines;
        }

        while batch.len() < self.batch_size {
            match self.read_event() {
                Ok(Some(body)) => batch.push(self.emitter.emit(body)),
                Err(err) if batch.is_empty() => return Err(err),
                Err(err) => {
                    self.pending_error = Some(err);
                    break;
                }
                Ok(None) => {
                    batch.push(self.emitter.emit(MessageBody::StreamEnd));
                    self.phase = Phase::Ended;
                    tracing::debug!("dmesg source reached end after {} lines", self.lines_read);
                    break;
                }
            }
        }

        Ok(Pull::Batch(batch))
    }

    /// Read lines until one produces an event. `None` at end of input.
    fn read_event(&mut self) -> PipelineResult<Option<MessageBody>> {
        loop {
            self.line_buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.line_buf)
                .map_err(|e| PipelineError::pull(self.name(), format!("read failed: {}", e)))?;
            if read == 0 {
                return Ok(None);
            }
            self.lines_read += 1;

            let decoded = String::from_utf8_lossy(&self.line_buf);
            let line = decoded.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }

            let (timestamp_ns, text) = if self.extract_timestamp {
                match parse_timestamp_prefix(line) {
                    Some((ns, rest)) => {
                        self.last_timestamp_ns = Some(ns);
                        (Some(ns), rest)
                    }
                    None => (self.last_timestamp_ns, line),
                }
            } else {
                (None, line)
            };

            let mut event = EventMessage::new(DMESG_EVENT_NAME)
                .with_field("str", FieldValue::Str(text.to_string()));
            if let Some(ns) = timestamp_ns {
                event = event.at(ClockClass::NANOSECONDS.snapshot(ns));
            }
            return Ok(Some(MessageBody::Event(event)));
        }
    }
}

/// Split `[  123.456789] text` into nanoseconds and `text`.
pub fn parse_timestamp_prefix(line: &str) -> Option<(u64, &str)> {
    let rest = line.strip_prefix('[')?;
    let close = rest.find(']')?;
    let stamp = rest[..close].trim();
    let text = rest[close + 1..].strip_prefix(' ').unwrap_or(&rest[close + 1..]);

    let (secs, frac) = stamp.split_once('.')?;
    if secs.is_empty() || frac.is_empty() || frac.len() > 9 {
        return None;
    }
    if !secs.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let secs: u64 = secs.parse().ok()?;
    let frac_digits: u64 = frac.parse().ok()?;
    let scale = 10u64.pow(9 - frac.len() as u32);
    let ns = secs.checked_mul(NS_PER_S)?.checked_add(frac_digits * scale)?;
    Some((ns, text))
}

impl MessageSource for DmesgSource {
    fn name(&self) -> &'static str {
        DmesgSource::name(self)
    }

    fn ports(&self) -> &'static [PortDescriptor] {
        DmesgSource::ports(self)
    }

    fn next_batch(&mut self) -> PipelineResult<Pull> {
        DmesgSource::next_batch(self)
    }
}
