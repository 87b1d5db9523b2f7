//! CanSource node: reads raw CAN frame captures.
//!
//! Capture layout, little-endian, 16 bytes per record:
//!
//! ```text
//! [bytes 0 -  3] timestamp (i32, milliseconds)
//! [bytes 4 -  7] frame ID (standard or extended)
//! [bytes 8 - 15] up to 64 bits of data
//! ```
//!
//! Frames are not decoded against a signal database; every record becomes an
//! `UNKNOWN` event carrying the frame ID and the eight data bytes.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::message::{
    Batch, ClockClass, EventMessage, FieldValue, MessageBody, MessageEmitter, ReleaseObserver,
};
use crate::pipeline::port::{PortDescriptor, SOURCE_PORTS};
use crate::pipeline::source::{MessageSource, Pull};
use std::io::{ErrorKind, Read};

/// Size of one capture record in bytes.
pub const CAN_RECORD_SIZE: usize = 16;

/// Frequency of the capture clock (1 kHz).
pub const CAN_CLOCK_HZ: u64 = 1000;

/// Event name for frames without a database entry.
pub const CAN_UNKNOWN_EVENT: &str = "UNKNOWN";

/// One decoded capture record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    pub timestamp: i32,
    pub frame_id: i32,
    pub data: [u8; 8],
}

impl CanFrame {
    pub fn from_bytes(raw: &[u8; CAN_RECORD_SIZE]) -> Self {
        let mut data = [0u8; 8];
        data.copy_from_slice(&raw[8..16]);
        Self {
            timestamp: i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            frame_id: i32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            data,
        }
    }

    pub fn to_bytes(&self) -> [u8; CAN_RECORD_SIZE] {
        let mut raw = [0u8; CAN_RECORD_SIZE];
        raw[0..4].copy_from_slice(&self.timestamp.to_le_bytes());
        raw[4..8].copy_from_slice(&self.frame_id.to_le_bytes());
        raw[8..16].copy_from_slice(&self.data);
        raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Beginning,
    Frames,
    Ended,
}

/// CanSource: one event per capture record.
pub struct CanSource {
    reader: Box<dyn Read + Send>,
    batch_size: usize,
    clock: ClockClass,
    phase: Phase,
    frames_read: u64,
    emitter: MessageEmitter,
}

impl CanSource {
    pub fn new(reader: Box<dyn Read + Send>, batch_size: usize) -> Self {
        Self {
            reader,
            batch_size: batch_size.max(1),
            clock: ClockClass::with_frequency(CAN_CLOCK_HZ),
            phase: Phase::Beginning,
            frames_read: 0,
            emitter: MessageEmitter::new(),
        }
    }

    pub fn observed_by(mut self, observer: ReleaseObserver) -> Self {
        self.emitter.set_observer(observer);
        self
    }

    pub fn name(&self) -> &'static str {
        "src.can.can"
    }

    pub fn ports(&self) -> &'static [PortDescriptor] {
        SOURCE_PORTS
    }

    pub fn next_batch(&mut self) -> PipelineResult<Pull> {
        if self.phase == Phase::Ended {
            return Ok(Pull::End);
        }

        let mut batch = Batch::with_capacity(self.batch_size.min(1024));

        if self.phase == Phase::Beginning {
            batch.push(self.emitter.emit(MessageBody::StreamBeginning));
            self.phase = Phase::Frames;
        }

        while batch.len() < self.batch_size {
            match self.read_frame()? {
                Some(frame) => {
                    let body = self.frame_event(&frame)?;
                    batch.push(self.emitter.emit(body));
                }
                None => {
                    batch.push(self.emitter.emit(MessageBody::StreamEnd));
                    self.phase = Phase::Ended;
                    tracing::debug!("CAN source reached end after {} frames", self.frames_read);
                    break;
                }
            }
        }

        Ok(Pull::Batch(batch))
    }

    /// Read one full record. `None` on a clean end of input.
    fn read_frame(&mut self) -> PipelineResult<Option<CanFrame>> {
        let mut raw = [0u8; CAN_RECORD_SIZE];
        let mut filled = 0;

        while filled < CAN_RECORD_SIZE {
            match self.reader.read(&mut raw[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(PipelineError::pull(self.name(), format!("read failed: {}", e)))
                }
            }
        }

        match filled {
            0 => Ok(None),
            CAN_RECORD_SIZE => {
                self.frames_read += 1;
                Ok(Some(CanFrame::from_bytes(&raw)))
            }
            partial => Err(PipelineError::pull(
                self.name(),
                format!(
                    "truncated record after frame {}: {} of {} bytes",
                    self.frames_read, partial, CAN_RECORD_SIZE
                ),
            )),
        }
    }

    fn frame_event(&self, frame: &CanFrame) -> PipelineResult<MessageBody> {
        let cycles = u64::try_from(frame.timestamp).map_err(|_| {
            PipelineError::pull(
                self.name(),
                format!(
                    "negative timestamp {} in frame {}",
                    frame.timestamp, self.frames_read
                ),
            )
        })?;

        let mut event = EventMessage::new(CAN_UNKNOWN_EVENT)
            .at(self.clock.snapshot(cycles))
            .with_field("id", FieldValue::Int(frame.frame_id as i64));
        for (i, byte) in frame.data.iter().enumerate() {
            event = event.with_field(format!("byte {}", i), FieldValue::UInt(*byte as u64));
        }
        Ok(MessageBody::Event(event))
    }
}

impl MessageSource for CanSource {
    fn name(&self) -> &'static str {
        CanSource::name(self)
    }

    fn ports(&self) -> &'static [PortDescriptor] {
        CanSource::ports(self)
    }

    fn next_batch(&mut self) -> PipelineResult<Pull> {
        CanSource::next_batch(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::ErrorKind as PipelineErrorKind;
    use crate::pipeline::message::MessageKind;
    use std::io::Cursor;

    fn capture(frames: &[CanFrame]) -> Vec<u8> {
        frames.iter().flat_map(|f| f.to_bytes()).collect()
    }

    fn source(bytes: Vec<u8>, batch_size: usize) -> CanSource {
        CanSource::new(Box::new(Cursor::new(bytes)), batch_size)
    }

    #[test]
    fn test_frame_layout() {
        let frame = CanFrame {
            timestamp: 1500,
            frame_id: 0x123,
            data: [1, 2, 3, 4, 5, 6, 7, 8],
        };
        let raw = frame.to_bytes();
        assert_eq!(&raw[0..4], &1500i32.to_le_bytes());
        assert_eq!(CanFrame::from_bytes(&raw), frame);
    }

    #[test]
    fn test_frames_become_millisecond_events() {
        let bytes = capture(&[
            CanFrame {
                timestamp: 10,
                frame_id: 0x7ff,
                data: [0xAA; 8],
            },
            CanFrame {
                timestamp: 25,
                frame_id: 0x100,
                data: [0; 8],
            },
        ]);
        let mut src = source(bytes, 64);

        let Pull::Batch(batch) = src.next_batch().unwrap() else {
            panic!("expected a batch");
        };
        let kinds: Vec<MessageKind> = batch.iter().map(|m| m.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::StreamBeginning,
                MessageKind::Event,
                MessageKind::Event,
                MessageKind::StreamEnd
            ]
        );

        let first = batch.iter().nth(1).and_then(|m| m.as_event()).unwrap();
        assert_eq!(first.name, CAN_UNKNOWN_EVENT);
        assert_eq!(first.timestamp_ns(), Ok(10_000_000));
        assert_eq!(first.field("id").and_then(FieldValue::as_i64), Some(0x7ff));
        assert_eq!(first.field("byte 7").and_then(FieldValue::as_u64), Some(0xAA));

        assert!(matches!(src.next_batch().unwrap(), Pull::End));
    }

    #[test]
    fn test_truncated_record_is_pull_error() {
        let mut bytes = capture(&[CanFrame {
            timestamp: 1,
            frame_id: 1,
            data: [0; 8],
        }]);
        bytes.extend_from_slice(&[0u8; 5]);
        let mut src = source(bytes, 64);

        let err = src.next_batch().unwrap_err();
        assert_eq!(err.kind(), PipelineErrorKind::Pull);
        assert!(err.to_string().contains("truncated record"));
    }

    #[test]
    fn test_negative_timestamp_is_pull_error() {
        let bytes = capture(&[CanFrame {
            timestamp: -5,
            frame_id: 1,
            data: [0; 8],
        }]);
        let mut src = source(bytes, 64);
        assert_eq!(
            src.next_batch().unwrap_err().kind(),
            PipelineErrorKind::Pull
        );
    }

    #[test]
    fn test_empty_capture() {
        let mut src = source(Vec::new(), 64);
        let Pull::Batch(batch) = src.next_batch().unwrap() else {
            panic!("expected a batch");
        };
        assert_eq!(batch.len(), 2);
        assert!(matches!(src.next_batch().unwrap(), Pull::End));
    }
}
