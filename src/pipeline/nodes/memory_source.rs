//! MemorySource node: replays a prepared message stream.
//!
//! Used to drive the pipeline without any I/O: the stream is cut into
//! batches either by a fixed size or by explicit chunk lengths, and a pull
//! error can be injected at a chosen pull.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::message::{Batch, MessageBody, MessageEmitter, ReleaseObserver};
use crate::pipeline::port::{PortDescriptor, SOURCE_PORTS};
use crate::pipeline::source::{MessageSource, Pull};
use std::collections::VecDeque;

/// MemorySource: serves a fixed list of message bodies.
#[derive(Debug)]
pub struct MemorySource {
    pending: VecDeque<MessageBody>,
    batch_size: usize,
    chunks: VecDeque<usize>,
    fail_at_pull: Option<(u64, String)>,
    pulls: u64,
    emitter: MessageEmitter,
}

impl MemorySource {
    pub fn new(bodies: impl IntoIterator<Item = MessageBody>) -> Self {
        Self {
            pending: bodies.into_iter().collect(),
            batch_size: usize::MAX,
            chunks: VecDeque::new(),
            fail_at_pull: None,
            pulls: 0,
            emitter: MessageEmitter::new(),
        }
    }

    /// Serve at most `batch_size` messages per pull.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Serve batches of exactly these lengths, then fall back to the batch size.
    pub fn with_chunks(mut self, chunks: impl IntoIterator<Item = usize>) -> Self {
        self.chunks = chunks.into_iter().collect();
        self
    }

    /// Fail the pull with zero-based index `pull`.
    pub fn failing_at(mut self, pull: u64, message: impl Into<String>) -> Self {
        self.fail_at_pull = Some((pull, message.into()));
        self
    }

    pub fn observed_by(mut self, observer: ReleaseObserver) -> Self {
        self.emitter.set_observer(observer);
        self
    }

    pub fn name(&self) -> &'static str {
        "src.memory"
    }

    pub fn ports(&self) -> &'static [PortDescriptor] {
        SOURCE_PORTS
    }

    /// Number of pulls served so far, including failed ones.
    pub fn pulls(&self) -> u64 {
        self.pulls
    }

    pub fn next_batch(&mut self) -> PipelineResult<Pull> {
        let pull = self.pulls;
        self.pulls += 1;

        if let Some((at, message)) = &self.fail_at_pull {
            if *at == pull {
                return Err(PipelineError::pull(self.name(), message.clone()));
            }
        }

        if self.pending.is_empty() {
            return Ok(Pull::End);
        }

        let take = self
            .chunks
            .pop_front()
            .unwrap_or(self.batch_size)
            .min(self.pending.len());

        let mut batch = Batch::with_capacity(take);
        for body in self.pending.drain(..take) {
            batch.push(self.emitter.emit(body));
        }
        Ok(Pull::Batch(batch))
    }
}

impl MessageSource for MemorySource {
    fn name(&self) -> &'static str {
        MemorySource::name(self)
    }

    fn ports(&self) -> &'static [PortDescriptor] {
        MemorySource::ports(self)
    }

    fn next_batch(&mut self) -> PipelineResult<Pull> {
        MemorySource::next_batch(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(n: usize) -> Vec<MessageBody> {
        (0..n as u64).map(|i| MessageBody::event_at("e", i)).collect()
    }

    fn batch_len(pull: Pull) -> Option<usize> {
        match pull {
            Pull::Batch(batch) => Some(batch.len()),
            Pull::End => None,
        }
    }

    #[test]
    fn test_whole_stream_in_one_batch_by_default() {
        let mut src = MemorySource::new(stream(5));
        assert_eq!(batch_len(src.next_batch().unwrap()), Some(5));
        assert_eq!(batch_len(src.next_batch().unwrap()), None);
    }

    #[test]
    fn test_fixed_batch_size() {
        let mut src = MemorySource::new(stream(5)).with_batch_size(2);
        let sizes: Vec<_> = std::iter::from_fn(|| batch_len(src.next_batch().unwrap())).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_explicit_chunks_including_empty() {
        let mut src = MemorySource::new(stream(4))
            .with_chunks([1, 0, 3])
            .with_batch_size(1);
        let sizes: Vec<_> = std::iter::from_fn(|| batch_len(src.next_batch().unwrap())).collect();
        assert_eq!(sizes, vec![1, 0, 3]);
    }

    #[test]
    fn test_empty_stream_ends_immediately() {
        let mut src = MemorySource::new(Vec::new());
        assert!(matches!(src.next_batch().unwrap(), Pull::End));
        assert_eq!(src.pulls(), 1);
    }

    #[test]
    fn test_injected_failure() {
        let mut src = MemorySource::new(stream(3))
            .with_batch_size(1)
            .failing_at(1, "disk went away");
        assert!(src.next_batch().is_ok());
        let err = src.next_batch().unwrap_err();
        assert_eq!(err.to_string(), "Pull error in src.memory: disk went away");
    }
}
