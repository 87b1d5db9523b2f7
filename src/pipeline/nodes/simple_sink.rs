//! SimpleSink node: pulls batches from its upstream and counts events.
//!
//! Every pulled batch is reported, each message is classified in order,
//! event timestamps are extracted and every message is released before the
//! next pull. In [`SinkMode::Deferred`] the pull only parks the batch and the
//! driver calls [`SimpleSinkNode::process_pending`] to classify it.

use crate::analysis::EventAnalyzer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::message::{Batch, Message, MessageBody};
use crate::pipeline::output::{LineSink, TraceLine};
use crate::pipeline::port::PortDescriptor;
use crate::pipeline::source::{IterationStatus, MessageSource, Pull};
use serde::{Deserialize, Serialize};

/// Ports for SimpleSinkNode.
static PORTS: &[PortDescriptor] = &[PortDescriptor::input("in")];

/// When a pulled batch gets classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    /// Classify inside `consume_once`.
    #[default]
    Eager,
    /// Park the batch; the driver classifies it after the tick.
    Deferred,
}

/// Counters owned by the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunState {
    pub event_count: u64,
    pub batches_received: u64,
    pub messages_received: u64,
}

/// SimpleSink: classifies messages and counts events.
pub struct SimpleSinkNode {
    mode: SinkMode,
    state: RunState,
    pending: Option<Batch>,
    output: Box<dyn LineSink>,
    analyzers: Vec<Box<dyn EventAnalyzer>>,
}

impl SimpleSinkNode {
    pub fn new(mode: SinkMode, output: Box<dyn LineSink>) -> Self {
        Self {
            mode,
            state: RunState::default(),
            pending: None,
            output,
            analyzers: Vec::new(),
        }
    }

    pub fn with_analyzer(mut self, analyzer: Box<dyn EventAnalyzer>) -> Self {
        self.analyzers.push(analyzer);
        self
    }

    pub fn name(&self) -> &str {
        "sink"
    }

    pub fn ports(&self) -> &'static [PortDescriptor] {
        PORTS
    }

    pub fn mode(&self) -> SinkMode {
        self.mode
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Reset counters. Called once before the first pull.
    pub fn init(&mut self) {
        self.state = RunState::default();
        self.pending = None;
        let names: Vec<&str> = self.analyzers.iter().map(|a| a.name()).collect();
        tracing::debug!(mode = ?self.mode, analyzers = ?names, "sink initialized");
    }

    /// Pull exactly one batch from `upstream`.
    pub fn consume_once(
        &mut self,
        upstream: &mut dyn MessageSource,
    ) -> PipelineResult<IterationStatus> {
        if self.pending.is_some() {
            return Err(PipelineError::InvalidState(
                "previous batch was not processed before the next pull".into(),
            ));
        }

        let pull = upstream.next_batch()?;
        let status = IterationStatus::from(&pull);

        if let Pull::Batch(batch) = pull {
            match self.mode {
                SinkMode::Eager => self.process_batch(batch)?,
                SinkMode::Deferred => self.pending = Some(batch),
            }
        }

        Ok(status)
    }

    /// Classify the batch parked by the last deferred pull, if any.
    pub fn process_pending(&mut self) -> PipelineResult<()> {
        match self.pending.take() {
            Some(batch) => self.process_batch(batch),
            None => Ok(()),
        }
    }

    /// Emit the closing summary line.
    pub fn emit_total(&mut self) -> PipelineResult<()> {
        self.output.emit(TraceLine::Total(self.state.event_count))
    }

    fn process_batch(&mut self, batch: Batch) -> PipelineResult<()> {
        let count = batch.len() as u64;
        self.state.batches_received += 1;
        self.state.messages_received += count;
        self.output.emit(TraceLine::Received(count))?;

        // On error the failing message and the rest of the batch are
        // released as the iterator drops.
        for msg in batch {
            self.classify(&msg)?;
            msg.release();
        }
        Ok(())
    }

    fn classify(&mut self, msg: &Message) -> PipelineResult<()> {
        match msg.body() {
            MessageBody::Event(event) => {
                let timestamp_ns =
                    event
                        .timestamp_ns()
                        .map_err(|reason| PipelineError::Timestamp {
                            seq: msg.seq(),
                            reason,
                        })?;

                self.output.emit(TraceLine::Event { timestamp_ns })?;
                self.state.event_count += 1;

                for analyzer in self.analyzers.iter_mut() {
                    if let Some(line) = analyzer.on_event(event, timestamp_ns) {
                        self.output.emit(TraceLine::Analysis(line))?;
                    }
                }
                Ok(())
            }
            _ => self.output.emit(TraceLine::Tag(msg.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::ErrorKind;
    use crate::pipeline::message::{EventMessage, ReleaseObserver};
    use crate::pipeline::nodes::MemorySource;
    use crate::pipeline::output::CollectedLines;

    fn scenario() -> Vec<MessageBody> {
        vec![
            MessageBody::StreamBeginning,
            MessageBody::event_at("e", 100),
            MessageBody::event_at("e", 250),
            MessageBody::DiscardedEvents { count: Some(4) },
            MessageBody::StreamEnd,
        ]
    }

    fn sink(mode: SinkMode) -> (SimpleSinkNode, CollectedLines) {
        let lines = CollectedLines::new();
        let mut node = SimpleSinkNode::new(mode, Box::new(lines.clone()));
        node.init();
        (node, lines)
    }

    #[test]
    fn test_eager_classifies_in_order() {
        let (mut node, lines) = sink(SinkMode::Eager);
        let mut src = MemorySource::new(scenario());

        assert_eq!(node.consume_once(&mut src).unwrap(), IterationStatus::Ok);
        assert_eq!(node.consume_once(&mut src).unwrap(), IterationStatus::End);
        node.emit_total().unwrap();

        assert_eq!(
            lines.lines(),
            vec![
                "(Received 5 messages.)",
                "[Stream beginning message]",
                "Event message with timestamp=100 ns",
                "Event message with timestamp=250 ns",
                "[Discarded events message]",
                "[Stream end message]",
                "Total number of events analyzed: 2",
            ]
        );
        assert_eq!(
            *node.state(),
            RunState {
                event_count: 2,
                batches_received: 1,
                messages_received: 5
            }
        );
    }

    #[test]
    fn test_deferred_parks_until_processed() {
        let (mut node, lines) = sink(SinkMode::Deferred);
        let mut src = MemorySource::new(scenario()).with_batch_size(2);

        assert_eq!(node.consume_once(&mut src).unwrap(), IterationStatus::Ok);
        assert!(lines.lines().is_empty());
        assert_eq!(node.state().event_count, 0);

        // Pulling again without processing would leak the parked batch.
        let err = node.consume_once(&mut src).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        node.process_pending().unwrap();
        assert_eq!(node.state().event_count, 1);
        assert_eq!(lines.lines().len(), 3);
    }

    #[test]
    fn test_timestamp_failure_releases_whole_batch() {
        let (observer, released) = ReleaseObserver::channel();
        let (mut node, lines) = sink(SinkMode::Eager);
        let mut src = MemorySource::new(vec![
            MessageBody::StreamBeginning,
            MessageBody::Event(EventMessage::new("no_clock")),
            MessageBody::event_at("e", 5),
            MessageBody::StreamEnd,
        ])
        .observed_by(observer);

        let err = node.consume_once(&mut src).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timestamp);
        assert!(matches!(err, PipelineError::Timestamp { seq: 1, .. }));
        assert_eq!(node.state().event_count, 0);
        assert_eq!(
            lines.lines(),
            vec!["(Received 4 messages.)", "[Stream beginning message]"]
        );

        let seqs: Vec<u64> = released.try_iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_empty_batch_reports_zero() {
        let (mut node, lines) = sink(SinkMode::Eager);
        let mut src = MemorySource::new(vec![MessageBody::StreamEnd]).with_chunks([0]);
        node.consume_once(&mut src).unwrap();
        assert_eq!(lines.lines(), vec!["(Received 0 messages.)"]);
    }

    #[test]
    fn test_init_resets_counters() {
        let (mut node, _lines) = sink(SinkMode::Eager);
        let mut src = MemorySource::new(scenario());
        node.consume_once(&mut src).unwrap();
        assert_eq!(node.state().event_count, 2);

        node.init();
        assert_eq!(*node.state(), RunState::default());
    }

    #[test]
    fn test_analyzer_lines_follow_their_event() {
        struct Echo;
        impl EventAnalyzer for Echo {
            fn name(&self) -> &str {
                "echo"
            }
            fn on_event(&mut self, event: &EventMessage, ts: i64) -> Option<String> {
                Some(format!("saw {} at {}", event.name, ts))
            }
        }

        let lines = CollectedLines::new();
        let mut node =
            SimpleSinkNode::new(SinkMode::Eager, Box::new(lines.clone())).with_analyzer(Box::new(Echo));
        node.init();
        let mut src = MemorySource::new(vec![MessageBody::event_at("tick", 7)]);
        node.consume_once(&mut src).unwrap();

        assert_eq!(
            lines.lines(),
            vec![
                "(Received 1 messages.)",
                "Event message with timestamp=7 ns",
                "saw tick at 7",
            ]
        );
    }
}
