//! Line-oriented trace output.
//!
//! The sink renders what it sees as [`TraceLine`] values and hands them to a
//! [`LineSink`]. The `Display` form of each line is the exact text printed
//! on standard output.

use crate::pipeline::error::PipelineResult;
use crate::pipeline::message::MessageKind;
use crossbeam_channel::Sender;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// One line of observable sink output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceLine {
    /// A batch of `n` messages was pulled.
    Received(u64),
    /// An event message and its timestamp.
    Event { timestamp_ns: i64 },
    /// A non-event message, printed as its bracketed tag.
    Tag(MessageKind),
    /// Output of an event analyzer.
    Analysis(String),
    /// Final summary after end of stream.
    Total(u64),
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceLine::Received(n) => write!(f, "(Received {} messages.)", n),
            TraceLine::Event { timestamp_ns } => {
                write!(f, "Event message with timestamp={} ns", timestamp_ns)
            }
            TraceLine::Tag(kind) => f.write_str(kind.tag()),
            TraceLine::Analysis(text) => f.write_str(text),
            TraceLine::Total(n) => write!(f, "Total number of events analyzed: {}", n),
        }
    }
}

/// Destination for trace lines.
pub trait LineSink: Send {
    fn emit(&mut self, line: TraceLine) -> PipelineResult<()>;
}

/// Writes lines to standard output.
#[derive(Debug, Default)]
pub struct StdoutLines;

impl StdoutLines {
    pub fn new() -> Self {
        Self
    }
}

impl LineSink for StdoutLines {
    fn emit(&mut self, line: TraceLine) -> PipelineResult<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", line)?;
        Ok(())
    }
}

/// Collects rendered lines in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CollectedLines {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CollectedLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line emitted so far.
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LineSink for CollectedLines {
    fn emit(&mut self, line: TraceLine) -> PipelineResult<()> {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push(line.to_string());
        Ok(())
    }
}

/// Forwards typed lines over a crossbeam channel.
pub struct ChannelLines {
    tx: Sender<TraceLine>,
}

impl ChannelLines {
    pub fn new(tx: Sender<TraceLine>) -> Self {
        Self { tx }
    }
}

impl LineSink for ChannelLines {
    fn emit(&mut self, line: TraceLine) -> PipelineResult<()> {
        // A departed receiver only means nobody is watching.
        let _ = self.tx.send(line);
        Ok(())
    }
}

/// Drops every line.
#[derive(Debug, Default)]
pub struct DiscardLines;

impl LineSink for DiscardLines {
    fn emit(&mut self, _line: TraceLine) -> PipelineResult<()> {
        Ok(())
    }
}
