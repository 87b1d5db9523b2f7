//! Event analysis run by the sink alongside event counting.
//!
//! Analyzers see every event message in stream order together with its
//! already-extracted timestamp, and may produce one output line per event.

pub mod latency;

pub use latency::{BlockLatencyAnalyzer, BLOCK_RQ_COMPLETE, BLOCK_RQ_INSERT};

use crate::pipeline::message::EventMessage;

/// Trait for per-event analyses attached to the sink.
pub trait EventAnalyzer: Send {
    /// Human-readable name of this analyzer.
    fn name(&self) -> &str;

    /// Observe one event. Returns a line to print, if any.
    fn on_event(&mut self, event: &EventMessage, timestamp_ns: i64) -> Option<String>;
}
