//! Block request latency.
//!
//! Matches `block_rq_insert` and `block_rq_complete` kernel events on their
//! `(dev, sector)` key and reports how long each request took, attributed to
//! the program that issued it.

use crate::analysis::EventAnalyzer;
use crate::pipeline::message::{EventMessage, FieldValue};
use std::collections::HashMap;

pub const BLOCK_RQ_INSERT: &str = "block_rq_insert";
pub const BLOCK_RQ_COMPLETE: &str = "block_rq_complete";

/// Pending request: insertion time and issuing program.
#[derive(Debug, Clone)]
struct Inserted {
    timestamp_ns: i64,
    comm: String,
}

/// Pairs block request insertions with their completions.
#[derive(Debug, Default)]
pub struct BlockLatencyAnalyzer {
    requests: HashMap<(u64, u64), Inserted>,
    completed: u64,
    unmatched: u64,
}

impl BlockLatencyAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests seen completing with a recorded insertion.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Completions whose insertion was never recorded.
    pub fn unmatched(&self) -> u64 {
        self.unmatched
    }

    /// Inserted requests still waiting for their completion.
    pub fn pending(&self) -> usize {
        self.requests.len()
    }

    fn request_key(event: &EventMessage) -> Option<(u64, u64)> {
        let dev = event.field("dev").and_then(FieldValue::as_u64)?;
        let sector = event.field("sector").and_then(FieldValue::as_u64)?;
        Some((dev, sector))
    }
}

impl EventAnalyzer for BlockLatencyAnalyzer {
    fn name(&self) -> &str {
        "block-latency"
    }

    fn on_event(&mut self, event: &EventMessage, timestamp_ns: i64) -> Option<String> {
        match event.name.as_str() {
            BLOCK_RQ_INSERT => {
                let Some(key) = Self::request_key(event) else {
                    tracing::debug!("block_rq_insert without dev/sector, skipped");
                    return None;
                };
                let comm = event
                    .field("comm")
                    .map(ToString::to_string)
                    .unwrap_or_default();
                self.requests.insert(key, Inserted { timestamp_ns, comm });
                None
            }
            BLOCK_RQ_COMPLETE => {
                let key = Self::request_key(event)?;
                // Completions for requests issued before the trace started are skipped.
                let Some(inserted) = self.requests.remove(&key) else {
                    self.unmatched += 1;
                    return None;
                };
                self.completed += 1;
                Some(format!(
                    "[{}] Block request took {} ns",
                    inserted.comm,
                    timestamp_ns.saturating_sub(inserted.timestamp_ns)
                ))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, dev: u64, sector: u64, comm: &str) -> EventMessage {
        EventMessage::new(name)
            .with_field("dev", FieldValue::UInt(dev))
            .with_field("sector", FieldValue::UInt(sector))
            .with_field("comm", FieldValue::Str(comm.into()))
    }

    #[test]
    fn test_insert_then_complete_reports_latency() {
        let mut analyzer = BlockLatencyAnalyzer::new();
        assert_eq!(
            analyzer.on_event(&request(BLOCK_RQ_INSERT, 8, 2048, "dd"), 1_000),
            None
        );
        assert_eq!(
            analyzer.on_event(&request(BLOCK_RQ_COMPLETE, 8, 2048, ""), 4_500),
            Some("[dd] Block request took 3500 ns".to_string())
        );
        assert_eq!(analyzer.completed(), 1);
    }

    #[test]
    fn test_unmatched_completion_is_skipped() {
        let mut analyzer = BlockLatencyAnalyzer::new();
        analyzer.on_event(&request(BLOCK_RQ_INSERT, 8, 1, "dd"), 0);
        assert_eq!(
            analyzer.on_event(&request(BLOCK_RQ_COMPLETE, 8, 2, "dd"), 10),
            None
        );
        assert_eq!(analyzer.unmatched(), 1);
        assert_eq!(analyzer.completed(), 0);
    }

    #[test]
    fn test_reinsert_overwrites_start_time() {
        let mut analyzer = BlockLatencyAnalyzer::new();
        analyzer.on_event(&request(BLOCK_RQ_INSERT, 1, 1, "first"), 100);
        analyzer.on_event(&request(BLOCK_RQ_INSERT, 1, 1, "second"), 300);
        assert_eq!(
            analyzer.on_event(&request(BLOCK_RQ_COMPLETE, 1, 1, ""), 400),
            Some("[second] Block request took 100 ns".to_string())
        );
    }

    #[test]
    fn test_completed_requests_leave_the_table() {
        let mut analyzer = BlockLatencyAnalyzer::new();
        for sector in 0..100 {
            analyzer.on_event(&request(BLOCK_RQ_INSERT, 8, sector, "dd"), 0);
        }
        analyzer.on_event(&request(BLOCK_RQ_INSERT, 8, 500, "sync"), 0);
        assert_eq!(analyzer.pending(), 101);

        for sector in 0..100 {
            assert_eq!(
                analyzer.on_event(&request(BLOCK_RQ_COMPLETE, 8, sector, ""), 250),
                Some("[dd] Block request took 250 ns".to_string())
            );
        }
        assert_eq!(analyzer.pending(), 1);
        assert_eq!(analyzer.completed(), 100);

        // A repeated completion no longer finds its insertion.
        assert_eq!(
            analyzer.on_event(&request(BLOCK_RQ_COMPLETE, 8, 0, ""), 300),
            None
        );
        assert_eq!(analyzer.unmatched(), 1);
    }

    #[test]
    fn test_other_events_ignored() {
        let mut analyzer = BlockLatencyAnalyzer::new();
        assert_eq!(analyzer.on_event(&EventMessage::new("sched_switch"), 5), None);
        assert_eq!(analyzer.on_event(&EventMessage::new(BLOCK_RQ_INSERT), 5), None);
    }
}
