//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use std::io::Write;
use tempfile::NamedTempFile;
use tracesink_rs::pipeline::{
    CollectedLines, MessageBody, PipelineBuilder, PipelineResult, SinkMode, SourceNode,
};
use tracesink_rs::AppConfig;

/// Lines printed for the reference scenario, in order.
pub const SCENARIO_LINES: &[&str] = &[
    "(Received 5 messages.)",
    "[Stream beginning message]",
    "Event message with timestamp=100 ns",
    "Event message with timestamp=250 ns",
    "[Discarded events message]",
    "[Stream end message]",
    "Total number of events analyzed: 2",
];

/// Run `source` through a default pipeline in `mode`, collecting the output.
pub fn run_collected(
    source: impl Into<SourceNode>,
    mode: SinkMode,
) -> (PipelineResult<u64>, Vec<String>) {
    let mut config = AppConfig::default();
    config.sink.mode = mode;
    run_with_config(source, &config)
}

pub fn run_with_config(
    source: impl Into<SourceNode>,
    config: &AppConfig,
) -> (PipelineResult<u64>, Vec<String>) {
    let lines = CollectedLines::new();
    let result = PipelineBuilder::new(config)
        .with_source(source)
        .with_output(Box::new(lines.clone()))
        .build()
        .and_then(|mut pipeline| pipeline.run());
    (result, lines.lines())
}

/// Number of event messages in a stream.
pub fn count_events(bodies: &[MessageBody]) -> u64 {
    bodies
        .iter()
        .filter(|b| matches!(b, MessageBody::Event(_)))
        .count() as u64
}

/// Write `contents` to a fresh temporary file.
pub fn temp_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(contents).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}
