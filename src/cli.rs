//! Command-line interface for the `tracesink` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::node::SourceKind;
use crate::pipeline::nodes::SinkMode;

#[derive(Debug, Parser, Clone, Default)]
#[command(name = "tracesink")]
#[command(about = "Pull trace messages from a source and count events")]
pub struct Cli {
    /// Config file (JSON, or TOML by extension). Defaults to the user config if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Built-in source to read.
    #[arg(long, value_enum)]
    pub source: Option<SourceKind>,

    /// Input file. Standard input when omitted (dmesg only).
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Maximum messages per batch.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Keep `[seconds]` prefixes in the dmesg text.
    #[arg(long)]
    pub no_extract_timestamp: bool,

    /// Classify each batch after the tick instead of during the pull.
    #[arg(long)]
    pub deferred: bool,

    /// Stop with an error after this many ticks.
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// Report block request latencies from `block_rq_insert`/`block_rq_complete` events.
    ///
    /// The built-in dmesg and CAN readers never emit these events, so this only
    /// prints results for a `MessageSource` plugin that does.
    #[arg(long)]
    pub latency: bool,

    /// Print a JSON run summary after the trace.
    #[arg(long)]
    pub summary_json: bool,

    /// Also write logs to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Load the config file and apply command-line overrides on top.
    pub fn resolve_config(&self) -> PipelineResult<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::load_default()?,
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(kind) = self.source {
            config.source.kind = kind;
        }
        if let Some(path) = &self.input {
            config.source.path = Some(path.clone());
        }
        if let Some(batch_size) = self.batch_size {
            config.source.batch_size = batch_size;
        }
        if self.no_extract_timestamp {
            config.source.no_extract_timestamp = true;
        }
        if self.deferred {
            config.sink.mode = SinkMode::Deferred;
        }
        if self.latency {
            config.sink.latency_analysis = true;
        }
        if self.max_ticks.is_some() {
            config.run.max_ticks = self.max_ticks;
        }
    }
}
