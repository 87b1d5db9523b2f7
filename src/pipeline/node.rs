//! Source node abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`MessageSource` trait**: for user-provided sources.
//! - **`BuiltinSource` enum**: for the sources shipped with the crate, picked
//!   by [`SourceKind`] at configuration time instead of loading plugins.
//!
//! `SourceNode` wraps either variant so the pipeline handles both uniformly.

use crate::config::SourceConfig;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::message::ReleaseObserver;
use crate::pipeline::nodes::{CanSource, DmesgSource, MemorySource};
use crate::pipeline::port::PortDescriptor;
use crate::pipeline::source::{MessageSource, Pull};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Built-in source readers that can be opened from configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// `dmesg` text lines.
    #[default]
    Dmesg,
    /// Raw CAN frame captures.
    Can,
}

impl SourceKind {
    /// Whether this reader cannot fall back to standard input.
    pub fn requires_path(self) -> bool {
        matches!(self, SourceKind::Can)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Dmesg => write!(f, "dmesg"),
            SourceKind::Can => write!(f, "can"),
        }
    }
}

/// Enum dispatch for built-in sources.
pub enum BuiltinSource {
    Dmesg(DmesgSource),
    Can(CanSource),
    Memory(MemorySource),
}

impl BuiltinSource {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinSource::Dmesg(s) => s.name(),
            BuiltinSource::Can(s) => s.name(),
            BuiltinSource::Memory(s) => s.name(),
        }
    }

    pub fn ports(&self) -> &'static [PortDescriptor] {
        match self {
            BuiltinSource::Dmesg(s) => s.ports(),
            BuiltinSource::Can(s) => s.ports(),
            BuiltinSource::Memory(s) => s.ports(),
        }
    }

    pub fn next_batch(&mut self) -> PipelineResult<Pull> {
        match self {
            BuiltinSource::Dmesg(s) => s.next_batch(),
            BuiltinSource::Can(s) => s.next_batch(),
            BuiltinSource::Memory(s) => s.next_batch(),
        }
    }
}

/// Wrapper that holds either a built-in source or a user source.
pub enum SourceNode {
    Builtin(BuiltinSource),
    Plugin(Box<dyn MessageSource>),
}

impl SourceNode {
    /// Open the built-in reader named by `config`.
    ///
    /// A missing `path` reads standard input.
    pub fn open(config: &SourceConfig) -> PipelineResult<Self> {
        Self::open_observed(config, None)
    }

    /// Like [`SourceNode::open`], notifying `observer` of every release.
    pub fn open_observed(
        config: &SourceConfig,
        observer: Option<ReleaseObserver>,
    ) -> PipelineResult<Self> {
        config.validate()?;

        let source = match config.kind {
            SourceKind::Dmesg => {
                let reader: Box<dyn std::io::BufRead + Send> = match &config.path {
                    Some(path) => Box::new(BufReader::new(open_input(path)?)),
                    None => Box::new(BufReader::new(std::io::stdin())),
                };
                let mut src = DmesgSource::new(reader, config.batch_size);
                if config.no_extract_timestamp {
                    src = src.without_timestamps();
                }
                if let Some(observer) = observer {
                    src = src.observed_by(observer);
                }
                BuiltinSource::Dmesg(src)
            }
            SourceKind::Can => {
                let path = config.path.as_deref().ok_or_else(|| {
                    PipelineError::Config("the can source requires an input path".into())
                })?;
                let reader: Box<dyn Read + Send> = Box::new(BufReader::new(open_input(path)?));
                let mut src = CanSource::new(reader, config.batch_size);
                if let Some(observer) = observer {
                    src = src.observed_by(observer);
                }
                BuiltinSource::Can(src)
            }
        };

        tracing::info!(
            "Opened {} reading from {}",
            source.name(),
            config
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "standard input".to_string())
        );
        Ok(SourceNode::Builtin(source))
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceNode::Builtin(s) => s.name(),
            SourceNode::Plugin(s) => s.name(),
        }
    }

    pub fn ports(&self) -> &'static [PortDescriptor] {
        match self {
            SourceNode::Builtin(s) => s.ports(),
            SourceNode::Plugin(s) => s.ports(),
        }
    }

    pub fn next_batch(&mut self) -> PipelineResult<Pull> {
        match self {
            SourceNode::Builtin(s) => s.next_batch(),
            SourceNode::Plugin(s) => s.next_batch(),
        }
    }
}

impl From<DmesgSource> for SourceNode {
    fn from(source: DmesgSource) -> Self {
        SourceNode::Builtin(BuiltinSource::Dmesg(source))
    }
}

impl From<CanSource> for SourceNode {
    fn from(source: CanSource) -> Self {
        SourceNode::Builtin(BuiltinSource::Can(source))
    }
}

impl From<MemorySource> for SourceNode {
    fn from(source: MemorySource) -> Self {
        SourceNode::Builtin(BuiltinSource::Memory(source))
    }
}

impl From<Box<dyn MessageSource>> for SourceNode {
    fn from(source: Box<dyn MessageSource>) -> Self {
        SourceNode::Plugin(source)
    }
}

impl MessageSource for SourceNode {
    fn name(&self) -> &'static str {
        SourceNode::name(self)
    }

    fn ports(&self) -> &'static [PortDescriptor] {
        SourceNode::ports(self)
    }

    fn next_batch(&mut self) -> PipelineResult<Pull> {
        SourceNode::next_batch(self)
    }
}

fn open_input(path: &Path) -> PipelineResult<File> {
    if !path.is_file() {
        return Err(PipelineError::Config(format!(
            "input {:?} does not exist or is not a file",
            path
        )));
    }
    File::open(path).map_err(|e| open_failure(path, e))
}

/// An input that exists but cannot be opened is still a bad origin.
fn open_failure(path: &Path, err: std::io::Error) -> PipelineError {
    PipelineError::Config(format!("cannot open input {:?}: {}", path, err))
}
