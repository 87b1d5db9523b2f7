//! Configuration module for tracesink-rs
//!
//! This module handles run configuration:
//! - Which built-in source to open and where it reads from
//! - How the sink schedules classification and which analyses it runs
//! - Limits on the driver loop
//!
//! # Config Location
//!
//! When no `--config` is given the default file is used if it exists:
//! - **Linux**: `~/.config/tracesink-rs/config.json`
//! - **macOS**: `~/Library/Application Support/tracesink-rs/config.json`
//! - **Windows**: `%APPDATA%\tracesink-rs\config.json`
//!
//! # Formats
//!
//! Files ending in `.toml` are read as TOML, everything else as JSON.
//!
//! # Example
//!
//! ```ignore
//! use tracesink_rs::config::AppConfig;
//!
//! let mut config = AppConfig::load("run.toml")?;
//! config.source.batch_size = 16;
//! config.save("run.json")?;
//! ```

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::node::SourceKind;
use crate::pipeline::nodes::SinkMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "tracesink-rs";

/// Default config filename
pub const CONFIG_FILE: &str = "config.json";

/// Default maximum number of messages per batch
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Current config file version
pub const CONFIG_VERSION: u32 = 1;

// ==================== Config Directory ====================

/// Get the application config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Source ====================

/// Which reader to open and how to batch its output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Built-in reader
    #[serde(default)]
    pub kind: SourceKind,

    /// Input file. `None` reads standard input.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Maximum messages per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Keep `[seconds]` prefixes as part of the text instead of parsing them
    #[serde(default)]
    pub no_extract_timestamp: bool,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            path: None,
            batch_size: DEFAULT_BATCH_SIZE,
            no_extract_timestamp: false,
        }
    }
}

impl SourceConfig {
    /// Check the parts of the config that do not need the filesystem
    pub fn validate(&self) -> PipelineResult<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::Config(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.kind.requires_path() && self.path.is_none() {
            return Err(PipelineError::Config(format!(
                "the {} source requires an input path",
                self.kind
            )));
        }
        Ok(())
    }
}

// ==================== Sink ====================

/// Sink scheduling and analyses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub mode: SinkMode,

    /// Attach the block request latency analysis
    #[serde(default)]
    pub latency_analysis: bool,
}

// ==================== Run ====================

/// Limits on the driver loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Fail with a tick limit error after this many ticks
    #[serde(default)]
    pub max_ticks: Option<u64>,
}

// ==================== App Config ====================

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version for future migration support
    #[serde(default = "default_config_version")]
    pub version: u32,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub run: RunConfig,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            source: SourceConfig::default(),
            sink: SinkConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load a config file, picking the format from its extension
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        let config: Self = if is_toml(path) {
            toml::from_str(&content).map_err(|e| {
                PipelineError::Config(format!("Failed to parse config {:?}: {}", path, e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                PipelineError::Config(format!("Failed to parse config {:?}: {}", path, e))
            })?
        };

        if config.version > CONFIG_VERSION {
            tracing::warn!(
                "Config {:?} has version {}, newer than supported version {}",
                path,
                config.version,
                CONFIG_VERSION
            );
        }

        config.validate()?;
        Ok(config)
    }

    /// Load the default config file if there is one, otherwise defaults
    pub fn load_default() -> PipelineResult<Self> {
        match default_config_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading default config from {:?}", path);
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Save the config as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> PipelineResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| PipelineError::Config(format!("Failed to write config: {}", e)))
    }

    pub fn validate(&self) -> PipelineResult<()> {
        self.source.validate()?;
        if self.run.max_ticks == Some(0) {
            return Err(PipelineError::Config(
                "max_ticks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}
