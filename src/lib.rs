//! # tracesink-rs: pull-based trace message pipeline
//!
//! A source produces timestamped trace messages in batches, a simple sink
//! pulls one batch per tick and counts the event messages, and a driver ticks
//! the sink until the source reports the end of the stream.
//!
//! ## Architecture
//!
//! - **Sources**: `dmesg` text, raw CAN captures and in-memory streams
//! - **Sink**: classifies every message, extracts event timestamps, counts events
//! - **Analysis**: optional per-event analyses such as block request latency
//! - **Driver**: port wiring, state machine, cancellation and tick limits
//!
//! ## Example
//!
//! ```ignore
//! use tracesink_rs::{config::AppConfig, pipeline::build_pipeline};
//!
//! let config = AppConfig::default();
//! let mut pipeline = build_pipeline(&config)?;
//! let events = pipeline.run()?;
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod pipeline;

// Re-export commonly used types
pub use config::{AppConfig, RunConfig, SinkConfig, SourceConfig};
pub use pipeline::{
    build_pipeline, CancelToken, Pipeline, PipelineBuilder, PipelineError, PipelineResult,
    PipelineState, RunSummary,
};
