//! Pipeline error types.
//!
//! Every error is terminal for a run. Callers inspect [`PipelineError::kind`]
//! rather than matching through context wrappers, and the binary maps each
//! kind to its own exit code.

use crate::pipeline::message::ClockError;
use thiserror::Error;

/// Errors that can occur while building or running a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad source or pipeline configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Port wiring failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// The source failed mid-stream
    #[error("Pull error in {component}: {message}")]
    Pull { component: String, message: String },

    /// An event message without a usable clock snapshot
    #[error("Timestamp error on message #{seq}: {reason}")]
    Timestamp {
        seq: u64,
        #[source]
        reason: ClockError,
    },

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Tick limit of {0} reached before end of stream")]
    TickLimitExceeded(u64),

    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

/// Inspectable classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Connection,
    Pull,
    Timestamp,
    Cancelled,
    TickLimit,
    InvalidState,
    Io,
}

impl PipelineError {
    /// Build a pull error for the named component.
    pub fn pull(component: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Pull {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Kind of the innermost error, looking through context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::Connection(_) => ErrorKind::Connection,
            PipelineError::Pull { .. } => ErrorKind::Pull,
            PipelineError::Timestamp { .. } => ErrorKind::Timestamp,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::TickLimitExceeded(_) => ErrorKind::TickLimit,
            PipelineError::InvalidState(_) => ErrorKind::InvalidState,
            PipelineError::Io(_) => ErrorKind::Io,
            PipelineError::WithContext { source, .. } => source.kind(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Config => 2,
            ErrorKind::Connection => 3,
            ErrorKind::Pull => 4,
            ErrorKind::Timestamp => 5,
            ErrorKind::Cancelled | ErrorKind::TickLimit => 6,
            ErrorKind::InvalidState | ErrorKind::Io => 1,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> PipelineResult<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> PipelineResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for PipelineResult<T> {
    fn context(self, context: impl Into<String>) -> PipelineResult<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> PipelineResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
