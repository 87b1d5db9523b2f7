//! Source adapter contract.
//!
//! A source owns a stream cursor and hands out one bounded batch per pull.
//! `&mut self` keeps pulls sequential.

use crate::pipeline::error::PipelineResult;
use crate::pipeline::message::Batch;
use crate::pipeline::port::PortDescriptor;

/// Outcome of a successful pull.
#[derive(Debug)]
pub enum Pull {
    /// More data may follow. The batch can be empty.
    Batch(Batch),
    /// The stream is exhausted. Callers must stop pulling.
    End,
}

/// Status of one sink iteration. Failures travel as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationStatus {
    Ok,
    End,
}

impl From<&Pull> for IterationStatus {
    fn from(pull: &Pull) -> Self {
        match pull {
            Pull::Batch(_) => IterationStatus::Ok,
            Pull::End => IterationStatus::End,
        }
    }
}

/// Trait for anything that produces trace messages in batches.
#[cfg_attr(test, mockall::automock)]
pub trait MessageSource: Send {
    /// Component name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Port descriptors for this source.
    fn ports(&self) -> &'static [PortDescriptor];

    /// Pull the next batch, advancing the stream cursor.
    ///
    /// Once `Pull::End` has been returned every later call returns it again.
    fn next_batch(&mut self) -> PipelineResult<Pull>;
}
