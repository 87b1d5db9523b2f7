//! Pull-based trace message pipeline.
//!
//! A source hands out batches of trace messages, a sink pulls them one batch
//! per tick and counts events, and the executor drives the sink until the
//! source ends or something fails.
//!
//! # Architecture
//!
//! ```text
//! [DmesgSource | CanSource | MemorySource] ──out──► in──[SimpleSink] ──► LineSink
//! ```
//!
//! # Design
//!
//! - **Enum dispatch for built-ins**: `BuiltinSource` enum, `MessageSource` trait for the rest.
//! - **Release by ownership**: a message is released when it is dropped.
//! - **Sticky terminal states**: after `End` or an error the pipeline refuses further ticks.
//! - **Cooperative cancellation**: `CancelToken` is checked before every tick.

pub mod error;
pub mod executor;
pub mod id;
pub mod message;
pub mod node;
pub mod nodes;
pub mod output;
pub mod port;
pub mod source;

pub use error::{ErrorKind, PipelineError, PipelineResult, ResultExt};
pub use executor::{
    build_pipeline, CancelToken, Connection, Pipeline, PipelineBuilder, PipelineState,
    RunSummary,
};
pub use id::{ConnectionId, NodeId, PortId};
pub use message::{
    Batch, ClockClass, ClockError, ClockSnapshot, EventMessage, FieldValue, Message, MessageBody,
    MessageEmitter, MessageKind, ReleaseObserver, Released,
};
pub use node::{BuiltinSource, SourceKind, SourceNode};
pub use nodes::{CanSource, DmesgSource, MemorySource, RunState, SimpleSinkNode, SinkMode};
pub use output::{ChannelLines, CollectedLines, DiscardLines, LineSink, StdoutLines, TraceLine};
pub use port::{PortDescriptor, PortDirection};
pub use source::{IterationStatus, MessageSource, Pull};
