//! Built-in pipeline node implementations.

pub mod can_source;
pub mod dmesg_source;
pub mod memory_source;
pub mod simple_sink;

pub use can_source::{CanFrame, CanSource, CAN_CLOCK_HZ, CAN_RECORD_SIZE, CAN_UNKNOWN_EVENT};
pub use dmesg_source::{parse_timestamp_prefix, DmesgSource, DMESG_EVENT_NAME};
pub use memory_source::MemorySource;
pub use simple_sink::{RunState, SimpleSinkNode, SinkMode};
