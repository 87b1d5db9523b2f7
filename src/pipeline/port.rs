//! Port descriptors for the node system.
//!
//! Each node declares its ports via static `PortDescriptor` arrays.
//! The pipeline uses these to validate connections. Every port carries
//! batches of trace messages.

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// Static descriptor for a node's port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: &'static str,
    pub direction: PortDirection,
}

impl PortDescriptor {
    pub const fn input(name: &'static str) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
        }
    }

    pub const fn output(name: &'static str) -> Self {
        Self {
            name,
            direction: PortDirection::Output,
        }
    }
}

/// The single `out` port every built-in source exposes.
pub static SOURCE_PORTS: &[PortDescriptor] = &[PortDescriptor::output("out")];
