//! Control surface trait: the narrow contract the routing layer needs from a
//! running DAW session.
//!
//! `ControlSurface` captures what the routing code *means* to do (enumerate
//! nodes, create a send, read a send attribute) independently of how it is
//! carried out (OSC to a bridge script, an in-process session model). This
//! lets the graph, validator and provisioner run against [`MemorySurface`] in
//! tests without a live DAW.
//!
//! Methods take `&self` and block until the surface answers. Implementations
//! must not cache: every read reflects the session as it is now.

mod memory;
mod osc;

pub use memory::{Fault, MemorySurface, SurfaceOp, DEFAULT_UNIT_PARAMS};
pub use osc::{OscSurface, REPLY_ADDR, REQUEST_PREFIX};

use std::fmt;
use std::sync::Arc;

use sendgraph_types::{NodeHandle, SendParam};

/// Result type for surface operations.
pub type SurfaceResult<T = ()> = Result<T, SurfaceError>;

/// Error from a surface operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceError {
    UnknownNode(NodeHandle),
    UnknownSend { node: NodeHandle, index: u32 },
    UnknownUnit { node: NodeHandle, index: u32 },
    /// The surface understood the request and refused it.
    Rejected(String),
    /// The request or its reply never made it across.
    Transport(String),
    /// A reply arrived but did not have the expected shape.
    Protocol(String),
}

impl SurfaceError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SurfaceError::UnknownNode(_)
                | SurfaceError::UnknownSend { .. }
                | SurfaceError::UnknownUnit { .. }
        )
    }
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::UnknownNode(node) => write!(f, "node {} does not exist", node),
            SurfaceError::UnknownSend { node, index } => {
                write!(f, "send {} on node {} does not exist", index, node)
            }
            SurfaceError::UnknownUnit { node, index } => {
                write!(f, "unit {} on node {} does not exist", index, node)
            }
            SurfaceError::Rejected(msg) => write!(f, "surface rejected request: {}", msg),
            SurfaceError::Transport(msg) => write!(f, "surface transport error: {}", msg),
            SurfaceError::Protocol(msg) => write!(f, "surface protocol error: {}", msg),
        }
    }
}

impl std::error::Error for SurfaceError {}

impl From<std::io::Error> for SurfaceError {
    fn from(e: std::io::Error) -> Self {
        SurfaceError::Transport(e.to_string())
    }
}

/// Semantic-level access to a live DAW session.
///
/// Send and unit indices are dense per node. Creation calls return the raw
/// index the surface assigned; a negative value means the surface failed to
/// create it.
pub trait ControlSurface: Send {
    /// All regular nodes (tracks), in session order. The master node is not listed.
    fn nodes(&self) -> SurfaceResult<Vec<NodeHandle>>;

    /// The master output node.
    fn master(&self) -> SurfaceResult<NodeHandle>;

    /// Whether `node` resolves to a live node (master included).
    fn contains(&self, node: NodeHandle) -> SurfaceResult<bool>;

    /// Append a new track at the end of the session.
    fn insert_node(&self) -> SurfaceResult<NodeHandle>;

    /// Remove a node together with its sends and units.
    fn delete_node(&self, node: NodeHandle) -> SurfaceResult<bool>;

    fn node_name(&self, node: NodeHandle) -> SurfaceResult<String>;

    fn set_node_name(&self, node: NodeHandle, name: &str) -> SurfaceResult;

    fn channel_count(&self, node: NodeHandle) -> SurfaceResult<u32>;

    fn set_channel_count(&self, node: NodeHandle, channels: u32) -> SurfaceResult;

    /// Whether the node feeds master directly.
    fn main_output(&self, node: NodeHandle) -> SurfaceResult<bool>;

    fn set_main_output(&self, node: NodeHandle, enabled: bool) -> SurfaceResult;

    /// Folder nesting value: positive inside a folder, 0 for a plain track,
    /// negative where a folder closes.
    fn folder_depth(&self, node: NodeHandle) -> SurfaceResult<i32>;

    fn set_folder_depth(&self, node: NodeHandle, depth: i32) -> SurfaceResult;

    fn send_count(&self, node: NodeHandle) -> SurfaceResult<u32>;

    /// Create a send from `source` to `destination` with surface defaults.
    fn create_send(&self, source: NodeHandle, destination: NodeHandle) -> SurfaceResult<i32>;

    fn remove_send(&self, source: NodeHandle, index: u32) -> SurfaceResult<bool>;

    fn send_destination(&self, source: NodeHandle, index: u32) -> SurfaceResult<NodeHandle>;

    /// Read one send attribute. `None` means the surface does not expose it.
    fn send_value(&self, source: NodeHandle, index: u32, param: SendParam)
        -> SurfaceResult<Option<f64>>;

    fn set_send_value(
        &self,
        source: NodeHandle,
        index: u32,
        param: SendParam,
        value: f64,
    ) -> SurfaceResult<bool>;

    fn unit_count(&self, node: NodeHandle) -> SurfaceResult<u32>;

    fn unit_name(&self, node: NodeHandle, unit: u32) -> SurfaceResult<String>;

    fn unit_enabled(&self, node: NodeHandle, unit: u32) -> SurfaceResult<bool>;

    /// Instantiate a unit by plugin name at the end of the chain.
    fn add_unit(&self, node: NodeHandle, name: &str) -> SurfaceResult<i32>;

    fn unit_param_count(&self, node: NodeHandle, unit: u32) -> SurfaceResult<u32>;

    fn unit_param_name(&self, node: NodeHandle, unit: u32, param: u32) -> SurfaceResult<String>;

    fn unit_param(&self, node: NodeHandle, unit: u32, param: u32) -> SurfaceResult<f64>;

    fn set_unit_param(
        &self,
        node: NodeHandle,
        unit: u32,
        param: u32,
        value: f64,
    ) -> SurfaceResult<bool>;

    /// Project sample rate in Hz. Non-positive means the surface does not know.
    fn sample_rate(&self) -> SurfaceResult<f64>;
}

/// Lets a test keep an `Arc` for assertions while the graph owns a boxed clone.
impl<S: ControlSurface + Sync + ?Sized> ControlSurface for Arc<S> {
    fn nodes(&self) -> SurfaceResult<Vec<NodeHandle>> {
        (**self).nodes()
    }
    fn master(&self) -> SurfaceResult<NodeHandle> {
        (**self).master()
    }
    fn contains(&self, node: NodeHandle) -> SurfaceResult<bool> {
        (**self).contains(node)
    }
    fn insert_node(&self) -> SurfaceResult<NodeHandle> {
        (**self).insert_node()
    }
    fn delete_node(&self, node: NodeHandle) -> SurfaceResult<bool> {
        (**self).delete_node(node)
    }
    fn node_name(&self, node: NodeHandle) -> SurfaceResult<String> {
        (**self).node_name(node)
    }
    fn set_node_name(&self, node: NodeHandle, name: &str) -> SurfaceResult {
        (**self).set_node_name(node, name)
    }
    fn channel_count(&self, node: NodeHandle) -> SurfaceResult<u32> {
        (**self).channel_count(node)
    }
    fn set_channel_count(&self, node: NodeHandle, channels: u32) -> SurfaceResult {
        (**self).set_channel_count(node, channels)
    }
    fn main_output(&self, node: NodeHandle) -> SurfaceResult<bool> {
        (**self).main_output(node)
    }
    fn set_main_output(&self, node: NodeHandle, enabled: bool) -> SurfaceResult {
        (**self).set_main_output(node, enabled)
    }
    fn folder_depth(&self, node: NodeHandle) -> SurfaceResult<i32> {
        (**self).folder_depth(node)
    }
    fn set_folder_depth(&self, node: NodeHandle, depth: i32) -> SurfaceResult {
        (**self).set_folder_depth(node, depth)
    }
    fn send_count(&self, node: NodeHandle) -> SurfaceResult<u32> {
        (**self).send_count(node)
    }
    fn create_send(&self, source: NodeHandle, destination: NodeHandle) -> SurfaceResult<i32> {
        (**self).create_send(source, destination)
    }
    fn remove_send(&self, source: NodeHandle, index: u32) -> SurfaceResult<bool> {
        (**self).remove_send(source, index)
    }
    fn send_destination(&self, source: NodeHandle, index: u32) -> SurfaceResult<NodeHandle> {
        (**self).send_destination(source, index)
    }
    fn send_value(
        &self,
        source: NodeHandle,
        index: u32,
        param: SendParam,
    ) -> SurfaceResult<Option<f64>> {
        (**self).send_value(source, index, param)
    }
    fn set_send_value(
        &self,
        source: NodeHandle,
        index: u32,
        param: SendParam,
        value: f64,
    ) -> SurfaceResult<bool> {
        (**self).set_send_value(source, index, param, value)
    }
    fn unit_count(&self, node: NodeHandle) -> SurfaceResult<u32> {
        (**self).unit_count(node)
    }
    fn unit_name(&self, node: NodeHandle, unit: u32) -> SurfaceResult<String> {
        (**self).unit_name(node, unit)
    }
    fn unit_enabled(&self, node: NodeHandle, unit: u32) -> SurfaceResult<bool> {
        (**self).unit_enabled(node, unit)
    }
    fn add_unit(&self, node: NodeHandle, name: &str) -> SurfaceResult<i32> {
        (**self).add_unit(node, name)
    }
    fn unit_param_count(&self, node: NodeHandle, unit: u32) -> SurfaceResult<u32> {
        (**self).unit_param_count(node, unit)
    }
    fn unit_param_name(&self, node: NodeHandle, unit: u32, param: u32) -> SurfaceResult<String> {
        (**self).unit_param_name(node, unit, param)
    }
    fn unit_param(&self, node: NodeHandle, unit: u32, param: u32) -> SurfaceResult<f64> {
        (**self).unit_param(node, unit, param)
    }
    fn set_unit_param(
        &self,
        node: NodeHandle,
        unit: u32,
        param: u32,
        value: f64,
    ) -> SurfaceResult<bool> {
        (**self).set_unit_param(node, unit, param, value)
    }
    fn sample_rate(&self) -> SurfaceResult<f64> {
        (**self).sample_rate()
    }
}
