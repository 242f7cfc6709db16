#![allow(dead_code)]
//! Test harness utilities for sendgraph-core integration tests.

use std::sync::Arc;

use sendgraph_core::surface::{MemorySurface, SurfaceOp};
use sendgraph_core::RoutingGraph;
use sendgraph_types::NodeHandle;

/// A graph over an in-memory session, with the surface kept for assertions.
pub struct Session {
    pub surface: Arc<MemorySurface>,
    pub graph: RoutingGraph,
}

impl Session {
    pub fn new() -> Self {
        let surface = Arc::new(MemorySurface::new());
        let graph = RoutingGraph::new(Arc::clone(&surface));
        Self { surface, graph }
    }

    /// Add a track hosting the given enabled units.
    pub fn track(&self, name: &str, channels: u32, units: &[&str]) -> NodeHandle {
        let node = self.surface.add_track(name, channels);
        for unit in units {
            self.surface.host_unit(node, unit, true).unwrap();
        }
        node
    }

    /// Number of sends in the session touching `node`, in either direction.
    pub fn edges_touching(&self, node: NodeHandle) -> usize {
        let outgoing = self.graph.list_outgoing(node).unwrap().len();
        let incoming = self.graph.list_incoming(node).unwrap().len();
        outgoing + incoming
    }

    pub fn sends_created(&self) -> usize {
        self.surface
            .count(|op| matches!(op, SurfaceOp::CreateSend { index, .. } if *index >= 0))
    }
}

/// Kick (stereo) and Bass (4 channels, compressor): the standard sidechain pair.
pub fn kick_and_bass() -> (Session, NodeHandle, NodeHandle) {
    let session = Session::new();
    let kick = session.track("Kick", 2, &[]);
    let bass = session.track("Bass", 4, &["Compressor"]);
    (session, kick, bass)
}
