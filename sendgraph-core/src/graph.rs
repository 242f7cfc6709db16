//! Routing graph accessor.
//!
//! `RoutingGraph` is the only piece of the routing layer that talks to the
//! control surface. It holds no session state of its own: every read goes to
//! the surface, so two reads with no mutation in between see the same graph
//! and a read after a write sees the write. Unresolvable handles are reported
//! as [`RoutingError::NotFound`]; nothing is retried.

use sendgraph_types::{
    HostedUnit, NodeHandle, NodeInfo, NodeKind, ReceiveEdge, RoutingSummary, SendAttrs, SendEdge,
    SendField, SendId, SendParam, UnitIndex, UnitParam,
};

use crate::analyzer::FALLBACK_SAMPLE_RATE;
use crate::error::{RoutingError, RoutingResult};
use crate::surface::ControlSurface;

/// Folder depth that opens a folder.
pub const FOLDER_START: i32 = 1;

pub struct RoutingGraph {
    surface: Option<Box<dyn ControlSurface>>,
    fallback_sample_rate: f64,
}

impl RoutingGraph {
    pub fn new<S: ControlSurface + 'static>(surface: S) -> Self {
        Self {
            surface: Some(Box::new(surface)),
            fallback_sample_rate: FALLBACK_SAMPLE_RATE,
        }
    }

    /// A graph with no surface. Every call fails until [`connect`](Self::connect).
    pub fn disconnected() -> Self {
        Self {
            surface: None,
            fallback_sample_rate: FALLBACK_SAMPLE_RATE,
        }
    }

    /// Sample rate to assume when the surface reports a non-positive one.
    pub fn with_fallback_sample_rate(mut self, sample_rate: f64) -> Self {
        if sample_rate > 0.0 {
            self.fallback_sample_rate = sample_rate;
        }
        self
    }

    pub fn connect<S: ControlSurface + 'static>(&mut self, surface: S) {
        if self.surface.is_some() {
            log::warn!(target: "routing::graph", "connect() replaced an existing surface");
        }
        self.surface = Some(Box::new(surface));
    }

    /// Drop the surface and hand it back to the caller.
    pub fn disconnect(&mut self) -> Option<Box<dyn ControlSurface>> {
        log::info!(target: "routing::graph", "surface disconnected");
        self.surface.take()
    }

    /// Swap in a fresh surface, returning the previous one.
    pub fn reconnect<S: ControlSurface + 'static>(
        &mut self,
        surface: S,
    ) -> Option<Box<dyn ControlSurface>> {
        log::info!(target: "routing::graph", "surface reconnected");
        self.surface.replace(Box::new(surface))
    }

    pub fn is_connected(&self) -> bool {
        self.surface.is_some()
    }

    fn surface(&self) -> RoutingResult<&dyn ControlSurface> {
        self.surface.as_deref().ok_or_else(|| {
            RoutingError::ExternalCallFailure("control surface is not connected".into())
        })
    }

    // ── Nodes ────────────────────────────────────────────────────

    pub fn exists(&self, node: NodeHandle) -> RoutingResult<bool> {
        Ok(self.surface()?.contains(node)?)
    }

    /// Fail with `NotFound` unless `node` resolves.
    pub fn require(&self, node: NodeHandle) -> RoutingResult {
        if self.exists(node)? {
            Ok(())
        } else {
            Err(RoutingError::NotFound(format!("node {} does not exist", node)))
        }
    }

    /// Regular nodes in session order; master is not included.
    pub fn nodes(&self) -> RoutingResult<Vec<NodeHandle>> {
        Ok(self.surface()?.nodes()?)
    }

    pub fn master(&self) -> RoutingResult<NodeHandle> {
        Ok(self.surface()?.master()?)
    }

    /// Snapshot of a node and its hosted units (unit parameters are not read).
    pub fn node_info(&self, node: NodeHandle) -> RoutingResult<NodeInfo> {
        let surface = self.surface()?;
        self.require(node)?;
        let unit_count = surface.unit_count(node)?;
        let mut units = Vec::with_capacity(unit_count as usize);
        for i in 0..unit_count {
            units.push(HostedUnit {
                index: UnitIndex::new(i),
                name: surface.unit_name(node, i)?,
                enabled: surface.unit_enabled(node, i)?,
                params: Vec::new(),
            });
        }
        Ok(NodeInfo {
            handle: node,
            name: surface.node_name(node)?,
            channel_count: surface.channel_count(node)?,
            main_output: surface.main_output(node)?,
            units,
        })
    }

    pub fn create_node(&self, kind: &NodeKind) -> RoutingResult<NodeHandle> {
        let surface = self.surface()?;
        if kind.name().is_some_and(|n| n.trim().is_empty()) {
            return Err(RoutingError::InvalidArgument("bus name must not be empty".into()));
        }
        let node = surface.insert_node()?;
        let configured = match kind.name() {
            Some(name) => surface.set_node_name(node, name),
            None => Ok(()),
        }
        .and_then(|()| match kind {
            NodeKind::Folder { .. } => surface.set_folder_depth(node, FOLDER_START),
            _ => Ok(()),
        });
        if let Err(e) = configured {
            log::error!(target: "routing::graph", "configuring new node {} failed: {}", node, e);
            if let Err(cleanup) = surface.delete_node(node) {
                log::error!(target: "routing::graph", "could not delete half-made node {}: {}", node, cleanup);
            }
            return Err(e.into());
        }
        log::debug!(target: "routing::graph", "created node {} ({:?})", node, kind);
        Ok(node)
    }

    /// Delete a node. Only call this for nodes the routing layer created.
    pub fn delete_node(&self, node: NodeHandle) -> RoutingResult<bool> {
        let deleted = self.surface()?.delete_node(node)?;
        log::debug!(target: "routing::graph", "delete node {}: {}", node, deleted);
        Ok(deleted)
    }

    pub fn set_main_output(&self, node: NodeHandle, enabled: bool) -> RoutingResult {
        self.surface()?.set_main_output(node, enabled)?;
        Ok(())
    }

    pub fn set_channel_count(&self, node: NodeHandle, channels: u32) -> RoutingResult {
        if channels == 0 || channels % 2 != 0 {
            return Err(RoutingError::InvalidArgument(format!(
                "channel count must be a positive even number, got {}",
                channels
            )));
        }
        self.surface()?.set_channel_count(node, channels)?;
        log::debug!(target: "routing::graph", "node {} now has {} channels", node, channels);
        Ok(())
    }

    // ── Folders ──────────────────────────────────────────────────

    pub fn folder_depth(&self, node: NodeHandle) -> RoutingResult<i32> {
        let surface = self.surface()?;
        self.require(node)?;
        Ok(surface.folder_depth(node)?)
    }

    /// `1` opens a folder, `0` is a plain track, negative values close folders.
    pub fn set_folder_depth(&self, node: NodeHandle, depth: i32) -> RoutingResult {
        let surface = self.surface()?;
        self.require_track(node)?;
        surface.set_folder_depth(node, depth)?;
        log::debug!(target: "routing::graph", "node {} folder depth {}", node, depth);
        Ok(())
    }

    /// Nest `child` under `parent`. Nodes are never reordered, so `child`
    /// must already come after `parent` in session order. `parent` is made a
    /// folder if it is not one yet.
    pub fn set_parent(&self, child: NodeHandle, parent: NodeHandle) -> RoutingResult {
        if child == parent {
            return Err(RoutingError::StructuralConflict(format!(
                "node {} cannot be its own parent",
                child
            )));
        }
        self.require_track(parent)?;
        self.require_track(child)?;
        let order = self.nodes()?;
        let position = |node| order.iter().position(|n| *n == node);
        if position(child) <= position(parent) {
            return Err(RoutingError::InvalidArgument(format!(
                "node {} must come after its parent {}",
                child, parent
            )));
        }
        if self.folder_depth(parent)? <= 0 {
            self.set_folder_depth(parent, FOLDER_START)?;
        }
        self.set_folder_depth(child, FOLDER_START)?;
        log::info!(target: "routing::graph", "node {} nested under {}", child, parent);
        Ok(())
    }

    /// Nodes nested under `parent`: the run of positive folder depths that
    /// directly follows it in session order.
    pub fn children(&self, parent: NodeHandle) -> RoutingResult<Vec<NodeHandle>> {
        let surface = self.surface()?;
        self.require(parent)?;
        let order = surface.nodes()?;
        let Some(start) = order.iter().position(|n| *n == parent) else {
            return Ok(Vec::new());
        };
        let mut children = Vec::new();
        for node in &order[start + 1..] {
            if surface.folder_depth(*node)? <= 0 {
                break;
            }
            children.push(*node);
        }
        Ok(children)
    }

    /// Like [`require`](Self::require), but the master node is refused too.
    fn require_track(&self, node: NodeHandle) -> RoutingResult {
        self.require(node)?;
        if node == self.master()? {
            return Err(RoutingError::InvalidArgument(
                "the master node cannot be part of a folder".into(),
            ));
        }
        Ok(())
    }

    // ── Edges ────────────────────────────────────────────────────

    /// Create a send from `source` to `destination` and apply every attribute.
    ///
    /// If an attribute cannot be applied the half-configured send is removed
    /// again before the error is returned.
    pub fn add_edge(
        &self,
        source: NodeHandle,
        destination: NodeHandle,
        attrs: &SendAttrs,
    ) -> RoutingResult<SendId> {
        let surface = self.surface()?;
        if source == destination {
            return Err(RoutingError::StructuralConflict(format!(
                "cannot route node {} to itself",
                source
            )));
        }
        self.require(source)?;
        self.require(destination)?;

        let raw = surface.create_send(source, destination)?;
        if raw < 0 {
            log::error!(target: "routing::graph", "surface returned send index {} for {} -> {}", raw, source, destination);
            return Err(RoutingError::ExternalCallFailure(format!(
                "failed to create send {} -> {} (surface returned {})",
                source, destination, raw
            )));
        }
        let index = raw as u32;

        for param in SendParam::ALL {
            let applied = match surface.set_send_value(source, index, param, attrs.raw(param)) {
                Ok(applied) => applied,
                Err(e) => {
                    self.discard_send(source, index);
                    return Err(e.into());
                }
            };
            if !applied {
                self.discard_send(source, index);
                return Err(RoutingError::ExternalCallFailure(format!(
                    "surface refused {} on new send {} -> {}",
                    param.key(),
                    source,
                    destination
                )));
            }
        }

        log::debug!(target: "routing::graph", "send {} -> {} created at index {}", source, destination, index);
        Ok(SendId::new(index))
    }

    fn discard_send(&self, source: NodeHandle, index: u32) {
        let removed = self
            .surface()
            .and_then(|s| s.remove_send(source, index).map_err(RoutingError::from));
        if let Err(e) = removed {
            log::error!(target: "routing::graph", "could not discard send {} on {}: {}", index, source, e);
        }
    }

    /// Remove one send. Later sends on the same source shift down by one.
    pub fn remove_edge(&self, source: NodeHandle, id: SendId) -> RoutingResult<bool> {
        let surface = self.surface()?;
        self.require(source)?;
        let removed = surface.remove_send(source, id.get())?;
        log::debug!(target: "routing::graph", "remove send {} on {}: {}", id, source, removed);
        Ok(removed)
    }

    /// Read one send. Attributes the surface does not expose take their defaults.
    pub fn edge(&self, source: NodeHandle, id: SendId) -> RoutingResult<SendEdge> {
        let surface = self.surface()?;
        let destination = surface.send_destination(source, id.get())?;
        let mut attrs = SendAttrs::default();
        for param in SendParam::ALL {
            if let Some(value) = surface.send_value(source, id.get(), param)? {
                attrs.apply_raw(param, value);
            }
        }
        Ok(SendEdge {
            id,
            source,
            destination,
            attrs,
        })
    }

    pub fn list_outgoing(&self, node: NodeHandle) -> RoutingResult<Vec<SendEdge>> {
        let surface = self.surface()?;
        self.require(node)?;
        let count = surface.send_count(node)?;
        (0..count).map(|i| self.edge(node, SendId::new(i))).collect()
    }

    /// Every send in the session whose destination is `node`.
    pub fn list_incoming(&self, node: NodeHandle) -> RoutingResult<Vec<ReceiveEdge>> {
        let surface = self.surface()?;
        self.require(node)?;
        let mut sources = surface.nodes()?;
        sources.push(surface.master()?);

        let mut receives: Vec<ReceiveEdge> = Vec::new();
        for source in sources {
            let count = surface.send_count(source)?;
            for i in 0..count {
                if surface.send_destination(source, i)? == node {
                    receives.push(self.edge(source, SendId::new(i))?.into());
                }
            }
        }
        Ok(receives)
    }

    /// Ids of the sends on `source` that land on `destination`.
    pub fn edges_between(
        &self,
        source: NodeHandle,
        destination: NodeHandle,
    ) -> RoutingResult<Vec<SendId>> {
        let surface = self.surface()?;
        self.require(source)?;
        let count = surface.send_count(source)?;
        let mut ids = Vec::new();
        for i in 0..count {
            if surface.send_destination(source, i)? == destination {
                ids.push(SendId::new(i));
            }
        }
        Ok(ids)
    }

    pub fn set_edge_attr(
        &self,
        source: NodeHandle,
        id: SendId,
        field: SendField,
    ) -> RoutingResult<bool> {
        let surface = self.surface()?;
        let applied = surface.set_send_value(source, id.get(), field.param(), field.raw_value())?;
        log::debug!(target: "routing::graph", "send {} on {}: {:?} applied={}", id, source, field, applied);
        Ok(applied)
    }

    /// Set or flip a send's mute. Returns the mute state now in effect.
    pub fn toggle_edge_mute(
        &self,
        source: NodeHandle,
        id: SendId,
        mute: Option<bool>,
    ) -> RoutingResult<bool> {
        let surface = self.surface()?;
        let current = surface
            .send_value(source, id.get(), SendParam::Mute)?
            .is_some_and(|v| v != 0.0);
        let target = mute.unwrap_or(!current);
        if !self.set_edge_attr(source, id, SendField::Mute(target))? {
            return Err(RoutingError::ExternalCallFailure(format!(
                "surface refused mute on send {} of {}",
                id, source
            )));
        }
        Ok(target)
    }

    /// Remove every send leaving `node`. Returns how many were removed.
    pub fn clear_outgoing(&self, node: NodeHandle) -> RoutingResult<usize> {
        let surface = self.surface()?;
        self.require(node)?;
        let count = surface.send_count(node)?;
        let mut removed = 0;
        for i in (0..count).rev() {
            if surface.remove_send(node, i)? {
                removed += 1;
            }
        }
        log::info!(target: "routing::graph", "cleared {} sends from {}", removed, node);
        Ok(removed)
    }

    /// Remove every send arriving at `node`. Returns how many were removed.
    pub fn clear_incoming(&self, node: NodeHandle) -> RoutingResult<usize> {
        let surface = self.surface()?;
        let receives = self.list_incoming(node)?;
        let mut removed = 0;
        // Highest index first so the remaining ids on each source stay valid.
        for receive in receives.iter().rev() {
            if surface.remove_send(receive.source, receive.send_id.get())? {
                removed += 1;
            }
        }
        log::info!(target: "routing::graph", "cleared {} receives into {}", removed, node);
        Ok(removed)
    }

    // ── Units ────────────────────────────────────────────────────

    pub fn add_unit(&self, node: NodeHandle, name: &str) -> RoutingResult<UnitIndex> {
        let surface = self.surface()?;
        if name.trim().is_empty() {
            return Err(RoutingError::InvalidArgument("unit name must not be empty".into()));
        }
        self.require(node)?;
        let raw = surface.add_unit(node, name)?;
        if raw < 0 {
            log::warn!(target: "routing::graph", "surface could not instantiate '{}' on {}", name, node);
            return Err(RoutingError::ExternalCallFailure(format!(
                "could not add unit '{}' to node {}",
                name, node
            )));
        }
        log::debug!(target: "routing::graph", "unit '{}' added to {} at {}", name, node, raw);
        Ok(UnitIndex::new(raw as u32))
    }

    pub fn unit_param_count(&self, node: NodeHandle, unit: UnitIndex) -> RoutingResult<u32> {
        Ok(self.surface()?.unit_param_count(node, unit.get())?)
    }

    pub fn unit_params(&self, node: NodeHandle, unit: UnitIndex) -> RoutingResult<Vec<UnitParam>> {
        let surface = self.surface()?;
        let count = surface.unit_param_count(node, unit.get())?;
        (0..count)
            .map(|p| {
                Ok(UnitParam {
                    name: surface.unit_param_name(node, unit.get(), p)?,
                    value: surface.unit_param(node, unit.get(), p)?,
                })
            })
            .collect()
    }

    pub fn set_unit_param(
        &self,
        node: NodeHandle,
        unit: UnitIndex,
        param: u32,
        value: f64,
    ) -> RoutingResult<bool> {
        Ok(self
            .surface()?
            .set_unit_param(node, unit.get(), param, value)?)
    }

    // ── Session ──────────────────────────────────────────────────

    /// Project sample rate, or the fallback when the surface does not know it.
    pub fn sample_rate(&self) -> RoutingResult<f64> {
        self.sample_rate_or(self.fallback_sample_rate)
    }

    /// Project sample rate, or `fallback` when the surface reports a
    /// non-positive one.
    pub fn sample_rate_or(&self, fallback: f64) -> RoutingResult<f64> {
        let rate = self.surface()?.sample_rate()?;
        if rate > 0.0 {
            Ok(rate)
        } else {
            log::debug!(target: "routing::graph", "surface sample rate {} unusable, using {}", rate, fallback);
            Ok(fallback)
        }
    }

    pub fn routing_summary(&self, node: NodeHandle) -> RoutingResult<RoutingSummary> {
        let name = self.surface()?.node_name(node)?;
        let sends = self.list_outgoing(node)?;
        let receives = self.list_incoming(node)?;
        Ok(RoutingSummary {
            node,
            name,
            send_count: sends.len(),
            receive_count: receives.len(),
            sends,
            receives,
        })
    }
}
