//! In-process session model implementing [`ControlSurface`].
//!
//! Behaves like a small DAW session: tracks with sends and hosted units, a
//! master node, dense send/unit indices that shift on removal. Every mutation
//! coming through the trait is recorded as a [`SurfaceOp`] so tests can assert
//! on exactly what the routing layer did. Faults can be injected to exercise
//! partial-failure paths.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use sendgraph_types::{NodeHandle, SendAttrs, SendParam, UnitParam, DEFAULT_CHANNEL_COUNT};

use super::{ControlSurface, SurfaceError, SurfaceResult};

/// Parameter names given to every unit instantiated on a `MemorySurface`.
pub const DEFAULT_UNIT_PARAMS: &[&str] = &["Drive", "Tone", "Mix", "Output"];

const MASTER_RAW: u64 = 0;
const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;

/// A mutation recorded by `MemorySurface` for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    InsertNode(NodeHandle),
    DeleteNode(NodeHandle),
    SetNodeName {
        node: NodeHandle,
        name: String,
    },
    SetChannelCount {
        node: NodeHandle,
        channels: u32,
    },
    SetMainOutput {
        node: NodeHandle,
        enabled: bool,
    },
    SetFolderDepth {
        node: NodeHandle,
        depth: i32,
    },
    CreateSend {
        source: NodeHandle,
        destination: NodeHandle,
        index: i32,
    },
    RemoveSend {
        source: NodeHandle,
        index: u32,
    },
    SetSendValue {
        source: NodeHandle,
        index: u32,
        param: SendParam,
        value: f64,
    },
    AddUnit {
        node: NodeHandle,
        name: String,
        index: i32,
    },
    SetUnitParam {
        node: NodeHandle,
        unit: u32,
        param: u32,
        value: f64,
    },
}

/// One-shot failure armed with [`MemorySurface::inject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Next `insert_node` fails with a transport error.
    InsertNode,
    /// Next `create_send` returns -1.
    CreateSend,
    /// Next `set_main_output` fails with a transport error.
    SetMainOutput,
    /// Next `set_send_value` reports `false`.
    SetSendValue,
}

#[derive(Debug, Clone)]
struct MemSend {
    destination: NodeHandle,
    attrs: SendAttrs,
}

#[derive(Debug, Clone)]
struct MemUnit {
    name: String,
    enabled: bool,
    params: Vec<UnitParam>,
}

impl MemUnit {
    fn new(name: &str, enabled: bool) -> Self {
        Self {
            name: name.to_string(),
            enabled,
            params: DEFAULT_UNIT_PARAMS
                .iter()
                .map(|p| UnitParam {
                    name: p.to_string(),
                    value: 0.0,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct MemNode {
    handle: NodeHandle,
    name: String,
    channels: u32,
    main_output: bool,
    folder_depth: i32,
    sends: Vec<MemSend>,
    units: Vec<MemUnit>,
}

impl MemNode {
    fn new(handle: NodeHandle, name: &str, channels: u32) -> Self {
        Self {
            handle,
            name: name.to_string(),
            channels,
            main_output: true,
            folder_depth: 0,
            sends: Vec::new(),
            units: Vec::new(),
        }
    }

    fn send(&self, index: u32) -> SurfaceResult<&MemSend> {
        self.sends.get(index as usize).ok_or(SurfaceError::UnknownSend {
            node: self.handle,
            index,
        })
    }

    fn unit(&self, index: u32) -> SurfaceResult<&MemUnit> {
        self.units.get(index as usize).ok_or(SurfaceError::UnknownUnit {
            node: self.handle,
            index,
        })
    }
}

struct Inner {
    master: MemNode,
    tracks: Vec<MemNode>,
    next_raw: u64,
    sample_rate: f64,
    ops: Vec<SurfaceOp>,
    faults: Vec<Fault>,
    rejected_plugins: HashSet<String>,
    hidden_params: HashSet<SendParam>,
}

impl Inner {
    fn node(&self, handle: NodeHandle) -> SurfaceResult<&MemNode> {
        if handle == self.master.handle {
            return Ok(&self.master);
        }
        self.tracks
            .iter()
            .find(|n| n.handle == handle)
            .ok_or(SurfaceError::UnknownNode(handle))
    }

    fn node_mut(&mut self, handle: NodeHandle) -> SurfaceResult<&mut MemNode> {
        if handle == self.master.handle {
            return Ok(&mut self.master);
        }
        self.tracks
            .iter_mut()
            .find(|n| n.handle == handle)
            .ok_or(SurfaceError::UnknownNode(handle))
    }

    fn take_fault(&mut self, fault: Fault) -> bool {
        if let Some(pos) = self.faults.iter().position(|f| *f == fault) {
            self.faults.remove(pos);
            true
        } else {
            false
        }
    }

    fn alloc_handle(&mut self) -> NodeHandle {
        let handle = NodeHandle::from_raw(self.next_raw);
        self.next_raw += 1;
        handle
    }
}

/// An in-memory DAW session. All operations succeed unless a fault is armed.
/// Uses a `Mutex` for interior mutability so the surface is `Send + Sync`
/// (needed for `Arc<MemorySurface>` sharing between a graph and a test).
pub struct MemorySurface {
    inner: Mutex<Inner>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                master: MemNode::new(NodeHandle::from_raw(MASTER_RAW), "MASTER", DEFAULT_CHANNEL_COUNT),
                tracks: Vec::new(),
                next_raw: MASTER_RAW + 1,
                sample_rate: DEFAULT_SAMPLE_RATE,
                ops: Vec::new(),
                faults: Vec::new(),
                rejected_plugins: HashSet::new(),
                hidden_params: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Session setup (not recorded) ─────────────────────────────

    /// Add a track to the session without recording an operation.
    pub fn add_track(&self, name: &str, channels: u32) -> NodeHandle {
        let mut inner = self.lock();
        let handle = inner.alloc_handle();
        inner.tracks.push(MemNode::new(handle, name, channels));
        handle
    }

    /// Host a unit on a node without recording an operation.
    pub fn host_unit(&self, node: NodeHandle, name: &str, enabled: bool) -> SurfaceResult<u32> {
        let mut inner = self.lock();
        let target = inner.node_mut(node)?;
        target.units.push(MemUnit::new(name, enabled));
        Ok(target.units.len() as u32 - 1)
    }

    pub fn set_sample_rate_hz(&self, sample_rate: f64) {
        self.lock().sample_rate = sample_rate;
    }

    /// Arm a one-shot fault.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    /// Make `add_unit` fail for this plugin name.
    pub fn reject_plugin(&self, name: &str) {
        self.lock().rejected_plugins.insert(name.to_string());
    }

    /// Make `send_value` report this attribute as unavailable.
    pub fn hide_send_param(&self, param: SendParam) {
        self.lock().hidden_params.insert(param);
    }

    // ── Assertions ───────────────────────────────────────────────

    /// Return all recorded operations.
    pub fn operations(&self) -> Vec<SurfaceOp> {
        self.lock().ops.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.lock().ops.clear();
    }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&SurfaceOp) -> bool>(&self, f: F) -> usize {
        self.lock().ops.iter().filter(|op| f(op)).count()
    }

    /// Find the first operation matching a predicate.
    pub fn find<F: Fn(&SurfaceOp) -> bool>(&self, f: F) -> Option<SurfaceOp> {
        self.lock().ops.iter().find(|op| f(op)).cloned()
    }

    pub fn track_count(&self) -> usize {
        self.lock().tracks.len()
    }

    pub fn unit_names(&self, node: NodeHandle) -> Vec<String> {
        self.lock()
            .node(node)
            .map(|n| n.units.iter().map(|u| u.name.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlSurface for MemorySurface {
    fn nodes(&self) -> SurfaceResult<Vec<NodeHandle>> {
        Ok(self.lock().tracks.iter().map(|n| n.handle).collect())
    }

    fn master(&self) -> SurfaceResult<NodeHandle> {
        Ok(self.lock().master.handle)
    }

    fn contains(&self, node: NodeHandle) -> SurfaceResult<bool> {
        Ok(self.lock().node(node).is_ok())
    }

    fn insert_node(&self) -> SurfaceResult<NodeHandle> {
        let mut inner = self.lock();
        if inner.take_fault(Fault::InsertNode) {
            return Err(SurfaceError::Transport("insert_node: injected fault".into()));
        }
        let handle = inner.alloc_handle();
        let name = format!("Track {}", inner.tracks.len() + 1);
        inner.tracks.push(MemNode::new(handle, &name, DEFAULT_CHANNEL_COUNT));
        inner.ops.push(SurfaceOp::InsertNode(handle));
        log::debug!(target: "surface::memory", "inserted node {}", handle);
        Ok(handle)
    }

    fn delete_node(&self, node: NodeHandle) -> SurfaceResult<bool> {
        let mut inner = self.lock();
        let Some(pos) = inner.tracks.iter().position(|n| n.handle == node) else {
            return Ok(false);
        };
        inner.tracks.remove(pos);
        // Sends into a deleted node go away with it.
        let inner = &mut *inner;
        for source in inner.tracks.iter_mut().chain(std::iter::once(&mut inner.master)) {
            source.sends.retain(|s| s.destination != node);
        }
        inner.ops.push(SurfaceOp::DeleteNode(node));
        Ok(true)
    }

    fn node_name(&self, node: NodeHandle) -> SurfaceResult<String> {
        Ok(self.lock().node(node)?.name.clone())
    }

    fn set_node_name(&self, node: NodeHandle, name: &str) -> SurfaceResult {
        let mut inner = self.lock();
        inner.node_mut(node)?.name = name.to_string();
        inner.ops.push(SurfaceOp::SetNodeName {
            node,
            name: name.to_string(),
        });
        Ok(())
    }

    fn channel_count(&self, node: NodeHandle) -> SurfaceResult<u32> {
        Ok(self.lock().node(node)?.channels)
    }

    fn set_channel_count(&self, node: NodeHandle, channels: u32) -> SurfaceResult {
        let mut inner = self.lock();
        inner.node_mut(node)?.channels = channels;
        inner.ops.push(SurfaceOp::SetChannelCount { node, channels });
        Ok(())
    }

    fn main_output(&self, node: NodeHandle) -> SurfaceResult<bool> {
        Ok(self.lock().node(node)?.main_output)
    }

    fn set_main_output(&self, node: NodeHandle, enabled: bool) -> SurfaceResult {
        let mut inner = self.lock();
        if inner.take_fault(Fault::SetMainOutput) {
            return Err(SurfaceError::Transport("set_main_output: injected fault".into()));
        }
        inner.node_mut(node)?.main_output = enabled;
        inner.ops.push(SurfaceOp::SetMainOutput { node, enabled });
        Ok(())
    }

    fn folder_depth(&self, node: NodeHandle) -> SurfaceResult<i32> {
        Ok(self.lock().node(node)?.folder_depth)
    }

    fn set_folder_depth(&self, node: NodeHandle, depth: i32) -> SurfaceResult {
        let mut inner = self.lock();
        inner.node_mut(node)?.folder_depth = depth;
        inner.ops.push(SurfaceOp::SetFolderDepth { node, depth });
        Ok(())
    }

    fn send_count(&self, node: NodeHandle) -> SurfaceResult<u32> {
        Ok(self.lock().node(node)?.sends.len() as u32)
    }

    fn create_send(&self, source: NodeHandle, destination: NodeHandle) -> SurfaceResult<i32> {
        let mut inner = self.lock();
        inner.node(destination)?;
        inner.node(source)?;
        let index = if inner.take_fault(Fault::CreateSend) {
            -1
        } else {
            let src = inner.node_mut(source)?;
            src.sends.push(MemSend {
                destination,
                attrs: SendAttrs::default(),
            });
            src.sends.len() as i32 - 1
        };
        inner.ops.push(SurfaceOp::CreateSend {
            source,
            destination,
            index,
        });
        Ok(index)
    }

    fn remove_send(&self, source: NodeHandle, index: u32) -> SurfaceResult<bool> {
        let mut inner = self.lock();
        let src = inner.node_mut(source)?;
        if index as usize >= src.sends.len() {
            return Ok(false);
        }
        src.sends.remove(index as usize);
        inner.ops.push(SurfaceOp::RemoveSend { source, index });
        Ok(true)
    }

    fn send_destination(&self, source: NodeHandle, index: u32) -> SurfaceResult<NodeHandle> {
        Ok(self.lock().node(source)?.send(index)?.destination)
    }

    fn send_value(
        &self,
        source: NodeHandle,
        index: u32,
        param: SendParam,
    ) -> SurfaceResult<Option<f64>> {
        let inner = self.lock();
        let send = inner.node(source)?.send(index)?;
        if inner.hidden_params.contains(&param) {
            return Ok(None);
        }
        Ok(Some(send.attrs.raw(param)))
    }

    fn set_send_value(
        &self,
        source: NodeHandle,
        index: u32,
        param: SendParam,
        value: f64,
    ) -> SurfaceResult<bool> {
        let mut inner = self.lock();
        inner.node(source)?.send(index)?;
        if inner.take_fault(Fault::SetSendValue) {
            return Ok(false);
        }
        let src = inner.node_mut(source)?;
        src.sends[index as usize].attrs.apply_raw(param, value);
        inner.ops.push(SurfaceOp::SetSendValue {
            source,
            index,
            param,
            value,
        });
        Ok(true)
    }

    fn unit_count(&self, node: NodeHandle) -> SurfaceResult<u32> {
        Ok(self.lock().node(node)?.units.len() as u32)
    }

    fn unit_name(&self, node: NodeHandle, unit: u32) -> SurfaceResult<String> {
        Ok(self.lock().node(node)?.unit(unit)?.name.clone())
    }

    fn unit_enabled(&self, node: NodeHandle, unit: u32) -> SurfaceResult<bool> {
        Ok(self.lock().node(node)?.unit(unit)?.enabled)
    }

    fn add_unit(&self, node: NodeHandle, name: &str) -> SurfaceResult<i32> {
        let mut inner = self.lock();
        inner.node(node)?;
        let index = if inner.rejected_plugins.contains(name) {
            -1
        } else {
            let target = inner.node_mut(node)?;
            target.units.push(MemUnit::new(name, true));
            target.units.len() as i32 - 1
        };
        inner.ops.push(SurfaceOp::AddUnit {
            node,
            name: name.to_string(),
            index,
        });
        Ok(index)
    }

    fn unit_param_count(&self, node: NodeHandle, unit: u32) -> SurfaceResult<u32> {
        Ok(self.lock().node(node)?.unit(unit)?.params.len() as u32)
    }

    fn unit_param_name(&self, node: NodeHandle, unit: u32, param: u32) -> SurfaceResult<String> {
        let inner = self.lock();
        let u = inner.node(node)?.unit(unit)?;
        u.params
            .get(param as usize)
            .map(|p| p.name.clone())
            .ok_or(SurfaceError::UnknownUnit { node, index: unit })
    }

    fn unit_param(&self, node: NodeHandle, unit: u32, param: u32) -> SurfaceResult<f64> {
        let inner = self.lock();
        let u = inner.node(node)?.unit(unit)?;
        u.params
            .get(param as usize)
            .map(|p| p.value)
            .ok_or(SurfaceError::UnknownUnit { node, index: unit })
    }

    fn set_unit_param(
        &self,
        node: NodeHandle,
        unit: u32,
        param: u32,
        value: f64,
    ) -> SurfaceResult<bool> {
        let mut inner = self.lock();
        let target = inner.node_mut(node)?;
        let handle = target.handle;
        let u = target
            .units
            .get_mut(unit as usize)
            .ok_or(SurfaceError::UnknownUnit { node: handle, index: unit })?;
        let Some(p) = u.params.get_mut(param as usize) else {
            return Ok(false);
        };
        p.value = value;
        inner.ops.push(SurfaceOp::SetUnitParam {
            node,
            unit,
            param,
            value,
        });
        Ok(true)
    }

    fn sample_rate(&self) -> SurfaceResult<f64> {
        Ok(self.lock().sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_get_distinct_handles_and_master_is_separate() {
        let surface = MemorySurface::new();
        let a = surface.add_track("Kick", 2);
        let b = surface.add_track("Bass", 4);
        assert_ne!(a, b);
        let master = surface.master().unwrap();
        assert_eq!(surface.nodes().unwrap(), vec![a, b]);
        assert!(surface.contains(master).unwrap());
        assert!(!surface.nodes().unwrap().contains(&master));
        assert_eq!(surface.channel_count(b).unwrap(), 4);
    }

    #[test]
    fn send_indices_are_dense_after_removal() {
        let surface = MemorySurface::new();
        let a = surface.add_track("A", 2);
        let b = surface.add_track("B", 2);
        let c = surface.add_track("C", 2);
        assert_eq!(surface.create_send(a, b).unwrap(), 0);
        assert_eq!(surface.create_send(a, c).unwrap(), 1);
        assert!(surface.remove_send(a, 0).unwrap());
        assert_eq!(surface.send_count(a).unwrap(), 1);
        assert_eq!(surface.send_destination(a, 0).unwrap(), c);
        assert!(!surface.remove_send(a, 5).unwrap());
    }

    #[test]
    fn unknown_handles_are_reported() {
        let surface = MemorySurface::new();
        let a = surface.add_track("A", 2);
        let ghost = NodeHandle::from_raw(999);
        assert_eq!(
            surface.create_send(a, ghost),
            Err(SurfaceError::UnknownNode(ghost))
        );
        assert!(matches!(
            surface.send_destination(a, 0),
            Err(SurfaceError::UnknownSend { index: 0, .. })
        ));
        assert!(surface.unit_name(a, 0).unwrap_err().is_not_found());
    }

    #[test]
    fn injected_create_send_fault_returns_negative_index() {
        let surface = MemorySurface::new();
        let a = surface.add_track("A", 2);
        let b = surface.add_track("B", 2);
        surface.inject(Fault::CreateSend);
        assert_eq!(surface.create_send(a, b).unwrap(), -1);
        // One-shot: the next call succeeds.
        assert_eq!(surface.create_send(a, b).unwrap(), 0);
        assert_eq!(surface.count(|op| matches!(op, SurfaceOp::CreateSend { .. })), 2);
    }

    #[test]
    fn rejected_plugins_fail_to_attach() {
        let surface = MemorySurface::new();
        let a = surface.add_track("A", 2);
        surface.reject_plugin("ReaTape");
        assert_eq!(surface.add_unit(a, "ReaTape").unwrap(), -1);
        assert_eq!(surface.add_unit(a, "ReaSaturate").unwrap(), 0);
        assert_eq!(surface.unit_names(a), vec!["ReaSaturate".to_string()]);
        assert_eq!(surface.unit_param_count(a, 0).unwrap(), DEFAULT_UNIT_PARAMS.len() as u32);
    }

    #[test]
    fn deleting_a_node_drops_sends_into_it() {
        let surface = MemorySurface::new();
        let a = surface.add_track("A", 2);
        let bus = surface.insert_node().unwrap();
        surface.create_send(a, bus).unwrap();
        assert!(surface.delete_node(bus).unwrap());
        assert_eq!(surface.send_count(a).unwrap(), 0);
        assert!(!surface.contains(bus).unwrap());
        assert!(!surface.delete_node(bus).unwrap());
    }

    #[test]
    fn deleting_a_node_drops_master_sends_into_it() {
        let surface = MemorySurface::new();
        let master = surface.master().unwrap();
        let bus = surface.insert_node().unwrap();
        surface.create_send(master, bus).unwrap();
        assert!(surface.delete_node(bus).unwrap());
        assert_eq!(surface.send_count(master).unwrap(), 0);
    }

    #[test]
    fn folder_depth_defaults_to_zero_and_is_recorded() {
        let surface = MemorySurface::new();
        let a = surface.add_track("Drums", 2);
        assert_eq!(surface.folder_depth(a).unwrap(), 0);
        surface.set_folder_depth(a, 1).unwrap();
        assert_eq!(surface.folder_depth(a).unwrap(), 1);
        assert_eq!(
            surface.operations(),
            vec![SurfaceOp::SetFolderDepth { node: a, depth: 1 }]
        );
    }

    #[test]
    fn hidden_params_read_as_none() {
        let surface = MemorySurface::new();
        let a = surface.add_track("A", 2);
        let b = surface.add_track("B", 2);
        surface.create_send(a, b).unwrap();
        surface.hide_send_param(SendParam::Pan);
        assert_eq!(surface.send_value(a, 0, SendParam::Pan).unwrap(), None);
        assert_eq!(surface.send_value(a, 0, SendParam::Volume).unwrap(), Some(1.0));
    }
}
