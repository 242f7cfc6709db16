use serde::{Deserialize, Serialize};

use crate::{NodeHandle, UnitIndex};

/// Channel count assumed for a node the surface reports nothing for.
pub const DEFAULT_CHANNEL_COUNT: u32 = 2;

/// What kind of node to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Plain track, named by the surface.
    Track,
    /// Node that exists only to host parallel or saturation processing.
    Bus { name: String },
    /// Track that opens a folder; the tracks nested after it are its children.
    Folder { name: String },
}

impl NodeKind {
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeKind::Track => None,
            NodeKind::Bus { name } | NodeKind::Folder { name } => Some(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitParam {
    pub name: String,
    pub value: f64,
}

/// A processing unit (plugin) hosted on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedUnit {
    pub index: UnitIndex,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub params: Vec<UnitParam>,
}

/// Snapshot of one node as read from the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub handle: NodeHandle,
    pub name: String,
    pub channel_count: u32,
    /// Whether the node feeds the master output directly.
    pub main_output: bool,
    #[serde(default)]
    pub units: Vec<HostedUnit>,
}

impl NodeInfo {
    /// Minimal node with no units, stereo, routed to master.
    pub fn new(handle: NodeHandle, name: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
            channel_count: DEFAULT_CHANNEL_COUNT,
            main_output: true,
            units: Vec::new(),
        }
    }

    pub fn with_channels(mut self, channel_count: u32) -> Self {
        self.channel_count = channel_count;
        self
    }

    /// Append a unit at the next index.
    pub fn with_unit(mut self, name: impl Into<String>, enabled: bool) -> Self {
        let index = UnitIndex::new(self.units.len() as u32);
        self.units.push(HostedUnit {
            index,
            name: name.into(),
            enabled,
            params: Vec::new(),
        });
        self
    }

    pub fn enabled_units(&self) -> impl Iterator<Item = &HostedUnit> + '_ {
        self.units.iter().filter(|u| u.enabled)
    }

    pub fn unit(&self, index: UnitIndex) -> Option<&HostedUnit> {
        self.units.iter().find(|u| u.index == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_unit_assigns_sequential_indices() {
        let node = NodeInfo::new(NodeHandle::from_raw(1), "Bass")
            .with_unit("Compressor", true)
            .with_unit("Reverb", false);
        assert_eq!(node.units[0].index, UnitIndex::new(0));
        assert_eq!(node.units[1].index, UnitIndex::new(1));
        assert_eq!(node.enabled_units().count(), 1);
        assert_eq!(node.unit(UnitIndex::new(1)).unwrap().name, "Reverb");
    }

    #[test]
    fn bus_kind_carries_name() {
        assert_eq!(NodeKind::Bus { name: "Crush".into() }.name(), Some("Crush"));
        assert_eq!(NodeKind::Track.name(), None);
        assert_eq!(NodeKind::Folder { name: "Drums".into() }.name(), Some("Drums"));
    }
}
