//! # sendgraph-types
//!
//! Shared type definitions for the sendgraph routing layer: node handles,
//! the send/receive edge model, route analysis results and the records
//! returned by the bus recipes.
//!
//! These types carry no behavior that touches a live session. Everything
//! here is plain data and serializes with serde so the tool layer can hand
//! it to external callers as JSON.

pub mod analysis;
pub mod bus;
pub mod node;
pub mod send;

pub use analysis::{ChannelMap, ProblemKind, RouteAnalysis, RouteProblem};
pub use bus::{
    ParallelBus, RoutingSummary, SaturationBus, SaturationType, SidechainMode, SidechainSend,
};
pub use node::{HostedUnit, NodeInfo, NodeKind, UnitParam, DEFAULT_CHANNEL_COUNT};
pub use send::{
    db_to_gain, gain_to_db, offset_to_pair, pair_to_offset, FaderStage, ReceiveEdge, SendAttrs,
    SendEdge, SendField, SendParam, MAIN_PAIR, SIDECHAIN_PAIR,
};

/// Opaque identity of a node in the live session.
///
/// Handles are minted by a control surface and stay stable for the session
/// lifetime. Two handles are the same node iff they compare equal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct NodeHandle(u64);

impl NodeHandle {
    /// Wrap a raw surface identifier. Only control surfaces should call this.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a send within its source node's send list.
///
/// Dense at read time: removing a send shifts every later send down by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct SendId(u32);

impl SendId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a hosted processing unit within a node's unit chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct UnitIndex(u32);

impl UnitIndex {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for UnitIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
