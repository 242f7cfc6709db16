use serde::{Deserialize, Serialize};

/// Class of a route problem. Mirrors the routing error taxonomy, with channel
/// capacity split out of invalid arguments because it can be repaired by
/// widening the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProblemKind {
    NotFound,
    InvalidArgument,
    ChannelCapacity,
    StructuralConflict,
    ExternalCallFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteProblem {
    pub kind: ProblemKind,
    pub message: String,
}

impl RouteProblem {
    pub fn new(kind: ProblemKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RouteProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Channel layout of a source/destination pair plus the canonical sidechain slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMap {
    pub source_channels: u32,
    pub dest_channels: u32,
    pub input_l: u32,
    pub input_r: u32,
    pub sidechain_l: u32,
    pub sidechain_r: u32,
    pub sidechain_available: bool,
}

/// Outcome of validating a proposed or existing route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteAnalysis {
    pub valid: bool,
    /// `None` when the nodes could not be resolved.
    pub channel_map: Option<ChannelMap>,
    pub latency_ms: f64,
    pub warnings: Vec<String>,
    pub errors: Vec<RouteProblem>,
}

impl RouteAnalysis {
    /// Analysis that failed before any channel or latency data was gathered.
    pub fn invalid(errors: Vec<RouteProblem>) -> Self {
        Self {
            valid: false,
            channel_map: None,
            latency_ms: 0.0,
            warnings: Vec::new(),
            errors,
        }
    }

    pub fn has_error(&self, kind: ProblemKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    /// True when every error is of the given kind (and there is at least one).
    pub fn only_errors_of(&self, kind: ProblemKind) -> bool {
        !self.errors.is_empty() && self.errors.iter().all(|e| e.kind == kind)
    }

    pub fn error_messages(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.message.as_str()).collect()
    }
}
