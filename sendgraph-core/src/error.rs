use std::fmt;

use sendgraph_types::{ProblemKind, RouteProblem};

use crate::surface::SurfaceError;

pub type RoutingResult<T = ()> = Result<T, RoutingError>;

/// Error from a routing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingError {
    /// A node, send or unit handle does not resolve.
    NotFound(String),
    /// Argument outside the accepted domain (channel pair, empty name, ...).
    InvalidArgument(String),
    /// The operation would create a cycle, including a one-node self-route.
    StructuralConflict(String),
    /// The control surface failed or is not connected.
    ExternalCallFailure(String),
}

impl RoutingError {
    pub fn kind(&self) -> ProblemKind {
        match self {
            RoutingError::NotFound(_) => ProblemKind::NotFound,
            RoutingError::InvalidArgument(_) => ProblemKind::InvalidArgument,
            RoutingError::StructuralConflict(_) => ProblemKind::StructuralConflict,
            RoutingError::ExternalCallFailure(_) => ProblemKind::ExternalCallFailure,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RoutingError::NotFound(m)
            | RoutingError::InvalidArgument(m)
            | RoutingError::StructuralConflict(m)
            | RoutingError::ExternalCallFailure(m) => m,
        }
    }
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::NotFound(msg) => write!(f, "not found: {}", msg),
            RoutingError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            RoutingError::StructuralConflict(msg) => write!(f, "structural conflict: {}", msg),
            RoutingError::ExternalCallFailure(msg) => write!(f, "external call failed: {}", msg),
        }
    }
}

impl std::error::Error for RoutingError {}

impl From<SurfaceError> for RoutingError {
    fn from(e: SurfaceError) -> Self {
        if e.is_not_found() {
            RoutingError::NotFound(e.to_string())
        } else {
            RoutingError::ExternalCallFailure(e.to_string())
        }
    }
}

impl From<RoutingError> for RouteProblem {
    fn from(e: RoutingError) -> Self {
        let kind = e.kind();
        let message = match e {
            RoutingError::NotFound(m)
            | RoutingError::InvalidArgument(m)
            | RoutingError::StructuralConflict(m)
            | RoutingError::ExternalCallFailure(m) => m,
        };
        RouteProblem::new(kind, message)
    }
}

/// Channel capacity problems surface as invalid arguments once they leave the analysis.
impl From<RouteProblem> for RoutingError {
    fn from(p: RouteProblem) -> Self {
        match p.kind {
            ProblemKind::NotFound => RoutingError::NotFound(p.message),
            ProblemKind::InvalidArgument | ProblemKind::ChannelCapacity => {
                RoutingError::InvalidArgument(p.message)
            }
            ProblemKind::StructuralConflict => RoutingError::StructuralConflict(p.message),
            ProblemKind::ExternalCallFailure => RoutingError::ExternalCallFailure(p.message),
        }
    }
}
