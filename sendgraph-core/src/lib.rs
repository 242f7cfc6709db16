//! # sendgraph-core
//!
//! Routing layer for a live DAW session: read and mutate the send graph
//! between tracks, validate sidechain routes, and build parallel and
//! saturation buses. All session access goes through a [`ControlSurface`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sendgraph_core::config::Config;
//! use sendgraph_core::graph::RoutingGraph;
//! use sendgraph_core::provisioner::{BusProvisioner, SidechainRequest};
//!
//! // 1. Load settings and open the surface the DAW bridge listens on
//! let config = Config::load();
//! let surface = config.osc_surface()?;
//! let graph = RoutingGraph::new(surface)
//!     .with_fallback_sample_rate(config.routing().fallback_sample_rate);
//!
//! // 2. Route the kick into the bass compressor's sidechain input (channels 3/4)
//! let provisioner = BusProvisioner::with_config(&graph, config.routing());
//! let send = provisioner.create_sidechain_send(
//!     &SidechainRequest::new(kick, bass).level_db(-6.0),
//! )?;
//! assert!(send.route_valid);
//! ```
//!
//! ## Module Overview
//!
//! - [`surface`]: `ControlSurface` trait, `MemorySurface` (in-process session
//!   with op log and fault injection), `OscSurface` (UDP bridge)
//! - [`graph`]: `RoutingGraph`, the send/receive accessor
//! - [`analyzer`]: pure channel-map and latency estimates
//! - [`validator`]: `RouteValidator`, single-pass route checks
//! - [`provisioner`]: `BusProvisioner` recipes with build log and rollback
//! - [`config`]: TOML configuration (embedded defaults + user override)
//! - [`error`]: `RoutingError` taxonomy

pub mod analyzer;
pub mod config;
pub mod error;
pub mod graph;
pub mod provisioner;
pub mod surface;
pub mod validator;

pub use sendgraph_types as types;

pub use config::{Config, RoutingConfig};
pub use error::{RoutingError, RoutingResult};
pub use graph::RoutingGraph;
pub use provisioner::{
    BuildLog, BuildStep, BusProvisioner, ParallelBusRequest, ProvisionError, ProvisionResult,
    SidechainRequest,
};
pub use surface::ControlSurface;
pub use validator::RouteValidator;
