//! Bus provisioner: multi-step routing recipes.
//!
//! Each recipe is a short sequence of graph mutations (create node, create
//! sends, configure, attach a unit). Recipes are not atomic. Every completed
//! mutation is recorded in a [`BuildLog`]; when a later step fails the error
//! carries that log so the caller can see (or undo) what was left behind.
//! With `rollback_on_failure` set the provisioner undoes the log itself.

use std::fmt;

use sendgraph_types::{
    FaderStage, NodeHandle, NodeKind, ParallelBus, ProblemKind, SaturationBus, SaturationType,
    SendAttrs, SendId, SidechainMode, SidechainSend, UnitIndex, SIDECHAIN_PAIR,
};

use crate::analyzer;
use crate::config::RoutingConfig;
use crate::error::{RoutingError, RoutingResult};
use crate::graph::RoutingGraph;
use crate::validator::RouteValidator;

/// One completed mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildStep {
    CreatedNode(NodeHandle),
    CreatedEdge { source: NodeHandle, id: SendId },
    DisabledMainOutput(NodeHandle),
    AttachedUnit { node: NodeHandle, unit: UnitIndex },
    ExpandedChannels { node: NodeHandle, from: u32 },
}

/// Mutations a recipe completed, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildLog {
    steps: Vec<BuildStep>,
}

impl BuildLog {
    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Nodes this recipe created.
    pub fn created_nodes(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.steps.iter().filter_map(|s| match s {
            BuildStep::CreatedNode(n) => Some(*n),
            _ => None,
        })
    }

    fn push(&mut self, step: BuildStep) {
        log::debug!(target: "routing::bus", "step: {:?}", step);
        self.steps.push(step);
    }
}

/// A failed recipe. `partial` lists what was built before the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionError {
    pub error: RoutingError,
    pub partial: BuildLog,
    /// Whether `partial` was undone before returning.
    pub rolled_back: bool,
}

impl ProvisionError {
    fn refused(error: RoutingError) -> Self {
        Self {
            error,
            partial: BuildLog::default(),
            rolled_back: false,
        }
    }
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if !self.partial.is_empty() {
            let state = if self.rolled_back { "rolled back" } else { "left in place" };
            write!(f, " ({} completed steps {})", self.partial.len(), state)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProvisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<RoutingError> for ProvisionError {
    fn from(error: RoutingError) -> Self {
        Self::refused(error)
    }
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug, Clone, PartialEq)]
pub struct SidechainRequest {
    pub source: NodeHandle,
    pub destination: NodeHandle,
    /// 1-based destination pair: 3 for channels 3/4, 1 for 1/2.
    pub dest_channels: u32,
    pub level_db: f64,
    pub pre_fader: bool,
    pub mode: SidechainMode,
}

impl SidechainRequest {
    /// Pre-fader, 0 dB into channels 3/4.
    pub fn new(source: NodeHandle, destination: NodeHandle) -> Self {
        Self {
            source,
            destination,
            dest_channels: SIDECHAIN_PAIR,
            level_db: 0.0,
            pre_fader: true,
            mode: SidechainMode::SendOnly,
        }
    }

    pub fn dest_channels(mut self, pair: u32) -> Self {
        self.dest_channels = pair;
        self
    }

    pub fn level_db(mut self, db: f64) -> Self {
        self.level_db = db;
        self
    }

    pub fn pre_fader(mut self, pre_fader: bool) -> Self {
        self.pre_fader = pre_fader;
        self
    }

    pub fn mode(mut self, mode: SidechainMode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParallelBusRequest {
    pub source: NodeHandle,
    pub name: String,
    pub mix_db: f64,
    pub latency_compensation: bool,
    /// Where the bus returns to. Master when `None`.
    pub return_to: Option<NodeHandle>,
}

impl ParallelBusRequest {
    /// -6 dB feed with latency compensation, returning to master.
    pub fn new(source: NodeHandle, name: impl Into<String>) -> Self {
        Self {
            source,
            name: name.into(),
            mix_db: -6.0,
            latency_compensation: true,
            return_to: None,
        }
    }

    pub fn mix_db(mut self, db: f64) -> Self {
        self.mix_db = db;
        self
    }

    pub fn latency_compensation(mut self, enabled: bool) -> Self {
        self.latency_compensation = enabled;
        self
    }

    pub fn return_to(mut self, node: NodeHandle) -> Self {
        self.return_to = Some(node);
        self
    }
}

/// Ids of a freshly wired bus.
struct BusWiring {
    bus: NodeHandle,
    feed: SendId,
    ret: SendId,
}

pub struct BusProvisioner<'a> {
    graph: &'a RoutingGraph,
    config: RoutingConfig,
}

impl<'a> BusProvisioner<'a> {
    pub fn new(graph: &'a RoutingGraph) -> Self {
        Self::with_config(graph, RoutingConfig::default())
    }

    pub fn with_config(graph: &'a RoutingGraph, config: RoutingConfig) -> Self {
        Self { graph, config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    fn validator(&self) -> RouteValidator<'a> {
        RouteValidator::new(self.graph)
            .with_high_latency_ms(self.config.high_latency_ms)
            .with_fallback_sample_rate(self.config.fallback_sample_rate)
    }

    /// Turn a failure after the first mutation into a `ProvisionError`,
    /// undoing the log first when configured to.
    fn fail(&self, error: RoutingError, partial: BuildLog) -> ProvisionError {
        log::error!(target: "routing::bus", "recipe failed after {} steps: {}", partial.len(), error);
        let rolled_back = if self.config.rollback_on_failure && !partial.is_empty() {
            match self.rollback(&partial) {
                Ok(()) => true,
                Err(e) => {
                    log::error!(target: "routing::bus", "rollback incomplete: {}", e);
                    false
                }
            }
        } else {
            false
        };
        ProvisionError {
            error,
            partial,
            rolled_back,
        }
    }

    /// Undo `log` in reverse order. Keeps going past failures and returns the first one.
    pub fn rollback(&self, built: &BuildLog) -> RoutingResult {
        let created: Vec<NodeHandle> = built.created_nodes().collect();
        let mut first_error = None;
        for step in built.steps().iter().rev() {
            let undone = match *step {
                BuildStep::CreatedEdge { source, id } => {
                    self.graph.remove_edge(source, id).map(|_| ())
                }
                BuildStep::DisabledMainOutput(node) if !created.contains(&node) => {
                    self.graph.set_main_output(node, true)
                }
                BuildStep::DisabledMainOutput(_) => Ok(()),
                BuildStep::AttachedUnit { node, unit } => {
                    if !created.contains(&node) {
                        log::warn!(target: "routing::bus", "unit {} on {} cannot be removed, left in place", unit, node);
                    }
                    Ok(())
                }
                BuildStep::ExpandedChannels { node, from } => {
                    self.graph.set_channel_count(node, from)
                }
                BuildStep::CreatedNode(node) => self.graph.delete_node(node).map(|_| ()),
            };
            if let Err(e) = undone {
                log::error!(target: "routing::bus", "could not undo {:?}: {}", step, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                log::info!(target: "routing::bus", "rolled back {} steps", built.len());
                Ok(())
            }
        }
    }

    // ── Sidechain send ───────────────────────────────────────────

    pub fn create_sidechain_send(&self, req: &SidechainRequest) -> ProvisionResult<SidechainSend> {
        let validator = self.validator();
        let mut steps = BuildLog::default();

        let mut analysis = validator.validate(req.source, req.destination, req.dest_channels);
        if !analysis.valid
            && analysis.only_errors_of(ProblemKind::ChannelCapacity)
            && self.config.expand_sidechain_channels
            && req.dest_channels == SIDECHAIN_PAIR
        {
            let from = analysis
                .channel_map
                .map(|m| m.dest_channels)
                .unwrap_or_default();
            self.graph
                .set_channel_count(req.destination, analyzer::SIDECHAIN_MIN_CHANNELS)?;
            steps.push(BuildStep::ExpandedChannels {
                node: req.destination,
                from,
            });
            log::info!(target: "routing::bus", "widened {} from {} to {} channels for sidechain", req.destination, from, analyzer::SIDECHAIN_MIN_CHANNELS);
            analysis = validator.validate(req.source, req.destination, req.dest_channels);
        }
        if !analysis.valid {
            let error = analysis
                .errors
                .into_iter()
                .next()
                .map(RoutingError::from)
                .unwrap_or_else(|| RoutingError::InvalidArgument("route is not valid".into()));
            log::warn!(target: "routing::bus", "sidechain {} -> {} refused: {}", req.source, req.destination, error);
            return Err(if steps.is_empty() {
                ProvisionError::refused(error)
            } else {
                self.fail(error, steps)
            });
        }

        let attrs = SendAttrs::default()
            .with_level_db(req.level_db)
            .with_stage(FaderStage::from_pre_fader(req.pre_fader))
            .with_dest_pair(req.dest_channels);
        let id = match self.graph.add_edge(req.source, req.destination, &attrs) {
            Ok(id) => id,
            Err(e) => return Err(self.fail(e, steps)),
        };
        steps.push(BuildStep::CreatedEdge {
            source: req.source,
            id,
        });

        match self.graph.edge(req.source, id) {
            Ok(edge) if edge.destination == req.destination => {}
            Ok(edge) => {
                let error = RoutingError::ExternalCallFailure(format!(
                    "send {} on {} reads back as going to {}",
                    id, req.source, edge.destination
                ));
                return Err(self.fail(error, steps));
            }
            Err(e) => return Err(self.fail(e, steps)),
        }

        let compressor_unit = match req.mode {
            SidechainMode::SendOnly => None,
            SidechainMode::WithCompressor => match self.ensure_compressor(req.destination, &mut steps) {
                Ok(unit) => Some(unit),
                Err(e) => return Err(self.fail(e, steps)),
            },
        };

        let confirmed = validator.validate(req.source, req.destination, req.dest_channels);
        log::info!(
            target: "routing::bus",
            "sidechain {} -> {} channels {}/{} at {} dB {}-fader",
            req.source,
            req.destination,
            req.dest_channels,
            req.dest_channels + 1,
            req.level_db,
            if req.pre_fader { "pre" } else { "post" }
        );

        Ok(SidechainSend {
            send_id: id,
            source: req.source,
            destination: req.destination,
            sidechain_channels: req.dest_channels,
            level_db: req.level_db,
            pre_fader: req.pre_fader,
            compressor_unit,
            route_valid: confirmed.valid,
            latency_ms: confirmed.latency_ms,
        })
    }

    /// First sidechain-capable unit on `node`, attaching the configured compressor if there is none.
    fn ensure_compressor(&self, node: NodeHandle, steps: &mut BuildLog) -> RoutingResult<UnitIndex> {
        let info = self.graph.node_info(node)?;
        if let Some(existing) = analyzer::sidechain_capable_units(&info).first() {
            return Ok(*existing);
        }
        let unit = self.graph.add_unit(node, &self.config.compressor_plugin)?;
        steps.push(BuildStep::AttachedUnit { node, unit });
        Ok(unit)
    }

    // ── Buses ────────────────────────────────────────────────────

    /// Create a bus node, feed it from `source`, mute its main output and
    /// return it into `return_to`.
    fn wire_bus(
        &self,
        source: NodeHandle,
        name: &str,
        feed: &SendAttrs,
        ret: &SendAttrs,
        return_to: NodeHandle,
        steps: &mut BuildLog,
    ) -> RoutingResult<BusWiring> {
        let bus = self.graph.create_node(&NodeKind::Bus {
            name: name.to_string(),
        })?;
        steps.push(BuildStep::CreatedNode(bus));

        let feed_id = self.graph.add_edge(source, bus, feed)?;
        steps.push(BuildStep::CreatedEdge {
            source,
            id: feed_id,
        });

        self.graph.set_main_output(bus, false)?;
        steps.push(BuildStep::DisabledMainOutput(bus));

        let ret_id = self.graph.add_edge(bus, return_to, ret)?;
        steps.push(BuildStep::CreatedEdge {
            source: bus,
            id: ret_id,
        });

        Ok(BusWiring {
            bus,
            feed: feed_id,
            ret: ret_id,
        })
    }

    /// Checks shared by both bus recipes. Returns the return destination.
    fn check_bus_source(
        &self,
        source: NodeHandle,
        return_to: Option<NodeHandle>,
    ) -> RoutingResult<NodeHandle> {
        self.graph.require(source)?;
        let return_to = match return_to {
            Some(node) => node,
            None => self.graph.master()?,
        };
        if return_to == source {
            return Err(RoutingError::StructuralConflict(format!(
                "bus cannot return into its own source {}",
                source
            )));
        }
        self.graph.require(return_to)?;
        Ok(return_to)
    }

    pub fn create_parallel_bus(&self, req: &ParallelBusRequest) -> ProvisionResult<ParallelBus> {
        if req.name.trim().is_empty() {
            return Err(RoutingError::InvalidArgument("bus name must not be empty".into()).into());
        }
        let return_to = self.check_bus_source(req.source, req.return_to)?;

        let mut steps = BuildLog::default();
        let feed = SendAttrs::default()
            .with_level_db(req.mix_db)
            .with_stage(FaderStage::PreFader);
        let wiring = match self.wire_bus(
            req.source,
            &req.name,
            &feed,
            &SendAttrs::default(),
            return_to,
            &mut steps,
        ) {
            Ok(w) => w,
            Err(e) => return Err(self.fail(e, steps)),
        };

        let compensation_samples = if req.latency_compensation {
            match self.compensation_samples(req.source, wiring.bus) {
                Ok(samples) => samples,
                Err(e) => return Err(self.fail(e, steps)),
            }
        } else {
            0.0
        };

        log::info!(
            target: "routing::bus",
            "parallel bus '{}' ({}) for {}: mix {} dB, compensation {} samples",
            req.name, wiring.bus, req.source, req.mix_db, compensation_samples
        );

        Ok(ParallelBus {
            bus: wiring.bus,
            source: req.source,
            name: req.name.clone(),
            return_to,
            feed_send: wiring.feed,
            return_send: wiring.ret,
            mix_db: req.mix_db,
            latency_compensation: req.latency_compensation,
            compensation_samples,
        })
    }

    fn compensation_samples(&self, source: NodeHandle, bus: NodeHandle) -> RoutingResult<f64> {
        let source = self.graph.node_info(source)?;
        let bus = self.graph.node_info(bus)?;
        Ok(analyzer::bus_compensation_samples(&source, &bus))
    }

    pub fn create_saturation_bus(
        &self,
        source: NodeHandle,
        saturation_type: SaturationType,
        mix_percent: f64,
    ) -> ProvisionResult<SaturationBus> {
        if !(0.0..=100.0).contains(&mix_percent) {
            return Err(RoutingError::InvalidArgument(format!(
                "mix must be between 0 and 100 percent, got {}",
                mix_percent
            ))
            .into());
        }
        let return_to = self.check_bus_source(source, None)?;
        let name = format!("{} Sat", self.graph.node_info(source)?.name);
        let return_gain = mix_percent / 100.0;

        let mut steps = BuildLog::default();
        let feed = SendAttrs::default().with_stage(FaderStage::PreFader);
        let ret = SendAttrs::default().with_gain(return_gain);
        let wiring = match self.wire_bus(source, &name, &feed, &ret, return_to, &mut steps) {
            Ok(w) => w,
            Err(e) => return Err(self.fail(e, steps)),
        };

        let attached = match self.attach_saturation(wiring.bus, saturation_type, &mut steps) {
            Ok(attached) => attached,
            Err(e) => return Err(self.fail(e, steps)),
        };
        let (plugin, saturation_unit, drive) = match attached {
            Some((plugin, unit, drive)) => (Some(plugin), Some(unit), drive),
            None => (None, None, None),
        };

        log::info!(
            target: "routing::bus",
            "saturation bus '{}' ({}) for {}: {} via {:?}, mix {}%",
            name, wiring.bus, source, saturation_type, plugin, mix_percent
        );

        Ok(SaturationBus {
            bus: wiring.bus,
            source,
            name,
            return_to,
            saturation_type,
            plugin,
            saturation_unit,
            drive,
            feed_send: wiring.feed,
            return_send: wiring.ret,
            mix_percent,
            return_gain,
        })
    }

    /// Add the type's plugin, or the generic one if that fails. `Ok(None)`
    /// when neither could be added.
    fn attach_saturation(
        &self,
        bus: NodeHandle,
        saturation_type: SaturationType,
        steps: &mut BuildLog,
    ) -> RoutingResult<Option<(String, UnitIndex, Option<f64>)>> {
        let plugins = &self.config.saturation;
        let mut candidates = vec![(plugins.plugin(saturation_type), saturation_type)];
        if plugins.fallback() != plugins.plugin(saturation_type) {
            candidates.push((plugins.fallback(), SaturationType::Generic));
        }

        for (plugin, drive_type) in candidates {
            match self.graph.add_unit(bus, plugin) {
                Ok(unit) => {
                    steps.push(BuildStep::AttachedUnit { node: bus, unit });
                    let drive = self.set_drive(bus, unit, drive_type.drive());
                    return Ok(Some((plugin.to_string(), unit, drive)));
                }
                Err(RoutingError::ExternalCallFailure(msg)) => {
                    log::warn!(target: "routing::bus", "could not add {}: {}", plugin, msg);
                }
                Err(e) => return Err(e),
            }
        }
        log::warn!(target: "routing::bus", "no saturation unit attached to {}", bus);
        Ok(None)
    }

    /// Set parameter 0 to `drive`. Returns the value applied, if any.
    fn set_drive(&self, node: NodeHandle, unit: UnitIndex, drive: f64) -> Option<f64> {
        let result = self.graph.unit_param_count(node, unit).and_then(|count| {
            if count == 0 {
                return Ok(false);
            }
            self.graph.set_unit_param(node, unit, 0, drive)
        });
        match result {
            Ok(true) => Some(drive),
            Ok(false) => {
                log::debug!(target: "routing::bus", "unit {} on {} has no drive parameter", unit, node);
                None
            }
            Err(e) => {
                log::warn!(target: "routing::bus", "could not set drive on unit {} of {}: {}", unit, node, e);
                None
            }
        }
    }
}
