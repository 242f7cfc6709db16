//! Route validation.
//!
//! A single pass over a proposed (or existing) source → destination route:
//!
//! 1. both nodes must resolve, otherwise stop
//! 2. structural checks: self-route, channel pair, destination capacity
//! 3. existing sends between the pair (warning)
//! 4. sidechain-capable units on the destination (warning when absent)
//! 5. estimated latency against the threshold (warning)
//! 6. a send already going back from destination to source (error)
//!
//! Warnings never affect validity.

use sendgraph_types::{
    offset_to_pair, NodeHandle, NodeInfo, ProblemKind, RouteAnalysis, RouteProblem, SendId,
    MAIN_PAIR, SIDECHAIN_PAIR,
};

use crate::analyzer;
use crate::error::RoutingResult;
use crate::graph::RoutingGraph;

pub const DEFAULT_HIGH_LATENCY_MS: f64 = 10.0;

pub struct RouteValidator<'a> {
    graph: &'a RoutingGraph,
    high_latency_ms: f64,
    fallback_sample_rate: f64,
}

impl<'a> RouteValidator<'a> {
    pub fn new(graph: &'a RoutingGraph) -> Self {
        Self {
            graph,
            high_latency_ms: DEFAULT_HIGH_LATENCY_MS,
            fallback_sample_rate: analyzer::FALLBACK_SAMPLE_RATE,
        }
    }

    pub fn with_high_latency_ms(mut self, ms: f64) -> Self {
        self.high_latency_ms = ms;
        self
    }

    /// Sample rate used for latency when the surface cannot supply one.
    pub fn with_fallback_sample_rate(mut self, sample_rate: f64) -> Self {
        if sample_rate > 0.0 {
            self.fallback_sample_rate = sample_rate;
        }
        self
    }

    /// Analyze a sidechain route into channels 3/4.
    pub fn analyze(&self, source: NodeHandle, destination: NodeHandle) -> RouteAnalysis {
        self.validate(source, destination, SIDECHAIN_PAIR)
    }

    /// Re-check a send that already exists, using its own destination pair.
    pub fn validate_edge(&self, source: NodeHandle, id: SendId) -> RouteAnalysis {
        match self.graph.edge(source, id) {
            Ok(edge) => self.validate(
                source,
                edge.destination,
                offset_to_pair(edge.attrs.dst_channel),
            ),
            Err(e) => {
                log::warn!(target: "routing::validate", "cannot read send {} on {}: {}", id, source, e);
                RouteAnalysis::invalid(vec![e.into()])
            }
        }
    }

    /// Validate routing `source` into the 1-based destination pair `dest_pair`.
    pub fn validate(
        &self,
        source: NodeHandle,
        destination: NodeHandle,
        dest_pair: u32,
    ) -> RouteAnalysis {
        let (src, dst) = match self.resolve(source, destination) {
            Ok(nodes) => nodes,
            Err(errors) => {
                log::info!(target: "routing::validate", "{} -> {}: unresolved ({} errors)", source, destination, errors.len());
                return RouteAnalysis::invalid(errors);
            }
        };

        let mut warnings = Vec::new();
        let mut errors = structural_problems(&src, &dst, dest_pair);

        match self.graph.edges_between(source, destination) {
            Ok(existing) if !existing.is_empty() => warnings.push(format!(
                "found {} existing sends from {} to {}",
                existing.len(),
                source,
                destination
            )),
            Ok(_) => {}
            Err(e) => errors.push(e.into()),
        }

        if analyzer::sidechain_capable_units(&dst).is_empty() {
            warnings.push(format!(
                "destination {} has no sidechain-capable units",
                dst.name
            ));
        }

        let sample_rate = self.sample_rate();
        let latency_ms = analyzer::estimate_route_latency(&src, &dst, sample_rate);
        if latency_ms > self.high_latency_ms {
            warnings.push(format!("high routing latency: {:.2} ms", latency_ms));
        }

        match self.graph.edges_between(destination, source) {
            Ok(back) if !back.is_empty() => errors.push(RouteProblem::new(
                ProblemKind::StructuralConflict,
                format!(
                    "potential feedback loop: {} already sends to {}",
                    destination, source
                ),
            )),
            Ok(_) => {}
            Err(e) => errors.push(e.into()),
        }

        let valid = errors.is_empty();
        log::info!(
            target: "routing::validate",
            "{} -> {} pair {}: valid={} latency={:.2}ms warnings={} errors={}",
            source, destination, dest_pair, valid, latency_ms, warnings.len(), errors.len()
        );

        RouteAnalysis {
            valid,
            channel_map: Some(analyzer::channel_map(&src, &dst)),
            latency_ms,
            warnings,
            errors,
        }
    }

    fn resolve(
        &self,
        source: NodeHandle,
        destination: NodeHandle,
    ) -> Result<(NodeInfo, NodeInfo), Vec<RouteProblem>> {
        let mut errors = Vec::new();
        for (role, node) in [("source", source), ("destination", destination)] {
            match self.graph.exists(node) {
                Ok(true) => {}
                Ok(false) => errors.push(RouteProblem::new(
                    ProblemKind::NotFound,
                    format!("{} node {} does not exist", role, node),
                )),
                Err(e) => errors.push(e.into()),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        let read = |node| -> RoutingResult<NodeInfo> { self.graph.node_info(node) };
        match (read(source), read(destination)) {
            (Ok(src), Ok(dst)) => Ok((src, dst)),
            (Err(e), _) | (_, Err(e)) => Err(vec![e.into()]),
        }
    }

    fn sample_rate(&self) -> f64 {
        self.graph
            .sample_rate_or(self.fallback_sample_rate)
            .unwrap_or_else(|e| {
                log::warn!(target: "routing::validate", "sample rate unavailable ({}), assuming {}", e, self.fallback_sample_rate);
                self.fallback_sample_rate
            })
    }
}

fn structural_problems(src: &NodeInfo, dst: &NodeInfo, dest_pair: u32) -> Vec<RouteProblem> {
    let mut problems = Vec::new();
    if src.handle == dst.handle {
        problems.push(RouteProblem::new(
            ProblemKind::StructuralConflict,
            format!("cannot route node {} to itself", src.handle),
        ));
    }
    if dest_pair != MAIN_PAIR && dest_pair != SIDECHAIN_PAIR {
        problems.push(RouteProblem::new(
            ProblemKind::InvalidArgument,
            format!(
                "unsupported destination channels {} (use 1 for 1/2 or 3 for 3/4)",
                dest_pair
            ),
        ));
    } else if dst.channel_count < analyzer::channels_required(dest_pair) {
        problems.push(RouteProblem::new(
            ProblemKind::ChannelCapacity,
            format!(
                "destination {} has {} channels, channels {}/{} need {}",
                dst.handle,
                dst.channel_count,
                dest_pair,
                dest_pair + 1,
                analyzer::channels_required(dest_pair)
            ),
        ));
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;
    use sendgraph_types::SendAttrs;
    use std::sync::Arc;

    fn session() -> (Arc<MemorySurface>, RoutingGraph) {
        let surface = Arc::new(MemorySurface::new());
        let graph = RoutingGraph::new(Arc::clone(&surface));
        (surface, graph)
    }

    #[test]
    fn clean_sidechain_route_is_valid() {
        let (surface, graph) = session();
        let kick = surface.add_track("Kick", 2);
        let bass = surface.add_track("Bass", 4);
        surface.host_unit(bass, "ReaComp", true).unwrap();

        let analysis = RouteValidator::new(&graph).analyze(kick, bass);
        assert!(analysis.valid, "{:?}", analysis.errors);
        assert!(analysis.warnings.is_empty(), "{:?}", analysis.warnings);
        assert!(analysis.channel_map.unwrap().sidechain_available);
    }

    #[test]
    fn self_route_is_structural_conflict() {
        let (surface, graph) = session();
        let a = surface.add_track("A", 4);
        let analysis = RouteValidator::new(&graph).analyze(a, a);
        assert!(!analysis.valid);
        assert!(analysis.has_error(ProblemKind::StructuralConflict));
    }

    #[test]
    fn missing_nodes_short_circuit() {
        let (_surface, graph) = session();
        let analysis = RouteValidator::new(&graph)
            .analyze(NodeHandle::from_raw(998), NodeHandle::from_raw(999));
        assert!(!analysis.valid);
        assert_eq!(analysis.errors.len(), 2);
        assert!(analysis.channel_map.is_none());
        assert!(analysis.only_errors_of(ProblemKind::NotFound));
    }

    #[test]
    fn unsupported_pair_is_invalid_argument() {
        let (surface, graph) = session();
        let a = surface.add_track("A", 8);
        let b = surface.add_track("B", 8);
        let analysis = RouteValidator::new(&graph).validate(a, b, 5);
        assert!(analysis.has_error(ProblemKind::InvalidArgument));
    }

    #[test]
    fn stereo_destination_lacks_capacity() {
        let (surface, graph) = session();
        let a = surface.add_track("A", 2);
        let b = surface.add_track("B", 2);
        let validator = RouteValidator::new(&graph);
        assert!(validator.analyze(a, b).only_errors_of(ProblemKind::ChannelCapacity));
        assert!(validator.validate(a, b, MAIN_PAIR).valid);
    }

    #[test]
    fn reverse_send_is_feedback_loop() {
        let (surface, graph) = session();
        let a = surface.add_track("A", 4);
        let b = surface.add_track("B", 4);
        graph.add_edge(b, a, &SendAttrs::default()).unwrap();
        let analysis = RouteValidator::new(&graph).analyze(a, b);
        assert!(!analysis.valid);
        assert!(analysis
            .error_messages()
            .iter()
            .any(|m| m.contains("feedback loop")));
    }

    #[test]
    fn existing_send_only_warns() {
        let (surface, graph) = session();
        let a = surface.add_track("A", 4);
        let b = surface.add_track("B", 4);
        surface.host_unit(b, "ReaComp", true).unwrap();
        graph.add_edge(a, b, &SendAttrs::default()).unwrap();
        let analysis = RouteValidator::new(&graph).analyze(a, b);
        assert!(analysis.valid);
        assert_eq!(analysis.warnings.len(), 1);
        assert!(analysis.warnings[0].contains("existing"));
    }

    #[test]
    fn high_latency_only_warns() {
        let (surface, graph) = session();
        let a = surface.add_track("A", 4);
        let b = surface.add_track("B", 4);
        surface.host_unit(b, "ReaComp", true).unwrap();
        surface.set_sample_rate_hz(1_000.0);
        // 3 samples at 1 kHz = 3 ms
        let analysis = RouteValidator::new(&graph)
            .with_high_latency_ms(1.0)
            .analyze(a, b);
        assert!(analysis.valid);
        assert!(analysis.warnings.iter().any(|w| w.contains("latency")));
        assert!((analysis.latency_ms - 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_sample_rate_uses_configured_fallback() {
        let (surface, graph) = session();
        let a = surface.add_track("A", 4);
        let b = surface.add_track("B", 4);
        surface.host_unit(b, "ReaComp", true).unwrap();
        surface.set_sample_rate_hz(0.0);
        // 3 samples at 1 kHz
        let analysis = RouteValidator::new(&graph)
            .with_fallback_sample_rate(1_000.0)
            .analyze(a, b);
        assert!((analysis.latency_ms - 3.0).abs() < 1e-9);
    }

    #[test]
    fn validate_edge_uses_send_pair() {
        let (surface, graph) = session();
        let a = surface.add_track("A", 2);
        let b = surface.add_track("B", 2);
        let id = graph
            .add_edge(a, b, &SendAttrs::default().with_dest_pair(SIDECHAIN_PAIR))
            .unwrap();
        let analysis = RouteValidator::new(&graph).validate_edge(a, id);
        assert!(analysis.has_error(ProblemKind::ChannelCapacity));
    }
}
