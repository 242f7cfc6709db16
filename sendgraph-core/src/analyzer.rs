//! Channel and latency analysis.
//!
//! Everything here is a pure function of the node snapshots passed in. The
//! latency figures are estimates from unit names, not measurements: a
//! session's real plugin delay is not observable through the control surface.

use sendgraph_types::{ChannelMap, NodeInfo, UnitIndex};

/// Fixed cost of one hop through the routing matrix, in samples.
pub const ROUTING_OVERHEAD_SAMPLES: f64 = 2.0;

/// Sample rate assumed when the session does not report a usable one.
pub const FALLBACK_SAMPLE_RATE: f64 = 48_000.0;

/// Minimum destination channel count for a 3/4 sidechain input.
pub const SIDECHAIN_MIN_CHANNELS: u32 = 4;

/// Name fragments of units that accept a sidechain or key input.
pub const SIDECHAIN_KEYWORDS: &[&str] = &[
    "comp",
    "gate",
    "ducker",
    "sidechain",
    "sc_",
    "trigger",
    "envelope",
    "limit",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyClass {
    /// Compressors, limiters and other detectors.
    Dynamics,
    Filter,
    /// Reverbs and delays.
    TimeBased,
    Saturation,
    Unknown,
}

impl LatencyClass {
    pub fn samples(self) -> f64 {
        match self {
            LatencyClass::Dynamics => 1.0,
            LatencyClass::Filter => 2.0,
            LatencyClass::TimeBased => 10.0,
            LatencyClass::Saturation => 3.0,
            LatencyClass::Unknown => 1.0,
        }
    }
}

/// Classify a unit by its plugin name. First match wins.
pub fn unit_latency_class(name: &str) -> LatencyClass {
    let name = name.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| name.contains(n));
    if has(&["comp", "limit"]) {
        LatencyClass::Dynamics
    } else if has(&["reverb", "delay"]) {
        LatencyClass::TimeBased
    } else if has(&["eq", "filter"]) {
        LatencyClass::Filter
    } else if has(&["saturat", "distort"]) {
        LatencyClass::Saturation
    } else {
        LatencyClass::Unknown
    }
}

pub fn unit_latency_samples(name: &str) -> f64 {
    unit_latency_class(name).samples()
}

/// Sum of the estimated latency of the node's enabled units, in samples.
/// Upstream sends are not followed.
pub fn estimate_node_latency(node: &NodeInfo) -> f64 {
    node.enabled_units()
        .map(|u| unit_latency_samples(&u.name))
        .sum()
}

pub fn samples_to_ms(samples: f64, sample_rate: f64) -> f64 {
    let rate = if sample_rate > 0.0 {
        sample_rate
    } else {
        FALLBACK_SAMPLE_RATE
    };
    samples / rate * 1000.0
}

/// Estimated source → destination latency in milliseconds.
pub fn estimate_route_latency(source: &NodeInfo, destination: &NodeInfo, sample_rate: f64) -> f64 {
    let samples =
        estimate_node_latency(source) + estimate_node_latency(destination) + ROUTING_OVERHEAD_SAMPLES;
    samples_to_ms(samples, sample_rate)
}

/// Samples by which the bus path lags the dry path. Never negative.
pub fn bus_compensation_samples(source: &NodeInfo, bus: &NodeInfo) -> f64 {
    (estimate_node_latency(bus) + ROUTING_OVERHEAD_SAMPLES - estimate_node_latency(source)).max(0.0)
}

pub fn channel_map(source: &NodeInfo, destination: &NodeInfo) -> ChannelMap {
    ChannelMap {
        source_channels: source.channel_count,
        dest_channels: destination.channel_count,
        input_l: 1,
        input_r: 2,
        sidechain_l: 3,
        sidechain_r: 4,
        sidechain_available: destination.channel_count >= SIDECHAIN_MIN_CHANNELS,
    }
}

/// Channels a destination needs to accept a send into the 1-based pair `pair`.
pub fn channels_required(pair: u32) -> u32 {
    pair + 1
}

pub fn is_sidechain_capable(unit_name: &str) -> bool {
    let name = unit_name.to_lowercase();
    SIDECHAIN_KEYWORDS.iter().any(|k| name.contains(k))
}

/// Units on `node` that can take a sidechain input.
pub fn sidechain_capable_units(node: &NodeInfo) -> Vec<UnitIndex> {
    node.units
        .iter()
        .filter(|u| is_sidechain_capable(&u.name))
        .map(|u| u.index)
        .collect()
}
