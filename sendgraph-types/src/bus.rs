use serde::{Deserialize, Serialize};

use crate::{NodeHandle, ReceiveEdge, SendEdge, SendId, UnitIndex};

/// Character of a saturation bus. Unknown names parse to `Generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaturationType {
    Tape,
    Tube,
    Transistor,
    Digital,
    Generic,
}

impl SaturationType {
    pub const ALL: [SaturationType; 5] = [
        SaturationType::Tape,
        SaturationType::Tube,
        SaturationType::Transistor,
        SaturationType::Digital,
        SaturationType::Generic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SaturationType::Tape => "tape",
            SaturationType::Tube => "tube",
            SaturationType::Transistor => "transistor",
            SaturationType::Digital => "digital",
            SaturationType::Generic => "generic",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "tape" => SaturationType::Tape,
            "tube" => SaturationType::Tube,
            "transistor" => SaturationType::Transistor,
            "digital" => SaturationType::Digital,
            _ => SaturationType::Generic,
        }
    }

    /// Normalized value for the unit's primary drive parameter.
    pub fn drive(self) -> f64 {
        match self {
            SaturationType::Tape => 0.6,
            SaturationType::Tube => 0.5,
            SaturationType::Transistor => 0.7,
            SaturationType::Digital | SaturationType::Generic => 0.4,
        }
    }
}

impl std::fmt::Display for SaturationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SidechainMode {
    /// Only create the send.
    #[default]
    SendOnly,
    /// Also attach a compressor to the destination if it has no sidechain-capable unit.
    WithCompressor,
}

/// Result of a sidechain send recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidechainSend {
    pub send_id: SendId,
    pub source: NodeHandle,
    pub destination: NodeHandle,
    /// 1-based destination pair start: 3 for channels 3/4, 1 for 1/2.
    pub sidechain_channels: u32,
    pub level_db: f64,
    pub pre_fader: bool,
    pub compressor_unit: Option<UnitIndex>,
    pub route_valid: bool,
    pub latency_ms: f64,
}

/// Result of a parallel bus recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelBus {
    pub bus: NodeHandle,
    pub source: NodeHandle,
    pub name: String,
    pub return_to: NodeHandle,
    pub feed_send: SendId,
    pub return_send: SendId,
    pub mix_db: f64,
    pub latency_compensation: bool,
    /// Samples the bus path lags the dry path by; 0 when compensation is off.
    pub compensation_samples: f64,
}

/// Result of a saturation bus recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaturationBus {
    pub bus: NodeHandle,
    pub source: NodeHandle,
    pub name: String,
    pub return_to: NodeHandle,
    pub saturation_type: SaturationType,
    /// Plugin actually attached, after any fallback.
    pub plugin: Option<String>,
    pub saturation_unit: Option<UnitIndex>,
    pub drive: Option<f64>,
    pub feed_send: SendId,
    pub return_send: SendId,
    pub mix_percent: f64,
    pub return_gain: f64,
}

/// Sends and receives of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSummary {
    pub node: NodeHandle,
    pub name: String,
    pub sends: Vec<SendEdge>,
    pub receives: Vec<ReceiveEdge>,
    pub send_count: usize,
    pub receive_count: usize,
}
