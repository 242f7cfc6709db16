//! Send/receive edge model.
//!
//! Channel mapping uses two separate fields, each holding the 0-based index of
//! the first channel of a stereo pair. Caller-facing APIs speak in 1-based
//! pair starts (`1` for channels 1/2, `3` for channels 3/4); use
//! [`pair_to_offset`] / [`offset_to_pair`] to move between the two.

use serde::{Deserialize, Serialize};

use crate::{NodeHandle, SendId};

/// 1-based start of the main stereo pair (channels 1/2).
pub const MAIN_PAIR: u32 = 1;
/// 1-based start of the sidechain stereo pair (channels 3/4).
pub const SIDECHAIN_PAIR: u32 = 3;

/// Convert decibels to linear gain.
pub fn db_to_gain(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Convert linear gain to decibels. Zero or negative gain is `-inf`.
pub fn gain_to_db(gain: f64) -> f64 {
    if gain <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

/// 1-based pair start → 0-based channel offset. `0` saturates to offset 0.
pub fn pair_to_offset(pair: u32) -> u32 {
    pair.saturating_sub(1)
}

pub fn offset_to_pair(offset: u32) -> u32 {
    offset + 1
}

/// Where in the source node's chain the send taps the signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaderStage {
    PreFader,
    #[default]
    PostFader,
}

impl FaderStage {
    pub fn from_pre_fader(pre_fader: bool) -> Self {
        if pre_fader {
            FaderStage::PreFader
        } else {
            FaderStage::PostFader
        }
    }

    pub fn is_pre_fader(self) -> bool {
        self == FaderStage::PreFader
    }

    /// Numeric send-mode code used on the control surface.
    pub fn to_raw(self) -> f64 {
        match self {
            FaderStage::PreFader => 0.0,
            FaderStage::PostFader => 1.0,
        }
    }

    pub fn from_raw(raw: f64) -> Self {
        if raw.round() as i64 == 0 {
            FaderStage::PreFader
        } else {
            FaderStage::PostFader
        }
    }
}

/// Per-send attribute keys understood by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendParam {
    Volume,
    Pan,
    Mute,
    PhaseInvert,
    SrcChannel,
    DstChannel,
    Stage,
}

impl SendParam {
    pub const ALL: [SendParam; 7] = [
        SendParam::Volume,
        SendParam::Pan,
        SendParam::Mute,
        SendParam::PhaseInvert,
        SendParam::SrcChannel,
        SendParam::DstChannel,
        SendParam::Stage,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SendParam::Volume => "volume",
            SendParam::Pan => "pan",
            SendParam::Mute => "mute",
            SendParam::PhaseInvert => "phase",
            SendParam::SrcChannel => "src_channel",
            SendParam::DstChannel => "dst_channel",
            SendParam::Stage => "stage",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }
}

/// Attributes of a send. Every field has a default, so a surface that cannot
/// report an attribute still yields a complete value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendAttrs {
    /// Linear gain; 1.0 is unity.
    pub volume: f64,
    /// -1.0 (left) ..= 1.0 (right)
    pub pan: f64,
    pub mute: bool,
    pub phase_invert: bool,
    pub src_channel: u32,
    pub dst_channel: u32,
    pub stage: FaderStage,
}

impl Default for SendAttrs {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            mute: false,
            phase_invert: false,
            src_channel: 0,
            dst_channel: 0,
            stage: FaderStage::PostFader,
        }
    }
}

impl SendAttrs {
    pub fn with_level_db(mut self, db: f64) -> Self {
        self.volume = db_to_gain(db);
        self
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.volume = gain.max(0.0);
        self
    }

    pub fn with_pan(mut self, pan: f64) -> Self {
        self.pan = pan.clamp(-1.0, 1.0);
        self
    }

    pub fn with_stage(mut self, stage: FaderStage) -> Self {
        self.stage = stage;
        self
    }

    /// Route into the 1-based destination pair (`1` or `3`).
    pub fn with_dest_pair(mut self, pair: u32) -> Self {
        self.dst_channel = pair_to_offset(pair);
        self
    }

    pub fn level_db(&self) -> f64 {
        gain_to_db(self.volume)
    }

    /// Surface-level value for one attribute.
    pub fn raw(&self, param: SendParam) -> f64 {
        match param {
            SendParam::Volume => self.volume,
            SendParam::Pan => self.pan,
            SendParam::Mute => bool_raw(self.mute),
            SendParam::PhaseInvert => bool_raw(self.phase_invert),
            SendParam::SrcChannel => self.src_channel as f64,
            SendParam::DstChannel => self.dst_channel as f64,
            SendParam::Stage => self.stage.to_raw(),
        }
    }

    /// Apply a surface-level value to one attribute.
    pub fn apply_raw(&mut self, param: SendParam, value: f64) {
        match param {
            SendParam::Volume => self.volume = value,
            SendParam::Pan => self.pan = value,
            SendParam::Mute => self.mute = value != 0.0,
            SendParam::PhaseInvert => self.phase_invert = value != 0.0,
            SendParam::SrcChannel => self.src_channel = value.max(0.0) as u32,
            SendParam::DstChannel => self.dst_channel = value.max(0.0) as u32,
            SendParam::Stage => self.stage = FaderStage::from_raw(value),
        }
    }
}

fn bool_raw(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// A single typed attribute change for an existing send.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SendField {
    VolumeDb(f64),
    Gain(f64),
    Pan(f64),
    Mute(bool),
    PhaseInvert(bool),
    SrcChannel(u32),
    DstChannel(u32),
    Stage(FaderStage),
}

impl SendField {
    pub fn param(self) -> SendParam {
        match self {
            SendField::VolumeDb(_) | SendField::Gain(_) => SendParam::Volume,
            SendField::Pan(_) => SendParam::Pan,
            SendField::Mute(_) => SendParam::Mute,
            SendField::PhaseInvert(_) => SendParam::PhaseInvert,
            SendField::SrcChannel(_) => SendParam::SrcChannel,
            SendField::DstChannel(_) => SendParam::DstChannel,
            SendField::Stage(_) => SendParam::Stage,
        }
    }

    pub fn raw_value(self) -> f64 {
        match self {
            SendField::VolumeDb(db) => db_to_gain(db),
            SendField::Gain(g) => g.max(0.0),
            SendField::Pan(p) => p.clamp(-1.0, 1.0),
            SendField::Mute(b) | SendField::PhaseInvert(b) => bool_raw(b),
            SendField::SrcChannel(c) | SendField::DstChannel(c) => c as f64,
            SendField::Stage(s) => s.to_raw(),
        }
    }
}

/// A directed, attributed edge as read from the source node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendEdge {
    pub id: SendId,
    pub source: NodeHandle,
    pub destination: NodeHandle,
    pub attrs: SendAttrs,
}

impl SendEdge {
    pub fn volume_db(&self) -> f64 {
        self.attrs.level_db()
    }

    /// True when the send lands on the sidechain pair (3/4) or higher.
    pub fn targets_sidechain(&self) -> bool {
        self.attrs.dst_channel >= pair_to_offset(SIDECHAIN_PAIR)
    }
}

/// Incoming view of a send, derived by scanning every node's outgoing edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveEdge {
    pub source: NodeHandle,
    /// Index of the send on `source`.
    pub send_id: SendId,
    pub destination: NodeHandle,
    pub attrs: SendAttrs,
}

impl From<SendEdge> for ReceiveEdge {
    fn from(edge: SendEdge) -> Self {
        Self {
            source: edge.source,
            send_id: edge.id,
            destination: edge.destination,
            attrs: edge.attrs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_gain_conversion() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_gain(-6.0) - 0.501_187).abs() < 1e-5);
        assert!((gain_to_db(db_to_gain(-12.5)) + 12.5).abs() < 1e-9);
        assert_eq!(gain_to_db(0.0), f64::NEG_INFINITY);
    }

    #[test]
    fn sidechain_pair_maps_to_offset_two() {
        assert_eq!(pair_to_offset(SIDECHAIN_PAIR), 2);
        assert_eq!(pair_to_offset(MAIN_PAIR), 0);
        assert_eq!(offset_to_pair(2), 3);
        let attrs = SendAttrs::default().with_dest_pair(SIDECHAIN_PAIR);
        assert_eq!(attrs.dst_channel, 2);
        assert_eq!(attrs.src_channel, 0);
    }

    #[test]
    fn fader_stage_raw_codes() {
        assert_eq!(FaderStage::PreFader.to_raw(), 0.0);
        assert_eq!(FaderStage::from_raw(1.0), FaderStage::PostFader);
        assert_eq!(FaderStage::from_raw(0.0), FaderStage::PreFader);
        assert!(FaderStage::from_pre_fader(true).is_pre_fader());
    }

    #[test]
    fn raw_apply_covers_every_param() {
        let source = SendAttrs {
            volume: 0.25,
            pan: -0.5,
            mute: true,
            phase_invert: true,
            src_channel: 2,
            dst_channel: 4,
            stage: FaderStage::PreFader,
        };
        let mut copy = SendAttrs::default();
        for param in SendParam::ALL {
            copy.apply_raw(param, source.raw(param));
        }
        assert_eq!(copy, source);
    }

    #[test]
    fn param_keys_are_unique() {
        for param in SendParam::ALL {
            assert_eq!(SendParam::from_key(param.key()), Some(param));
        }
        assert_eq!(SendParam::from_key("bogus"), None);
    }

    #[test]
    fn field_raw_values_clamp() {
        assert_eq!(SendField::Pan(3.0).raw_value(), 1.0);
        assert_eq!(SendField::Gain(-1.0).raw_value(), 0.0);
        assert_eq!(SendField::Mute(true).param(), SendParam::Mute);
        assert_eq!(SendField::VolumeDb(0.0).raw_value(), 1.0);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let attrs: SendAttrs = serde_json::from_str(r#"{"pan": 0.5}"#).unwrap();
        assert_eq!(attrs.pan, 0.5);
        assert_eq!(attrs.volume, 1.0);
        assert_eq!(attrs.stage, FaderStage::PostFader);
    }
}
