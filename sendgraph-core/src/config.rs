use std::path::{Path, PathBuf};
use std::time::Duration;

use sendgraph_types::SaturationType;
use serde::Deserialize;

use crate::analyzer::FALLBACK_SAMPLE_RATE;
use crate::surface::OscSurface;
use crate::validator::DEFAULT_HIGH_LATENCY_MS;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");
const DEFAULT_SURFACE_ADDRESS: &str = "127.0.0.1:9050";

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    analysis: AnalysisConfig,
    #[serde(default)]
    bus: BusConfig,
    #[serde(default)]
    saturation: SaturationConfig,
    #[serde(default)]
    surface: SurfaceConfig,
}

#[derive(Deserialize, Default)]
struct AnalysisConfig {
    fallback_sample_rate: Option<f64>,
    high_latency_ms: Option<f64>,
}

#[derive(Deserialize, Default)]
struct BusConfig {
    rollback_on_failure: Option<bool>,
    expand_sidechain_channels: Option<bool>,
    compressor_plugin: Option<String>,
}

#[derive(Deserialize, Default)]
struct SaturationConfig {
    tape: Option<String>,
    tube: Option<String>,
    transistor: Option<String>,
    digital: Option<String>,
    generic: Option<String>,
}

#[derive(Deserialize, Default)]
struct SurfaceConfig {
    address: Option<String>,
    reply_timeout_ms: Option<u64>,
}

/// Plugin names used by the saturation bus recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct SaturationPlugins {
    pub tape: String,
    pub tube: String,
    pub transistor: String,
    pub digital: String,
    pub generic: String,
}

impl SaturationPlugins {
    pub fn plugin(&self, ty: SaturationType) -> &str {
        match ty {
            SaturationType::Tape => &self.tape,
            SaturationType::Tube => &self.tube,
            SaturationType::Transistor => &self.transistor,
            SaturationType::Digital => &self.digital,
            SaturationType::Generic => &self.generic,
        }
    }

    /// Plugin tried when the type's own plugin cannot be added.
    pub fn fallback(&self) -> &str {
        &self.generic
    }
}

impl Default for SaturationPlugins {
    fn default() -> Self {
        Self {
            tape: "ReaTape".into(),
            tube: "ReaTube".into(),
            transistor: "ReaSaturate".into(),
            digital: "ReaBitcrush".into(),
            generic: "ReaSaturate".into(),
        }
    }
}

/// Settings the validator and provisioner run with.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingConfig {
    pub fallback_sample_rate: f64,
    pub high_latency_ms: f64,
    pub rollback_on_failure: bool,
    pub expand_sidechain_channels: bool,
    pub compressor_plugin: String,
    pub saturation: SaturationPlugins,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            fallback_sample_rate: FALLBACK_SAMPLE_RATE,
            high_latency_ms: DEFAULT_HIGH_LATENCY_MS,
            rollback_on_failure: false,
            expand_sidechain_channels: true,
            compressor_plugin: "ReaComp".into(),
            saturation: SaturationPlugins::default(),
        }
    }
}

pub struct Config {
    analysis: AnalysisConfig,
    bus: BusConfig,
    saturation: SaturationConfig,
    surface: SurfaceConfig,
}

impl Config {
    /// Embedded defaults overlaid with the user's config file, if any.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::from_file(embedded()),
        }
    }

    /// Embedded defaults overlaid with the file at `path`. A missing,
    /// unreadable or malformed file leaves the defaults untouched.
    pub fn load_from(path: &Path) -> Self {
        let mut base = embedded();
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                    Ok(user) => merge(&mut base, user),
                    Err(e) => {
                        log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                    }
                },
                Err(e) => {
                    log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                }
            }
        }
        Self::from_file(base)
    }

    /// Embedded defaults overlaid with `contents`.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let mut base = embedded();
        merge(&mut base, toml::from_str(contents)?);
        Ok(Self::from_file(base))
    }

    fn from_file(file: ConfigFile) -> Self {
        Config {
            analysis: file.analysis,
            bus: file.bus,
            saturation: file.saturation,
            surface: file.surface,
        }
    }

    pub fn routing(&self) -> RoutingConfig {
        let fallback = RoutingConfig::default();
        let plugins = SaturationPlugins::default();
        let pick = |value: &Option<String>, default: String| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or(default)
        };
        RoutingConfig {
            fallback_sample_rate: self
                .analysis
                .fallback_sample_rate
                .filter(|r| *r > 0.0)
                .unwrap_or(fallback.fallback_sample_rate),
            high_latency_ms: self
                .analysis
                .high_latency_ms
                .filter(|ms| *ms >= 0.0)
                .unwrap_or(fallback.high_latency_ms),
            rollback_on_failure: self
                .bus
                .rollback_on_failure
                .unwrap_or(fallback.rollback_on_failure),
            expand_sidechain_channels: self
                .bus
                .expand_sidechain_channels
                .unwrap_or(fallback.expand_sidechain_channels),
            compressor_plugin: pick(&self.bus.compressor_plugin, fallback.compressor_plugin),
            saturation: SaturationPlugins {
                tape: pick(&self.saturation.tape, plugins.tape),
                tube: pick(&self.saturation.tube, plugins.tube),
                transistor: pick(&self.saturation.transistor, plugins.transistor),
                digital: pick(&self.saturation.digital, plugins.digital),
                generic: pick(&self.saturation.generic, plugins.generic),
            },
        }
    }

    pub fn surface_address(&self) -> &str {
        self.surface
            .address
            .as_deref()
            .unwrap_or(DEFAULT_SURFACE_ADDRESS)
    }

    /// `None` means wait for the bridge indefinitely.
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.surface
            .reply_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Open an OSC surface at the configured bridge address.
    pub fn osc_surface(&self) -> std::io::Result<OscSurface> {
        OscSurface::connect(self.surface_address(), self.reply_timeout())
    }
}

fn embedded() -> ConfigFile {
    toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml")
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sendgraph").join("config.toml"))
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    merge_analysis(&mut base.analysis, user.analysis);
    merge_bus(&mut base.bus, user.bus);
    merge_saturation(&mut base.saturation, user.saturation);
    merge_surface(&mut base.surface, user.surface);
}

fn merge_analysis(base: &mut AnalysisConfig, user: AnalysisConfig) {
    if user.fallback_sample_rate.is_some() {
        base.fallback_sample_rate = user.fallback_sample_rate;
    }
    if user.high_latency_ms.is_some() {
        base.high_latency_ms = user.high_latency_ms;
    }
}

fn merge_bus(base: &mut BusConfig, user: BusConfig) {
    if user.rollback_on_failure.is_some() {
        base.rollback_on_failure = user.rollback_on_failure;
    }
    if user.expand_sidechain_channels.is_some() {
        base.expand_sidechain_channels = user.expand_sidechain_channels;
    }
    if user.compressor_plugin.is_some() {
        base.compressor_plugin = user.compressor_plugin;
    }
}

fn merge_saturation(base: &mut SaturationConfig, user: SaturationConfig) {
    if user.tape.is_some() {
        base.tape = user.tape;
    }
    if user.tube.is_some() {
        base.tube = user.tube;
    }
    if user.transistor.is_some() {
        base.transistor = user.transistor;
    }
    if user.digital.is_some() {
        base.digital = user.digital;
    }
    if user.generic.is_some() {
        base.generic = user.generic;
    }
}

fn merge_surface(base: &mut SurfaceConfig, user: SurfaceConfig) {
    if user.address.is_some() {
        base.address = user.address;
    }
    if user.reply_timeout_ms.is_some() {
        base.reply_timeout_ms = user.reply_timeout_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_embedded_defaults() {
        let config = Config::from_toml_str("").unwrap();
        let routing = config.routing();
        assert_eq!(routing, RoutingConfig::default());
        assert_eq!(config.surface_address(), "127.0.0.1:9050");
        assert_eq!(config.reply_timeout(), None);
    }

    #[test]
    fn test_user_overrides_single_keys() {
        let config = Config::from_toml_str(
            r#"
            [bus]
            rollback_on_failure = true

            [saturation]
            tape = "Tape Machine"

            [surface]
            reply_timeout_ms = 250
            "#,
        )
        .unwrap();
        let routing = config.routing();
        assert!(routing.rollback_on_failure);
        assert!(routing.expand_sidechain_channels);
        assert_eq!(routing.saturation.plugin(SaturationType::Tape), "Tape Machine");
        assert_eq!(routing.saturation.plugin(SaturationType::Tube), "ReaTube");
        assert_eq!(config.reply_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = Config::from_toml_str(
            r#"
            [analysis]
            fallback_sample_rate = -1.0

            [bus]
            compressor_plugin = "   "
            "#,
        )
        .unwrap();
        let routing = config.routing();
        assert_eq!(routing.fallback_sample_rate, FALLBACK_SAMPLE_RATE);
        assert_eq!(routing.compressor_plugin, "ReaComp");
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(Config::from_toml_str("[bus\nrollback_on_failure = ").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[analysis]\nhigh_latency_ms = 4.5").unwrap();
        let config = Config::load_from(file.path());
        assert_eq!(config.routing().high_latency_ms, 4.5);
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is = = not toml").unwrap();
        let config = Config::load_from(file.path());
        assert_eq!(config.routing(), RoutingConfig::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml"));
        assert_eq!(config.surface_address(), "127.0.0.1:9050");
    }

    #[test]
    fn test_generic_is_fallback() {
        let plugins = SaturationPlugins::default();
        assert_eq!(plugins.fallback(), "ReaSaturate");
        assert_eq!(plugins.plugin(SaturationType::Digital), "ReaBitcrush");
    }
}
