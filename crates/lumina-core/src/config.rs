//! Deployment configuration, loaded from TOML.
//!
//! Every field has a default so an empty file (or no file) is a valid
//! configuration. Tuning constants live here rather than in the engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "LUMINA_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub render: RenderConfig,
    pub detector: DetectorConfig,
    pub clock: ClockConfig,
    pub status: StatusConfig,
    pub devices: DeviceConfig,
    /// Playlist JSON file handed over by the preparation pipeline.
    pub playlist: Option<PathBuf>,
}

/// Energy-to-command mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Render loop rate.
    pub tick_hz: u32,
    /// Linear gain applied to envelope energy before compression.
    pub gain: f32,
    /// Perceptual compression exponent.
    pub gamma: f32,
    /// Highest VU level the hardware accepts.
    pub hardware_max: u16,
    /// Units kept free below `hardware_max`.
    pub headroom: u16,
    /// Number of hues the contour rotates through on peaks.
    pub hue_count: usize,
    /// Hue distance between consecutive rotation entries.
    pub hue_spread: u8,
    /// Contour commands are re-sent at least this often while unchanged.
    pub contour_resend_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tick_hz: 60,
            gain: 1.3,
            gamma: 0.75,
            hardware_max: 50,
            headroom: 2,
            hue_count: 3,
            hue_spread: 40,
            contour_resend_ms: 140,
        }
    }
}

impl RenderConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_hz.max(1)
    }

    /// Top of the usable meter range.
    pub const fn visual_max(&self) -> u16 {
        self.hardware_max.saturating_sub(self.headroom)
    }
}

/// Adaptive peak detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// EMA smoothing factor.
    pub alpha: f32,
    /// Per-tick upward creep of the noise floor.
    pub floor_increment: f32,
    /// Noise floor cap as a fraction of the EMA.
    pub floor_ratio: f32,
    /// Lowest threshold a peak must exceed.
    pub min_threshold: f32,
    /// Distance above the EMA a peak must reach.
    pub margin: f32,
    /// Minimum spacing between peaks.
    pub cooldown_ms: u64,
    /// Below this energy the contour is switched off.
    pub low_energy_floor: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.08,
            floor_increment: 0.0005,
            floor_ratio: 0.85,
            min_threshold: 0.35,
            margin: 0.12,
            cooldown_ms: 120,
            low_energy_floor: 0.05,
        }
    }
}

/// Source of elapsed playback time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ClockMode {
    /// The executor owns a monotonic timer.
    #[default]
    Internal,
    /// Elapsed time comes from sync messages sent by the audio player.
    ClockMaster,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClockConfig {
    pub mode: ClockMode,
    /// Clock-master silence after which the step counts as stalled.
    pub stall_timeout_ms: u64,
    /// Move to the next step when the current one ends.
    pub auto_advance: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            mode: ClockMode::Internal,
            stall_timeout_ms: 2000,
            auto_advance: false,
        }
    }
}

impl ClockConfig {
    pub const fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StatusConfig {
    /// Rate of `elapsedMs` updates while playing.
    pub elapsed_hz: u32,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { elapsed_hz: 4 }
    }
}

impl StatusConfig {
    pub fn elapsed_interval_ms(&self) -> u64 {
        1000 / u64::from(self.elapsed_hz.max(1))
    }
}

/// A known actuator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActuatorConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// `host:port` the actuator listens on.
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Local address the UDP socket binds to.
    pub bind: String,
    /// Upper bound for a single send.
    pub send_timeout_ms: u64,
    /// Consecutive failures before an actuator is reported offline.
    pub offline_after: u32,
    pub actuators: Vec<ActuatorConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:0".to_string(),
            send_timeout_ms: 20,
            offline_after: 3,
            actuators: Vec::new(),
        }
    }
}

impl DeviceConfig {
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_toml(&text)?;

        // Relative playlist paths are resolved against the config file
        if let (Some(playlist), Some(dir)) = (&config.playlist, path.parent()) {
            if playlist.is_relative() {
                config.playlist = Some(dir.join(playlist));
            }
        }

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Default config file location for this user.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lumina").map(|d| d.config_dir().join("config.toml"))
    }

    /// Resolve the config to use: an explicit path must exist, then
    /// `LUMINA_CONFIG`, then the per-user default file if present, else
    /// built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(PathBuf::from(path));
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let r = &self.render;
        if !(30..=60).contains(&r.tick_hz) {
            return Err(Error::Config(format!(
                "render.tick_hz must be within 30..=60, got {}",
                r.tick_hz
            )));
        }
        if !(r.gain.is_finite() && r.gain > 0.0) {
            return Err(Error::Config(format!("render.gain must be positive, got {}", r.gain)));
        }
        if !(r.gamma.is_finite() && r.gamma > 0.0) {
            return Err(Error::Config(format!("render.gamma must be positive, got {}", r.gamma)));
        }
        if r.headroom >= r.hardware_max {
            return Err(Error::Config(format!(
                "render.headroom ({}) must be below render.hardware_max ({})",
                r.headroom, r.hardware_max
            )));
        }
        if r.hue_count == 0 {
            return Err(Error::Config("render.hue_count must be at least 1".into()));
        }

        let d = &self.detector;
        if !(d.alpha > 0.0 && d.alpha <= 1.0) {
            return Err(Error::Config(format!(
                "detector.alpha must be within (0, 1], got {}",
                d.alpha
            )));
        }
        if d.cooldown_ms == 0 {
            return Err(Error::Config("detector.cooldown_ms must be positive".into()));
        }
        if !(0.0..1.0).contains(&d.floor_ratio) {
            return Err(Error::Config(format!(
                "detector.floor_ratio must be within [0, 1), got {}",
                d.floor_ratio
            )));
        }

        if self.status.elapsed_hz == 0 {
            return Err(Error::Config("status.elapsed_hz must be positive".into()));
        }
        if self.devices.send_timeout_ms == 0 {
            return Err(Error::Config("devices.send_timeout_ms must be positive".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.render.visual_max(), 48);
        assert_eq!(config.render.tick_interval(), Duration::from_micros(16_666));
        assert_eq!(config.status.elapsed_interval_ms(), 250);
    }

    #[test]
    fn test_partial_document() {
        let config = Config::from_toml(
            r#"
            playlist = "show.json"

            [render]
            gain = 1.25
            gamma = 0.85

            [clock]
            mode = "clock-master"

            [[devices.actuators]]
            id = "right"
            addr = "192.168.0.41:7777"
            "#,
        )
        .unwrap();

        assert!((config.render.gain - 1.25).abs() < f32::EPSILON);
        assert_eq!(config.render.tick_hz, 60);
        assert_eq!(config.clock.mode, ClockMode::ClockMaster);
        assert_eq!(config.devices.actuators.len(), 1);
        assert_eq!(config.devices.actuators[0].id, "right");
        assert_eq!(config.playlist, Some(PathBuf::from("show.json")));
    }

    #[test]
    fn test_validation_rejects_bad_tuning() {
        assert!(Config::from_toml("[render]\ntick_hz = 120").is_err());
        assert!(Config::from_toml("[render]\ngamma = 0.0").is_err());
        assert!(Config::from_toml("[render]\nhardware_max = 2\nheadroom = 2").is_err());
        assert!(Config::from_toml("[detector]\ncooldown_ms = 0").is_err());
        assert!(Config::from_toml("[clock]\nmode = \"sundial\"").is_err());
    }

    #[test]
    fn test_load_resolves_relative_playlist() {
        let dir = std::env::temp_dir().join(format!("lumina-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "playlist = \"show.json\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.playlist, Some(dir.join("show.json")));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
