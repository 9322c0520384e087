//! Player configuration management
//!
//! Loaded from `--config <path>` or `<config dir>/oldtom/player.toml`.
//! Every section is optional; missing keys keep their defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use oldtom_audio::{AudioEngineConfig, CapabilityFlags};
use oldtom_narration::TimelineConfig;
use serde::{Deserialize, Serialize};

/// Simulated device reported to the engine's capability probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub cores: usize,
    pub memory_mb: u64,
    pub sample_rate: u32,
    pub spatial_audio: bool,
    pub realtime_analysis: bool,
    pub hardware_acceleration: bool,
    /// Battery level to report at startup (0.0 to 1.0)
    pub battery: Option<f32>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            cores: 4,
            memory_mb: 4_096,
            sample_rate: 44_100,
            spatial_audio: true,
            realtime_analysis: true,
            hardware_acceleration: false,
            battery: None,
        }
    }
}

impl DeviceConfig {
    pub fn flags(&self) -> CapabilityFlags {
        CapabilityFlags {
            spatial_audio: self.spatial_audio,
            realtime_analysis: self.realtime_analysis,
            hardware_acceleration: self.hardware_acceleration,
        }
    }
}

/// Player configuration stored in a config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Simulated frames per second
    pub fps: f32,
    /// Print one time-update out of this many frames
    pub time_update_every: u32,
    /// Stop after this much simulated time even if content remains
    pub max_seconds: f64,
    /// Content file (JSON or TOML); the bundled chapter when unset
    pub content: Option<PathBuf>,
    pub device: DeviceConfig,
    pub audio: AudioEngineConfig,
    pub timeline: TimelineConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            fps: 60.0,
            time_update_every: 30,
            max_seconds: 600.0,
            content: None,
            device: DeviceConfig::default(),
            audio: AudioEngineConfig::default(),
            timeline: TimelineConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("oldtom").join("player.toml"))
    }

    /// Load from `path`, or from the default location
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        anyhow::ensure!(config.fps > 0.0, "fps must be positive");
        Ok(config)
    }

    /// Seconds per simulated frame
    pub fn frame_time(&self) -> f32 {
        1.0 / self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();
        assert_eq!(config.fps, 60.0);
        assert!(config.content.is_none());
        assert_eq!(config.timeline.tail_padding, 2.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PlayerConfig::parse(
            r#"
            fps = 24.0

            [device]
            cores = 2
            battery = 0.15

            [timeline]
            tail_padding = 1.0
            "#,
        )
        .unwrap();
        assert_eq!(config.fps, 24.0);
        assert_eq!(config.device.cores, 2);
        assert_eq!(config.device.memory_mb, 4_096);
        assert_eq!(config.device.battery, Some(0.15));
        assert_eq!(config.timeline.tail_padding, 1.0);
        assert_eq!(config.timeline.prompt_fraction, 0.8);
        assert_eq!(config.audio, AudioEngineConfig::default());
    }

    #[test]
    fn test_rejects_zero_fps() {
        assert!(PlayerConfig::parse("fps = 0.0").is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(PlayerConfig::load(Some(Path::new("/nonexistent/oldtom/player.toml"))).is_err());
    }
}
