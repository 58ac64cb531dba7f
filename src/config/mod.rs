// Configuration management for MixFlip
// Handles loading/saving settings, with sensible defaults when config is missing

pub mod player;

pub use player::{PlayerColors, PlayerSettings};

use crate::audio::crossfade::CrossfadeSettings;
use anyhow::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub gestures: GestureConfig,
    pub ui: UiConfig,
    pub analytics: AnalyticsConfig,
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub crossfade_ms: u64,
    pub crossfade_steps: u32,
    pub unlock_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub drag_threshold_px: f64,
    pub debounce_ms: u64,
    pub touch_click_suppress_ms: u64,
    /// How many virtual pixels one terminal column stands for
    pub cell_width_px: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub frame_interval_ms: u64,
    pub theme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub enabled: bool,
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub manifest_path: Option<PathBuf>,
}

fn app_dir() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mixflip")
}

impl Default for AudioConfig {
    fn default() -> Self {
        let crossfade = CrossfadeSettings::default();
        Self {
            crossfade_ms: crossfade.duration.as_millis() as u64,
            crossfade_steps: crossfade.steps,
            unlock_ms: 30,
        }
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            drag_threshold_px: 15.0,
            debounce_ms: 300,
            touch_click_suppress_ms: 100,
            cell_width_px: 8.0,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            theme: "default".to_string(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: app_dir().join("plays.db"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            gestures: GestureConfig::default(),
            ui: UiConfig::default(),
            analytics: AnalyticsConfig::default(),
            library: LibraryConfig::default(),
        }
    }
}

impl AudioConfig {
    pub fn crossfade(&self) -> CrossfadeSettings {
        CrossfadeSettings {
            duration: Duration::from_millis(self.crossfade_ms),
            steps: self.crossfade_steps.max(1),
        }
    }

    pub fn unlock_duration(&self) -> Duration {
        Duration::from_millis(self.unlock_ms)
    }
}

impl UiConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Read `path`, writing the defaults there first if it does not exist yet
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content)?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("mixflip");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.audio.crossfade_ms, 100);
        assert_eq!(config.audio.crossfade_steps, 10);
        assert_eq!(config.gestures.drag_threshold_px, 15.0);
        assert_eq!(config.gestures.debounce_ms, 300);
        assert_eq!(config.ui.frame_interval(), Duration::from_millis(16));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[audio]\ncrossfade_ms = 250\n\n[analytics]\nenabled = false\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.audio.crossfade().duration, Duration::from_millis(250));
        assert_eq!(config.audio.crossfade_steps, 10);
        assert!(!config.analytics.enabled);
        assert_eq!(config.gestures.touch_click_suppress_ms, 100);
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.library.manifest_path = Some(PathBuf::from("/srv/player.json"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.library.manifest_path, config.library.manifest_path);
    }
}
