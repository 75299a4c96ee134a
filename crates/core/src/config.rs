use anyhow::Context;
use serde::{Deserialize, Serialize};
use singsong_engine::ClickSettings;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub metronome_bpm: f64,
    pub click_frequency_hz: f64,
    pub click_duration_ms: u64,
    pub click_gain: f32,
    /// Volume given to freshly captured tracks
    pub default_track_volume: f32,
    /// How often the capture meter is refreshed
    pub meter_interval_ms: u64,
    pub meter_window_frames: usize,
    /// Audio the capture device may buffer between meter refreshes
    pub capture_buffer_secs: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let click = ClickSettings::default();
        Self {
            metronome_bpm: click.bpm,
            click_frequency_hz: click.frequency_hz,
            click_duration_ms: click.duration_ms,
            click_gain: click.gain,
            default_track_volume: singsong_transport::DEFAULT_TRACK_VOLUME,
            meter_interval_ms: 16,
            meter_window_frames: 2048,
            capture_buffer_secs: 30,
        }
    }
}

impl EngineConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("singsong").join("config.toml"))
    }

    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Read a config file, falling back to defaults if it is missing or invalid.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("ignoring invalid config {}: {err}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Write to the user config file and return where it went.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = Self::config_path().context("no config directory on this system")?;
        self.save_to(&path)?;
        log::info!("saved config to {}", path.display());
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn click_settings(&self) -> ClickSettings {
        ClickSettings {
            bpm: self.metronome_bpm,
            frequency_hz: self.click_frequency_hz,
            duration_ms: self.click_duration_ms,
            gain: self.click_gain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.metronome_bpm, 100.0);
        assert_eq!(config.click_frequency_hz, 950.0);
        assert_eq!(config.click_duration_ms, 50);
        assert_eq!(config.click_gain, 0.08);
        assert_eq!(config.default_track_volume, 0.9);
        assert_eq!(config.meter_interval_ms, 16);
        assert_eq!(config.meter_window_frames, 2048);
        assert_eq!(config.capture_buffer_secs, 30);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let config = EngineConfig {
            metronome_bpm: 72.0,
            ..EngineConfig::default()
        };

        config.save_to(&path).expect("save");
        assert_eq!(EngineConfig::load_from(&path), config);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "click_gain = 0.5\n").expect("write");

        let config = EngineConfig::load_from(&path);
        assert_eq!(config.click_gain, 0.5);
        assert_eq!(config.metronome_bpm, 100.0);
    }

    #[test]
    fn test_missing_or_invalid_file_falls_back() {
        let dir = tempdir().expect("tempdir");
        assert_eq!(
            EngineConfig::load_from(&dir.path().join("absent.toml")),
            EngineConfig::default()
        );

        let path = dir.path().join("broken.toml");
        fs::write(&path, "metronome_bpm = \"fast\"").expect("write");
        assert_eq!(EngineConfig::load_from(&path), EngineConfig::default());
    }

    #[test]
    fn test_click_settings() {
        let click = EngineConfig::default().click_settings();
        assert_eq!(click, ClickSettings::default());
    }
}
