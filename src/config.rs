//! Deck configuration: serial link, smoothing, presets, remote API.
//!
//! Loaded from a YAML file that is created with defaults when missing and
//! hot-reloaded through [`watcher::ConfigWatcher`]. The only field the
//! gateway itself mutates is the selected preset index, persisted on every
//! preset change.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::reconcile::{CycleSettings, Smoothing};

/// Bumped when the file layout changes; mismatching files are rewritten
/// with their recognized fields preserved.
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DeckConfig {
    #[serde(default)]
    pub config_version: u32,

    /// Serial port of the fader deck.
    #[serde(default = "default_port_name")]
    pub port_name: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_slider_count")]
    pub slider_count: usize,

    /// Maximum permitted per-cycle change in raw units (1-1024).
    #[serde(default = "default_smoothness")]
    pub smoothness: u16,
    #[serde(default = "default_true")]
    pub do_smooth: bool,

    /// How long to let the mixer settle after committing decreases while
    /// an override-driven increase is held back.
    #[serde(default = "default_decrease_timeout")]
    pub decrease_before_increase_timeout_ms: u64,

    /// Ordered preset set; each preset maps sliders to target-name groups.
    #[serde(default = "default_presets")]
    pub presets: Vec<Preset>,
    #[serde(default)]
    pub selected_preset: usize,
    /// Republish every channel right after a preset change instead of
    /// waiting for the next frame.
    #[serde(default = "default_true")]
    pub update_after_preset_change: bool,

    #[serde(default)]
    pub api: ApiConfig,
}

/// One channel→targets mapping.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Preset {
    pub name: String,
    /// Target-name groups, one per slider.
    pub sliders: Vec<Vec<String>>,
}

/// Remote-control HTTP API settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_api_port(),
        }
    }
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            port_name: default_port_name(),
            baud_rate: default_baud_rate(),
            slider_count: default_slider_count(),
            smoothness: default_smoothness(),
            do_smooth: true,
            decrease_before_increase_timeout_ms: default_decrease_timeout(),
            presets: default_presets(),
            selected_preset: 0,
            update_after_preset_change: true,
            api: ApiConfig::default(),
        }
    }
}

impl DeckConfig {
    /// Load configuration from file with validation.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: DeckConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;
        // A file edited by hand may point past the preset set.
        config.selected_preset %= config.presets.len();

        Ok(config)
    }

    /// Save configuration to file.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Load the config, creating it with defaults when missing and
    /// restoring defaults when it cannot be parsed.
    pub async fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = DeckConfig::default();
            config.save(path).await?;
            info!("Created default configuration at {}", path.display());
            return Ok(config);
        }

        match Self::load(path).await {
            Ok(mut config) => {
                if config.config_version != CONFIG_VERSION {
                    config.config_version = CONFIG_VERSION;
                    config.save(path).await?;
                    info!("Migrated configuration to version {}", CONFIG_VERSION);
                }
                Ok(config)
            }
            Err(e) => {
                warn!("Unusable config ({e:#}), restoring defaults");
                let config = DeckConfig::default();
                config.save(path).await?;
                Ok(config)
            }
        }
    }

    /// Validate configuration for correctness and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.slider_count == 0 {
            anyhow::bail!("slider_count must be at least 1");
        }
        if self.smoothness == 0 || self.smoothness > 1024 {
            anyhow::bail!("smoothness {} is invalid (must be 1-1024)", self.smoothness);
        }
        if self.presets.is_empty() {
            anyhow::bail!("At least one preset must be defined");
        }
        for (idx, preset) in self.presets.iter().enumerate() {
            if preset.name.is_empty() {
                anyhow::bail!("Preset {} name cannot be empty", idx);
            }
        }
        Ok(())
    }

    /// Advance the selected preset, wrapping modulo the preset count.
    /// Returns the new index.
    pub fn cycle_preset(&mut self) -> usize {
        self.selected_preset = (self.selected_preset + 1) % self.presets.len();
        self.selected_preset
    }

    /// Target names driven by `channel` under the active preset, if the
    /// preset covers that slider.
    pub fn slider_targets(&self, channel: usize) -> Option<&[String]> {
        self.presets
            .get(self.selected_preset)
            .and_then(|p| p.sliders.get(channel))
            .map(Vec::as_slice)
    }

    /// Name of the active preset.
    pub fn active_preset_name(&self) -> &str {
        self.presets
            .get(self.selected_preset)
            .map(|p| p.name.as_str())
            .unwrap_or("<none>")
    }

    /// Snapshot of the settings the reconciler consumes each cycle.
    pub fn cycle_settings(&self) -> CycleSettings {
        CycleSettings {
            slider_count: self.slider_count,
            smoothing: Smoothing {
                bound: self.smoothness,
                enabled: self.do_smooth,
            },
        }
    }
}

// Default value functions
fn default_port_name() -> String {
    if cfg!(windows) {
        "COM3".to_string()
    } else {
        "/dev/ttyACM0".to_string()
    }
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_slider_count() -> usize {
    4
}
fn default_smoothness() -> u16 {
    1000
}
fn default_decrease_timeout() -> u64 {
    20
}
fn default_true() -> bool {
    true
}
fn default_api_port() -> u16 {
    5195
}
fn default_presets() -> Vec<Preset> {
    vec![
        Preset {
            name: "browser".to_string(),
            sliders: vec![
                vec!["firefox".to_string(), "chromium".to_string()],
                vec!["master".to_string()],
            ],
        },
        Preset {
            name: "gaming".to_string(),
            sliders: vec![vec!["steam".to_string()], vec!["master".to_string()]],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn preset_cycling_wraps() {
        let mut config = DeckConfig::default();
        assert_eq!(config.presets.len(), 2);

        config.selected_preset = 1;
        assert_eq!(config.cycle_preset(), 0);
        assert_eq!(config.cycle_preset(), 1);
    }

    #[test]
    fn slider_targets_skips_uncovered_channels() {
        let config = DeckConfig::default();
        assert_eq!(
            config.slider_targets(0),
            Some(&["firefox".to_string(), "chromium".to_string()][..])
        );
        // Default presets cover two sliders; the rest are skipped.
        assert_eq!(config.slider_targets(3), None);
    }

    #[test]
    fn validate_rejects_bad_smoothness() {
        let mut config = DeckConfig::default();
        config.smoothness = 0;
        assert!(config.validate().is_err());
        config.smoothness = 1025;
        assert!(config.validate().is_err());
        config.smoothness = 1024;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_presets() {
        let mut config = DeckConfig::default();
        config.presets.clear();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn round_trips_through_yaml() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yaml");

        let config = DeckConfig::default();
        config.save(&path).await?;

        let loaded = DeckConfig::load(&path).await?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn load_or_init_creates_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yaml");

        let config = DeckConfig::load_or_init(&path).await?;
        assert_eq!(config, DeckConfig::default());
        assert!(path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn load_or_init_restores_defaults_on_garbage() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yaml");
        tokio::fs::write(&path, "::: not yaml :::").await?;

        let config = DeckConfig::load_or_init(&path).await?;
        assert_eq!(config, DeckConfig::default());
        Ok(())
    }

    #[tokio::test]
    async fn out_of_range_selected_preset_is_clamped() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yaml");

        let mut config = DeckConfig::default();
        config.selected_preset = 7;
        let yaml = serde_yaml::to_string(&config)?;
        tokio::fs::write(&path, yaml).await?;

        let loaded = DeckConfig::load(&path).await?;
        assert_eq!(loaded.selected_preset, 1);
        Ok(())
    }
}
