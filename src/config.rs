use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PlayerError, Result};
use crate::ffmpeg::FfmpegConfig;
use crate::glyph::DEFAULT_PALETTE;

/// File name searched for in the data directory and the working directory.
pub const CONFIG_FILE_NAME: &str = "glyphreel.toml";

fn default_palette() -> String {
    DEFAULT_PALETTE.to_string()
}

fn default_preset_name() -> String {
    "default".to_string()
}

/// Named quality settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub columns: u32,
    pub fps: f64,
    pub max_height: u32,
    pub font_ratio: f64,
}

/// Application configuration: presets, palette and external tool names.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub presets: HashMap<String, Preset>,
    #[serde(default = "default_preset_name")]
    pub default_preset: String,
    #[serde(default = "default_palette")]
    pub palette: String,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let presets = [
            ("default", Preset { columns: 100, fps: 24.0, max_height: 600, font_ratio: 0.5 }),
            ("small", Preset { columns: 60, fps: 15.0, max_height: 360, font_ratio: 0.5 }),
            ("large", Preset { columns: 200, fps: 30.0, max_height: 1080, font_ratio: 0.5 }),
        ]
        .into_iter()
        .map(|(name, preset)| (name.to_string(), preset))
        .collect();

        Self {
            presets,
            default_preset: default_preset_name(),
            palette: default_palette(),
            ffmpeg: FfmpegConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse a config file. `.toml` files are read as TOML, anything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let is_toml = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let cfg: AppConfig = if is_toml {
            toml::from_str(&text)
                .map_err(|e| PlayerError::config(format!("parsing {}: {}", path.display(), e)))?
        } else {
            serde_json::from_str(&text)
                .map_err(|e| PlayerError::config(format!("parsing {}: {}", path.display(), e)))?
        };
        cfg.validate().map_err(|e| match e {
            PlayerError::Config(msg) => PlayerError::config(format!("{} in {}", msg, path.display())),
            other => other,
        })?;
        Ok(cfg)
    }

    /// Resolve the configuration: an explicit path wins, then the data
    /// directory, then the working directory, then the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let mut tried: Vec<PathBuf> = Vec::new();
        if let Some(mut d) = dirs::data_dir() {
            d.push("glyphreel");
            d.push(CONFIG_FILE_NAME);
            tried.push(d);
        }
        tried.push(PathBuf::from(CONFIG_FILE_NAME));

        for p in &tried {
            if p.exists() {
                tracing::debug!(path = %p.display(), "loading config");
                return Self::from_file(p);
            }
        }

        tracing::debug!("no config file found, using built-in defaults");
        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        if !self.palette.is_ascii() {
            return Err(PlayerError::config("palette contains non-ASCII characters"));
        }
        if self.palette.is_empty() {
            return Err(PlayerError::config("palette is empty"));
        }
        if !self.presets.contains_key(&self.default_preset) {
            return Err(PlayerError::config(format!("default preset '{}' is not defined", self.default_preset)));
        }
        Ok(())
    }

    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    /// Build playback settings from a preset name (or the default preset).
    pub fn playback_config(&self, preset_name: Option<&str>) -> Result<PlaybackConfig> {
        let name = preset_name.unwrap_or(&self.default_preset);
        let preset = self
            .preset(name)
            .ok_or_else(|| PlayerError::config(format!("preset '{}' not found", name)))?;
        Ok(PlaybackConfig::from_preset(preset).with_palette(self.palette.clone()))
    }
}

/// Settings for a single playback run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Output width in glyphs.
    pub columns: u32,
    /// Playback rate in frames per second.
    pub target_rate: f64,
    /// Frames taller than this are downscaled before sampling.
    pub max_scan_height: u32,
    /// Glyph cell ratio used by the scaler (0.5 suits most monospace fonts).
    pub glyph_aspect: f64,
    /// Pending frames the channel holds before the producer blocks.
    pub channel_capacity: usize,
    /// Glyphs from darkest to brightest.
    pub palette: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            columns: 100,
            target_rate: 24.0,
            max_scan_height: 600,
            glyph_aspect: 0.5,
            channel_capacity: 10,
            palette: default_palette(),
        }
    }
}

impl PlaybackConfig {
    pub fn with_columns(mut self, columns: u32) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_target_rate(mut self, target_rate: f64) -> Self {
        self.target_rate = target_rate;
        self
    }

    pub fn with_max_scan_height(mut self, max_scan_height: u32) -> Self {
        self.max_scan_height = max_scan_height;
        self
    }

    pub fn with_glyph_aspect(mut self, glyph_aspect: f64) -> Self {
        self.glyph_aspect = glyph_aspect;
        self
    }

    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }

    pub fn with_palette(mut self, palette: String) -> Self {
        self.palette = palette;
        self
    }

    pub fn from_preset(preset: &Preset) -> Self {
        Self {
            columns: preset.columns,
            target_rate: preset.fps,
            max_scan_height: preset.max_height,
            glyph_aspect: preset.font_ratio,
            ..Self::default()
        }
    }

    /// Reject values that would make the scaler or the pacing meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.columns == 0 {
            return Err(PlayerError::config("columns must be positive"));
        }
        if !(self.target_rate.is_finite() && self.target_rate > 0.0) {
            return Err(PlayerError::config(format!("target rate must be positive, got {}", self.target_rate)));
        }
        if self.max_scan_height == 0 {
            return Err(PlayerError::config("max scan height must be positive"));
        }
        if !(self.glyph_aspect.is_finite() && self.glyph_aspect > 0.0) {
            return Err(PlayerError::config(format!("glyph aspect must be positive, got {}", self.glyph_aspect)));
        }
        if self.channel_capacity == 0 {
            return Err(PlayerError::config("channel capacity must be at least 1"));
        }
        if self.palette.is_empty() || !self.palette.is_ascii() {
            return Err(PlayerError::config("palette must be a non-empty ASCII string"));
        }
        Ok(())
    }

    /// Pause between rendered frames for blocking playback.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.target_rate)
    }
}
