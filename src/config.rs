//! Configuration loading
//!
//! Every section is optional; missing keys fall back to compiled defaults.
//!
//! ```toml
//! [playback]
//! frame_rate = 60
//! skip_seconds = 5.0
//!
//! [transitions]
//! duration_ms = 1000
//! styles = ["crossfade", "ken-burns", "slide-up", "zoom", "dip-to-black"]
//!
//! [capture]
//! enabled = true
//! output_dir = "recordings"
//! flush_interval_ms = 100
//!
//! [policy]
//! auto_record = false
//! start_delay_ms = 500
//! stop_on_end = true
//! stop_on_pause = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::CaptureOptions;
use crate::error::ConfigError;
use crate::transition::TransitionStyle;

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "karaoke.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KaraokeConfig {
    pub playback: PlaybackConfig,
    pub transitions: TransitionsConfig,
    pub capture: CaptureConfig,
    pub policy: PolicyConfig,
    pub visuals: VisualsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Sync ticks per second while playing.
    pub frame_rate: u32,
    pub skip_seconds: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            skip_seconds: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionsConfig {
    pub duration_ms: u64,
    pub styles: Vec<TransitionStyle>,
}

impl Default for TransitionsConfig {
    fn default() -> Self {
        Self {
            duration_ms: 1000,
            styles: TransitionStyle::ALL.to_vec(),
        }
    }
}

impl TransitionsConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
    pub flush_interval_ms: u64,
    pub file_prefix: String,
    pub format_priority: Vec<String>,
    pub bits_per_second: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let options = CaptureOptions::default();
        Self {
            enabled: true,
            output_dir: PathBuf::from("recordings"),
            flush_interval_ms: options.flush_interval.as_millis() as u64,
            file_prefix: options.file_prefix,
            format_priority: options.format_priority,
            bits_per_second: options.bits_per_second,
        }
    }
}

impl CaptureConfig {
    pub fn options(&self) -> CaptureOptions {
        CaptureOptions {
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            format_priority: self.format_priority.clone(),
            file_prefix: self.file_prefix.clone(),
            bits_per_second: self.bits_per_second,
        }
    }
}

/// How capture follows playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Start recording when playback starts.
    pub auto_record: bool,
    pub start_delay_ms: u64,
    pub stop_on_end: bool,
    pub stop_on_pause: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            auto_record: false,
            start_delay_ms: 500,
            stop_on_end: true,
            stop_on_pause: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualsConfig {
    /// `{prompt}`, `{key}` and `{seed}` are substituted per cue.
    pub url_template: String,
}

impl Default for VisualsConfig {
    fn default() -> Self {
        Self {
            url_template: "https://image.pollinations.ai/prompt/{prompt}?width=1280&height=720&seed={seed}&nologo=true"
                .to_string(),
        }
    }
}

impl KaraokeConfig {
    /// Load from `path`, or from `./karaoke.toml` if it exists, or defaults.
    ///
    /// An explicit path that does not exist is an error; a missing local file
    /// is not.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !local.exists() {
                    tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    return Ok(Self::default());
                }
                local
            }
        };

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::FileRead {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        tracing::info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}
