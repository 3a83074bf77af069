//! Error types for the karaoke core
//!
//! Each component has its own error enum. The binary wraps them with `anyhow`.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the capture boundary (device grant, recorder, finalize).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("Capture permission denied: {0}")]
    PermissionDenied(String),

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("No supported capture format (tried: {})", tried.join(", "))]
    UnsupportedFormat { tried: Vec<String> },

    #[error("Capture track ended outside the recorder")]
    ExternalInterruption,

    #[error("Failed to finalize recording: {0}")]
    Finalize(String),
}

/// Failures reported by the media source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("Media source error: {0}")]
    MediaSourceError(String),

    #[error("Playback was rejected: {0}")]
    PlayRejected(String),
}

/// Load-time validation failures of a cue timeline.
#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("Timeline has no cues")]
    Empty,

    #[error("Cue {index} has an invalid timestamp ({timestamp})")]
    InvalidTimestamp { index: usize, timestamp: f64 },

    #[error("Cue {index} at {timestamp}s comes before the previous cue at {previous}s")]
    Unsorted {
        index: usize,
        timestamp: f64,
        previous: f64,
    },

    #[error("Cue {index} duplicates timestamp {timestamp}s")]
    Duplicate { index: usize, timestamp: f64 },

    #[error("Failed to parse timeline: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read timeline {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}
