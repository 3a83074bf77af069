//! Playback-related types and the media source boundary

use std::future::Future;

use crate::error::MediaError;

/// Player state exposed to the UI and the sync clock.
///
/// Always reconciled from the media source, never accumulated locally.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub has_ended: bool,
}

impl PlaybackState {
    /// Playback progress in `[0, 1]`, or 0 while the duration is unknown.
    pub fn progress_ratio(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.position_secs / self.duration_secs).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn duration_known(&self) -> bool {
        self.duration_secs > 0.0
    }
}

/// Lifecycle events raised by a media source.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaEvent {
    MetadataLoaded,
    Ended,
    Error(MediaError),
}

/// A playable audio handle.
///
/// Times are in seconds. `duration` may be NaN or 0 until metadata has loaded.
pub trait MediaSource {
    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, seconds: f64);

    fn duration(&self) -> f64;

    fn paused(&self) -> bool;

    fn ended(&self) -> bool;

    /// Start or resume playback. May be rejected by the source.
    fn play(&mut self) -> impl Future<Output = Result<(), MediaError>>;

    fn pause(&mut self);

    /// An asynchronous failure (decode error, lost output device) raised
    /// since the last call. Sources that cannot fail this way keep the default.
    fn take_error(&mut self) -> Option<MediaError> {
        None
    }
}

/// Turn a possibly NaN/negative duration into a usable value (0 = unknown).
pub(crate) fn sanitize_duration(duration: f64) -> f64 {
    if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        0.0
    }
}

/// Turn a possibly NaN/negative position into a usable value.
pub(crate) fn sanitize_position(position: f64) -> f64 {
    if position.is_finite() && position > 0.0 {
        position
    } else {
        0.0
    }
}
