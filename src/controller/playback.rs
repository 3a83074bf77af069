//! Playback control
//!
//! Every command mutates the media source and then reconciles
//! `PlaybackState` from it; the state is never advanced locally.

use crate::error::MediaError;
use crate::model::{sanitize_duration, sanitize_position, MediaEvent, MediaSource, PlaybackState};

pub struct PlaybackController<M: MediaSource> {
    media: M,
    state: PlaybackState,
}

impl<M: MediaSource> PlaybackController<M> {
    pub fn new(media: M) -> Self {
        let mut controller = Self {
            media,
            state: PlaybackState::default(),
        };
        controller.reconcile();
        controller
    }

    /// Last reconciled state.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    /// Re-read the state from the media source.
    pub fn reconcile(&mut self) -> PlaybackState {
        let ended = self.media.ended();
        self.state = PlaybackState {
            is_playing: !self.media.paused() && !ended,
            position_secs: sanitize_position(self.media.current_time()),
            duration_secs: sanitize_duration(self.media.duration()),
            has_ended: ended,
        };
        self.state
    }

    /// Start or resume playback. Playing an ended source starts over.
    ///
    /// The state is reconciled whether or not the source accepts.
    pub async fn play(&mut self) -> Result<PlaybackState, MediaError> {
        if self.media.ended() {
            tracing::debug!("Media ended, restarting from the top");
            self.media.set_current_time(0.0);
        }

        let result = self.media.play().await;
        let state = self.reconcile();

        match result {
            Ok(()) => {
                tracing::info!(position_secs = state.position_secs, "Playback started");
                Ok(state)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Media source rejected play");
                Err(e)
            }
        }
    }

    pub fn pause(&mut self) -> PlaybackState {
        self.media.pause();
        let state = self.reconcile();
        tracing::info!(position_secs = state.position_secs, "Playback paused");
        state
    }

    pub async fn toggle(&mut self) -> Result<PlaybackState, MediaError> {
        if self.reconcile().is_playing {
            Ok(self.pause())
        } else {
            self.play().await
        }
    }

    /// Move to `to` seconds, clamped to `[0, duration]` (lower bound only
    /// while the duration is unknown). Returns the position actually applied.
    pub fn seek(&mut self, to: f64) -> f64 {
        let duration = sanitize_duration(self.media.duration());
        let mut target = if to.is_nan() { 0.0 } else { to.max(0.0) };
        if duration > 0.0 {
            target = target.min(duration);
        }

        self.media.set_current_time(target);
        self.reconcile();
        tracing::debug!(requested = to, position_secs = target, "Seek");
        target
    }

    /// Relative seek from the current source position.
    pub fn skip(&mut self, delta_secs: f64) -> f64 {
        let from = self.reconcile().position_secs;
        self.seek(from + delta_secs)
    }

    /// Pause and rewind to the start.
    pub fn reset(&mut self) -> PlaybackState {
        self.media.pause();
        self.media.set_current_time(0.0);
        let state = self.reconcile();
        tracing::info!("Playback reset");
        state
    }

    /// Apply a media lifecycle event.
    pub fn handle_event(&mut self, event: MediaEvent) -> Result<PlaybackState, MediaError> {
        match event {
            MediaEvent::MetadataLoaded => {
                let state = self.reconcile();
                tracing::debug!(duration_secs = state.duration_secs, "Media metadata loaded");
                Ok(state)
            }
            MediaEvent::Ended => {
                self.reconcile();
                self.state.has_ended = true;
                self.state.is_playing = false;
                tracing::info!(position_secs = self.state.position_secs, "Media ended");
                Ok(self.state)
            }
            MediaEvent::Error(e) => {
                self.reconcile();
                tracing::error!(error = %e, "Media source error");
                Err(match e {
                    MediaError::MediaSourceError(message) | MediaError::PlayRejected(message) => {
                        MediaError::MediaSourceError(message)
                    }
                })
            }
        }
    }
}
