//! Media lifecycle events and how recording follows them

use crate::capture::CaptureBackend;
use crate::model::{MediaEvent, MediaSource};

use super::AppController;

impl<M: MediaSource, B: CaptureBackend> AppController<M, B> {
    pub async fn handle_media_event(&mut self, event: MediaEvent) {
        let is_ended = matches!(event, MediaEvent::Ended);

        match self.playback.handle_event(event) {
            Ok(state) if is_ended => {
                self.clock.stop();
                self.auto_record_token += 1;
                tracing::info!(
                    position_secs = state.position_secs,
                    capture = self.capture_status().label(),
                    "Media ended"
                );
                if self.policy.stop_on_end {
                    self.stop_recording().await;
                }
            }
            Ok(state) => {
                tracing::debug!(duration_secs = state.duration_secs, "Media metadata loaded");
                self.resync();
            }
            Err(e) => {
                if !self.playback.state().is_playing {
                    self.clock.stop();
                }
                self.ui.set_error(Self::format_media_error(&e));
            }
        }
    }

    /// Surface failures the media source raised on its own.
    pub(crate) async fn poll_media_errors(&mut self) {
        while let Some(error) = self.playback.media_mut().take_error() {
            self.handle_media_event(MediaEvent::Error(error)).await;
        }
    }
}
