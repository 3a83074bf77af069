//! View module - UI rendering
//!
//! This module handles all UI rendering for the application using ratatui.
//! It is organized into submodules by component type:
//!
//! - `utils`: Shared formatting helpers
//! - `lyrics`: Lyric panel (current line, transition, next-line preview)
//! - `progress`: Progress gauge
//! - `status`: Recording status line
//! - `overlays`: Modal overlays (error, help)
//! - `snapshot`: Rendered buffer to capture frame

mod lyrics;
mod overlays;
mod progress;
mod snapshot;
mod status;
mod utils;

pub use snapshot::snapshot_frame;
pub use utils::format_duration;

use std::path::Path;
use std::time::{Duration, Instant};

use ratatui::{
    layout::{Constraint, Direction, Layout},
    Frame,
};

use crate::capture::{CaptureBackend, CaptureStatus};
use crate::controller::AppController;
use crate::model::{MediaSource, PlaybackState, SyncResult, Timeline, UiState};
use crate::transition::TransitionState;

/// Recording details shown in the status line.
#[derive(Clone, Debug, Default)]
pub struct RecordingInfo {
    pub enabled: bool,
    pub status: CaptureStatus,
    pub elapsed: Option<Duration>,
    pub chunk_count: usize,
    pub buffered_bytes: usize,
    pub format: Option<String>,
    pub auto_record: bool,
}

/// Everything one frame needs, read from the controller.
pub struct ViewState<'a> {
    pub timeline: &'a Timeline,
    pub playback: PlaybackState,
    pub sync: SyncResult<'a>,
    pub transition: TransitionState,
    pub recording: RecordingInfo,
    pub ui: &'a UiState,
    pub visual_template: &'a str,
    pub last_saved: Option<&'a Path>,
}

impl<'a> ViewState<'a> {
    pub fn from_app<M: MediaSource, B: CaptureBackend>(app: &'a AppController<M, B>, now: Instant) -> Self {
        let recording = match app.capture() {
            Some(capture) => RecordingInfo {
                enabled: true,
                status: capture.status(),
                elapsed: capture.recording_elapsed(),
                chunk_count: capture.chunk_count(),
                buffered_bytes: capture.buffered_bytes(),
                format: capture.format().map(|format| format.mime.clone()),
                auto_record: app.policy().auto_record,
            },
            None => RecordingInfo::default(),
        };

        Self {
            timeline: app.timeline(),
            playback: app.playback_state(),
            sync: app.sync(),
            transition: app.transition_state(now),
            recording,
            ui: app.ui(),
            visual_template: app.visual_template(),
            last_saved: app.last_saved(),
        }
    }

    /// The lyric line on screen, if any.
    pub fn caption(&self) -> Option<String> {
        self.transition
            .current_cue
            .and_then(|index| self.timeline.get(index))
            .map(|cue| cue.text.clone())
    }
}

pub struct AppView;

impl AppView {
    pub fn render(frame: &mut Frame, state: &ViewState) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(0),    // Lyric panel
                Constraint::Length(3), // Progress gauge
                Constraint::Length(1), // Status line
            ])
            .split(frame.area());

        lyrics::render_lyrics(frame, chunks[0], state);
        progress::render_progress_bar(frame, chunks[1], state);
        status::render_status_line(frame, chunks[2], state);

        if state.ui.error_message.is_some() {
            overlays::render_error_notification(frame, state.ui);
        }

        if state.ui.show_help_popup {
            overlays::render_help_popup(frame);
        }
    }
}
