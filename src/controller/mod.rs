//! Controller module - Application logic and event handling
//!
//! `AppController` is the single owner of the timeline, the playback
//! controller, the sync clock, the transition machine and the capture session.
//! It runs on one task; background work (device grants, record delays) reports
//! back over a channel and is applied here.
//!
//! - `input`: Key event handling
//! - `playback`: Playback control over a media source
//! - `media_events`: Media lifecycle events and the record policy

mod input;
mod media_events;
mod playback;

pub use playback::PlaybackController;

use std::future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::capture::{Artifact, CaptureBackend, CaptureManager, CaptureStatus, GrantOutcome};
use crate::config::{KaraokeConfig, PolicyConfig};
use crate::error::{CaptureError, MediaError};
use crate::model::{MediaEvent, MediaSource, PlaybackState, SyncResult, Timeline, UiState};
use crate::sync::{SyncClock, TickStamp};
use crate::transition::{TransitionMachine, TransitionState};

/// How capture follows playback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordPolicy {
    pub auto_record: bool,
    pub start_delay: Duration,
    pub stop_on_end: bool,
    pub stop_on_pause: bool,
}

impl From<&PolicyConfig> for RecordPolicy {
    fn from(config: &PolicyConfig) -> Self {
        Self {
            auto_record: config.auto_record,
            start_delay: Duration::from_millis(config.start_delay_ms),
            stop_on_end: config.stop_on_end,
            stop_on_pause: config.stop_on_pause,
        }
    }
}

/// Completions of background work, applied on the controller's task.
pub enum AppEvent<S> {
    CaptureGrant(GrantOutcome<S>),
    AutoRecordDue { token: u64 },
}

/// What woke the controller up.
pub enum Wakeup<S> {
    Tick(TickStamp),
    Flush,
    Event(AppEvent<S>),
}

pub struct AppController<M: MediaSource, B: CaptureBackend> {
    timeline: Timeline,
    playback: PlaybackController<M>,
    clock: SyncClock,
    transitions: TransitionMachine,
    capture: Option<CaptureManager<B>>,
    policy: RecordPolicy,
    ui: UiState,
    events_tx: mpsc::UnboundedSender<AppEvent<B::Stream>>,
    events_rx: mpsc::UnboundedReceiver<AppEvent<B::Stream>>,
    output_dir: PathBuf,
    visual_template: String,
    skip_seconds: f64,
    auto_record_token: u64,
    last_saved: Option<PathBuf>,
    should_quit: bool,
}

impl<M: MediaSource, B: CaptureBackend> AppController<M, B> {
    /// `capture` is `None` when recording is disabled.
    pub fn new(config: &KaraokeConfig, timeline: Timeline, media: M, capture: Option<Arc<B>>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let capture = capture.map(|backend| CaptureManager::new(backend, config.capture.options()));

        let mut controller = Self {
            timeline,
            playback: PlaybackController::new(media),
            clock: SyncClock::new(config.playback.frame_rate),
            transitions: TransitionMachine::new(
                config.transitions.styles.clone(),
                config.transitions.window(),
            ),
            capture,
            policy: RecordPolicy::from(&config.policy),
            ui: UiState::default(),
            events_tx,
            events_rx,
            output_dir: config.capture.output_dir.clone(),
            visual_template: config.visuals.url_template.clone(),
            skip_seconds: config.playback.skip_seconds,
            auto_record_token: 0,
            last_saved: None,
            should_quit: false,
        };
        controller.resync();
        controller
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    /// The timeline resolved at the last reconciled position.
    pub fn sync(&self) -> SyncResult<'_> {
        self.timeline.resolve(self.playback.state().position_secs)
    }

    pub fn transition_state(&self, now: Instant) -> TransitionState {
        self.transitions.state(now)
    }

    pub fn capture(&self) -> Option<&CaptureManager<B>> {
        self.capture.as_ref()
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.capture
            .as_ref()
            .map(|capture| capture.status())
            .unwrap_or_default()
    }

    pub fn policy(&self) -> &RecordPolicy {
        &self.policy
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn visual_template(&self) -> &str {
        &self.visual_template
    }

    pub fn last_saved(&self) -> Option<&Path> {
        self.last_saved.as_deref()
    }

    pub fn is_sync_running(&self) -> bool {
        self.clock.is_running()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn set_should_quit(&mut self, quit: bool) {
        self.should_quit = quit;
    }

    /// Wait for the next sync tick, capture flush or background completion.
    pub async fn next_wakeup(&mut self) -> Wakeup<B::Stream> {
        let running = self.clock.is_running();
        tokio::select! {
            tick = self.clock.tick(), if running => Wakeup::Tick(tick),
            _ = Self::flush_due(&mut self.capture) => Wakeup::Flush,
            Some(event) = self.events_rx.recv() => Wakeup::Event(event),
        }
    }

    async fn flush_due(capture: &mut Option<CaptureManager<B>>) {
        match capture.as_mut() {
            Some(capture) => capture.next_flush().await,
            None => future::pending().await,
        }
    }

    pub async fn handle_wakeup(&mut self, wakeup: Wakeup<B::Stream>) {
        match wakeup {
            Wakeup::Tick(tick) => self.on_tick(tick).await,
            Wakeup::Flush => self.on_capture_flush().await,
            Wakeup::Event(event) => self.handle_app_event(event).await,
        }
    }

    /// Housekeeping before a redraw.
    pub fn on_frame(&mut self) {
        self.ui.auto_clear_old_errors();
        self.transitions.advance(Instant::now());
    }

    async fn on_tick(&mut self, tick: TickStamp) {
        let frame = self.clock.sample(tick, &mut self.playback, &self.timeline);
        let active = frame.sync.active_index;
        let ended_now = frame.ended_now;

        self.transitions.observe(active, tick);
        if ended_now {
            self.handle_media_event(MediaEvent::Ended).await;
        }
        self.poll_media_errors().await;
    }

    /// Resolve the timeline right away, outside the tick loop.
    fn resync(&mut self) {
        let tick = self.clock.stamp_now();
        let frame = self.clock.sample(tick, &mut self.playback, &self.timeline);
        let active = frame.sync.active_index;
        self.transitions.observe(active, tick);
    }

    async fn handle_app_event(&mut self, event: AppEvent<B::Stream>) {
        match event {
            AppEvent::CaptureGrant(outcome) => {
                let Some(capture) = self.capture.as_mut() else {
                    return;
                };
                let result = capture.complete(outcome);
                crate::log_capture_result!("start", result);
                if let Err(e) = result {
                    self.ui.set_error(Self::format_capture_error(&e));
                }
            }
            AppEvent::AutoRecordDue { token } => {
                if token != self.auto_record_token || !self.playback.state().is_playing {
                    tracing::debug!(token, "Auto-record no longer wanted");
                    return;
                }
                tracing::info!("Auto-record delay elapsed, starting capture");
                self.start_recording();
            }
        }
    }

    async fn on_capture_flush(&mut self) {
        let Some(capture) = self.capture.as_mut() else {
            return;
        };
        let artifact = capture.flush();
        let failure = match capture.status() {
            CaptureStatus::Failed => capture.last_error().map(Self::format_capture_error),
            _ => None,
        };

        if let Some(message) = failure {
            self.ui.set_error(message);
        }
        if let Some(artifact) = artifact {
            self.persist(artifact).await;
        }
    }

    pub async fn play(&mut self) {
        crate::log_playback_command!("play", position_secs = self.playback.state().position_secs);
        match self.playback.play().await {
            Ok(_) => {
                self.clock.start();
                self.resync();
                self.schedule_auto_record();
            }
            Err(e) => {
                self.resync();
                self.ui.set_error(Self::format_media_error(&e));
            }
        }
    }

    pub async fn pause(&mut self) {
        crate::log_playback_command!("pause", position_secs = self.playback.state().position_secs);
        self.playback.pause();
        self.clock.stop();
        self.auto_record_token += 1;
        self.resync();
        if self.policy.stop_on_pause {
            self.stop_recording().await;
        }
    }

    pub async fn toggle_playback(&mut self) {
        if self.playback.reconcile().is_playing {
            self.pause().await;
        } else {
            self.play().await;
        }
    }

    pub async fn seek(&mut self, to: f64) -> f64 {
        crate::log_playback_command!("seek", requested_secs = to);
        let before = self.playback.reconcile();
        let applied = self.playback.seek(to);
        self.after_seek(before).await;
        applied
    }

    pub async fn skip(&mut self, delta_secs: f64) -> f64 {
        crate::log_playback_command!("skip", delta_secs);
        let before = self.playback.reconcile();
        let applied = self.playback.skip(delta_secs);
        self.after_seek(before).await;
        applied
    }

    pub async fn skip_forward(&mut self) -> f64 {
        self.skip(self.skip_seconds).await
    }

    pub async fn skip_backward(&mut self) -> f64 {
        self.skip(-self.skip_seconds).await
    }

    /// A seek that lands a playing source on its end is the end of the track:
    /// the clock has already stopped, so no tick would report it.
    async fn after_seek(&mut self, before: PlaybackState) {
        self.resync();
        let state = self.playback.state();
        if before.is_playing && state.has_ended {
            self.handle_media_event(MediaEvent::Ended).await;
        } else if state.is_playing {
            self.clock.start();
        }
    }

    pub async fn reset(&mut self) {
        crate::log_playback_command!("reset", position_secs = self.playback.state().position_secs);
        self.playback.reset();
        self.clock.stop();
        self.auto_record_token += 1;
        self.transitions.reset();
        self.resync();
        if self.policy.stop_on_pause {
            self.stop_recording().await;
        }
    }

    /// Ask for the capture device. The grant resolves in the background.
    pub fn start_recording(&mut self) {
        let Some(capture) = self.capture.as_mut() else {
            self.ui.set_error("Recording is disabled (--no-capture)".to_string());
            return;
        };

        match capture.begin() {
            Ok(Some(pending)) => {
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let outcome = pending.resolve().await;
                    if tx.send(AppEvent::CaptureGrant(outcome)).is_err() {
                        tracing::debug!("Controller gone, dropping capture grant");
                    }
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Capture could not start");
                self.ui.set_error(Self::format_capture_error(&e));
            }
        }
    }

    /// Finalize the recording (if any) and save it.
    pub async fn stop_recording(&mut self) {
        let artifact = self.capture.as_mut().and_then(|capture| capture.stop());
        if let Some(artifact) = artifact {
            self.persist(artifact).await;
        }
    }

    pub async fn toggle_recording(&mut self) {
        match self.capture_status() {
            CaptureStatus::Requesting => {
                if let Some(capture) = self.capture.as_mut() {
                    capture.cancel();
                }
                self.ui.notice = Some("Recording request cancelled".to_string());
            }
            CaptureStatus::Recording => self.stop_recording().await,
            CaptureStatus::Finalizing => {}
            CaptureStatus::Idle | CaptureStatus::Done | CaptureStatus::Failed => self.start_recording(),
        }
    }

    fn schedule_auto_record(&mut self) {
        if !self.policy.auto_record {
            return;
        }
        // A refused grant is not retried behind the user's back
        if !matches!(self.capture_status(), CaptureStatus::Idle | CaptureStatus::Done)
            || self.capture.is_none()
        {
            return;
        }

        self.auto_record_token += 1;
        let token = self.auto_record_token;
        let delay = self.policy.start_delay;
        let tx = self.events_tx.clone();
        tracing::debug!(token, delay_ms = delay.as_millis() as u64, "Auto-record scheduled");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(AppEvent::AutoRecordDue { token });
        });
    }

    async fn persist(&mut self, artifact: Artifact) {
        let result = artifact.save_to(&self.output_dir).await;
        crate::log_capture_result!("save", result);
        match result {
            Ok(path) => {
                self.ui.notice = Some(format!("Saved {}", path.display()));
                self.last_saved = Some(path);
            }
            Err(e) => self.ui.set_error(format!("Failed to save recording: {}", e)),
        }
    }

    /// Stop the clock, finalize any recording and pause the media.
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down controller");
        self.clock.stop();
        self.auto_record_token += 1;

        let artifact = self.capture.as_mut().and_then(|capture| capture.cancel());
        if let Some(artifact) = artifact {
            self.persist(artifact).await;
        }
        self.playback.pause();
    }

    pub(crate) fn format_capture_error(error: &CaptureError) -> String {
        match error {
            CaptureError::PermissionDenied(reason) => {
                format!("Recording not allowed: {}. Check the recordings directory.", reason)
            }
            CaptureError::DeviceUnavailable(reason) => format!("Nothing to record: {}", reason),
            CaptureError::UnsupportedFormat { .. } => {
                "No supported recording format. Check [capture] format_priority.".to_string()
            }
            other => format!("Error: {}", other),
        }
    }

    pub(crate) fn format_media_error(error: &MediaError) -> String {
        match error {
            MediaError::PlayRejected(reason) => format!("Playback refused: {}", reason),
            MediaError::MediaSourceError(reason) => format!("Audio error: {}", reason),
        }
    }
}
