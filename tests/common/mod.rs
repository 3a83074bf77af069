//! Common test utilities for controller tests
//!
//! A scripted media source whose clock only moves when the test moves it, and
//! a capture backend that counts grants, flushes and releases.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use karaoke_rs::capture::{CaptureBackend, CaptureFormat, DeviceStream, Recorder, RecorderOptions};
use karaoke_rs::config::KaraokeConfig;
use karaoke_rs::controller::AppController;
use karaoke_rs::error::{CaptureError, MediaError};
use karaoke_rs::model::{Cue, MediaSource, Timeline};

pub type TestApp = AppController<ScriptedMedia, FakeCapture>;

#[derive(Debug)]
pub struct MediaScript {
    pub time: f64,
    pub duration: f64,
    pub paused: bool,
    pub ended: bool,
    pub reject_play: Option<MediaError>,
    /// Report `ended` as soon as a seek reaches the duration, like an audio element.
    pub ends_on_seek: bool,
}

/// Media source driven by the test through a shared handle.
#[derive(Clone)]
pub struct ScriptedMedia(Arc<Mutex<MediaScript>>);

impl ScriptedMedia {
    pub fn new(duration: f64) -> Self {
        Self(Arc::new(Mutex::new(MediaScript {
            time: 0.0,
            duration,
            paused: true,
            ended: false,
            reject_play: None,
            ends_on_seek: false,
        })))
    }

    pub fn script(&self) -> std::sync::MutexGuard<'_, MediaScript> {
        self.0.lock().unwrap()
    }

    pub fn set_time(&self, seconds: f64) {
        self.script().time = seconds;
    }

    /// Run to the end of the track, as the audio element would.
    pub fn finish(&self) {
        let mut script = self.script();
        script.time = script.duration;
        script.ended = true;
        script.paused = true;
    }
}

impl MediaSource for ScriptedMedia {
    fn current_time(&self) -> f64 {
        self.script().time
    }

    fn set_current_time(&mut self, seconds: f64) {
        let mut script = self.script();
        script.time = seconds;
        script.ended = script.ends_on_seek && seconds >= script.duration;
    }

    fn duration(&self) -> f64 {
        self.script().duration
    }

    fn paused(&self) -> bool {
        self.script().paused
    }

    fn ended(&self) -> bool {
        self.script().ended
    }

    async fn play(&mut self) -> Result<(), MediaError> {
        let mut script = self.script();
        if let Some(e) = script.reject_play.clone() {
            return Err(e);
        }
        script.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.script().paused = true;
    }
}

#[derive(Default)]
pub struct CaptureCounters {
    pub grants: AtomicUsize,
    pub flushes: AtomicUsize,
    pub released: AtomicUsize,
}

#[derive(Clone)]
pub struct FakeCapture {
    pub counters: Arc<CaptureCounters>,
    pub refuse: Option<CaptureError>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(CaptureCounters::default()),
            refuse: None,
        }
    }

    pub fn refusing(error: CaptureError) -> Self {
        Self {
            refuse: Some(error),
            ..Self::new()
        }
    }

    pub fn grants(&self) -> usize {
        self.counters.grants.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.counters.flushes.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    /// Bytes an artifact holds after `flushes` flushes and a clean finish.
    pub fn expected_bytes(flushes: usize) -> Vec<u8> {
        let mut bytes: Vec<u8> = (1..=flushes)
            .flat_map(|i| format!("[{}]", i).into_bytes())
            .collect();
        bytes.extend_from_slice(b"[last]");
        bytes
    }
}

pub struct FakeStream {
    counters: Arc<CaptureCounters>,
    live: bool,
}

impl DeviceStream for FakeStream {
    fn stop_tracks(&mut self) {
        if self.live {
            self.live = false;
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

pub struct FakeRecorder {
    stream: FakeStream,
}

impl Recorder for FakeRecorder {
    fn flush(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        let n = self.stream.counters.flushes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(format!("[{}]", n).into_bytes()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, CaptureError> {
        Ok(b"[last]".to_vec())
    }

    fn release(&mut self) {
        self.stream.stop_tracks();
    }
}

impl CaptureBackend for FakeCapture {
    type Stream = FakeStream;
    type Recorder = FakeRecorder;

    fn is_type_supported(&self, mime: &str) -> bool {
        mime == "video/webm"
    }

    fn acquire(&self) -> BoxFuture<'static, Result<FakeStream, CaptureError>> {
        self.counters.grants.fetch_add(1, Ordering::SeqCst);
        let counters = self.counters.clone();
        let refuse = self.refuse.clone();
        Box::pin(async move {
            // A permission prompt the user answers a moment later
            tokio::time::sleep(Duration::from_millis(30)).await;
            match refuse {
                Some(e) => Err(e),
                None => Ok(FakeStream { counters, live: true }),
            }
        })
    }

    fn open_recorder(
        &self,
        stream: FakeStream,
        _format: &CaptureFormat,
        _options: &RecorderOptions,
    ) -> Result<FakeRecorder, CaptureError> {
        Ok(FakeRecorder { stream })
    }
}

/// Cues at 0, 5 and 12 seconds.
pub fn scenario_timeline() -> Timeline {
    Timeline::new(vec![
        Cue::new(0.0, "Intro", "Noche de paz", "night-sky"),
        Cue::new(5.0, "Verso", "Noche de amor", "candles"),
        Cue::new(12.0, "Coro", "Todo duerme en derredor", "manger"),
    ])
    .unwrap()
}

pub fn test_config(output_dir: &Path) -> KaraokeConfig {
    let mut config = KaraokeConfig::default();
    config.capture.output_dir = output_dir.to_path_buf();
    config.capture.format_priority = vec!["video/webm;codecs=vp9,opus".to_string(), "video/webm".to_string()];
    config.capture.file_prefix = "test".to_string();
    config
}

pub fn app(config: &KaraokeConfig, media: &ScriptedMedia, capture: Option<&FakeCapture>) -> TestApp {
    AppController::new(
        config,
        scenario_timeline(),
        media.clone(),
        capture.map(|capture| Arc::new(capture.clone())),
    )
}

/// Handle wakeups until `done` holds. Panics after `max` wakeups.
pub async fn pump_until(app: &mut TestApp, max: usize, mut done: impl FnMut(&TestApp) -> bool) {
    for _ in 0..max {
        if done(app) {
            return;
        }
        let wakeup = app.next_wakeup().await;
        app.handle_wakeup(wakeup).await;
    }
    assert!(done(app), "condition not reached after {} wakeups", max);
}

/// Handle wakeups for `duration` of (virtual) time.
pub async fn run_for(app: &mut TestApp, duration: Duration) {
    let _ = tokio::time::timeout(duration, async {
        loop {
            let wakeup = app.next_wakeup().await;
            app.handle_wakeup(wakeup).await;
        }
    })
    .await;
}
