//! Capture session lifecycle
//!
//! `Idle → Requesting → Recording → Finalizing → Done`, with `Failed`
//! reachable from `Requesting` and `Recording`. At most one session holds the
//! device at a time; the recorder (and through it the device stream) lives in
//! an `ActiveCapture` guard that releases it on drop, so every exit path gives
//! the device back.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::{
    negotiate_format, Artifact, CaptureBackend, CaptureFormat, CaptureStatus, DeviceStream,
    Recorder, RecorderOptions, StopReason,
};
use crate::error::CaptureError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureOptions {
    pub flush_interval: Duration,
    pub format_priority: Vec<String>,
    pub file_prefix: String,
    pub bits_per_second: u64,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(100),
            format_priority: vec![
                "application/x-asciicast;version=2".to_string(),
                "text/plain".to_string(),
            ],
            file_prefix: "karaoke".to_string(),
            bits_per_second: 8_000_000,
        }
    }
}

/// A device grant in flight. Resolve it anywhere (it is `Send + 'static`) and
/// hand the outcome back to `CaptureManager::complete`.
pub struct PendingGrant<S> {
    generation: u64,
    grant: BoxFuture<'static, Result<S, CaptureError>>,
}

impl<S> PendingGrant<S> {
    pub async fn resolve(self) -> GrantOutcome<S> {
        GrantOutcome {
            generation: self.generation,
            result: self.grant.await,
        }
    }
}

pub struct GrantOutcome<S> {
    generation: u64,
    result: Result<S, CaptureError>,
}

impl<S> GrantOutcome<S> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_granted(&self) -> bool {
        self.result.is_ok()
    }
}

struct ActiveCapture<R: Recorder> {
    recorder: R,
    format: CaptureFormat,
    started_at: Instant,
    flush_timer: Interval,
}

impl<R: Recorder> Drop for ActiveCapture<R> {
    fn drop(&mut self) {
        self.recorder.release();
    }
}

pub struct CaptureManager<B: CaptureBackend> {
    backend: Arc<B>,
    options: CaptureOptions,
    status: CaptureStatus,
    generation: u64,
    pending_format: Option<CaptureFormat>,
    active: Option<ActiveCapture<B::Recorder>>,
    chunks: Vec<Vec<u8>>,
    last_error: Option<CaptureError>,
}

impl<B: CaptureBackend> CaptureManager<B> {
    pub fn new(backend: Arc<B>, options: CaptureOptions) -> Self {
        Self {
            backend,
            options,
            status: CaptureStatus::Idle,
            generation: 0,
            pending_format: None,
            active: None,
            chunks: Vec::new(),
            last_error: None,
        }
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&CaptureError> {
        self.last_error.as_ref()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn format(&self) -> Option<&CaptureFormat> {
        self.active.as_ref().map(|active| &active.format)
    }

    pub fn recording_elapsed(&self) -> Option<Duration> {
        self.active.as_ref().map(|active| active.started_at.elapsed())
    }

    /// Move to `Requesting` and return the device grant to await.
    ///
    /// Returns `Ok(None)` without touching the device when a session is
    /// already active. Fails fast with `UnsupportedFormat` before asking for
    /// the device.
    pub fn begin(&mut self) -> Result<Option<PendingGrant<B::Stream>>, CaptureError> {
        if self.status.is_active() {
            tracing::debug!(status = self.status.label(), "Capture already active, ignoring start");
            return Ok(None);
        }

        let format = match negotiate_format(&*self.backend, &self.options.format_priority) {
            Ok(format) => format,
            Err(e) => {
                self.fail(e.clone());
                return Err(e);
            }
        };

        self.generation += 1;
        self.status = CaptureStatus::Requesting;
        self.chunks.clear();
        self.last_error = None;
        tracing::info!(generation = self.generation, format = %format.mime, "Requesting capture device");
        self.pending_format = Some(format);

        Ok(Some(PendingGrant {
            generation: self.generation,
            grant: self.backend.acquire(),
        }))
    }

    /// Apply the outcome of a grant started by `begin`.
    ///
    /// Outcomes from a cancelled or superseded request are dropped and their
    /// stream released.
    pub fn complete(&mut self, outcome: GrantOutcome<B::Stream>) -> Result<CaptureStatus, CaptureError> {
        let current = outcome.generation == self.generation && self.status == CaptureStatus::Requesting;
        let format = if current { self.pending_format.take() } else { None };

        let Some(format) = format else {
            tracing::debug!(generation = outcome.generation, "Dropping stale capture grant");
            if let Ok(mut stream) = outcome.result {
                stream.stop_tracks();
            }
            return Ok(self.status);
        };

        let stream = match outcome.result {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Capture device refused");
                self.fail(e.clone());
                return Err(e);
            }
        };

        let recorder_options = RecorderOptions {
            bits_per_second: self.options.bits_per_second,
        };
        let recorder = match self.backend.open_recorder(stream, &format, &recorder_options) {
            Ok(recorder) => recorder,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open recorder");
                self.fail(e.clone());
                return Err(e);
            }
        };

        let period = self.options.flush_interval.max(Duration::from_millis(1));
        let mut flush_timer = tokio::time::interval_at(Instant::now() + period, period);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.active = Some(ActiveCapture {
            recorder,
            format,
            started_at: Instant::now(),
            flush_timer,
        });
        self.status = CaptureStatus::Recording;
        tracing::info!(flush_ms = period.as_millis() as u64, "Capture recording");
        Ok(self.status)
    }

    /// Request the device and start recording in one step.
    pub async fn start(&mut self) -> Result<CaptureStatus, CaptureError> {
        match self.begin()? {
            Some(pending) => {
                let outcome = pending.resolve().await;
                self.complete(outcome)
            }
            None => Ok(self.status),
        }
    }

    /// Wait for the next flush deadline. Never completes unless recording.
    pub async fn next_flush(&mut self) {
        match self.active.as_mut() {
            Some(active) => {
                active.flush_timer.tick().await;
            }
            None => future::pending().await,
        }
    }

    /// Pull the recorder's data since the last flush.
    ///
    /// Returns an artifact when the recording ended during this flush: the
    /// track was ended externally (finalized like `stop`) or the device was
    /// lost (partial artifact from the chunks flushed so far).
    pub fn flush(&mut self) -> Option<Artifact> {
        let active = self.active.as_mut()?;

        match active.recorder.flush() {
            Ok(Some(chunk)) if !chunk.is_empty() => {
                tracing::trace!(bytes = chunk.len(), index = self.chunks.len(), "Capture chunk");
                self.chunks.push(chunk);
                None
            }
            Ok(_) => None,
            Err(CaptureError::ExternalInterruption) => {
                tracing::info!("Capture track ended externally, finalizing");
                self.finalize(StopReason::ExternalInterruption)
            }
            Err(e) => {
                tracing::error!(error = %e, "Capture device lost");
                self.abort(e)
            }
        }
    }

    /// Finalize the recording. A no-op returning `None` unless recording.
    pub fn stop(&mut self) -> Option<Artifact> {
        if self.status != CaptureStatus::Recording {
            tracing::debug!(status = self.status.label(), "Capture stop ignored");
            return None;
        }
        self.finalize(StopReason::Requested)
    }

    /// Release everything, whatever the state. An in-flight grant is
    /// abandoned (its stream is released when it arrives); a recording is
    /// finalized.
    pub fn cancel(&mut self) -> Option<Artifact> {
        match self.status {
            CaptureStatus::Requesting => {
                self.generation += 1;
                self.pending_format = None;
                self.status = CaptureStatus::Idle;
                tracing::info!("Capture request cancelled");
                None
            }
            CaptureStatus::Recording => self.finalize(StopReason::Cancelled),
            _ => None,
        }
    }

    fn finalize(&mut self, reason: StopReason) -> Option<Artifact> {
        let mut active = self.active.take()?;
        self.status = CaptureStatus::Finalizing;

        let last = active.recorder.finish();
        let format = active.format.clone();
        drop(active);

        let mut finish_error = None;
        match last {
            Ok(chunk) if !chunk.is_empty() => self.chunks.push(chunk),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Recorder failed to finish, keeping flushed chunks");
                finish_error = Some(e);
            }
        }

        let chunks = std::mem::take(&mut self.chunks);
        if chunks.is_empty() {
            if let Some(e) = finish_error {
                self.status = CaptureStatus::Failed;
                self.last_error = Some(e);
                return None;
            }
        }

        let artifact = Artifact::assemble(chunks, format, reason, &self.options.file_prefix);
        self.status = CaptureStatus::Done;
        self.last_error = finish_error;
        tracing::info!(
            bytes = artifact.len(),
            chunks = artifact.chunk_count,
            reason = ?reason,
            "Capture finalized"
        );
        Some(artifact)
    }

    fn abort(&mut self, error: CaptureError) -> Option<Artifact> {
        let format = self.active.take().map(|active| active.format.clone());
        self.status = CaptureStatus::Failed;
        self.last_error = Some(error);

        let chunks = std::mem::take(&mut self.chunks);
        match format {
            Some(format) if !chunks.is_empty() => Some(Artifact::assemble(
                chunks,
                format,
                StopReason::DeviceLost,
                &self.options.file_prefix,
            )),
            _ => None,
        }
    }

    fn fail(&mut self, error: CaptureError) {
        self.active = None;
        self.pending_format = None;
        self.status = CaptureStatus::Failed;
        self.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        grants: AtomicUsize,
        released: AtomicUsize,
    }

    #[derive(Clone)]
    struct FakeBackend {
        counters: Arc<Counters>,
        refuse: Option<CaptureError>,
        supported: Vec<&'static str>,
        end_after: Option<usize>,
        finish_fails: bool,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                counters: Arc::new(Counters::default()),
                refuse: None,
                supported: vec!["video/webm"],
                end_after: None,
                finish_fails: false,
            }
        }
    }

    struct FakeStream {
        counters: Arc<Counters>,
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

    struct FakeRecorder {
        stream: FakeStream,
        flushes: usize,
        end_after: Option<usize>,
        finish_fails: bool,
    }

    impl Recorder for FakeRecorder {
        fn flush(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
            if self.end_after == Some(self.flushes) {
                return Err(CaptureError::ExternalInterruption);
            }
            self.flushes += 1;
            Ok(Some(format!("[{}]", self.flushes).into_bytes()))
        }

        fn finish(&mut self) -> Result<Vec<u8>, CaptureError> {
            if self.finish_fails {
                return Err(CaptureError::Finalize("muxer exploded".to_string()));
            }
            Ok(b"[last]".to_vec())
        }

        fn release(&mut self) {
            self.stream.stop_tracks();
        }
    }

    impl CaptureBackend for FakeBackend {
        type Stream = FakeStream;
        type Recorder = FakeRecorder;

        fn is_type_supported(&self, mime: &str) -> bool {
            self.supported.iter().any(|s| *s == mime)
        }

        fn acquire(&self) -> BoxFuture<'static, Result<FakeStream, CaptureError>> {
            self.counters.grants.fetch_add(1, Ordering::SeqCst);
            let counters = self.counters.clone();
            let refuse = self.refuse.clone();
            Box::pin(async move {
                tokio::task::yield_now().await;
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
            Ok(FakeRecorder {
                stream,
                flushes: 0,
                end_after: self.end_after,
                finish_fails: self.finish_fails,
            })
        }
    }

    fn options() -> CaptureOptions {
        CaptureOptions {
            format_priority: vec!["video/webm;codecs=vp9,opus".to_string(), "video/webm".to_string()],
            ..CaptureOptions::default()
        }
    }

    fn manager(backend: &FakeBackend) -> CaptureManager<FakeBackend> {
        CaptureManager::new(Arc::new(backend.clone()), options())
    }

    #[tokio::test]
    async fn test_second_start_reuses_session() {
        let backend = FakeBackend::new();
        let mut manager = manager(&backend);

        assert_eq!(manager.start().await.unwrap(), CaptureStatus::Recording);
        assert_eq!(manager.start().await.unwrap(), CaptureStatus::Recording);
        assert_eq!(backend.counters.grants.load(Ordering::SeqCst), 1);
        assert_eq!(manager.format().map(|f| f.mime.as_str()), Some("video/webm"));
    }

    #[tokio::test]
    async fn test_begin_while_requesting_is_noop() {
        let backend = FakeBackend::new();
        let mut manager = manager(&backend);

        let pending = manager.begin().unwrap().expect("first begin returns a grant");
        assert_eq!(manager.status(), CaptureStatus::Requesting);
        assert!(manager.begin().unwrap().is_none());

        let outcome = pending.resolve().await;
        assert_eq!(manager.complete(outcome).unwrap(), CaptureStatus::Recording);
        assert_eq!(backend.counters.grants.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_when_not_recording_is_noop() {
        let backend = FakeBackend::new();
        let mut manager = manager(&backend);

        assert!(manager.stop().is_none());
        assert_eq!(manager.status(), CaptureStatus::Idle);

        manager.start().await.unwrap();
        assert!(manager.stop().is_some());
        assert_eq!(manager.status(), CaptureStatus::Done);

        assert!(manager.stop().is_none());
        assert_eq!(manager.status(), CaptureStatus::Done);
    }

    #[tokio::test]
    async fn test_permission_denied_fails_session() {
        let mut backend = FakeBackend::new();
        backend.refuse = Some(CaptureError::PermissionDenied("user dismissed prompt".to_string()));
        let mut manager = manager(&backend);

        let err = manager.start().await.unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied(_)));
        assert_eq!(manager.status(), CaptureStatus::Failed);
        assert_eq!(manager.last_error(), Some(&err));
        assert!(manager.stop().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_format_fails_before_grant() {
        let mut backend = FakeBackend::new();
        backend.supported = vec!["video/mp4"];
        let mut manager = manager(&backend);

        let err = manager.start().await.unwrap_err();
        assert!(matches!(err, CaptureError::UnsupportedFormat { .. }));
        assert_eq!(manager.status(), CaptureStatus::Failed);
        assert_eq!(backend.counters.grants.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_assembles_chunks_in_order_and_releases() {
        let backend = FakeBackend::new();
        let mut manager = manager(&backend);
        manager.start().await.unwrap();

        assert!(manager.flush().is_none());
        assert!(manager.flush().is_none());
        assert_eq!(manager.chunk_count(), 2);

        let artifact = manager.stop().unwrap();
        assert_eq!(artifact.bytes, b"[1][2][last]");
        assert_eq!(artifact.stop_reason, StopReason::Requested);
        assert_eq!(manager.status(), CaptureStatus::Done);
        assert_eq!(backend.counters.released.load(Ordering::SeqCst), 1);
        assert_eq!(manager.chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_external_track_end_finalizes_like_stop() {
        let mut backend = FakeBackend::new();
        backend.end_after = Some(1);
        let mut manager = manager(&backend);
        manager.start().await.unwrap();

        assert!(manager.flush().is_none());
        let artifact = manager.flush().expect("track end finalizes");
        assert_eq!(artifact.bytes, b"[1][last]");
        assert_eq!(artifact.stop_reason, StopReason::ExternalInterruption);
        assert_eq!(manager.status(), CaptureStatus::Done);
        assert_eq!(backend.counters.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finish_failure_still_releases_and_keeps_chunks() {
        let mut backend = FakeBackend::new();
        backend.finish_fails = true;
        let mut manager = manager(&backend);
        manager.start().await.unwrap();
        manager.flush();

        let artifact = manager.stop().expect("flushed chunks survive");
        assert_eq!(artifact.bytes, b"[1]");
        assert_eq!(manager.status(), CaptureStatus::Done);
        assert!(matches!(manager.last_error(), Some(CaptureError::Finalize(_))));
        assert_eq!(backend.counters.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finish_failure_without_chunks_fails() {
        let mut backend = FakeBackend::new();
        backend.finish_fails = true;
        let mut manager = manager(&backend);
        manager.start().await.unwrap();

        assert!(manager.stop().is_none());
        assert_eq!(manager.status(), CaptureStatus::Failed);
        assert_eq!(backend.counters.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_acquisition_releases_late_grant() {
        let backend = FakeBackend::new();
        let mut manager = manager(&backend);

        let pending = manager.begin().unwrap().unwrap();
        assert!(manager.cancel().is_none());
        assert_eq!(manager.status(), CaptureStatus::Idle);

        let outcome = pending.resolve().await;
        assert!(outcome.is_granted());
        assert_eq!(manager.complete(outcome).unwrap(), CaptureStatus::Idle);
        assert_eq!(backend.counters.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restart_after_done() {
        let backend = FakeBackend::new();
        let mut manager = manager(&backend);

        manager.start().await.unwrap();
        manager.stop();
        assert_eq!(manager.start().await.unwrap(), CaptureStatus::Recording);
        assert_eq!(backend.counters.grants.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_deadline_follows_interval() {
        let backend = FakeBackend::new();
        let mut manager = manager(&backend);

        let idle = tokio::time::timeout(Duration::from_secs(1), manager.next_flush()).await;
        assert!(idle.is_err(), "no flush ticks before recording");

        manager.start().await.unwrap();
        let started = Instant::now();
        manager.next_flush().await;
        assert!(started.elapsed() >= Duration::from_millis(100));
        manager.flush();
        manager.next_flush().await;
        manager.flush();
        assert_eq!(manager.chunk_count(), 2);
    }
}
