//! Capture module - recording the playback as a downloadable artifact
//!
//! - `manager`: Capture session lifecycle (`CaptureManager`)
//! - `terminal`: Capture backend that records rendered terminal frames
//!
//! The boundary to the capture device is three traits: a `CaptureBackend`
//! grants a `DeviceStream` and opens a `Recorder` on it. Recorders are pulled
//! on a fixed interval by the manager, so chunks arrive in order.

mod manager;
pub mod terminal;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use futures::future::BoxFuture;

use crate::error::CaptureError;

pub use manager::{CaptureManager, CaptureOptions, GrantOutcome, PendingGrant};

/// Lifecycle of a capture session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureStatus {
    #[default]
    Idle,
    Requesting,
    Recording,
    Finalizing,
    Done,
    Failed,
}

impl CaptureStatus {
    /// A session currently holds (or is acquiring) the device.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            CaptureStatus::Requesting | CaptureStatus::Recording | CaptureStatus::Finalizing
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            CaptureStatus::Idle => "idle",
            CaptureStatus::Requesting => "requesting",
            CaptureStatus::Recording => "recording",
            CaptureStatus::Finalizing => "finalizing",
            CaptureStatus::Done => "done",
            CaptureStatus::Failed => "failed",
        }
    }
}

/// Why a recording ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    ExternalInterruption,
    DeviceLost,
    Cancelled,
}

/// Options passed to a backend when it opens a recorder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecorderOptions {
    pub bits_per_second: u64,
}

/// Container format negotiated for a session (a MIME type with optional
/// codec parameters, e.g. `video/webm;codecs=vp9,opus`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureFormat {
    pub mime: String,
}

impl CaptureFormat {
    pub fn new(mime: &str) -> Self {
        Self {
            mime: mime.trim().to_string(),
        }
    }

    /// MIME type without parameters.
    pub fn essence(&self) -> &str {
        self.mime.split(';').next().unwrap_or_default().trim()
    }

    pub fn extension(&self) -> &'static str {
        match self.essence() {
            "video/webm" | "audio/webm" => "webm",
            "video/mp4" => "mp4",
            "application/x-asciicast" => "cast",
            "text/plain" => "txt",
            _ => "bin",
        }
    }
}

/// Pick the first format in `priority` the backend supports.
pub fn negotiate_format<B: CaptureBackend + ?Sized>(
    backend: &B,
    priority: &[String],
) -> Result<CaptureFormat, CaptureError> {
    priority
        .iter()
        .find(|mime| backend.is_type_supported(mime))
        .map(|mime| CaptureFormat::new(mime))
        .ok_or_else(|| CaptureError::UnsupportedFormat {
            tried: priority.to_vec(),
        })
}

/// A live device grant. Implementations must also stop their tracks on drop.
pub trait DeviceStream: Send + 'static {
    /// Stop every track of the stream. Idempotent.
    fn stop_tracks(&mut self);
}

/// Encodes a device stream into chunks.
pub trait Recorder: Send + 'static {
    /// Everything captured since the previous flush, if anything.
    ///
    /// `Err(CaptureError::ExternalInterruption)` reports that the underlying
    /// track ended outside the recorder; data captured before that is still
    /// returned by `finish`.
    fn flush(&mut self) -> Result<Option<Vec<u8>>, CaptureError>;

    /// Stop encoding and return the final in-flight chunk.
    fn finish(&mut self) -> Result<Vec<u8>, CaptureError>;

    /// Release the device stream. Idempotent.
    fn release(&mut self);
}

/// Device/display capture grant and recorder factory.
pub trait CaptureBackend: Send + Sync + 'static {
    type Stream: DeviceStream;
    type Recorder: Recorder;

    fn is_type_supported(&self, mime: &str) -> bool;

    /// Ask for the device. May wait on the user and may be refused.
    fn acquire(&self) -> BoxFuture<'static, Result<Self::Stream, CaptureError>>;

    fn open_recorder(
        &self,
        stream: Self::Stream,
        format: &CaptureFormat,
        options: &RecorderOptions,
    ) -> Result<Self::Recorder, CaptureError>;
}

/// A finalized recording handed to the caller for export.
#[derive(Clone, Debug)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub format: CaptureFormat,
    pub created_at: DateTime<Local>,
    pub stop_reason: StopReason,
    pub chunk_count: usize,
    file_prefix: String,
}

impl Artifact {
    pub(crate) fn assemble(
        chunks: Vec<Vec<u8>>,
        format: CaptureFormat,
        stop_reason: StopReason,
        file_prefix: &str,
    ) -> Self {
        let chunk_count = chunks.len();
        Self {
            bytes: chunks.concat(),
            format,
            created_at: Local::now(),
            stop_reason,
            chunk_count,
            file_prefix: file_prefix.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `<prefix>-<YYYYMMDD-HHMMSS>.<ext>`
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}.{}",
            self.file_prefix,
            self.created_at.format("%Y%m%d-%H%M%S"),
            self.format.extension()
        )
    }

    /// Write the artifact into `dir` under its generated file name.
    pub async fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, &self.bytes).await?;
        tracing::info!(path = %path.display(), bytes = self.bytes.len(), "Recording saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe(&'static [&'static str]);

    struct NoStream;
    impl DeviceStream for NoStream {
        fn stop_tracks(&mut self) {}
    }

    struct NoRecorder;
    impl Recorder for NoRecorder {
        fn flush(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
            Ok(None)
        }
        fn finish(&mut self) -> Result<Vec<u8>, CaptureError> {
            Ok(Vec::new())
        }
        fn release(&mut self) {}
    }

    impl CaptureBackend for Probe {
        type Stream = NoStream;
        type Recorder = NoRecorder;

        fn is_type_supported(&self, mime: &str) -> bool {
            self.0.iter().any(|s| *s == mime)
        }

        fn acquire(&self) -> BoxFuture<'static, Result<NoStream, CaptureError>> {
            Box::pin(async { Ok(NoStream) })
        }

        fn open_recorder(
            &self,
            _stream: NoStream,
            _format: &CaptureFormat,
            _options: &RecorderOptions,
        ) -> Result<NoRecorder, CaptureError> {
            Ok(NoRecorder)
        }
    }

    fn webm_priority() -> Vec<String> {
        vec![
            "video/webm;codecs=vp9,opus".to_string(),
            "video/webm;codecs=vp8,opus".to_string(),
            "video/webm".to_string(),
        ]
    }

    #[test]
    fn test_negotiation_prefers_earliest_supported() {
        let backend = Probe(&["video/webm", "video/webm;codecs=vp8,opus"]);
        let format = negotiate_format(&backend, &webm_priority()).unwrap();
        assert_eq!(format.mime, "video/webm;codecs=vp8,opus");
        assert_eq!(format.essence(), "video/webm");
        assert_eq!(format.extension(), "webm");
    }

    #[test]
    fn test_negotiation_falls_back_to_baseline() {
        let backend = Probe(&["video/webm"]);
        let format = negotiate_format(&backend, &webm_priority()).unwrap();
        assert_eq!(format.mime, "video/webm");
    }

    #[test]
    fn test_negotiation_fails_when_nothing_matches() {
        let backend = Probe(&["video/mp4"]);
        let err = negotiate_format(&backend, &webm_priority()).unwrap_err();
        assert!(matches!(err, CaptureError::UnsupportedFormat { ref tried } if tried.len() == 3));
    }

    #[test]
    fn test_artifact_concatenates_chunks_and_names_file() {
        let artifact = Artifact::assemble(
            vec![b"ab".to_vec(), b"cd".to_vec(), b"e".to_vec()],
            CaptureFormat::new("application/x-asciicast;version=2"),
            StopReason::Requested,
            "villancico",
        );
        assert_eq!(artifact.bytes, b"abcde");
        assert_eq!(artifact.chunk_count, 3);

        let name = artifact.file_name();
        assert!(name.starts_with("villancico-"));
        assert!(name.ends_with(".cast"));
    }

    #[tokio::test]
    async fn test_artifact_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = Artifact::assemble(
            vec![b"hello".to_vec()],
            CaptureFormat::new("text/plain"),
            StopReason::Requested,
            "karaoke",
        );

        let path = artifact.save_to(&dir.path().join("out")).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
    }
}
