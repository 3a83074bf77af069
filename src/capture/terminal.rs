//! Terminal capture backend
//!
//! The view publishes every rendered frame to a `ScreenFeed`. Granting the
//! "display" subscribes to that feed; the recorder turns frames into an
//! asciicast v2 recording (replayable with `asciinema play`) or, as the
//! baseline format, a timestamped transcript of the lyric lines.
//!
//! The grant is refused with `PermissionDenied` when the recordings directory
//! is not writable, and with `DeviceUnavailable` when there is no terminal to
//! capture. Dropping the feed ends the track.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use super::{CaptureBackend, CaptureFormat, DeviceStream, Recorder, RecorderOptions};
use crate::error::CaptureError;

const FEED_CAPACITY: usize = 256;
const ASCIICAST: &str = "application/x-asciicast";
const TRANSCRIPT: &str = "text/plain";

/// One rendered terminal frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScreenFrame {
    pub width: u16,
    pub height: u16,
    pub rows: Vec<String>,
    /// The lyric line on screen, if any
    pub caption: Option<String>,
}

/// Fan-out of rendered frames to capture subscribers.
///
/// Cheap to publish into when nobody is recording.
pub struct ScreenFeed {
    tx: Arc<broadcast::Sender<Arc<ScreenFrame>>>,
    last_size: Arc<AtomicU32>,
}

impl ScreenFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            tx: Arc::new(tx),
            last_size: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    pub fn publish(&self, frame: ScreenFrame) {
        self.last_size.store(pack_size(frame.width, frame.height), Ordering::Relaxed);
        if self.is_subscribed() {
            // Err only means every receiver went away in the meantime.
            let _ = self.tx.send(Arc::new(frame));
        }
    }

    fn handle(&self) -> FeedHandle {
        FeedHandle {
            tx: Arc::downgrade(&self.tx),
            last_size: self.last_size.clone(),
        }
    }
}

impl Default for ScreenFeed {
    fn default() -> Self {
        Self::new()
    }
}

fn pack_size(width: u16, height: u16) -> u32 {
    ((width as u32) << 16) | height as u32
}

fn unpack_size(packed: u32) -> (u16, u16) {
    ((packed >> 16) as u16, (packed & 0xFFFF) as u16)
}

#[derive(Clone)]
struct FeedHandle {
    tx: Weak<broadcast::Sender<Arc<ScreenFrame>>>,
    last_size: Arc<AtomicU32>,
}

impl FeedHandle {
    fn size(&self) -> Option<(u16, u16)> {
        match self.last_size.load(Ordering::Relaxed) {
            0 => crossterm::terminal::size().ok(),
            packed => Some(unpack_size(packed)),
        }
    }
}

/// Subscription to the screen feed.
pub struct TerminalStream {
    rx: Option<broadcast::Receiver<Arc<ScreenFrame>>>,
    width: u16,
    height: u16,
}

impl TerminalStream {
    fn is_live(&self) -> bool {
        self.rx.is_some()
    }

    /// Drain every frame published since the last call. The bool is true when
    /// the feed has closed.
    fn drain(&mut self) -> (Vec<Arc<ScreenFrame>>, bool) {
        let mut frames = Vec::new();
        let Some(rx) = self.rx.as_mut() else {
            return (frames, true);
        };

        loop {
            match rx.try_recv() {
                Ok(frame) => frames.push(frame),
                Err(TryRecvError::Empty) => return (frames, false),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Capture lagged behind the screen feed");
                }
                Err(TryRecvError::Closed) => return (frames, true),
            }
        }
    }
}

impl DeviceStream for TerminalStream {
    fn stop_tracks(&mut self) {
        if self.rx.take().is_some() {
            tracing::debug!("Terminal capture stream released");
        }
    }
}

impl Drop for TerminalStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Asciicast,
    Transcript,
}

pub struct TerminalRecorder {
    stream: TerminalStream,
    encoding: Encoding,
    title: String,
    started: Instant,
    header_written: bool,
    pending: Vec<u8>,
    last_rows: Option<Vec<String>>,
    last_caption: Option<String>,
    ended: bool,
}

impl TerminalRecorder {
    fn new(stream: TerminalStream, encoding: Encoding, title: String) -> Self {
        Self {
            stream,
            encoding,
            title,
            started: Instant::now(),
            header_written: false,
            pending: Vec::new(),
            last_rows: None,
            last_caption: None,
            ended: false,
        }
    }

    fn write_header(&mut self) {
        if self.header_written {
            return;
        }
        self.header_written = true;

        match self.encoding {
            Encoding::Asciicast => {
                let header = serde_json::json!({
                    "version": 2,
                    "width": self.stream.width,
                    "height": self.stream.height,
                    "timestamp": chrono::Utc::now().timestamp(),
                    "title": self.title,
                });
                self.pending.extend_from_slice(header.to_string().as_bytes());
                self.pending.push(b'\n');
            }
            Encoding::Transcript => {
                let line = format!("# {}\n", self.title);
                self.pending.extend_from_slice(line.as_bytes());
            }
        }
    }

    fn encode(&mut self, frame: &ScreenFrame, elapsed: f64) {
        match self.encoding {
            Encoding::Asciicast => {
                if self.last_rows.as_ref() == Some(&frame.rows) {
                    return;
                }
                let data = format!("\u{1b}[H\u{1b}[2J{}", frame.rows.join("\r\n"));
                let event = serde_json::json!([(elapsed * 1000.0).round() / 1000.0, "o", data]);
                self.pending.extend_from_slice(event.to_string().as_bytes());
                self.pending.push(b'\n');
                self.last_rows = Some(frame.rows.clone());
            }
            Encoding::Transcript => {
                if frame.caption == self.last_caption {
                    return;
                }
                if let Some(caption) = &frame.caption {
                    let minutes = (elapsed / 60.0).floor() as u64;
                    let seconds = elapsed - (minutes * 60) as f64;
                    let line = format!("[{:02}:{:06.3}] {}\n", minutes, seconds, caption);
                    self.pending.extend_from_slice(line.as_bytes());
                }
                self.last_caption = frame.caption.clone();
            }
        }
    }

    fn pump(&mut self) {
        self.write_header();
        let (frames, closed) = self.stream.drain();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        for frame in frames {
            self.encode(&frame, elapsed);
        }
        if closed && !self.ended {
            self.ended = true;
        }
    }
}

impl Recorder for TerminalRecorder {
    fn flush(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        if !self.stream.is_live() && !self.ended {
            return Err(CaptureError::DeviceUnavailable("capture stream already released".to_string()));
        }
        self.pump();
        if self.ended {
            // Whatever was drained stays pending for `finish`.
            return Err(CaptureError::ExternalInterruption);
        }
        if self.pending.is_empty() {
            Ok(None)
        } else {
            Ok(Some(std::mem::take(&mut self.pending)))
        }
    }

    fn finish(&mut self) -> Result<Vec<u8>, CaptureError> {
        if self.stream.is_live() {
            self.pump();
        }
        self.release();
        Ok(std::mem::take(&mut self.pending))
    }

    fn release(&mut self) {
        self.stream.stop_tracks();
    }
}

/// Captures the terminal the karaoke view renders into.
pub struct TerminalCapture {
    feed: FeedHandle,
    output_dir: PathBuf,
    title: String,
}

impl TerminalCapture {
    pub fn new(feed: &ScreenFeed, output_dir: PathBuf, title: &str) -> Self {
        Self {
            feed: feed.handle(),
            output_dir,
            title: title.to_string(),
        }
    }
}

fn classify_io_error(context: &str, error: std::io::Error) -> CaptureError {
    let message = format!("{}: {}", context, error);
    if error.kind() == std::io::ErrorKind::PermissionDenied {
        CaptureError::PermissionDenied(message)
    } else {
        CaptureError::DeviceUnavailable(message)
    }
}

impl CaptureBackend for TerminalCapture {
    type Stream = TerminalStream;
    type Recorder = TerminalRecorder;

    fn is_type_supported(&self, mime: &str) -> bool {
        let format = CaptureFormat::new(mime);
        match format.essence() {
            ASCIICAST => {
                let version = format
                    .mime
                    .split(';')
                    .skip(1)
                    .find_map(|param| param.trim().strip_prefix("version="));
                matches!(version, None | Some("2"))
            }
            TRANSCRIPT => true,
            _ => false,
        }
    }

    fn acquire(&self) -> BoxFuture<'static, Result<TerminalStream, CaptureError>> {
        let feed = self.feed.clone();
        let output_dir = self.output_dir.clone();

        Box::pin(async move {
            tokio::fs::create_dir_all(&output_dir)
                .await
                .map_err(|e| classify_io_error("cannot create recordings directory", e))?;

            let probe = output_dir.join(".karaoke-write-probe");
            tokio::fs::write(&probe, b"")
                .await
                .map_err(|e| classify_io_error("recordings directory is not writable", e))?;
            let _ = tokio::fs::remove_file(&probe).await;

            let (width, height) = feed
                .size()
                .filter(|(w, h)| *w > 0 && *h > 0)
                .ok_or_else(|| CaptureError::DeviceUnavailable("no terminal to capture".to_string()))?;

            let tx = feed
                .tx
                .upgrade()
                .ok_or_else(|| CaptureError::DeviceUnavailable("screen feed is closed".to_string()))?;

            tracing::debug!(width, height, "Terminal capture granted");
            Ok(TerminalStream {
                rx: Some(tx.subscribe()),
                width,
                height,
            })
        })
    }

    fn open_recorder(
        &self,
        stream: TerminalStream,
        format: &CaptureFormat,
        _options: &RecorderOptions,
    ) -> Result<TerminalRecorder, CaptureError> {
        let encoding = match format.essence() {
            ASCIICAST => Encoding::Asciicast,
            TRANSCRIPT => Encoding::Transcript,
            _ => {
                return Err(CaptureError::UnsupportedFormat {
                    tried: vec![format.mime.clone()],
                });
            }
        };
        Ok(TerminalRecorder::new(stream, encoding, self.title.clone()))
    }
}
