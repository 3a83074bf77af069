//! Local audio playback on the default output device

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};

use crate::error::MediaError;
use crate::model::MediaSource;

/// A decoded audio file feeding one sink.
///
/// The sink empties when the track runs out; seeking or playing after that
/// decodes the file again.
pub struct AudioBackend {
    path: PathBuf,
    // Must outlive the sink
    _stream: OutputStream,
    sink: Sink,
    duration_secs: f64,
    error: Option<MediaError>,
}

impl AudioBackend {
    pub fn open(path: &Path) -> Result<Self, MediaError> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| MediaError::MediaSourceError(format!("No audio output device: {}", e)))?;
        // rodio prints to stderr on drop, which would land on top of the TUI
        stream.log_on_drop(false);

        let sink = Sink::connect_new(&stream.mixer());
        sink.pause();

        let decoder = Self::decode(path)?;
        let duration_secs = decoder
            .total_duration()
            .map(|d| d.as_secs_f64())
            .unwrap_or(f64::NAN);
        sink.append(decoder);

        tracing::info!(path = %path.display(), duration_secs, "Audio loaded");

        Ok(Self {
            path: path.to_path_buf(),
            _stream: stream,
            sink,
            duration_secs,
            error: None,
        })
    }

    fn decode(path: &Path) -> Result<Decoder<BufReader<File>>, MediaError> {
        let file = File::open(path).map_err(|e| {
            MediaError::MediaSourceError(format!("Cannot open {}: {}", path.display(), e))
        })?;
        Decoder::new(BufReader::new(file)).map_err(|e| {
            MediaError::MediaSourceError(format!("Cannot decode {}: {}", path.display(), e))
        })
    }

    /// Queue the file again after the sink ran dry. Leaves the sink paused.
    fn reload(&mut self) -> Result<(), MediaError> {
        let decoder = Self::decode(&self.path)?;
        self.sink.pause();
        self.sink.append(decoder);
        tracing::debug!(path = %self.path.display(), "Audio reloaded");
        Ok(())
    }
}

impl MediaSource for AudioBackend {
    fn current_time(&self) -> f64 {
        if self.ended() && self.duration_secs.is_finite() {
            self.duration_secs
        } else {
            self.sink.get_pos().as_secs_f64()
        }
    }

    fn set_current_time(&mut self, seconds: f64) {
        if self.sink.empty() {
            if let Err(e) = self.reload() {
                tracing::error!(error = %e, "Failed to reload audio for seek");
                self.error = Some(e);
                return;
            }
        }

        let Ok(target) = Duration::try_from_secs_f64(seconds.max(0.0)) else {
            tracing::warn!(seconds, "Ignoring seek to a non-finite position");
            return;
        };
        if let Err(e) = self.sink.try_seek(target) {
            tracing::warn!(error = %e, seconds, "Seek failed");
            self.error = Some(MediaError::MediaSourceError(format!("Seek failed: {}", e)));
        }
    }

    fn duration(&self) -> f64 {
        self.duration_secs
    }

    fn paused(&self) -> bool {
        self.sink.is_paused() || self.sink.empty()
    }

    fn ended(&self) -> bool {
        self.sink.empty()
    }

    async fn play(&mut self) -> Result<(), MediaError> {
        if self.sink.empty() {
            self.reload()?;
        }
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn take_error(&mut self) -> Option<MediaError> {
        self.error.take()
    }
}
