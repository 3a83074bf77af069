//! Cue timeline and position lookup

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TimelineError;

/// A single lyric/visual cue point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cue {
    #[serde(alias = "time")]
    pub timestamp_seconds: f64,
    #[serde(alias = "section")]
    pub section_label: String,
    pub text: String,
    #[serde(alias = "imageKey", default)]
    pub visual_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_description: Option<String>,
}

impl Cue {
    pub fn new(timestamp_seconds: f64, section_label: &str, text: &str, visual_key: &str) -> Self {
        Self {
            timestamp_seconds,
            section_label: section_label.to_string(),
            text: text.to_string(),
            visual_key: visual_key.to_string(),
            visual_description: None,
        }
    }

    /// Expand a visual URL template for this cue.
    ///
    /// Supported placeholders: `{prompt}` (percent-encoded description, or the
    /// visual key when there is none), `{key}` and `{seed}` (the timestamp).
    pub fn visual_url(&self, template: &str) -> String {
        let prompt = self
            .visual_description
            .as_deref()
            .unwrap_or(&self.visual_key);
        template
            .replace("{prompt}", &percent_encode(prompt))
            .replace("{key}", &percent_encode(&self.visual_key))
            .replace("{seed}", &format!("{}", self.timestamp_seconds))
    }
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Projection of a playback position onto the timeline.
///
/// Recomputed on every tick, never stored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyncResult<'a> {
    pub active_index: Option<usize>,
    pub current: Option<&'a Cue>,
    pub next: Option<&'a Cue>,
}

/// Immutable, validated sequence of cues ordered by timestamp.
#[derive(Clone, Debug)]
pub struct Timeline {
    cues: Vec<Cue>,
}

impl Timeline {
    /// Validate and wrap a cue list: non-empty, finite non-negative
    /// timestamps, strictly increasing.
    pub fn new(cues: Vec<Cue>) -> Result<Self, TimelineError> {
        if cues.is_empty() {
            return Err(TimelineError::Empty);
        }

        for (index, cue) in cues.iter().enumerate() {
            let timestamp = cue.timestamp_seconds;
            if !timestamp.is_finite() || timestamp < 0.0 {
                return Err(TimelineError::InvalidTimestamp { index, timestamp });
            }
            if index == 0 {
                continue;
            }
            let previous = cues[index - 1].timestamp_seconds;
            if timestamp == previous {
                return Err(TimelineError::Duplicate { index, timestamp });
            }
            if timestamp < previous {
                return Err(TimelineError::Unsorted {
                    index,
                    timestamp,
                    previous,
                });
            }
        }

        Ok(Self { cues })
    }

    pub fn from_json_str(json: &str) -> Result<Self, TimelineError> {
        let cues: Vec<Cue> = serde_json::from_str(json)?;
        Self::new(cues)
    }

    pub fn load(path: &Path) -> Result<Self, TimelineError> {
        let content = std::fs::read_to_string(path).map_err(|source| TimelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let timeline = Self::from_json_str(&content)?;
        tracing::info!(path = %path.display(), cues = timeline.len(), "Timeline loaded");
        Ok(timeline)
    }

    /// Find the active cue for `position_secs`: the last cue whose timestamp
    /// is `<=` the position. Positions before the first cue (and NaN) have no
    /// active cue and preview the first one.
    pub fn resolve(&self, position_secs: f64) -> SyncResult<'_> {
        // NaN compares false, so it lands before the first cue.
        let after = self
            .cues
            .partition_point(|cue| cue.timestamp_seconds <= position_secs);

        match after.checked_sub(1) {
            Some(index) => SyncResult {
                active_index: Some(index),
                current: self.cues.get(index),
                next: self.cues.get(index + 1),
            },
            None => SyncResult {
                active_index: None,
                current: None,
                next: self.cues.first(),
            },
        }
    }

    pub fn get(&self, index: usize) -> Option<&Cue> {
        self.cues.get(index)
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    /// Always false; a timeline is validated non-empty.
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn first(&self) -> &Cue {
        &self.cues[0]
    }

    pub fn last(&self) -> &Cue {
        &self.cues[self.cues.len() - 1]
    }
}
