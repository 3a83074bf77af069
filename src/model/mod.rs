//! Model module - Application state and data types
//!
//! This module contains the data structures shared by the sync core and the UI.
//! It is organized into submodules by responsibility:
//!
//! - `timeline`: Cue timeline and position lookup
//! - `playback`: Player state and the media source boundary
//! - `types`: UI state

mod playback;
mod timeline;
mod types;

pub use playback::{MediaEvent, MediaSource, PlaybackState};
pub(crate) use playback::{sanitize_duration, sanitize_position};
pub use timeline::{Cue, SyncResult, Timeline};
pub use types::UiState;
