//! Time-synchronized lyric playback with screen recording
//!
//! A timeline of timestamped cues is played back against an audio file. The
//! sync clock samples the media position every frame, resolves the active cue
//! and drives transitions between cues; the capture session records what is
//! on screen and hands back one artifact when the recording ends.

pub mod audio;
pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod model;
pub mod sync;
pub mod transition;
pub mod view;
