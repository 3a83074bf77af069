//! Sync clock: per-frame sampling of the media source
//!
//! The clock only schedules ticks while playback is active. Each tick reads
//! position/duration straight from the media source (through the playback
//! controller) and projects it onto the timeline.

use std::future;
use std::time::{Duration, Instant};

use tokio::time::{Interval, MissedTickBehavior};

use crate::controller::PlaybackController;
use crate::model::{MediaSource, PlaybackState, SyncResult, Timeline};

/// Monotonic tick identity handed to the transition machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStamp {
    pub seq: u64,
    pub at: Instant,
}

/// Result of sampling the media source on one tick.
#[derive(Clone, Copy, Debug)]
pub struct SyncFrame<'a> {
    pub tick: TickStamp,
    pub state: PlaybackState,
    pub sync: SyncResult<'a>,
    /// True on the tick where the source first reports `ended`.
    pub ended_now: bool,
}

pub struct SyncClock {
    period: Duration,
    ticker: Option<Interval>,
    seq: u64,
}

impl SyncClock {
    /// `frame_rate` is clamped to `1..=240` ticks per second.
    pub fn new(frame_rate: u32) -> Self {
        let frame_rate = frame_rate.clamp(1, 240);
        Self {
            period: Duration::from_secs_f64(1.0 / frame_rate as f64),
            ticker: None,
            seq: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Start scheduling ticks. Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.ticker.is_some() {
            return false;
        }
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        tracing::debug!(period_ms = self.period.as_millis() as u64, "Sync clock started");
        true
    }

    /// Stop scheduling ticks. The pending tick is cancelled with the interval.
    pub fn stop(&mut self) {
        if self.ticker.take().is_some() {
            tracing::debug!(ticks = self.seq, "Sync clock stopped");
        }
    }

    /// Wait for the next tick. Never completes while the clock is stopped.
    pub async fn tick(&mut self) -> TickStamp {
        match self.ticker.as_mut() {
            Some(ticker) => {
                let at = ticker.tick().await.into_std();
                self.seq += 1;
                TickStamp { seq: self.seq, at }
            }
            None => future::pending().await,
        }
    }

    /// Stamp for a resolution that happens outside the tick loop (seek while
    /// paused, reset).
    pub fn stamp_now(&mut self) -> TickStamp {
        self.seq += 1;
        TickStamp {
            seq: self.seq,
            at: Instant::now(),
        }
    }

    /// Sample the source of truth and resolve the active cue.
    ///
    /// Stops the clock when the sample shows playback is no longer active.
    pub fn sample<'a, M: MediaSource>(
        &mut self,
        tick: TickStamp,
        playback: &mut PlaybackController<M>,
        timeline: &'a Timeline,
    ) -> SyncFrame<'a> {
        let was_ended = playback.state().has_ended;
        let state = playback.reconcile();
        let sync = timeline.resolve(state.position_secs);

        tracing::trace!(
            seq = tick.seq,
            position_secs = state.position_secs,
            cue = ?sync.active_index,
            "Sync tick"
        );

        if !state.is_playing {
            self.stop();
        }

        SyncFrame {
            tick,
            state,
            sync,
            ended_now: state.has_ended && !was_ended,
        }
    }
}
