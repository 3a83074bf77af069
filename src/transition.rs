//! Transition state machine for cue changes
//!
//! `Stable(cue)` → `Transitioning { from, to, style }` → `Stable(to)`.
//!
//! The style for a transition into cue `i` is `styles[i % styles.len()]`, so a
//! given timeline always plays back with the same sequence of styles. A cue
//! change that arrives mid-transition retargets and restarts the window; the
//! cue that was entering becomes the one leaving.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::sync::TickStamp;

/// Visual transition styles, selected by cue index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionStyle {
    Crossfade,
    KenBurns,
    SlideUp,
    Zoom,
    DipToBlack,
}

impl TransitionStyle {
    pub const ALL: [TransitionStyle; 5] = [
        TransitionStyle::Crossfade,
        TransitionStyle::KenBurns,
        TransitionStyle::SlideUp,
        TransitionStyle::Zoom,
        TransitionStyle::DipToBlack,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TransitionStyle::Crossfade => "Crossfade",
            TransitionStyle::KenBurns => "Ken Burns",
            TransitionStyle::SlideUp => "Slide up",
            TransitionStyle::Zoom => "Zoom",
            TransitionStyle::DipToBlack => "Dip to black",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TransitionPhase {
    Stable {
        cue: Option<usize>,
    },
    Transitioning {
        from: Option<usize>,
        to: usize,
        style: TransitionStyle,
        started_at: Instant,
        started_tick: u64,
    },
}

/// Snapshot of the machine for rendering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransitionState {
    pub active_style: Option<TransitionStyle>,
    pub current_cue: Option<usize>,
    pub previous_cue: Option<usize>,
    pub is_transitioning: bool,
    pub started_at_tick: Option<u64>,
    /// Linear progress through the window, `1.0` when stable.
    pub progress: f32,
}

impl TransitionState {
    /// Opacity of the incoming cue.
    pub fn enter_opacity(&self) -> f32 {
        if self.is_transitioning {
            ease_in_out(self.progress)
        } else {
            1.0
        }
    }

    /// Opacity of the outgoing cue, zero once retired.
    pub fn exit_opacity(&self) -> f32 {
        if self.is_transitioning && self.previous_cue.is_some() {
            1.0 - ease_in_out(self.progress)
        } else {
            0.0
        }
    }
}

/// Smooth-step easing on `[0, 1]`.
fn ease_in_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// A transition that has just begun.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionStarted {
    pub from: Option<usize>,
    pub to: usize,
    pub style: TransitionStyle,
    pub retargeted: bool,
}

pub struct TransitionMachine {
    styles: Vec<TransitionStyle>,
    window: Duration,
    phase: TransitionPhase,
}

impl TransitionMachine {
    /// An empty style table falls back to every style in declaration order.
    pub fn new(styles: Vec<TransitionStyle>, window: Duration) -> Self {
        let styles = if styles.is_empty() {
            TransitionStyle::ALL.to_vec()
        } else {
            styles
        };
        Self {
            styles,
            window,
            phase: TransitionPhase::Stable { cue: None },
        }
    }

    pub fn phase(&self) -> TransitionPhase {
        self.phase
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn style_for(&self, cue_index: usize) -> TransitionStyle {
        self.styles[cue_index % self.styles.len()]
    }

    /// The cue currently shown (or entering).
    pub fn current_cue(&self) -> Option<usize> {
        match self.phase {
            TransitionPhase::Stable { cue } => cue,
            TransitionPhase::Transitioning { to, .. } => Some(to),
        }
    }

    /// Feed the active cue from the latest resolution. Starts a transition
    /// only if the active cue differs from the current one.
    pub fn observe(&mut self, active: Option<usize>, tick: TickStamp) -> Option<TransitionStarted> {
        self.advance(tick.at);

        let current = self.current_cue();
        if active == current {
            return None;
        }

        let retargeted = matches!(self.phase, TransitionPhase::Transitioning { .. });

        let Some(to) = active else {
            tracing::debug!(from = ?current, "Cue cleared, settling without transition");
            self.phase = TransitionPhase::Stable { cue: None };
            return None;
        };

        let style = self.style_for(to);
        self.phase = TransitionPhase::Transitioning {
            from: current,
            to,
            style,
            started_at: tick.at,
            started_tick: tick.seq,
        };

        tracing::debug!(from = ?current, to, style = style.label(), retargeted, "Transition started");

        Some(TransitionStarted {
            from: current,
            to,
            style,
            retargeted,
        })
    }

    /// Retire the previous cue once the window has elapsed. Returns true when
    /// a transition completed.
    pub fn advance(&mut self, now: Instant) -> bool {
        if let TransitionPhase::Transitioning { to, started_at, .. } = self.phase {
            if now.saturating_duration_since(started_at) >= self.window {
                self.phase = TransitionPhase::Stable { cue: Some(to) };
                tracing::trace!(cue = to, "Transition settled");
                return true;
            }
        }
        false
    }

    pub fn reset(&mut self) {
        self.phase = TransitionPhase::Stable { cue: None };
    }

    pub fn state(&self, now: Instant) -> TransitionState {
        match self.phase {
            TransitionPhase::Stable { cue } => TransitionState {
                active_style: None,
                current_cue: cue,
                previous_cue: None,
                is_transitioning: false,
                started_at_tick: None,
                progress: 1.0,
            },
            TransitionPhase::Transitioning {
                from,
                to,
                style,
                started_at,
                started_tick,
            } => {
                let elapsed = now.saturating_duration_since(started_at);
                let progress = if self.window.is_zero() {
                    1.0
                } else {
                    (elapsed.as_secs_f32() / self.window.as_secs_f32()).min(1.0)
                };
                TransitionState {
                    active_style: Some(style),
                    current_cue: Some(to),
                    previous_cue: from,
                    is_transitioning: true,
                    started_at_tick: Some(started_tick),
                    progress,
                }
            }
        }
    }
}
