//! # Timer: Lazy Tour Countdown
//!
//! The countdown for the entrant at the front of the line. There is no
//! background clock: every state stores enough to recompute the remaining
//! time from "now" on demand, so repeated reads never accumulate drift.
//!
//! ## States
//!
//! | State | Meaning | Remaining |
//! |-------|---------|-----------|
//! | `Idle { paused: false }` | nobody waiting | absent |
//! | `Idle { paused: true }` | nobody waiting, operator paused | absent |
//! | `Running` | countdown active | `remaining_at_start - elapsed` |
//! | `Paused` | countdown frozen | frozen value |
//!
//! `Idle { paused: true }` latches a pause made while the line was empty:
//! when somebody registers, the countdown starts out `Paused` at the full
//! tour length instead of `Running`.
//!
//! Advancing the queue on expiry is the engine's job; this type only
//! answers whether the countdown is due.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Timer {
    Idle {
        paused: bool,
    },
    Running {
        started_at: DateTime<Utc>,
        remaining_at_start: i64,
    },
    Paused {
        remaining: i64,
    },
}

impl Default for Timer {
    fn default() -> Self {
        Timer::Idle { paused: false }
    }
}

/// Whole seconds elapsed since `since`, never negative.
fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - since).num_seconds().max(0)
}

impl Timer {
    pub fn label(&self) -> &'static str {
        match self {
            Timer::Idle { .. } => "idle",
            Timer::Running { .. } => "running",
            Timer::Paused { .. } => "paused",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Timer::Idle { .. })
    }

    /// Operator-facing paused flag, including the idle latch.
    pub fn is_paused(&self) -> bool {
        matches!(self, Timer::Paused { .. } | Timer::Idle { paused: true })
    }

    /// Seconds left on the countdown, floored at zero. `None` while idle.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        match *self {
            Timer::Idle { .. } => None,
            Timer::Paused { remaining } => Some(remaining.max(0)),
            Timer::Running {
                started_at,
                remaining_at_start,
            } => Some((remaining_at_start - elapsed_secs(started_at, now)).max(0)),
        }
    }

    /// True when a running countdown has reached zero.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Timer::Running { .. }) && self.remaining(now) == Some(0)
    }

    /// Instant a running countdown reaches zero. `None` unless running.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match *self {
            Timer::Running {
                started_at,
                remaining_at_start,
            } => Some(started_at + chrono::Duration::seconds(remaining_at_start.max(0))),
            _ => None,
        }
    }

    /// Start a full countdown if none is active. Called when the line becomes non-empty.
    pub fn activate(&mut self, now: DateTime<Utc>, tour_length: i64) {
        if let Timer::Idle { paused } = *self {
            *self = if paused {
                Timer::Paused {
                    remaining: tour_length,
                }
            } else {
                Timer::Running {
                    started_at: now,
                    remaining_at_start: tour_length,
                }
            };
        }
    }

    /// Drop the countdown, keeping the paused latch. Called when the line empties.
    pub fn deactivate(&mut self) {
        *self = Timer::Idle {
            paused: self.is_paused(),
        };
    }

    /// Give the (new) front entrant a full tour. Idle stays idle.
    pub fn restart(&mut self, now: DateTime<Utc>, tour_length: i64) {
        match self {
            Timer::Idle { .. } => {}
            Timer::Running { .. } => {
                *self = Timer::Running {
                    started_at: now,
                    remaining_at_start: tour_length,
                }
            }
            Timer::Paused { .. } => {
                *self = Timer::Paused {
                    remaining: tour_length,
                }
            }
        }
    }

    /// Freeze the countdown at its current value. Already paused is a no-op.
    pub fn pause(&mut self, now: DateTime<Utc>) {
        match *self {
            Timer::Running { .. } => {
                let remaining = self.remaining(now).unwrap_or(0);
                *self = Timer::Paused { remaining };
            }
            Timer::Idle { .. } => *self = Timer::Idle { paused: true },
            Timer::Paused { .. } => {}
        }
    }

    /// Continue from the frozen value. Already running is a no-op.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        match *self {
            Timer::Paused { remaining } => {
                *self = Timer::Running {
                    started_at: now,
                    remaining_at_start: remaining,
                }
            }
            Timer::Idle { .. } => *self = Timer::Idle { paused: false },
            Timer::Running { .. } => {}
        }
    }
}
