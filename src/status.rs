//! Status projection: the read model polled by clients.
//!
//! [`project`] is a pure function of the engine state. [`observe`] is what a
//! status query runs: it evaluates the lazy countdown first, so an expired
//! tour is advanced exactly once and the projection already reflects it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::QueueEngine;
use crate::entrant::{Entrant, EntrantId, Status};

/// Client-facing form of an entrant record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrantView {
    pub id: EntrantId,
    pub name: String,
    pub status: Status,
    pub position: Option<u32>,
    pub added_at: DateTime<Utc>,
    pub passed_at: Option<DateTime<Utc>>,
}

impl From<&Entrant> for EntrantView {
    fn from(e: &Entrant) -> Self {
        EntrantView {
            id: e.id,
            name: e.name.clone(),
            status: e.status,
            position: e.position,
            added_at: e.added_at,
            passed_at: e.passed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitingView {
    #[serde(flatten)]
    pub entrant: EntrantView,
    pub eta_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub waiting: Vec<WaitingView>,
    pub passed: Vec<EntrantView>,
    pub time_remaining_seconds: Option<i64>,
    pub tour_length_seconds: i64,
    pub timer_paused: bool,
    pub timer_state: &'static str,
}

/// Estimated wait for the entrant at `position`: one tour per entrant ahead.
pub fn eta_seconds(position: u32, tour_length_seconds: i64) -> i64 {
    (position as i64 - 1).max(0) * tour_length_seconds.max(0)
}

/// Build the status view without touching the engine.
pub fn project(engine: &QueueEngine, now: DateTime<Utc>) -> QueueStatus {
    let tour = engine.tour_length_seconds();
    let waiting = engine
        .waiting()
        .into_iter()
        .map(|e| WaitingView {
            entrant: EntrantView::from(e),
            eta_seconds: eta_seconds(e.position.unwrap_or(1), tour),
        })
        .collect();
    let passed = engine.passed().into_iter().map(EntrantView::from).collect();
    let timer = engine.timer();
    QueueStatus {
        waiting,
        passed,
        time_remaining_seconds: timer.remaining(now),
        tour_length_seconds: tour,
        timer_paused: timer.is_paused(),
        timer_state: timer.label(),
    }
}

/// Result of a status query: what the countdown advanced, if anything, and the view.
#[derive(Debug, Clone)]
pub struct Observation {
    pub advanced: Option<Entrant>,
    pub status: QueueStatus,
}

/// Run the lazy countdown evaluation, then project.
pub fn observe(engine: &mut QueueEngine, now: DateTime<Utc>) -> Observation {
    let advanced = engine.tick(now);
    Observation {
        advanced,
        status: project(engine, now),
    }
}
