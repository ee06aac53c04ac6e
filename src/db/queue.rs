//! Queue snapshot load/save against PostgreSQL.
//!
//! A save replaces the whole queue inside one transaction. The settings row
//! is locked with `FOR UPDATE` first and its revision compared, so two saves
//! racing each other serialize and the older one is dropped.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

use super::Database;
use crate::engine::QueueEngine;
use crate::entrant::Entrant;
use crate::store::{EntrantStore, Snapshot};
use crate::timer::Timer;

#[derive(sqlx::FromRow)]
struct EntrantRow {
    id: i64,
    name: String,
    status: String,
    position: Option<i32>,
    added_at: DateTime<Utc>,
    passed_at: Option<DateTime<Utc>>,
    passed_seq: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    revision: i64,
    tour_length_seconds: i64,
    timer_state: String,
    timer_paused: bool,
    started_at: Option<DateTime<Utc>>,
    remaining_seconds: Option<i64>,
    next_id: i64,
    next_passed_seq: i64,
    saved_at: DateTime<Utc>,
}

impl TryFrom<EntrantRow> for Entrant {
    type Error = anyhow::Error;

    fn try_from(row: EntrantRow) -> Result<Self> {
        Ok(Entrant {
            id: row.id,
            name: row.name,
            status: row.status.parse()?,
            position: row.position.and_then(|p| u32::try_from(p).ok()),
            added_at: row.added_at,
            passed_at: row.passed_at,
            passed_seq: row.passed_seq.map(|s| s.max(0) as u64),
        })
    }
}

/// Countdown as stored in the settings row.
struct TimerColumns {
    state: &'static str,
    paused: bool,
    started_at: Option<DateTime<Utc>>,
    remaining: Option<i64>,
}

fn timer_columns(timer: &Timer) -> TimerColumns {
    match *timer {
        Timer::Idle { paused } => TimerColumns {
            state: "idle",
            paused,
            started_at: None,
            remaining: None,
        },
        Timer::Running {
            started_at,
            remaining_at_start,
        } => TimerColumns {
            state: "running",
            paused: false,
            started_at: Some(started_at),
            remaining: Some(remaining_at_start),
        },
        Timer::Paused { remaining } => TimerColumns {
            state: "paused",
            paused: true,
            started_at: None,
            remaining: Some(remaining),
        },
    }
}

/// Inverse of [`timer_columns`]. Incomplete rows degrade to idle.
fn timer_from_row(row: &SettingsRow) -> Timer {
    match (row.timer_state.as_str(), row.started_at, row.remaining_seconds) {
        ("running", Some(started_at), Some(remaining_at_start)) => Timer::Running {
            started_at,
            remaining_at_start,
        },
        ("paused", _, Some(remaining)) => Timer::Paused { remaining },
        _ => Timer::Idle {
            paused: row.timer_paused,
        },
    }
}

impl Database {
    /// Load the persisted queue. `None` when no snapshot was ever saved.
    pub async fn load_snapshot(&self) -> Result<Option<Snapshot>> {
        let settings = sqlx::query_as::<_, SettingsRow>(
            "SELECT revision, tour_length_seconds, timer_state, timer_paused, started_at,
                    remaining_seconds, next_id, next_passed_seq, saved_at
             FROM queue_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        let Some(settings) = settings else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, EntrantRow>(
            "SELECT id, name, status, position, added_at, passed_at, passed_seq
             FROM queue_entrants ORDER BY status, position, id",
        )
        .fetch_all(&self.pool)
        .await?;
        let entrants = rows
            .into_iter()
            .map(Entrant::try_from)
            .collect::<Result<Vec<_>>>()?;

        let store = EntrantStore::from_parts(
            entrants,
            settings.next_id,
            settings.next_passed_seq.max(1) as u64,
        );
        let timer = timer_from_row(&settings);
        let queue =
            QueueEngine::from_parts(store, settings.tour_length_seconds, timer, Utc::now());
        info!(
            revision = settings.revision,
            waiting = queue.waiting_len(),
            "queue snapshot loaded from postgres"
        );
        Ok(Some(Snapshot {
            revision: settings.revision.max(0) as u64,
            saved_at: settings.saved_at,
            queue,
        }))
    }

    /// Replace the persisted queue with `snapshot`. Returns `false` and writes
    /// nothing when the stored revision is already at least as new.
    pub async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<bool> {
        let revision = snapshot.revision as i64;
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO queue_settings (id) VALUES (1) ON CONFLICT (id) DO NOTHING")
            .execute(&mut *tx)
            .await?;
        let stored: i64 =
            sqlx::query_scalar("SELECT revision FROM queue_settings WHERE id = 1 FOR UPDATE")
                .fetch_one(&mut *tx)
                .await?;
        if stored >= revision {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM queue_entrants")
            .execute(&mut *tx)
            .await?;
        for e in snapshot.queue.store().all() {
            sqlx::query(
                "INSERT INTO queue_entrants (id, name, status, position, added_at, passed_at, passed_seq)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(e.id)
            .bind(&e.name)
            .bind(e.status.as_str())
            .bind(e.position.map(|p| p as i32))
            .bind(e.added_at)
            .bind(e.passed_at)
            .bind(e.passed_seq.map(|s| s as i64))
            .execute(&mut *tx)
            .await?;
        }

        let timer = timer_columns(snapshot.queue.timer());
        sqlx::query(
            "UPDATE queue_settings SET
               revision = $1,
               tour_length_seconds = $2,
               timer_state = $3,
               timer_paused = $4,
               started_at = $5,
               remaining_seconds = $6,
               next_id = $7,
               next_passed_seq = $8,
               saved_at = $9
             WHERE id = 1",
        )
        .bind(revision)
        .bind(snapshot.queue.tour_length_seconds())
        .bind(timer.state)
        .bind(timer.paused)
        .bind(timer.started_at)
        .bind(timer.remaining)
        .bind(snapshot.queue.store().next_id())
        .bind(snapshot.queue.store().next_passed_seq() as i64)
        .bind(snapshot.saved_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Delete every entrant and the settings row.
    pub async fn clear_queue(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM queue_entrants")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM queue_settings")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn settings_for(timer: &Timer) -> SettingsRow {
        let cols = timer_columns(timer);
        SettingsRow {
            revision: 1,
            tour_length_seconds: 60,
            timer_state: cols.state.to_string(),
            timer_paused: cols.paused,
            started_at: cols.started_at,
            remaining_seconds: cols.remaining,
            next_id: 1,
            next_passed_seq: 1,
            saved_at: t0(),
        }
    }

    #[test]
    fn timer_columns_survive_the_row() {
        let timers = [
            Timer::Idle { paused: false },
            Timer::Idle { paused: true },
            Timer::Running {
                started_at: t0(),
                remaining_at_start: 45,
            },
            Timer::Paused { remaining: 12 },
        ];
        for timer in timers {
            assert_eq!(timer_from_row(&settings_for(&timer)), timer);
        }
    }

    #[test]
    fn incomplete_running_row_degrades_to_idle() {
        let mut row = settings_for(&Timer::Running {
            started_at: t0(),
            remaining_at_start: 45,
        });
        row.started_at = None;
        assert_eq!(timer_from_row(&row), Timer::Idle { paused: false });
    }

    #[test]
    fn entrant_row_rejects_unknown_status() {
        let row = EntrantRow {
            id: 1,
            name: "A".into(),
            status: "gone".into(),
            position: None,
            added_at: t0(),
            passed_at: None,
            passed_seq: None,
        };
        assert!(Entrant::try_from(row).is_err());
    }
}
