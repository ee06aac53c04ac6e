//! # Service: Serialized Access to the Queue
//!
//! [`QueueService`] is the handle every request goes through. It owns the
//! single [`QueueEngine`] behind one mutex, so commands and the lazy
//! countdown evaluation never interleave.
//!
//! ## Command path
//!
//! 1. Lock, read the clock, run the engine command.
//! 2. On success, bump the revision and clone a [`Snapshot`]; unlock.
//! 3. Write the snapshot to the [`Backend`] outside the lock.
//!
//! Step 3 keeps I/O out of the critical section. Backends drop snapshots
//! older than the one they hold, so out-of-order writes are harmless, and
//! a failed write is healed by the next one since every snapshot is the
//! full state. A failed write is logged and counted, never reported as a
//! failed command: the in-memory engine is authoritative.
//!
//! ## Countdown
//!
//! Automatic advancement happens only inside [`QueueService::status`].
//! There is no background task; a queue nobody polls does not advance.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::engine::QueueEngine;
use crate::entrant::{Entrant, EntrantId, Status};
use crate::error::QueueError;
use crate::lock_or_recover;
use crate::prom_metrics::{AdvanceLabel, Metrics};
use crate::status::{self, QueueStatus};
use crate::store::{Backend, Snapshot};

struct Inner {
    engine: QueueEngine,
    revision: u64,
}

impl Inner {
    fn commit(&mut self, now: DateTime<Utc>) -> Snapshot {
        self.revision += 1;
        Snapshot {
            revision: self.revision,
            saved_at: now,
            queue: self.engine.clone(),
        }
    }
}

pub struct QueueService {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    backend: Backend,
    metrics: Arc<Metrics>,
}

impl QueueService {
    /// Open the service on `backend`, restoring the newest snapshot if there
    /// is one, otherwise starting an empty line with `default_tour_length`.
    pub async fn open(
        backend: Backend,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        default_tour_length: i64,
    ) -> anyhow::Result<Self> {
        let now = clock.now();
        let (engine, revision) = match backend.load().await? {
            Some(snapshot) => {
                let queue = snapshot.queue;
                let engine = QueueEngine::from_parts(
                    queue.store().clone(),
                    queue.tour_length_seconds(),
                    *queue.timer(),
                    now,
                );
                info!(
                    backend = backend.describe(),
                    revision = snapshot.revision,
                    waiting = engine.waiting_len(),
                    "queue restored"
                );
                (engine, snapshot.revision)
            }
            None => {
                info!(
                    backend = backend.describe(),
                    tour_length_seconds = default_tour_length,
                    "starting empty queue"
                );
                (QueueEngine::new(default_tour_length), 0)
            }
        };
        let service = QueueService {
            inner: Mutex::new(Inner { engine, revision }),
            clock,
            backend,
            metrics,
        };
        service.refresh_gauges_now();
        Ok(service)
    }

    /// Service with a fresh queue and nothing persisted.
    pub fn in_memory(clock: Arc<dyn Clock>, metrics: Arc<Metrics>, tour_length: i64) -> Self {
        QueueService {
            inner: Mutex::new(Inner {
                engine: QueueEngine::new(tour_length),
                revision: 0,
            }),
            clock,
            backend: Backend::Memory,
            metrics,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn metrics_handle(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Readiness: the backend must be reachable.
    pub async fn health_check(&self) -> anyhow::Result<()> {
        self.backend.health_check().await
    }

    pub fn revision(&self) -> u64 {
        lock_or_recover(&self.inner).revision
    }

    /// Copy of the current engine state, without running the countdown.
    pub fn engine_snapshot(&self) -> QueueEngine {
        lock_or_recover(&self.inner).engine.clone()
    }

    // ── Read path ───────────────────────────────────────────────

    /// Evaluate the countdown, then project the status view.
    pub async fn status(&self) -> QueueStatus {
        let (observation, snapshot) = {
            let mut inner = lock_or_recover(&self.inner);
            let now = self.clock.now();
            let observation = status::observe(&mut inner.engine, now);
            let snapshot = observation.advanced.as_ref().map(|_| inner.commit(now));
            (observation, snapshot)
        };
        if let Some(ref passed) = observation.advanced {
            self.metrics
                .advances
                .get_or_create(&AdvanceLabel::timer())
                .inc();
            info!(id = passed.id, "countdown advanced the queue");
        }
        if let Some(snapshot) = snapshot {
            self.persist(snapshot).await;
        }
        observation.status
    }

    // ── Commands ────────────────────────────────────────────────

    pub async fn register(&self, name: &str) -> Result<Entrant, QueueError> {
        let entrant = self.apply(|e, now| e.register(name, now)).await?;
        self.metrics.registrations.inc();
        Ok(entrant)
    }

    pub async fn move_to(
        &self,
        id: EntrantId,
        to: Status,
        to_position: Option<i64>,
    ) -> Result<(), QueueError> {
        self.apply(|e, now| e.move_to(id, to, to_position, now))
            .await
    }

    pub async fn reposition(&self, id: EntrantId, to_position: i64) -> Result<(), QueueError> {
        self.apply(|e, now| e.reposition(id, to_position, now))
            .await
    }

    pub async fn reorder(&self, ids: &[EntrantId]) -> Result<(), QueueError> {
        self.apply(|e, now| e.reorder(ids, now)).await
    }

    /// Manual "Next". `None` when nobody is waiting; nothing is persisted then.
    pub async fn advance(&self) -> Option<Entrant> {
        let passed = self.apply_optional(|e, now| e.advance(now)).await;
        if passed.is_some() {
            self.metrics
                .advances
                .get_or_create(&AdvanceLabel::manual())
                .inc();
        }
        passed
    }

    /// Manual "Back". `None` when nobody has passed.
    pub async fn retreat(&self) -> Option<Entrant> {
        self.apply_optional(|e, now| e.retreat(now)).await
    }

    pub async fn delete(&self, id: EntrantId) -> Result<Entrant, QueueError> {
        self.apply(|e, now| e.delete(id, now)).await
    }

    pub async fn pause(&self) -> Option<i64> {
        self.apply_infallible(|e, now| {
            e.pause(now);
            e.time_remaining(now)
        })
        .await
    }

    pub async fn resume(&self) -> Option<i64> {
        self.apply_infallible(|e, now| {
            e.resume(now);
            e.time_remaining(now)
        })
        .await
    }

    pub async fn set_tour_length_minutes(&self, minutes: i64) -> Result<i64, QueueError> {
        self.apply(|e, now| {
            e.set_tour_length_minutes(minutes, now)?;
            Ok(e.tour_length_seconds())
        })
        .await
    }

    pub async fn set_tour_length_seconds(&self, seconds: i64) -> Result<i64, QueueError> {
        self.apply(|e, now| {
            e.set_tour_length_seconds(seconds, now)?;
            Ok(e.tour_length_seconds())
        })
        .await
    }

    pub async fn clear_entrants(&self) {
        self.apply_infallible(|e, _| e.clear_entrants()).await
    }

    pub async fn reset(&self) {
        self.apply_infallible(|e, _| e.reset()).await
    }

    // ── Internals ───────────────────────────────────────────────

    /// Run a fallible engine command under the lock; persist on success.
    async fn apply<T>(
        &self,
        op: impl FnOnce(&mut QueueEngine, DateTime<Utc>) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let (out, snapshot) = {
            let mut inner = lock_or_recover(&self.inner);
            let now = self.clock.now();
            let out = op(&mut inner.engine, now)?;
            (out, inner.commit(now))
        };
        self.persist(snapshot).await;
        Ok(out)
    }

    /// Like [`Self::apply`] for commands that report "nothing to do" as `None`.
    async fn apply_optional<T>(
        &self,
        op: impl FnOnce(&mut QueueEngine, DateTime<Utc>) -> Option<T>,
    ) -> Option<T> {
        let (out, snapshot) = {
            let mut inner = lock_or_recover(&self.inner);
            let now = self.clock.now();
            let out = op(&mut inner.engine, now)?;
            (out, inner.commit(now))
        };
        self.persist(snapshot).await;
        Some(out)
    }

    async fn apply_infallible<T>(
        &self,
        op: impl FnOnce(&mut QueueEngine, DateTime<Utc>) -> T,
    ) -> T {
        let (out, snapshot) = {
            let mut inner = lock_or_recover(&self.inner);
            let now = self.clock.now();
            let out = op(&mut inner.engine, now);
            (out, inner.commit(now))
        };
        self.persist(snapshot).await;
        out
    }

    async fn persist(&self, snapshot: Snapshot) {
        self.refresh_gauges(&snapshot.queue);
        if let Err(e) = self.backend.save(&snapshot).await {
            self.metrics.persist_failures.inc();
            warn!(
                backend = self.backend.describe(),
                revision = snapshot.revision,
                error = %e,
                "failed to persist queue snapshot"
            );
        }
    }

    fn refresh_gauges(&self, engine: &QueueEngine) {
        self.metrics
            .waiting_entrants
            .set(engine.waiting_len() as i64);
        self.metrics
            .passed_entrants
            .set(engine.passed().len() as i64);
    }

    fn refresh_gauges_now(&self) {
        let engine = self.engine_snapshot();
        self.refresh_gauges(&engine);
    }
}
