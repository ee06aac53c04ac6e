//! # Engine: Queue State Machine
//!
//! [`QueueEngine`] is the single aggregate that owns the line: the entrant
//! records, the configured tour length, and the countdown. Every command
//! keeps one invariant intact:
//!
//! > the waiting entrants hold positions exactly `1..=N`, no gaps, no
//! > duplicates, and passed entrants hold no position.
//!
//! Commands validate first and mutate second, so a command that returns an
//! error has not touched the state. The engine never reads the wall clock;
//! every command receives `now`.
//!
//! ## Countdown coupling
//!
//! - The line becoming non-empty starts a full countdown (or a paused one
//!   if the operator paused while the line was empty).
//! - The line becoming empty drops the countdown to idle.
//! - Any explicit command that can change who is at the front (advance,
//!   retreat, move, reposition, reorder, deleting the front entrant)
//!   restarts the countdown at the full tour length.
//! - [`QueueEngine::tick`] is the lazy evaluation: at most one automatic
//!   advance per call, re-anchored at "now", so repeated calls within one
//!   instant advance at most once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::entrant::{Entrant, EntrantId, Status, MAX_NAME_LEN};
use crate::error::QueueError;
use crate::store::EntrantStore;
use crate::timer::Timer;

/// Tour length used when nothing else is configured (5 minutes).
pub const DEFAULT_TOUR_LENGTH_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEngine {
    store: EntrantStore,
    tour_length_seconds: i64,
    timer: Timer,
}

impl Default for QueueEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TOUR_LENGTH_SECS)
    }
}

impl QueueEngine {
    /// Empty line with the given tour length. Non-positive lengths fall back to the default.
    pub fn new(tour_length_seconds: i64) -> Self {
        QueueEngine {
            store: EntrantStore::new(),
            tour_length_seconds: if tour_length_seconds > 0 {
                tour_length_seconds
            } else {
                DEFAULT_TOUR_LENGTH_SECS
            },
            timer: Timer::default(),
        }
    }

    /// Assemble an engine from persisted parts and repair anything that
    /// breaks the position invariant.
    pub fn from_parts(
        store: EntrantStore,
        tour_length_seconds: i64,
        timer: Timer,
        now: DateTime<Utc>,
    ) -> Self {
        let mut engine = QueueEngine {
            store,
            tour_length_seconds,
            timer,
        };
        engine.normalize(now);
        engine
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn store(&self) -> &EntrantStore {
        &self.store
    }

    pub fn entrant(&self, id: EntrantId) -> Option<&Entrant> {
        self.store.get(id)
    }

    pub fn waiting(&self) -> Vec<&Entrant> {
        self.store.waiting()
    }

    pub fn passed(&self) -> Vec<&Entrant> {
        self.store.passed()
    }

    pub fn waiting_len(&self) -> usize {
        self.store.waiting_len()
    }

    pub fn tour_length_seconds(&self) -> i64 {
        self.tour_length_seconds
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.timer.remaining(now)
    }

    /// True when waiting positions are exactly `1..=N` and passed entrants carry none.
    pub fn positions_are_dense(&self) -> bool {
        let waiting = self.store.waiting();
        let dense = waiting
            .iter()
            .enumerate()
            .all(|(i, e)| e.position == Some(i as u32 + 1));
        let passed_clean = self.store.passed().iter().all(|e| e.position.is_none());
        dense && passed_clean
    }

    // ── Commands ────────────────────────────────────────────────

    /// Add a new entrant at the tail of the line.
    pub fn register(&mut self, name: &str, now: DateTime<Utc>) -> Result<Entrant, QueueError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(QueueError::Validation("name required".into()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(QueueError::Validation(format!(
                "name longer than {} characters",
                MAX_NAME_LEN
            )));
        }
        let position = self.store.waiting_len() as u32 + 1;
        let entrant = self.store.create(name, position, now);
        self.sync_timer(now, false);
        info!(id = entrant.id, position, "entrant registered");
        Ok(entrant)
    }

    /// Move an entrant between `waiting` and `passed`.
    ///
    /// Requeuing inserts at `to_position` clamped to `[1, N+1]`, or at the
    /// front when no position is given.
    pub fn move_to(
        &mut self,
        id: EntrantId,
        to: Status,
        to_position: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let from = self.require(id)?.status;
        if from == to {
            return Err(QueueError::InvalidTransition { id, from, to });
        }
        match to {
            Status::Passed => self.pass(id, now),
            Status::Waiting => self.requeue(id, to_position),
        }
        self.sync_timer(now, true);
        info!(id, from = %from, to = %to, "entrant moved");
        Ok(())
    }

    /// Move a waiting entrant to another waiting position, clamped to `[1, N]`.
    pub fn reposition(
        &mut self,
        id: EntrantId,
        to_position: i64,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let entrant = self.require(id)?;
        let old = match (entrant.status, entrant.position) {
            (Status::Waiting, Some(p)) => p,
            (from, _) => {
                return Err(QueueError::InvalidTransition {
                    id,
                    from,
                    to: Status::Waiting,
                })
            }
        };
        let n = self.store.waiting_len() as i64;
        let new = to_position.clamp(1, n.max(1)) as u32;
        if new == old {
            return Ok(());
        }
        if new < old {
            self.store.shift_positions(new, old - 1, 1);
        } else {
            self.store.shift_positions(old + 1, new, -1);
        }
        if let Some(e) = self.store.get_mut(id) {
            e.position = Some(new);
        }
        self.sync_timer(now, true);
        info!(id, from = old, to = new, "entrant repositioned");
        Ok(())
    }

    /// Replace the whole waiting order. `ids` must be exactly the current
    /// waiting set; anything else is rejected without touching the line.
    pub fn reorder(&mut self, ids: &[EntrantId], now: DateTime<Utc>) -> Result<(), QueueError> {
        let current: HashSet<EntrantId> = self.store.waiting_ids().into_iter().collect();
        let mut seen = HashSet::with_capacity(ids.len());
        for &id in ids {
            if !seen.insert(id) {
                return Err(QueueError::InvalidReorder(format!("duplicate id {}", id)));
            }
            if !current.contains(&id) {
                return Err(QueueError::InvalidReorder(format!(
                    "id {} is not waiting",
                    id
                )));
            }
        }
        if seen.len() != current.len() {
            return Err(QueueError::InvalidReorder(format!(
                "expected {} waiting ids, got {}",
                current.len(),
                seen.len()
            )));
        }
        for (idx, &id) in ids.iter().enumerate() {
            if let Some(e) = self.store.get_mut(id) {
                e.position = Some(idx as u32 + 1);
            }
        }
        self.sync_timer(now, true);
        info!(count = ids.len(), "waiting order replaced");
        Ok(())
    }

    /// Manual "Next": pass the front entrant. `None` when nobody is waiting.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Option<Entrant> {
        let id = self.store.front()?.id;
        self.pass(id, now);
        self.sync_timer(now, true);
        info!(id, "advanced");
        self.store.get(id).cloned()
    }

    /// Manual "Back": requeue the most recently passed entrant at the front.
    pub fn retreat(&mut self, now: DateTime<Utc>) -> Option<Entrant> {
        let id = self.store.last_passed()?.id;
        self.requeue(id, Some(1));
        self.sync_timer(now, true);
        info!(id, "retreated");
        self.store.get(id).cloned()
    }

    /// Remove an entrant permanently, whatever its status.
    pub fn delete(&mut self, id: EntrantId, now: DateTime<Utc>) -> Result<Entrant, QueueError> {
        let removed = self.store.remove(id).ok_or(QueueError::NotFound { id })?;
        let was_front = removed.position == Some(1);
        if let Some(p) = removed.position {
            self.store.shift_positions(p + 1, u32::MAX, -1);
        }
        self.sync_timer(now, was_front);
        info!(id, status = %removed.status, "entrant deleted");
        Ok(removed)
    }

    /// Remove every entrant; tour length and pause latch survive.
    pub fn clear_entrants(&mut self) {
        let count = self.store.len();
        self.store.clear();
        self.timer.deactivate();
        info!(count, "entrants cleared");
    }

    /// Remove every entrant and restore the default configuration.
    pub fn reset(&mut self) {
        let count = self.store.len();
        self.store.clear();
        self.tour_length_seconds = DEFAULT_TOUR_LENGTH_SECS;
        self.timer = Timer::default();
        info!(count, "queue reset");
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        self.timer.pause(now);
        info!(remaining = ?self.timer.remaining(now), "timer paused");
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.timer.resume(now);
        info!(remaining = ?self.timer.remaining(now), "timer resumed");
    }

    /// Set the tour length in whole minutes.
    pub fn set_tour_length_minutes(
        &mut self,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        if minutes <= 0 {
            return Err(QueueError::Validation(
                "tour length must be a positive number of minutes".into(),
            ));
        }
        let seconds = minutes
            .checked_mul(60)
            .ok_or_else(|| QueueError::Validation("tour length too large".into()))?;
        self.set_tour_length_seconds(seconds, now)
    }

    /// Set the tour length in seconds. An active countdown restarts at the new full length.
    pub fn set_tour_length_seconds(
        &mut self,
        seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        if seconds <= 0 {
            return Err(QueueError::Validation(
                "tour length must be positive".into(),
            ));
        }
        self.tour_length_seconds = seconds;
        self.timer.restart(now, seconds);
        info!(tour_length_seconds = seconds, "tour length set");
        Ok(())
    }

    /// Lazy countdown evaluation. Passes at most one entrant when the
    /// countdown has run out and returns it.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Entrant> {
        if !self.timer.is_due(now) {
            return None;
        }
        let Some(id) = self.store.front().map(|e| e.id) else {
            warn!("countdown due with nobody waiting");
            self.timer.deactivate();
            return None;
        };
        // Stamp when the tour ran out, not when somebody happened to poll
        let ended_at = self.timer.expires_at().map_or(now, |at| at.min(now));
        self.pass(id, ended_at);
        self.sync_timer(now, true);
        info!(id, waiting = self.store.waiting_len(), "tour elapsed, advanced");
        self.store.get(id).cloned()
    }

    // ── Internals ───────────────────────────────────────────────

    fn require(&self, id: EntrantId) -> Result<&Entrant, QueueError> {
        self.store.get(id).ok_or(QueueError::NotFound { id })
    }

    /// Waiting → passed. Caller has checked the entrant is waiting.
    fn pass(&mut self, id: EntrantId, now: DateTime<Utc>) {
        let Some(position) = self.store.get(id).and_then(|e| e.position) else {
            return;
        };
        let seq = self.store.take_passed_seq();
        if let Some(e) = self.store.get_mut(id) {
            e.status = Status::Passed;
            e.position = None;
            e.passed_at = Some(now);
            e.passed_seq = Some(seq);
        }
        self.store.shift_positions(position + 1, u32::MAX, -1);
    }

    /// Passed → waiting at `to_position` clamped to `[1, N+1]`, front by default.
    fn requeue(&mut self, id: EntrantId, to_position: Option<i64>) {
        let n = self.store.waiting_len() as i64;
        let position = to_position.unwrap_or(1).clamp(1, n + 1) as u32;
        self.store.shift_positions(position, u32::MAX, 1);
        if let Some(e) = self.store.get_mut(id) {
            e.status = Status::Waiting;
            e.position = Some(position);
            e.passed_at = None;
            e.passed_seq = None;
        }
    }

    /// Bring the countdown in line with the waiting set.
    fn sync_timer(&mut self, now: DateTime<Utc>, front_changed: bool) {
        if self.store.waiting_len() == 0 {
            self.timer.deactivate();
        } else if self.timer.is_idle() {
            self.timer.activate(now, self.tour_length_seconds);
        } else if front_changed {
            self.timer.restart(now, self.tour_length_seconds);
        }
    }

    /// Renumber waiting entrants densely (by stored position, then id),
    /// strip positions from passed entrants, and realign the countdown.
    fn normalize(&mut self, now: DateTime<Utc>) {
        if self.tour_length_seconds <= 0 {
            warn!(
                tour_length_seconds = self.tour_length_seconds,
                "invalid stored tour length, using default"
            );
            self.tour_length_seconds = DEFAULT_TOUR_LENGTH_SECS;
        }
        if !self.positions_are_dense() {
            let mut order: Vec<(Option<u32>, EntrantId)> = self
                .store
                .all()
                .filter(|e| e.is_waiting())
                .map(|e| (e.position, e.id))
                .collect();
            order.sort_by_key(|&(p, id)| (p.unwrap_or(u32::MAX), id));
            warn!(waiting = order.len(), "renumbering non-dense waiting positions");
            for (idx, (_, id)) in order.into_iter().enumerate() {
                if let Some(e) = self.store.get_mut(id) {
                    e.position = Some(idx as u32 + 1);
                }
            }
            let passed: Vec<EntrantId> = self.store.passed().iter().map(|e| e.id).collect();
            for id in passed {
                if let Some(e) = self.store.get_mut(id) {
                    e.position = None;
                }
            }
        }
        self.sync_timer(now, false);
        debug!(
            waiting = self.store.waiting_len(),
            timer = self.timer.label(),
            "engine normalized"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    /// Engine with the given names registered in order at t0.
    fn engine_with(tour: i64, names: &[&str]) -> QueueEngine {
        let mut engine = QueueEngine::new(tour);
        for name in names {
            engine.register(name, t0()).unwrap();
        }
        engine
    }

    fn waiting_names(engine: &QueueEngine) -> Vec<String> {
        engine.waiting().iter().map(|e| e.name.clone()).collect()
    }

    fn id_of(engine: &QueueEngine, name: &str) -> EntrantId {
        engine
            .store()
            .all()
            .find(|e| e.name == name)
            .map(|e| e.id)
            .unwrap()
    }

    // == Register ==

    #[test]
    fn register_appends_at_tail() {
        let engine = engine_with(300, &["A", "B", "C"]);
        let positions: Vec<Option<u32>> = engine.waiting().iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(waiting_names(&engine), vec!["A", "B", "C"]);
    }

    #[test]
    fn register_rejects_blank_name() {
        let mut engine = QueueEngine::default();
        for bad in ["", "   ", "\t"] {
            assert!(matches!(
                engine.register(bad, t0()),
                Err(QueueError::Validation(_))
            ));
        }
        assert_eq!(engine.store().len(), 0);
    }

    #[test]
    fn register_rejects_overlong_name() {
        let mut engine = QueueEngine::default();
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            engine.register(&long, t0()),
            Err(QueueError::Validation(_))
        ));
    }

    #[test]
    fn first_registration_starts_countdown() {
        let mut engine = QueueEngine::new(60);
        assert!(engine.timer().is_idle());
        engine.register("A", t0()).unwrap();
        assert_eq!(engine.time_remaining(t0()), Some(60));
        // Later registrations leave the running countdown alone
        engine.register("B", at(20)).unwrap();
        assert_eq!(engine.time_remaining(at(20)), Some(40));
    }

    // == Move ==

    #[test]
    fn move_to_passed_closes_the_gap() {
        let mut engine = engine_with(300, &["A", "B", "C"]);
        let b = id_of(&engine, "B");
        engine.move_to(b, Status::Passed, None, at(5)).unwrap();
        assert_eq!(waiting_names(&engine), vec!["A", "C"]);
        assert!(engine.positions_are_dense());
        let passed = engine.entrant(b).unwrap();
        assert_eq!(passed.position, None);
        assert_eq!(passed.passed_at, Some(at(5)));
    }

    #[test]
    fn move_to_waiting_defaults_to_front() {
        let mut engine = engine_with(300, &["A", "B", "C"]);
        let c = id_of(&engine, "C");
        engine.move_to(c, Status::Passed, None, t0()).unwrap();
        engine.move_to(c, Status::Waiting, None, t0()).unwrap();
        assert_eq!(waiting_names(&engine), vec!["C", "A", "B"]);
        assert_eq!(engine.entrant(c).unwrap().passed_at, None);
    }

    #[test]
    fn move_to_waiting_clamps_position() {
        let mut engine = engine_with(300, &["A", "B", "C"]);
        let a = id_of(&engine, "A");
        engine.move_to(a, Status::Passed, None, t0()).unwrap();
        engine.move_to(a, Status::Waiting, Some(99), t0()).unwrap();
        assert_eq!(waiting_names(&engine), vec!["B", "C", "A"]);

        engine.move_to(a, Status::Passed, None, t0()).unwrap();
        engine.move_to(a, Status::Waiting, Some(-4), t0()).unwrap();
        assert_eq!(waiting_names(&engine), vec!["A", "B", "C"]);

        engine.move_to(a, Status::Passed, None, t0()).unwrap();
        engine.move_to(a, Status::Waiting, Some(2), t0()).unwrap();
        assert_eq!(waiting_names(&engine), vec!["B", "A", "C"]);
        assert!(engine.positions_are_dense());
    }

    #[test]
    fn move_to_same_status_is_invalid() {
        let mut engine = engine_with(300, &["A", "B"]);
        let a = id_of(&engine, "A");
        let before = engine.clone();
        let err = engine.move_to(a, Status::Waiting, Some(2), t0()).unwrap_err();
        assert_eq!(
            err,
            QueueError::InvalidTransition {
                id: a,
                from: Status::Waiting,
                to: Status::Waiting
            }
        );
        assert_eq!(engine, before);
    }

    #[test]
    fn move_unknown_id_is_not_found() {
        let mut engine = engine_with(300, &["A"]);
        assert_eq!(
            engine.move_to(999, Status::Passed, None, t0()),
            Err(QueueError::NotFound { id: 999 })
        );
    }

    // == Reposition ==

    #[test]
    fn reposition_moves_within_waiting() {
        let mut engine = engine_with(300, &["A", "B", "C", "D"]);
        let d = id_of(&engine, "D");
        engine.reposition(d, 2, t0()).unwrap();
        assert_eq!(waiting_names(&engine), vec!["A", "D", "B", "C"]);
        let a = id_of(&engine, "A");
        engine.reposition(a, 10, t0()).unwrap();
        assert_eq!(waiting_names(&engine), vec!["D", "B", "C", "A"]);
        assert!(engine.positions_are_dense());
    }

    #[test]
    fn reposition_rejects_passed_entrant() {
        let mut engine = engine_with(300, &["A", "B"]);
        let a = engine.advance(t0()).unwrap().id;
        assert!(matches!(
            engine.reposition(a, 1, t0()),
            Err(QueueError::InvalidTransition { .. })
        ));
    }

    // == Reorder ==

    #[test]
    fn reorder_assigns_positions_in_given_order() {
        let mut engine = engine_with(300, &["A", "B", "C"]);
        let mut ids = engine.store().waiting_ids();
        ids.reverse();
        engine.reorder(&ids, t0()).unwrap();
        assert_eq!(waiting_names(&engine), vec!["C", "B", "A"]);
        assert!(engine.positions_are_dense());
    }

    #[test]
    fn reorder_mismatch_leaves_state_untouched() {
        let mut engine = engine_with(300, &["A", "B", "C"]);
        let ids = engine.store().waiting_ids();
        let before = engine.clone();

        // Missing one id
        let err = engine.reorder(&ids[..2], t0()).unwrap_err();
        assert!(matches!(err, QueueError::InvalidReorder(_)));
        assert_eq!(engine, before);

        // Extra unknown id
        let mut extra = ids.clone();
        extra.push(999);
        assert!(matches!(
            engine.reorder(&extra, t0()),
            Err(QueueError::InvalidReorder(_))
        ));
        assert_eq!(engine, before);

        // Duplicate that keeps the length equal
        let dup = vec![ids[0], ids[0], ids[1]];
        assert!(matches!(
            engine.reorder(&dup, t0()),
            Err(QueueError::InvalidReorder(_))
        ));
        assert_eq!(engine, before);
    }

    #[test]
    fn reorder_rejects_passed_ids() {
        let mut engine = engine_with(300, &["A", "B", "C"]);
        let a = engine.advance(t0()).unwrap().id;
        let mut ids = engine.store().waiting_ids();
        ids.push(a);
        assert!(matches!(
            engine.reorder(&ids, t0()),
            Err(QueueError::InvalidReorder(_))
        ));
    }

    #[test]
    fn reorder_of_empty_line_accepts_empty_list() {
        let mut engine = QueueEngine::default();
        engine.reorder(&[], t0()).unwrap();
        assert!(engine.timer().is_idle());
    }

    // == Advance / Retreat ==

    #[test]
    fn advance_pops_front() {
        let mut engine = engine_with(300, &["A", "B"]);
        let popped = engine.advance(at(10)).unwrap();
        assert_eq!(popped.name, "A");
        assert_eq!(popped.status, Status::Passed);
        assert_eq!(waiting_names(&engine), vec!["B"]);
        assert_eq!(engine.waiting()[0].position, Some(1));
    }

    #[test]
    fn advance_on_empty_line_returns_none() {
        let mut engine = QueueEngine::default();
        assert!(engine.advance(t0()).is_none());
    }

    #[test]
    fn advance_restarts_countdown_for_next_entrant() {
        let mut engine = engine_with(60, &["A", "B"]);
        engine.advance(at(45)).unwrap();
        assert_eq!(engine.time_remaining(at(45)), Some(60));
    }

    #[test]
    fn advancing_last_entrant_goes_idle() {
        let mut engine = engine_with(60, &["A"]);
        engine.advance(at(1)).unwrap();
        assert!(engine.timer().is_idle());
        assert_eq!(engine.time_remaining(at(1)), None);
    }

    #[test]
    fn retreat_after_advance_restores_front() {
        let mut engine = engine_with(300, &["A", "B", "C"]);
        let popped = engine.advance(t0()).unwrap();
        let back = engine.retreat(at(1)).unwrap();
        assert_eq!(back.id, popped.id);
        assert_eq!(back.name, popped.name);
        assert_eq!(back.position, Some(1));
        assert_eq!(back.passed_at, None);
        assert_eq!(waiting_names(&engine), vec!["A", "B", "C"]);
    }

    #[test]
    fn retreat_takes_most_recently_passed() {
        let mut engine = engine_with(300, &["A", "B", "C"]);
        engine.advance(t0()).unwrap();
        engine.advance(t0()).unwrap();
        // Both passed in the same instant; sequence decides
        let back = engine.retreat(t0()).unwrap();
        assert_eq!(back.name, "B");
        assert_eq!(waiting_names(&engine), vec!["B", "C"]);
    }

    #[test]
    fn retreat_with_nobody_passed_returns_none() {
        let mut engine = engine_with(300, &["A"]);
        assert!(engine.retreat(t0()).is_none());
    }

    #[test]
    fn retreat_into_empty_line_starts_countdown() {
        let mut engine = engine_with(60, &["A"]);
        engine.advance(t0()).unwrap();
        assert!(engine.timer().is_idle());
        engine.retreat(at(5)).unwrap();
        assert_eq!(engine.time_remaining(at(5)), Some(60));
    }

    // == Delete ==

    #[test]
    fn delete_middle_closes_gap() {
        let mut engine = engine_with(300, &["A", "B", "C"]);
        let b = id_of(&engine, "B");
        engine.delete(b, t0()).unwrap();
        let got: Vec<(String, Option<u32>)> = engine
            .waiting()
            .iter()
            .map(|e| (e.name.clone(), e.position))
            .collect();
        assert_eq!(
            got,
            vec![("A".to_string(), Some(1)), ("C".to_string(), Some(2))]
        );
    }

    #[test]
    fn delete_passed_entrant_leaves_waiting_alone() {
        let mut engine = engine_with(300, &["A", "B"]);
        let a = engine.advance(t0()).unwrap().id;
        engine.delete(a, t0()).unwrap();
        assert!(engine.passed().is_empty());
        assert_eq!(waiting_names(&engine), vec!["B"]);
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let mut engine = QueueEngine::default();
        assert_eq!(
            engine.delete(5, t0()).unwrap_err(),
            QueueError::NotFound { id: 5 }
        );
    }

    #[test]
    fn delete_last_waiting_goes_idle() {
        let mut engine = engine_with(60, &["A"]);
        let a = id_of(&engine, "A");
        engine.delete(a, t0()).unwrap();
        assert!(engine.timer().is_idle());
    }

    #[test]
    fn deleting_non_front_keeps_countdown() {
        let mut engine = engine_with(60, &["A", "B"]);
        let b = id_of(&engine, "B");
        engine.delete(b, at(20)).unwrap();
        assert_eq!(engine.time_remaining(at(20)), Some(40));
    }

    // == Timer ==

    #[test]
    fn tick_before_expiry_does_nothing() {
        let mut engine = engine_with(60, &["A"]);
        assert!(engine.tick(at(59)).is_none());
        assert_eq!(engine.waiting_len(), 1);
    }

    #[test]
    fn tick_on_expiry_with_single_entrant_goes_idle() {
        let mut engine = engine_with(60, &["A"]);
        let passed = engine.tick(at(60)).unwrap();
        assert_eq!(passed.name, "A");
        assert_eq!(engine.waiting_len(), 0);
        assert!(engine.timer().is_idle());
        assert_eq!(engine.time_remaining(at(60)), None);
    }

    #[test]
    fn tick_on_expiry_resets_to_full_length() {
        let mut engine = engine_with(60, &["A", "B"]);
        engine.tick(at(61)).unwrap();
        assert_eq!(waiting_names(&engine), vec!["B"]);
        assert_eq!(engine.time_remaining(at(61)), Some(60));
    }

    #[test]
    fn tick_is_idempotent_within_an_instant() {
        let mut engine = engine_with(60, &["A", "B", "C"]);
        // Far more than three tours elapsed while nobody polled
        let now = at(60 * 10);
        assert!(engine.tick(now).is_some());
        assert!(engine.tick(now).is_none());
        assert!(engine.tick(now).is_none());
        assert_eq!(waiting_names(&engine), vec!["B", "C"]);
    }

    #[test]
    fn tick_stamps_passed_at_with_tour_end() {
        let mut engine = engine_with(60, &["A", "B"]);
        let passed = engine.tick(at(600)).unwrap();
        assert_eq!(passed.passed_at, Some(at(60)));
        // Manual advance still stamps the command time
        let manual = engine.advance(at(610)).unwrap();
        assert_eq!(manual.passed_at, Some(at(610)));
    }

    #[test]
    fn tick_while_paused_never_advances() {
        let mut engine = engine_with(60, &["A"]);
        engine.pause(at(20));
        assert!(engine.tick(at(1000)).is_none());
        assert_eq!(engine.time_remaining(at(1000)), Some(40));
        engine.resume(at(1000));
        assert_eq!(engine.time_remaining(at(1000)), Some(40));
        assert!(engine.tick(at(1040)).is_some());
    }

    #[test]
    fn pause_while_empty_latches_for_next_registration() {
        let mut engine = QueueEngine::new(120);
        engine.pause(t0());
        engine.register("A", at(5)).unwrap();
        assert_eq!(engine.timer(), &Timer::Paused { remaining: 120 });
        assert!(engine.tick(at(1000)).is_none());
    }

    #[test]
    fn set_tour_length_restarts_running_countdown() {
        let mut engine = engine_with(60, &["A", "B"]);
        engine.set_tour_length_minutes(2, at(20)).unwrap();
        assert_eq!(engine.tour_length_seconds(), 120);
        assert_eq!(engine.time_remaining(at(20)), Some(120));
    }

    #[test]
    fn set_tour_length_rejects_non_positive() {
        let mut engine = engine_with(60, &["A"]);
        let before = engine.clone();
        for bad in [0, -1, -60] {
            assert!(matches!(
                engine.set_tour_length_minutes(bad, t0()),
                Err(QueueError::Validation(_))
            ));
            assert!(matches!(
                engine.set_tour_length_seconds(bad, t0()),
                Err(QueueError::Validation(_))
            ));
        }
        assert_eq!(engine, before);
    }

    #[test]
    fn set_tour_length_while_idle_stays_idle() {
        let mut engine = QueueEngine::default();
        engine.set_tour_length_seconds(90, t0()).unwrap();
        assert!(engine.timer().is_idle());
        engine.register("A", t0()).unwrap();
        assert_eq!(engine.time_remaining(t0()), Some(90));
    }

    // == Clear / Reset ==

    #[test]
    fn clear_entrants_keeps_settings() {
        let mut engine = engine_with(120, &["A", "B"]);
        engine.pause(t0());
        engine.clear_entrants();
        assert_eq!(engine.store().len(), 0);
        assert_eq!(engine.tour_length_seconds(), 120);
        assert_eq!(engine.timer(), &Timer::Idle { paused: true });
    }

    #[test]
    fn reset_restores_defaults() {
        let mut engine = engine_with(120, &["A", "B"]);
        engine.pause(t0());
        engine.reset();
        assert_eq!(engine.store().len(), 0);
        assert_eq!(engine.tour_length_seconds(), DEFAULT_TOUR_LENGTH_SECS);
        assert_eq!(engine.timer(), &Timer::default());
    }

    // == Normalization ==

    #[test]
    fn from_parts_repairs_gaps() {
        let mut store = EntrantStore::new();
        store.create("A", 3, t0());
        store.create("B", 7, t0());
        store.create("C", 3, t0());
        let engine = QueueEngine::from_parts(store, 60, Timer::default(), t0());
        assert!(engine.positions_are_dense());
        assert_eq!(waiting_names(&engine), vec!["A", "C", "B"]);
        // Non-empty line gets a countdown
        assert_eq!(engine.time_remaining(t0()), Some(60));
    }

    #[test]
    fn from_parts_drops_countdown_for_empty_line() {
        let timer = Timer::Running {
            started_at: t0(),
            remaining_at_start: 60,
        };
        let engine = QueueEngine::from_parts(EntrantStore::new(), 60, timer, t0());
        assert!(engine.timer().is_idle());
    }
}
