//! # Store: Entrant Records and Durable Snapshots
//!
//! [`EntrantStore`] is the in-process mapping from entrant id to record. It
//! carries no queue rules: it creates, reads, updates, and deletes records
//! and answers position-scoped queries. Keeping positions dense is the
//! engine's job.
//!
//! Durability is layered on top as whole-state [`Snapshot`]s written to a
//! [`Backend`] after each committed command:
//!
//! - [`Backend::Memory`]: nothing leaves the process.
//! - [`Backend::File`]: JSON envelope with SHA-256 checksum and rotating
//!   generations (see [`file`]).
//! - [`Backend::Postgres`]: `queue_entrants` + `queue_settings` tables
//!   (see [`crate::db`]).
//!
//! Every snapshot carries a monotonically increasing revision. Backends drop
//! a save whose revision is not newer than what they already hold, so saves
//! that finish out of order never roll the durable state backwards.

pub mod file;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::db;
use crate::engine::QueueEngine;
use crate::entrant::{Entrant, EntrantId, Status};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrantStore {
    entrants: BTreeMap<EntrantId, Entrant>,
    next_id: EntrantId,
    next_passed_seq: u64,
}

impl Default for EntrantStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntrantStore {
    pub fn new() -> Self {
        EntrantStore {
            entrants: BTreeMap::new(),
            next_id: 1,
            next_passed_seq: 1,
        }
    }

    /// Rebuild a store from persisted rows. Counters are raised past any id or
    /// sequence already in use.
    pub fn from_parts(entrants: Vec<Entrant>, next_id: EntrantId, next_passed_seq: u64) -> Self {
        let max_id = entrants.iter().map(|e| e.id).max().unwrap_or(0);
        let max_seq = entrants.iter().filter_map(|e| e.passed_seq).max().unwrap_or(0);
        EntrantStore {
            entrants: entrants.into_iter().map(|e| (e.id, e)).collect(),
            next_id: next_id.max(max_id + 1),
            next_passed_seq: next_passed_seq.max(max_seq + 1),
        }
    }

    /// Insert a new waiting record at `position` and return a copy of it.
    pub fn create(&mut self, name: &str, position: u32, now: DateTime<Utc>) -> Entrant {
        let id = self.next_id;
        self.next_id += 1;
        let entrant = Entrant {
            id,
            name: name.to_string(),
            status: Status::Waiting,
            position: Some(position),
            added_at: now,
            passed_at: None,
            passed_seq: None,
        };
        self.entrants.insert(id, entrant.clone());
        entrant
    }

    pub fn get(&self, id: EntrantId) -> Option<&Entrant> {
        self.entrants.get(&id)
    }

    pub fn get_mut(&mut self, id: EntrantId) -> Option<&mut Entrant> {
        self.entrants.get_mut(&id)
    }

    pub fn remove(&mut self, id: EntrantId) -> Option<Entrant> {
        self.entrants.remove(&id)
    }

    pub fn clear(&mut self) {
        self.entrants.clear();
    }

    pub fn len(&self) -> usize {
        self.entrants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entrants.is_empty()
    }

    pub fn next_id(&self) -> EntrantId {
        self.next_id
    }

    pub fn next_passed_seq(&self) -> u64 {
        self.next_passed_seq
    }

    /// Hand out the next passed-list sequence number.
    pub fn take_passed_seq(&mut self) -> u64 {
        let seq = self.next_passed_seq;
        self.next_passed_seq += 1;
        seq
    }

    /// All records in id order.
    pub fn all(&self) -> impl Iterator<Item = &Entrant> {
        self.entrants.values()
    }

    /// Waiting records ordered by position. Position is the only sort key.
    pub fn waiting(&self) -> Vec<&Entrant> {
        let mut waiting: Vec<&Entrant> = self.entrants.values().filter(|e| e.is_waiting()).collect();
        waiting.sort_by_key(|e| e.position);
        waiting
    }

    pub fn waiting_ids(&self) -> Vec<EntrantId> {
        self.waiting().into_iter().map(|e| e.id).collect()
    }

    pub fn waiting_len(&self) -> usize {
        self.entrants.values().filter(|e| e.is_waiting()).count()
    }

    /// The waiting record with the lowest position.
    pub fn front(&self) -> Option<&Entrant> {
        self.entrants
            .values()
            .filter(|e| e.is_waiting())
            .min_by_key(|e| e.position)
    }

    /// Passed records in the order they entered the passed list.
    pub fn passed(&self) -> Vec<&Entrant> {
        let mut passed: Vec<&Entrant> = self
            .entrants
            .values()
            .filter(|e| e.status == Status::Passed)
            .collect();
        passed.sort_by_key(|e| (e.passed_seq, e.id));
        passed
    }

    /// The record that entered the passed list most recently.
    pub fn last_passed(&self) -> Option<&Entrant> {
        self.entrants
            .values()
            .filter(|e| e.status == Status::Passed)
            .max_by_key(|e| (e.passed_seq, e.id))
    }

    /// Add `delta` to the position of every waiting record whose position is
    /// within `[from, to]`.
    pub fn shift_positions(&mut self, from: u32, to: u32, delta: i64) {
        for e in self.entrants.values_mut().filter(|e| e.is_waiting()) {
            if let Some(p) = e.position {
                if p >= from && p <= to {
                    e.position = Some((p as i64 + delta).max(1) as u32);
                }
            }
        }
    }
}

// ── Snapshots and backends ──────────────────────────────────────

/// Complete durable state of the queue at one revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub revision: u64,
    pub saved_at: DateTime<Utc>,
    pub queue: QueueEngine,
}

/// Where snapshots are written.
pub enum Backend {
    Memory,
    File(file::FileStore),
    Postgres(db::Database),
}

impl Backend {
    pub fn describe(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::File(_) => "file",
            Backend::Postgres(_) => "postgres",
        }
    }

    /// Load the newest persisted snapshot, if any.
    pub async fn load(&self) -> Result<Option<Snapshot>> {
        match self {
            Backend::Memory => Ok(None),
            Backend::File(store) => store.load().await,
            Backend::Postgres(db) => db.load_snapshot().await,
        }
    }

    /// Persist `snapshot`. Returns `false` when a newer revision is already stored.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<bool> {
        let written = match self {
            Backend::Memory => true,
            Backend::File(store) => store.save(snapshot).await?,
            Backend::Postgres(db) => db.save_snapshot(snapshot).await?,
        };
        if !written {
            debug!(revision = snapshot.revision, "stale snapshot skipped");
        }
        Ok(written)
    }

    /// Remove every persisted snapshot.
    pub async fn clear(&self) -> Result<()> {
        match self {
            Backend::Memory => Ok(()),
            Backend::File(store) => store.clear().await,
            Backend::Postgres(db) => db.clear_queue().await,
        }
    }

    /// Probe the backend for the readiness endpoint.
    pub async fn health_check(&self) -> Result<()> {
        match self {
            Backend::Memory => Ok(()),
            Backend::File(store) => store.health_check(),
            Backend::Postgres(db) => db.health_check().await,
        }
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

    #[test]
    fn create_assigns_increasing_ids() {
        let mut store = EntrantStore::new();
        let a = store.create("A", 1, t0());
        let b = store.create("B", 2, t0());
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.next_id(), 3);
    }

    #[test]
    fn ids_are_not_reused_after_remove() {
        let mut store = EntrantStore::new();
        let a = store.create("A", 1, t0());
        store.remove(a.id);
        let b = store.create("B", 1, t0());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn waiting_sorts_by_position_only() {
        let mut store = EntrantStore::new();
        // Same timestamp, names in reverse order of position.
        store.create("Zed", 2, t0());
        store.create("Amy", 3, t0());
        store.create("Bob", 1, t0());
        let names: Vec<&str> = store.waiting().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Zed", "Amy"]);
        assert_eq!(store.front().unwrap().name, "Bob");
    }

    #[test]
    fn shift_positions_only_touches_range() {
        let mut store = EntrantStore::new();
        for (i, name) in ["A", "B", "C", "D"].iter().enumerate() {
            store.create(name, i as u32 + 1, t0());
        }
        store.shift_positions(2, 3, 1);
        let positions: Vec<(String, u32)> = store
            .waiting()
            .iter()
            .map(|e| (e.name.clone(), e.position.unwrap()))
            .collect();
        assert_eq!(
            positions,
            vec![
                ("A".to_string(), 1),
                ("B".to_string(), 3),
                ("C".to_string(), 4),
                ("D".to_string(), 4),
            ]
        );
    }

    #[test]
    fn passed_order_follows_sequence() {
        let mut store = EntrantStore::new();
        let a = store.create("A", 1, t0());
        let b = store.create("B", 2, t0());
        for id in [b.id, a.id] {
            let seq = store.take_passed_seq();
            let e = store.get_mut(id).unwrap();
            e.status = Status::Passed;
            e.position = None;
            e.passed_at = Some(t0());
            e.passed_seq = Some(seq);
        }
        let order: Vec<EntrantId> = store.passed().iter().map(|e| e.id).collect();
        assert_eq!(order, vec![b.id, a.id]);
        assert_eq!(store.last_passed().unwrap().id, a.id);
    }

    #[test]
    fn from_parts_raises_counters_past_existing_rows() {
        let mut store = EntrantStore::new();
        store.create("A", 1, t0());
        store.create("B", 2, t0());
        let rows: Vec<Entrant> = store.all().cloned().collect();
        let rebuilt = EntrantStore::from_parts(rows, 1, 1);
        assert_eq!(rebuilt.next_id(), 3);
        assert_eq!(rebuilt.len(), 2);
    }
}
