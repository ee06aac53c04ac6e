//! JSON snapshot file with integrity checksum and generational backups.
//!
//! ## Atomic Writes
//!
//! Snapshots are written to a `.tmp` sibling and renamed into place, so a
//! crash mid-write leaves the previous file intact.
//!
//! ## Integrity
//!
//! The file holds an envelope `{checksum, data}` where `checksum` is the
//! SHA-256 of the pretty-printed data. A file whose checksum does not match
//! is skipped and the next older generation is tried (3 generations kept:
//! `state.json`, `state.json.1`, `state.json.2`).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::Snapshot;

/// Number of backup generations to keep.
const GENERATIONS: usize = 3;

#[derive(Serialize, Deserialize)]
struct SnapshotEnvelope {
    checksum: String,
    data: serde_json::Value,
}

pub struct FileStore {
    path: PathBuf,
    last_revision: tokio::sync::Mutex<u64>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore {
            path: path.into(),
            last_revision: tokio::sync::Mutex::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<Snapshot>> {
        let path = self.path.clone();
        let snapshot = tokio::task::spawn_blocking(move || load(&path)).await?;
        if let Some(ref s) = snapshot {
            *self.last_revision.lock().await = s.revision;
        }
        Ok(snapshot)
    }

    /// Write `snapshot` unless a newer revision has already been written.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<bool> {
        let mut last = self.last_revision.lock().await;
        if snapshot.revision <= *last {
            return Ok(false);
        }
        let path = self.path.clone();
        let owned = snapshot.clone();
        tokio::task::spawn_blocking(move || save(&path, &owned)).await??;
        *last = snapshot.revision;
        Ok(true)
    }

    pub async fn clear(&self) -> Result<()> {
        let mut last = self.last_revision.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || clear(&path)).await?;
        *last = 0;
        Ok(())
    }

    /// The snapshot directory must exist and be a directory.
    pub fn health_check(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if dir.is_dir() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "snapshot directory {} is missing",
                dir.display()
            ))
        }
    }
}

/// Compute SHA-256 hex digest of a string.
fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Return the path for generation `gen` (0 = current, 1 = .1, 2 = .2, ...).
fn generation_path(base: &Path, gen: usize) -> PathBuf {
    if gen == 0 {
        base.to_path_buf()
    } else {
        let mut p = base.as_os_str().to_os_string();
        p.push(format!(".{}", gen));
        PathBuf::from(p)
    }
}

/// Save a snapshot with integrity checksum and rotating generations.
///
/// Rotation: current → .1 → .2 (oldest .2 is discarded).
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    for gen in (1..GENERATIONS).rev() {
        let src = generation_path(path, gen - 1);
        let dst = generation_path(path, gen);
        if src.exists() {
            let _ = fs::rename(&src, &dst);
        }
    }

    let data = serde_json::to_value(snapshot)?;
    let data_str = serde_json::to_string_pretty(&data)?;
    let checksum = sha256_hex(&data_str);

    let envelope = SnapshotEnvelope { checksum, data };
    let json = serde_json::to_string_pretty(&envelope)?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &json)?;
    fs::rename(&tmp, path)?;

    Ok(())
}

/// Load the newest valid snapshot, falling back to older generations on corruption.
pub fn load(path: &Path) -> Option<Snapshot> {
    for gen in 0..GENERATIONS {
        let p = generation_path(path, gen);
        if let Some(snapshot) = load_single(&p) {
            if gen > 0 {
                warn!(
                    generation = gen,
                    path = %p.display(),
                    "recovered queue snapshot from older generation"
                );
            } else {
                info!(revision = snapshot.revision, path = %p.display(), "queue snapshot loaded");
            }
            return Some(snapshot);
        }
    }
    None
}

/// Try to load and verify a single snapshot file.
fn load_single(path: &Path) -> Option<Snapshot> {
    let raw = fs::read_to_string(path).ok()?;
    let envelope: SnapshotEnvelope = match serde_json::from_str(&raw) {
        Ok(e) => e,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable snapshot envelope");
            return None;
        }
    };

    let data_str = serde_json::to_string_pretty(&envelope.data).ok()?;
    let expected = sha256_hex(&data_str);
    if expected != envelope.checksum {
        warn!(
            path = %path.display(),
            expected = &expected[..12],
            got = &envelope.checksum[..12.min(envelope.checksum.len())],
            "snapshot integrity check failed"
        );
        return None;
    }

    serde_json::from_value(envelope.data).ok()
}

/// Remove all snapshot files (current + all generations).
pub fn clear(path: &Path) {
    for gen in 0..GENERATIONS {
        let _ = fs::remove_file(generation_path(path, gen));
    }
    let _ = fs::remove_file(path.with_extension("tmp"));
}
