//! # Config: Server Settings from TOML
//!
//! Optional settings file, layered under the CLI flags:
//!
//! ```toml
//! [server]
//! port = 5000
//! static_dir = "frontend/out"
//! request_timeout_secs = 30
//! body_limit_bytes = 65536
//! # public_url = "https://tour.example.org"
//!
//! [queue]
//! tour_length_seconds = 300
//!
//! [storage]
//! state_file = "tourline.json"
//! # database_url = "postgres://..."
//! ```
//!
//! Every key is optional. Precedence is CLI flag, then file, then default.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::DEFAULT_TOUR_LENGTH_SECS;

pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub body_limit_bytes: usize,
    /// Base URL printed into the registration QR code. Derived from the
    /// request's `Host` header when unset.
    pub public_url: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            port: DEFAULT_PORT,
            static_dir: None,
            request_timeout_secs: 30,
            body_limit_bytes: 64 * 1024,
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub tour_length_seconds: i64,
}

impl Default for QueueSection {
    fn default() -> Self {
        QueueSection {
            tour_length_seconds: DEFAULT_TOUR_LENGTH_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub state_file: Option<PathBuf>,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSection,
    pub queue: QueueSection,
    pub storage: StorageSection,
}

/// Where the queue snapshot lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    Memory,
    File(PathBuf),
    Postgres(String),
}

impl Settings {
    /// Postgres wins over a state file; neither means in-memory only.
    pub fn storage_target(&self) -> StorageTarget {
        if let Some(ref url) = self.storage.database_url {
            StorageTarget::Postgres(url.clone())
        } else if let Some(ref path) = self.storage.state_file {
            StorageTarget::File(path.clone())
        } else {
            StorageTarget::Memory
        }
    }
}

/// Parse settings from TOML text and validate them.
pub fn parse(content: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(content)?;
    validate(&settings)?;
    Ok(settings)
}

/// Read and parse a settings file.
pub fn load(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", path.display(), e))?;
    parse(&content)
}

pub fn validate(settings: &Settings) -> Result<()> {
    if settings.queue.tour_length_seconds <= 0 {
        anyhow::bail!("queue.tour_length_seconds must be positive");
    }
    if settings.server.request_timeout_secs == 0 {
        anyhow::bail!("server.request_timeout_secs must be positive");
    }
    if settings.server.body_limit_bytes == 0 {
        anyhow::bail!("server.body_limit_bytes must be positive");
    }
    if let Some(ref url) = settings.server.public_url {
        if url::Url::parse(url).is_err() {
            anyhow::bail!("server.public_url must be an absolute URL");
        }
    }
    if let Some(ref url) = settings.storage.database_url {
        if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
            anyhow::bail!("storage.database_url must be a postgres:// URL");
        }
    }
    Ok(())
}
