//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim: settings
//! resolution, backend selection, and one function per subcommand.

use anyhow::Result;
use std::sync::Arc;
use tourline::clock::{Clock, SystemClock};
use tourline::config::{self, Settings, StorageTarget};
use tourline::dashboard::{self, AppState};
use tourline::engine::QueueEngine;
use tourline::prom_metrics::Metrics;
use tourline::service::QueueService;
use tourline::status;
use tourline::store::file::FileStore;
use tourline::store::Backend;
use tourline::db;
use tracing::info;

use super::{Cli, Commands};

/// Defaults, then the config file, then CLI flags and env vars.
pub fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match cli.config {
        Some(ref path) => config::load(path)?,
        None => Settings::default(),
    };
    if let Some(ref url) = cli.database_url {
        settings.storage.database_url = Some(url.clone());
    }
    if let Some(ref path) = cli.state_file {
        settings.storage.state_file = Some(path.clone());
    }
    if let Commands::Serve {
        port,
        static_dir,
        tour_length,
        public_url,
    } = &cli.command
    {
        if let Some(port) = port {
            settings.server.port = *port;
        }
        if let Some(dir) = static_dir {
            settings.server.static_dir = Some(dir.clone());
        }
        if let Some(secs) = tour_length {
            settings.queue.tour_length_seconds = *secs;
        }
        if let Some(url) = public_url {
            settings.server.public_url = Some(url.clone());
        }
    }
    config::validate(&settings)?;
    Ok(settings)
}

/// Connect to the configured snapshot backend. Postgres is migrated on connect.
pub async fn open_backend(settings: &Settings) -> Result<Backend> {
    Ok(match settings.storage_target() {
        StorageTarget::Postgres(url) => {
            let database = db::Database::connect(&url).await?;
            database.migrate().await?;
            Backend::Postgres(database)
        }
        StorageTarget::File(path) => Backend::File(FileStore::new(path)),
        StorageTarget::Memory => Backend::Memory,
    })
}

async fn open_service(settings: &Settings) -> Result<QueueService> {
    let backend = open_backend(settings).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    QueueService::open(
        backend,
        clock,
        Arc::new(Metrics::new()),
        settings.queue.tour_length_seconds,
    )
    .await
}

pub async fn run_serve(settings: Settings) -> Result<()> {
    let service = open_service(&settings).await?;
    let port = settings.server.port;
    let static_dir = settings.server.static_dir.clone();
    let state = AppState::new(service, settings.server);
    dashboard::run(state, port, static_dir.as_deref()).await
}

pub async fn run_clear(settings: Settings, keep_settings: bool) -> Result<()> {
    if keep_settings {
        let service = open_service(&settings).await?;
        service.clear_entrants().await;
        info!(
            backend = service.backend().describe(),
            "entrants cleared, settings kept"
        );
    } else {
        let backend = open_backend(&settings).await?;
        backend.clear().await?;
        info!(backend = backend.describe(), "queue state cleared");
    }
    Ok(())
}

/// Print the persisted queue without running the countdown.
pub async fn run_status(settings: Settings) -> Result<()> {
    let backend = open_backend(&settings).await?;
    let now = SystemClock.now();
    let output = match backend.load().await? {
        Some(snapshot) => serde_json::json!({
            "backend": backend.describe(),
            "revision": snapshot.revision,
            "saved_at": snapshot.saved_at,
            "status": status::project(&snapshot.queue, now),
        }),
        None => serde_json::json!({
            "backend": backend.describe(),
            "revision": null,
            "saved_at": null,
            "status": status::project(&QueueEngine::new(settings.queue.tour_length_seconds), now),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
