//! # Database: PostgreSQL Snapshot Backend
//!
//! Optional durable home for the queue, via `sqlx::PgPool`.
//!
//! ## Schema
//!
//! - `queue_entrants`: one row per entrant, indexed on `(status, position)`
//!   for the "all waiting ordered by position" read.
//! - `queue_settings`: a single row (`id = 1`) holding the tour length,
//!   the countdown columns, the id/sequence counters, and the revision of
//!   the snapshot last written.
//!
//! See [`queue`] for the snapshot read/write path.

mod queue;

use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

/// Schema applied by [`Database::migrate`]. Idempotent.
const SCHEMA: &str = include_str!("../../migrations/001_create_queue.sql");

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// Parses the URL by hand so percent-encoded credentials survive
    /// (pooler usernames like `user.project-ref` included).
    pub async fn connect(database_url: &str) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username)
            .statement_cache_capacity(0);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the queue tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    ///
    /// Used by the `/readyz` readiness probe.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_both_tables() {
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS queue_entrants"));
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS queue_settings"));
        assert!(SCHEMA.contains("(status, position)"));
    }
}
