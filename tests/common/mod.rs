//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use tourline::clock::{Clock, ManualClock};
use tourline::config::ServerSection;
use tourline::dashboard::{self, AppState};
use tourline::prom_metrics::Metrics;
use tourline::service::QueueService;

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for database tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// A router over an in-memory queue plus the clock that drives it.
pub struct TestApp {
    pub router: axum::Router,
    pub clock: Arc<ManualClock>,
    pub state: Arc<AppState>,
}

/// Build an Axum test app with an in-memory queue and a manual clock.
pub fn build_test_app(tour_length_seconds: i64) -> TestApp {
    let clock = Arc::new(ManualClock::fixed());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let service = QueueService::in_memory(dyn_clock, Arc::new(Metrics::new()), tour_length_seconds);
    let state = AppState::new(service, ServerSection::default());
    let router = dashboard::build_router(state.clone(), None);
    TestApp {
        router,
        clock,
        state,
    }
}

/// Connect to the test database, migrate, and wipe the queue tables.
pub async fn setup_test_db() -> tourline::db::Database {
    let db = tourline::db::Database::connect(&test_db_url())
        .await
        .expect("Failed to connect to test database");
    db.migrate().await.expect("migration failed");
    db.clear_queue().await.expect("failed to clear queue tables");
    db
}
