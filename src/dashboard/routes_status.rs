//! `GET /api/status`: the polled read model.
//!
//! Polling is what drives the countdown: each call may pass the front
//! entrant if their tour has run out (see [`crate::service::QueueService::status`]).

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

use super::AppState;

pub(super) async fn handler_api_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.status().await)
}
