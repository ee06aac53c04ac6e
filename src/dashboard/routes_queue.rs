//! Queue command API: register, next/back, pause/resume, reorder, move,
//! reposition, tour length, delete and clear.
//!
//! Domain failures map to `400` (bad input, illegal transition, bad reorder)
//! or `404` (unknown entrant) with an `{"error": "...", "kind": "..."}` body.
//! Bodies that do not parse get `400` with an `{"error": "..."}` body too.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path as AxumPath, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use super::AppState;
use crate::entrant::{EntrantId, Status};
use crate::error::QueueError;
use crate::status::EntrantView;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn queue_error(e: QueueError) -> Response {
    let status = match e {
        QueueError::NotFound { .. } => StatusCode::NOT_FOUND,
        QueueError::Validation(_)
        | QueueError::InvalidTransition { .. }
        | QueueError::InvalidReorder(_) => StatusCode::BAD_REQUEST,
    };
    warn!(kind = e.kind(), error = %e, "queue command rejected");
    (
        status,
        Json(serde_json::json!({ "error": e.to_string(), "kind": e.kind() })),
    )
        .into_response()
}

/// Unparseable body. Oversized bodies keep their 413.
fn bad_body(status: StatusCode, text: String) -> Response {
    let status = if status == StatusCode::PAYLOAD_TOO_LARGE {
        status
    } else {
        StatusCode::BAD_REQUEST
    };
    warn!(error = %text, "request body rejected");
    error_response(status, text)
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(v)| v)
        .map_err(|e| bad_body(e.status(), e.body_text()))
}

fn is_form(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn message(text: &str) -> Response {
    Json(serde_json::json!({ "message": text })).into_response()
}

#[derive(Deserialize)]
pub(super) struct RegisterRequest {
    #[serde(default)]
    name: Option<String>,
}

/// Accepts a JSON body or an HTML form post.
pub(super) async fn handler_register(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> impl IntoResponse {
    let parsed = if is_form(&request) {
        Form::<RegisterRequest>::from_request(request, &())
            .await
            .map(|Form(r)| r)
            .map_err(|e| bad_body(e.status(), e.body_text()))
    } else {
        json_body(Json::<RegisterRequest>::from_request(request, &()).await)
    };
    let req = match parsed {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let Some(name) = req.name else {
        return error_response(StatusCode::BAD_REQUEST, "name required");
    };
    match state.service.register(&name).await {
        Ok(entrant) => (StatusCode::CREATED, Json(EntrantView::from(&entrant))).into_response(),
        Err(e) => queue_error(e),
    }
}

pub(super) async fn handler_next(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.service.advance().await {
        Some(p) => Json(serde_json::json!({
            "message": "advanced",
            "person": EntrantView::from(&p),
        }))
        .into_response(),
        None => error_response(StatusCode::BAD_REQUEST, "no one to advance"),
    }
}

pub(super) async fn handler_back(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.service.retreat().await {
        Some(p) => Json(serde_json::json!({
            "message": "backed",
            "person": EntrantView::from(&p),
        }))
        .into_response(),
        None => error_response(StatusCode::BAD_REQUEST, "no one to go back"),
    }
}

pub(super) async fn handler_pause(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let remaining = state.service.pause().await;
    Json(serde_json::json!({
        "message": "paused",
        "time_remaining_seconds": remaining,
    }))
}

pub(super) async fn handler_resume(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let remaining = state.service.resume().await;
    Json(serde_json::json!({
        "message": "resumed",
        "time_remaining_seconds": remaining,
    }))
}

#[derive(Deserialize)]
pub(super) struct ReorderRequest {
    #[serde(default)]
    ids: Option<Vec<EntrantId>>,
}

pub(super) async fn handler_reorder(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ReorderRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match json_body(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let Some(ids) = req.ids else {
        return error_response(StatusCode::BAD_REQUEST, "ids list required");
    };
    match state.service.reorder(&ids).await {
        Ok(()) => message("reordered"),
        Err(e) => queue_error(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MoveRequest {
    #[serde(default)]
    id: Option<EntrantId>,
    #[serde(default)]
    to_status: Option<String>,
    #[serde(default)]
    to_position: Option<i64>,
}

pub(super) async fn handler_move(
    State(state): State<Arc<AppState>>,
    body: Result<Json<MoveRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match json_body(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let (Some(id), Some(to_status)) = (req.id, req.to_status) else {
        return error_response(StatusCode::BAD_REQUEST, "id and toStatus required");
    };
    let to: Status = match to_status.parse() {
        Ok(s) => s,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    match state.service.move_to(id, to, req.to_position).await {
        Ok(()) => message("moved"),
        Err(e) => queue_error(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RepositionRequest {
    #[serde(default)]
    id: Option<EntrantId>,
    #[serde(default)]
    to_position: Option<i64>,
}

pub(super) async fn handler_reposition(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RepositionRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match json_body(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let (Some(id), Some(to_position)) = (req.id, req.to_position) else {
        return error_response(StatusCode::BAD_REQUEST, "id and toPosition required");
    };
    match state.service.reposition(id, to_position).await {
        Ok(()) => message("repositioned"),
        Err(e) => queue_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct TourLengthRequest {
    #[serde(default)]
    minutes: Option<i64>,
    #[serde(default)]
    seconds: Option<i64>,
}

pub(super) async fn handler_set_tour_length(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TourLengthRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match json_body(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let result = match (req.minutes, req.seconds) {
        (Some(minutes), _) => state.service.set_tour_length_minutes(minutes).await,
        (None, Some(seconds)) => state.service.set_tour_length_seconds(seconds).await,
        (None, None) => {
            return error_response(StatusCode::BAD_REQUEST, "seconds or minutes required")
        }
    };
    match result {
        Ok(tour_length_seconds) => Json(serde_json::json!({
            "message": "tour length set",
            "tour_length_seconds": tour_length_seconds,
        }))
        .into_response(),
        Err(e) => queue_error(e),
    }
}

pub(super) async fn handler_delete_person(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<EntrantId>,
) -> impl IntoResponse {
    match state.service.delete(id).await {
        Ok(p) => Json(serde_json::json!({
            "message": "deleted",
            "person": EntrantView::from(&p),
        }))
        .into_response(),
        Err(e) => queue_error(e),
    }
}

pub(super) async fn handler_clear(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.service.reset().await;
    message("cleared")
}

pub(super) async fn handler_clear_persons(
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    state.service.clear_entrants().await;
    message("cleared")
}
