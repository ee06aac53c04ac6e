//! # Dashboard: HTTP Surface for the Tour Queue
//!
//! Runs an Axum HTTP server exposing the queue commands and the polled status
//! view. An optional static directory (the presentation client) is served as
//! the fallback route.
//!
//! Every handler goes through the shared [`QueueService`]; the router holds no
//! queue state of its own.

mod routes_health;
mod routes_qrcode;
mod routes_queue;
mod routes_status;

use crate::config::ServerSection;
use crate::prom_metrics;
use crate::service::QueueService;
use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::routing::{delete, get, post};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};

pub struct AppState {
    pub service: QueueService,
    pub prom_metrics: Arc<prom_metrics::Metrics>,
    pub server: ServerSection,
}

impl AppState {
    pub fn new(service: QueueService, server: ServerSection) -> Arc<Self> {
        let prom_metrics = service.metrics_handle();
        Arc::new(AppState {
            service,
            prom_metrics,
            server,
        })
    }
}

/// Middleware that records HTTP request duration into the Prometheus histogram,
/// generates (or propagates) a request ID for correlation, and wraps the
/// request in a tracing span.
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    let duration = start.elapsed().as_secs_f64();
    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(duration);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Collapse numeric path segments (entrant ids) so the histogram label set
/// stays bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if !seg.is_empty() && seg.chars().all(|c| c.is_ascii_digit() || c == '-') {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/api/status", get(routes_status::handler_api_status))
        .route("/register", post(routes_queue::handler_register))
        .route("/api/register", post(routes_queue::handler_register))
        .route("/api/next", post(routes_queue::handler_next))
        .route("/api/back", post(routes_queue::handler_back))
        .route("/api/pause", post(routes_queue::handler_pause))
        .route("/api/resume", post(routes_queue::handler_resume))
        .route("/api/reorder", post(routes_queue::handler_reorder))
        .route("/api/move", post(routes_queue::handler_move))
        .route("/api/reposition", post(routes_queue::handler_reposition))
        .route(
            "/api/set-tour-length",
            post(routes_queue::handler_set_tour_length),
        )
        .route("/api/person/{id}", delete(routes_queue::handler_delete_person))
        .route("/api/clear", post(routes_queue::handler_clear))
        .route(
            "/api/clear-persons",
            post(routes_queue::handler_clear_persons),
        )
        .route("/qrcode", get(routes_qrcode::handler_qrcode))
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    let body_limit = state.server.body_limit_bytes;
    let timeout = Duration::from_secs(state.server.request_timeout_secs);

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(CatchPanicLayer::new())
    .layer(axum::middleware::from_fn_with_state(
        state.clone(),
        metrics_middleware,
    ))
    .layer(TraceLayer::new_for_http())
    .layer(RequestBodyLimitLayer::new(body_limit))
    .layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        timeout,
    ))
    .with_state(state)
}

/// Bind `0.0.0.0:port` and serve until SIGINT/SIGTERM.
pub async fn run(state: Arc<AppState>, port: u16, static_dir: Option<&Path>) -> Result<()> {
    let app = build_router(state.clone(), static_dir);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(
        port,
        backend = state.service.backend().describe(),
        "tour queue running"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("tour queue shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
                info!("received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_preserves_api_routes() {
        assert_eq!(normalize_path("/api/status"), "/api/status");
        assert_eq!(normalize_path("/api/set-tour-length"), "/api/set-tour-length");
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }

    #[test]
    fn normalize_path_collapses_entrant_ids() {
        assert_eq!(normalize_path("/api/person/42"), "/api/person/:id");
        assert_eq!(normalize_path("/api/person/-1"), "/api/person/:id");
    }

    #[test]
    fn normalize_path_handles_empty_and_root() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "");
    }
}
