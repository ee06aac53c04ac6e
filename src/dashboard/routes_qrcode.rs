//! `GET /qrcode`: PNG QR code pointing entrants at the registration page.
//!
//! The encoded URL is `server.public_url` + `/register` when configured,
//! otherwise it is rebuilt from the request's `Host` and
//! `X-Forwarded-Proto` headers.

use anyhow::Result;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;
use std::sync::Arc;
use tracing::warn;

use super::AppState;

fn register_url(public_url: Option<&str>, headers: &HeaderMap, port: u16) -> String {
    if let Some(base) = public_url {
        return format!("{}/register", base.trim_end_matches('/'));
    }
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let scheme = header_str("x-forwarded-proto").unwrap_or("http");
    match header_str(header::HOST.as_str()) {
        Some(host) => format!("{}://{}/register", scheme, host),
        None => format!("{}://localhost:{}/register", scheme, port),
    }
}

fn render_png(data: &str) -> Result<Vec<u8>> {
    let code = QrCode::new(data.as_bytes())?;
    let img = code
        .render::<Luma<u8>>()
        .min_dimensions(256, 256)
        .build();
    let mut png = Vec::new();
    DynamicImage::ImageLuma8(img).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

pub(super) async fn handler_qrcode(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let url = register_url(
        state.server.public_url.as_deref(),
        &headers,
        state.server.port,
    );
    match render_png(&url) {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(e) => {
            warn!(error = %e, url, "failed to render registration QR code");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "qr code rendering failed" })),
            )
                .into_response()
        }
    }
}
