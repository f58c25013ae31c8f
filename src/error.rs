//! Request-level error type and its HTTP mapping.
//!
//! Malformed query parameters never reach this type: they are normalised to
//! safe defaults by the handlers, because the public endpoints are hit by
//! untrusted QR-scanning clients.

use crate::store::StoreError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
};

/// Failures inside the QR render pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("QR encoding failed: {0}")]
    Encode(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("render task aborted: {0}")]
    Task(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    /// Valid slug, but the QR rotation token is missing or outside its window.
    #[error("QR code expired")]
    Expired,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("record store unavailable: {0}")]
    StoreUnavailable(StoreError),

    #[error("render failed: {0}")]
    RenderFailure(#[from] RenderError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(slug) => Self::Conflict(format!("slug '{slug}' is already taken")),
            other => Self::StoreUnavailable(other),
        }
    }
}

const EXPIRED_PAGE: &str = r#"<!doctype html>
<meta charset="utf-8">
<title>QR code expired</title>
<div style="font:16px/1.6 -apple-system,BlinkMacSystemFont,Segoe UI,Roboto,Helvetica,Arial,sans-serif;padding:24px;max-width:720px;margin:40px auto;">
<h1 style="margin:0 0 8px;">This QR code has expired</h1>
<p>Please scan the latest QR code again. Codes for this link change periodically and older ones stop working.</p>
</div>
"#;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => (StatusCode::NOT_FOUND, "Short link not found").into_response(),
            Self::Expired => (
                StatusCode::GONE,
                [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
                Html(EXPIRED_PAGE),
            )
                .into_response(),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))],
                "Unauthorized",
            )
                .into_response(),
            Self::StoreUnavailable(err) => {
                tracing::error!(error = %err, "record store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable").into_response()
            }
            Self::RenderFailure(err) => {
                tracing::error!(error = %err, "QR render failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render QR code").into_response()
            }
            Self::Internal(err) => {
                tracing::error!(error = ?err, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}
