use super::{last_param, QueryPairs};
use crate::{
    error::AppError,
    resolver::{RedirectQuery, Resolution},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

/// GET /
/// Redirect root visitors to the configured ROOT_REDIRECT_URL.
pub async fn index(State(state): State<Arc<AppState>>) -> Redirect {
    Redirect::to(&state.config.root_redirect_url)
}

/// GET /:slug[?qr=1&t=<token>]
///
/// 1. Resolve the slug (404 if unknown).
/// 2. Requests marked as QR scans on a rotating link must carry the token
///    for the current window, otherwise 410.
/// 3. Record the scan (best effort), then 301 to the destination.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(pairs): Query<QueryPairs>,
) -> Result<Response, AppError> {
    let query = RedirectQuery {
        qr: last_param(&pairs, "qr"),
        t: last_param(&pairs, "t"),
    };
    match state.resolver().resolve(&slug, &query).await? {
        Resolution::Redirect { id, destination } => {
            tracing::debug!(id, slug = %slug, "Redirecting");
            Ok((
                StatusCode::MOVED_PERMANENTLY,
                [
                    (header::LOCATION, destination),
                    // a browser-cached 301 would skip both counting and token checks
                    (header::CACHE_CONTROL, "no-store".to_owned()),
                ],
            )
                .into_response())
        }
        Resolution::Gone => Err(AppError::Expired),
        Resolution::NotFound => Err(AppError::NotFound),
    }
}
