use crate::{
    error::AppError,
    links,
    models::ShortLink,
    store,
    token::RotationWindow,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    url: String,
    slug: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedLink {
    pub id: i64,
    pub slug: String,
    pub short_url: String,
    pub qr_png_url: String,
    pub created: bool,
}

impl CreatedLink {
    fn new(link: &ShortLink, base_url: &str, created: bool) -> Self {
        Self {
            id: link.id,
            slug: link.slug.clone(),
            short_url: link.short_url(base_url),
            qr_png_url: format!("{base_url}/qr-png?id={}", link.id),
            created,
        }
    }
}

/// What a page showing the code needs to know to refresh it on time.
#[derive(Debug, Serialize)]
pub struct CurrentQr {
    pub id: i64,
    pub short_url: String,
    pub destination: String,
    pub rotation_interval: i64,
    pub has_rotation: bool,
    pub now: i64,
    pub remaining_seconds: i64,
    pub next_change: i64,
    pub tokenized_short_url: String,
}

/// POST /api/links
///
/// 201 for a new record, 200 when an existing record for the same
/// destination is handed back.
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLinkRequest>,
) -> Result<Response, AppError> {
    let submitted = links::submit(
        state.store.as_ref(),
        state.config.store_timeout,
        &req.url,
        req.slug.as_deref(),
        state.clock.now(),
    )
    .await?;

    let status = if submitted.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let body = CreatedLink::new(&submitted.link, &state.config.base_url, submitted.created);
    Ok((status, Json(body)).into_response())
}

/// GET /api/links/:id/current
pub async fn current(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = id.parse::<i64>().map_err(|_| AppError::NotFound)?;
    let link = store::bounded(state.config.store_timeout, state.store.get_by_id(id))
        .await?
        .ok_or(AppError::NotFound)?;

    let now = state.clock.now();
    let short_url = link.short_url(&state.config.base_url);
    let window = RotationWindow::at(link.id, now, link.rotation_interval, state.secret.salt());

    let (remaining_seconds, next_change, tokenized_short_url) = match window {
        Some(w) => (
            w.remaining_seconds,
            w.next_change,
            format!("{short_url}?qr=1&t={}", w.token),
        ),
        None => (0, 0, String::new()),
    };

    let body = CurrentQr {
        id: link.id,
        has_rotation: link.rotation_enabled(),
        rotation_interval: link.rotation_interval,
        destination: link.destination,
        short_url,
        now,
        remaining_seconds,
        next_change,
        tokenized_short_url,
    };

    Ok(([(header::CACHE_CONTROL, "no-store")], Json(body)).into_response())
}
