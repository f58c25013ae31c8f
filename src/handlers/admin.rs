use crate::{
    auth::AdminAuth,
    error::AppError,
    links,
    models::ShortLink,
    store,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};

#[derive(Deserialize)]
pub struct DestinationForm {
    url: String,
}

#[derive(Deserialize)]
pub struct RotationForm {
    interval: i64,
}

#[derive(Deserialize)]
pub struct WatermarkForm {
    path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct WatermarkStatus {
    pub path: Option<PathBuf>,
    pub revision: String,
    pub purged: bool,
}

async fn load(state: &AppState, id: i64) -> Result<ShortLink, AppError> {
    store::bounded(state.config.store_timeout, state.store.get_by_id(id))
        .await?
        .ok_or(AppError::NotFound)
}

// ── Links ──────────────────────────────────────────────────────────────────

/// GET /admin/api/links
pub async fn list_links(
    _auth: AdminAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ShortLink>>, AppError> {
    let links = store::bounded(state.config.store_timeout, state.store.list()).await?;
    Ok(Json(links))
}

/// GET /admin/api/links/:id
pub async fn get_link(
    _auth: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ShortLink>, AppError> {
    Ok(Json(load(&state, id).await?))
}

/// PUT /admin/api/links/:id/destination
///
/// Renders encode the short URL, so cached PNGs stay valid.
pub async fn update_destination(
    _auth: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(form): Json<DestinationForm>,
) -> Result<Json<ShortLink>, AppError> {
    let destination = links::validate_destination(&form.url)?;
    let timeout = state.config.store_timeout;
    if !store::bounded(timeout, state.store.set_destination(id, &destination)).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(id, %destination, "Destination updated");
    Ok(Json(load(&state, id).await?))
}

/// PUT /admin/api/links/:id/rotation
///
/// Negative intervals are stored as 0 (rotation off).
pub async fn update_rotation(
    _auth: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(form): Json<RotationForm>,
) -> Result<Json<ShortLink>, AppError> {
    let interval = form.interval.max(0);
    let timeout = state.config.store_timeout;
    if !store::bounded(timeout, state.store.set_rotation_interval(id, interval)).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(id, interval, "Rotation interval updated");
    Ok(Json(load(&state, id).await?))
}

/// POST /admin/api/links/:id/reset
pub async fn reset_stats(
    _auth: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ShortLink>, AppError> {
    if !store::bounded(state.config.store_timeout, state.store.reset_stats(id)).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(id, "Scan statistics reset");
    Ok(Json(load(&state, id).await?))
}

/// DELETE /admin/api/links/:id
pub async fn delete_link(
    _auth: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !store::bounded(state.config.store_timeout, state.store.delete(id)).await? {
        return Err(AppError::NotFound);
    }
    let purged = state.render_cache.purge_id(id);
    tracing::info!(id, purged, "Link deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── Watermark ──────────────────────────────────────────────────────────────

/// PUT /admin/api/watermark
///
/// `{"path": null}` removes the logo. Every cached render is dropped.
pub async fn set_watermark(
    _auth: AdminAuth,
    State(state): State<Arc<AppState>>,
    Json(form): Json<WatermarkForm>,
) -> Json<WatermarkStatus> {
    let path = form.path.filter(|p| !p.as_os_str().is_empty());
    state.watermarks.configure(path).await;
    state.render_cache.purge_all();

    let watermark = state.watermark().await;
    let path = state.watermarks.path().await;
    tracing::info!(path = ?path, revision = %watermark.revision, "Watermark reconfigured");
    Json(WatermarkStatus {
        path,
        revision: watermark.revision,
        purged: true,
    })
}
