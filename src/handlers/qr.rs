use super::{last_param, QueryPairs};
use crate::{
    cache::RenderKey,
    compositor::HexColor,
    error::{AppError, RenderError},
    render::{self, RenderSpec},
    store, AppState,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

static X_CACHE: HeaderName = HeaderName::from_static("x-cache");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheStatus {
    Hit,
    Miss,
}

/// GET /qr-png?id=<id>&color=<RRGGBB>
///
/// The code always encodes the link's public short URL so scans go through
/// the resolver. A deleted id is 404 even while stale cache entries exist;
/// only a store failure lets a cached PNG be served without a fresh lookup.
pub async fn qr_png(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QueryPairs>,
) -> Result<Response, AppError> {
    // malformed values degrade (404 / default colour) instead of 400ing
    let id = last_param(&query, "id")
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .ok_or(AppError::NotFound)?;

    let color = HexColor::parse_or_default(last_param(&query, "color").as_deref());
    let watermark = state.watermark().await;
    let key = RenderKey::new(id, color, watermark.revision.clone());

    let link = match store::bounded(state.config.store_timeout, state.store.get_by_id(id)).await {
        Ok(Some(link)) => link,
        Ok(None) => return Err(AppError::NotFound),
        // store unreachable: an already-rendered code is still the right answer
        Err(e) => match state.render_cache.get(&key) {
            Some(png) => {
                tracing::warn!(id, error = %e, "Record store unavailable; serving cached QR");
                return Ok(png_response(png, CacheStatus::Hit));
            }
            None => return Err(e.into()),
        },
    };

    if let Some(png) = state.render_cache.get(&key) {
        tracing::debug!(id, %color, "QR cache hit");
        return Ok(png_response(png, CacheStatus::Hit));
    }

    tracing::debug!(id, %color, revision = %watermark.revision, "QR cache miss, rendering");

    let text = link.short_url(&state.config.base_url);
    let encoder = state.encoder.clone();
    let threshold = state.config.dark_threshold;
    let png = tokio::task::spawn_blocking(move || {
        let spec = RenderSpec {
            text: &text,
            color,
            dark_threshold: threshold,
            logo: watermark.logo.as_deref(),
        };
        render::render_png(encoder.as_ref(), &spec)
    })
    .await
    .map_err(|e| RenderError::Task(e.to_string()))??;

    let png = Bytes::from(png);
    state.render_cache.put(key, png.clone());

    Ok(png_response(png, CacheStatus::Miss))
}

/// Build an HTTP response with PNG content and cache headers.
fn png_response(png: Bytes, status: CacheStatus) -> Response {
    let cache = match status {
        CacheStatus::Hit => "HIT",
        CacheStatus::Miss => "MISS",
    };
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
        (header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=3600")),
        (X_CACHE.clone(), HeaderValue::from_static(cache)),
    ];

    (StatusCode::OK, headers, png).into_response()
}

#[cfg(test)]
mod tests {
    use crate::{
        cache::RenderKey,
        compositor::HexColor,
        store::RecordStore,
        testing::{body_bytes, push_mtime_forward, send, send_admin, StuckStore, TestApp},
        watermark::NO_WATERMARK,
    };
    use axum::{
        body::Bytes,
        http::{header, StatusCode},
    };
    use image::{Rgba, RgbaImage};

    #[tokio::test]
    async fn first_request_misses_then_hits_with_identical_bytes() {
        let app = TestApp::new().await;
        let link = app.link("https://example.com", 0).await;
        let uri = format!("/qr-png?id={}", link.id);

        let first = send(&app.router, "GET", &uri, None).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(first.headers()[header::CACHE_CONTROL], "public, max-age=3600");
        assert_eq!(first.headers()["x-cache"], "MISS");
        let first = body_bytes(first).await;
        assert!(first.starts_with(b"\x89PNG"));

        let second = send(&app.router, "GET", &uri, None).await;
        assert_eq!(second.headers()["x-cache"], "HIT");
        assert_eq!(body_bytes(second).await, first);
    }

    #[tokio::test]
    async fn recompute_after_purge_is_byte_identical() {
        let app = TestApp::new().await;
        let link = app.link("https://example.com", 0).await;
        let uri = format!("/qr-png?id={}&color=0A68FF", link.id);

        let first = body_bytes(send(&app.router, "GET", &uri, None).await).await;
        app.state.render_cache.purge_all();
        let res = send(&app.router, "GET", &uri, None).await;
        assert_eq!(res.headers()["x-cache"], "MISS");
        assert_eq!(body_bytes(res).await, first);
    }

    #[tokio::test]
    async fn encodes_the_short_url_not_the_destination() {
        let app = TestApp::new().await;
        let link = app.link("https://example.com", 0).await;
        let res = send(&app.router, "GET", &format!("/qr-png?id={}", link.id), None).await;
        let served = body_bytes(res).await;

        let expected = crate::render::render_png(
            app.state.encoder.as_ref(),
            &crate::render::RenderSpec {
                text: &format!("https://go.example.org/{}", link.slug),
                color: crate::compositor::HexColor::BLACK,
                dark_threshold: 50,
                logo: None,
            },
        )
        .unwrap();
        assert_eq!(served.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn invalid_ids_are_404() {
        let app = TestApp::new().await;
        for uri in ["/qr-png", "/qr-png?id=", "/qr-png?id=abc", "/qr-png?id=-3", "/qr-png?id=999"] {
            let res = send(&app.router, "GET", uri, None).await;
            assert_eq!(res.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn invalid_color_falls_back_to_black() {
        let app = TestApp::new().await;
        let link = app.link("https://example.com", 0).await;

        let black = body_bytes(
            send(&app.router, "GET", &format!("/qr-png?id={}", link.id), None).await,
        )
        .await;
        let res = send(&app.router, "GET", &format!("/qr-png?id={}&color=nothex", link.id), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        // same cache key as the default colour
        assert_eq!(res.headers()["x-cache"], "HIT");
        assert_eq!(body_bytes(res).await, black);
    }

    #[tokio::test]
    async fn repeated_query_keys_use_the_last_value() {
        let app = TestApp::new().await;
        let link = app.link("https://example.com", 0).await;

        let green = body_bytes(
            send(&app.router, "GET", &format!("/qr-png?id={}&color=00ff00", link.id), None).await,
        )
        .await;

        let uri = format!("/qr-png?id=999&id={}&color=ff0000&color=00ff00", link.id);
        let res = send(&app.router, "GET", &uri, None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-cache"], "HIT");
        assert_eq!(body_bytes(res).await, green);
    }

    #[tokio::test]
    async fn deleted_link_is_404_despite_cached_png() {
        let app = TestApp::new().await;
        let link = app.link("https://example.com", 0).await;
        let uri = format!("/qr-png?id={}", link.id);
        send(&app.router, "GET", &uri, None).await;

        // remove the record behind the cache's back
        app.store.delete(link.id).await.unwrap();
        assert!(!app.state.render_cache.is_empty());

        let res = send(&app.router, "GET", &uri, None).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn store_outage_serves_cached_png_or_503() {
        let (state, router) = StuckStore::app();
        let key = RenderKey::new(7, HexColor::BLACK, NO_WATERMARK);
        state.render_cache.put(key, Bytes::from_static(b"png"));

        let res = send(&router, "GET", "/qr-png?id=7", None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-cache"], "HIT");
        assert_eq!(body_bytes(res).await.as_ref(), b"png");

        let res = send(&router, "GET", "/qr-png?id=8", None).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn watermark_change_produces_new_renders() {
        let dir = tempfile::tempdir().unwrap();
        let logo_path = dir.path().join("logo.png");
        RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255])).save(&logo_path).unwrap();

        let app = TestApp::new().await;
        let link = app.link("https://example.com", 0).await;
        let uri = format!("/qr-png?id={}", link.id);

        let plain = body_bytes(send(&app.router, "GET", &uri, None).await).await;

        let res = send_admin(
            &app.router,
            "PUT",
            "/admin/api/watermark",
            Some(serde_json::json!({ "path": logo_path })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = send(&app.router, "GET", &uri, None).await;
        assert_eq!(res.headers()["x-cache"], "MISS");
        let marked = body_bytes(res).await;
        assert_ne!(marked, plain);

        let img = image::load_from_memory(&marked).unwrap().into_rgba8();
        let (w, h) = img.dimensions();
        assert_eq!(*img.get_pixel(w / 2, h / 2), Rgba([255, 0, 0, 255]));
    }

    #[tokio::test]
    async fn rewriting_the_logo_in_place_invalidates_renders() {
        let dir = tempfile::tempdir().unwrap();
        let logo_path = dir.path().join("logo.png");
        RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255])).save(&logo_path).unwrap();

        let app = TestApp::with_watermark(Some(logo_path.clone())).await;
        let link = app.link("https://example.com", 0).await;
        let uri = format!("/qr-png?id={}", link.id);

        let res = send(&app.router, "GET", &uri, None).await;
        assert_eq!(res.headers()["x-cache"], "MISS");
        let red = body_bytes(res).await;
        let res = send(&app.router, "GET", &uri, None).await;
        assert_eq!(res.headers()["x-cache"], "HIT");
        let before = app.state.watermark().await.revision;

        // same path, new content and a later mtime
        RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255])).save(&logo_path).unwrap();
        push_mtime_forward(&logo_path, 60);

        let res = send(&app.router, "GET", &uri, None).await;
        assert_eq!(res.headers()["x-cache"], "MISS");
        let blue = body_bytes(res).await;
        assert_ne!(blue, red);

        let img = image::load_from_memory(&blue).unwrap().into_rgba8();
        let (w, h) = img.dimensions();
        assert_eq!(*img.get_pixel(w / 2, h / 2), Rgba([0, 0, 255, 255]));

        let after = app.state.watermark().await.revision;
        assert_ne!(after, before);
        assert_ne!(after, NO_WATERMARK);
    }
}
