//! Shared fixtures for handler tests: an in-memory app driven through the
//! real router with `tower::ServiceExt::oneshot`.

use crate::{
    clock::FixedClock,
    config::AppConfig,
    models::ShortLink,
    router,
    store::{MemoryStore, RecordStore, StoreError},
    AppState,
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, Request},
    response::Response,
    Router,
};
use chrono::FixedOffset;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tower::ServiceExt;

pub const ADMIN_PASSWORD: &str = "hunter2";

pub fn test_config(watermark_path: Option<PathBuf>) -> AppConfig {
    AppConfig {
        database_url: "memory:".into(),
        admin_password: ADMIN_PASSWORD.into(),
        token_secret: "s".into(),
        host: "127.0.0.1".into(),
        port: 0,
        base_url: "https://go.example.org".into(),
        root_redirect_url: "https://example.org".into(),
        site_offset: FixedOffset::east_opt(0).unwrap(),
        render_cache_ttl: Duration::from_secs(3600),
        render_cache_max_bytes: 16 * 1024 * 1024,
        qr_module_scale: 4,
        qr_quiet_zone: 2,
        dark_threshold: 50,
        watermark_path,
        store_timeout: Duration::from_millis(500),
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_watermark(None).await
    }

    pub async fn with_watermark(path: Option<PathBuf>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::at(1_000));
        let state = Arc::new(AppState::new(test_config(path), store.clone(), clock.clone()));
        Self {
            router: router(state.clone()),
            state,
            store,
            clock,
        }
    }

    pub async fn link(&self, destination: &str, interval: i64) -> ShortLink {
        let slug = crate::links::random_slug(6);
        let link = self.store.insert(&slug, destination, 0).await.unwrap();
        self.store.set_rotation_interval(link.id, interval).await.unwrap();
        self.store.get_by_id(link.id).await.unwrap().unwrap()
    }

    pub async fn scans(&self, id: i64) -> i64 {
        self.store.get_by_id(id).await.unwrap().unwrap().scan_count
    }
}

/// Record store whose every call fails like a timed-out backend.
pub struct StuckStore;

impl StuckStore {
    pub fn app() -> (Arc<AppState>, Router) {
        let state = Arc::new(AppState::new(
            test_config(None),
            Arc::new(StuckStore),
            Arc::new(FixedClock::at(1_000)),
        ));
        (state.clone(), router(state))
    }
}

fn down<T>() -> Result<T, StoreError> {
    Err(StoreError::Timeout(Duration::from_millis(500)))
}

#[async_trait]
impl RecordStore for StuckStore {
    async fn get_by_slug(&self, _: &str) -> Result<Option<ShortLink>, StoreError> {
        down()
    }
    async fn get_by_id(&self, _: i64) -> Result<Option<ShortLink>, StoreError> {
        down()
    }
    async fn find_by_destination(&self, _: &str) -> Result<Option<ShortLink>, StoreError> {
        down()
    }
    async fn insert(&self, _: &str, _: &str, _: i64) -> Result<ShortLink, StoreError> {
        down()
    }
    async fn list(&self) -> Result<Vec<ShortLink>, StoreError> {
        down()
    }
    async fn increment_scan(&self, _: i64, _: &str, _: i64) -> Result<bool, StoreError> {
        down()
    }
    async fn set_destination(&self, _: i64, _: &str) -> Result<bool, StoreError> {
        down()
    }
    async fn set_rotation_interval(&self, _: i64, _: i64) -> Result<bool, StoreError> {
        down()
    }
    async fn reset_stats(&self, _: i64) -> Result<bool, StoreError> {
        down()
    }
    async fn delete(&self, _: i64) -> Result<bool, StoreError> {
        down()
    }
}

/// Move a file's modification time `secs` into the future.
pub fn push_mtime_forward(path: &Path, secs: u64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    let modified = file.metadata().unwrap().modified().unwrap();
    file.set_modified(modified + Duration::from_secs(secs)).unwrap();
}

async fn dispatch(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
    bearer: Option<&str>,
) -> Response {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();
    router.clone().oneshot(req).await.unwrap()
}

pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Response {
    dispatch(router, method, uri, body, None).await
}

pub async fn send_admin(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Response {
    dispatch(router, method, uri, body, Some(ADMIN_PASSWORD)).await
}

pub async fn body_bytes(res: Response) -> Bytes {
    to_bytes(res.into_body(), usize::MAX).await.unwrap()
}

pub async fn body_string(res: Response) -> String {
    String::from_utf8(body_bytes(res).await.to_vec()).unwrap()
}

pub async fn body_json(res: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(res).await).unwrap()
}
