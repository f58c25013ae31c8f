use std::{net::SocketAddr, sync::Arc};

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod cache;
mod clock;
mod compositor;
mod config;
mod error;
mod handlers;
mod links;
mod models;
mod qr;
mod render;
mod resolver;
mod store;
mod token;
mod watermark;

#[cfg(test)]
mod testing;

use cache::RenderCache;
use clock::{Clock, SystemClock};
use qr::{QrCodeEncoder, QrEncoder};
use resolver::Resolver;
use store::RecordStore;
use token::{SecretProvider, StaticSecret};
use watermark::{Watermark, WatermarkRegistry};

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub config: config::AppConfig,
    pub store: Arc<dyn RecordStore>,
    pub clock: Arc<dyn Clock>,
    pub secret: Arc<dyn SecretProvider>,
    pub encoder: Arc<dyn QrEncoder>,
    /// Rendered PNGs keyed by (id, colour, watermark revision).
    pub render_cache: RenderCache,
    pub watermarks: WatermarkRegistry,
}

impl AppState {
    pub fn new(
        config: config::AppConfig,
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            secret: Arc::new(StaticSecret::new(config.token_secret.clone())),
            encoder: Arc::new(QrCodeEncoder::new(config.qr_module_scale, config.qr_quiet_zone)),
            render_cache: RenderCache::new(
                config.render_cache_ttl,
                config.render_cache_max_bytes,
            ),
            watermarks: WatermarkRegistry::new(config.watermark_path.clone()),
            config,
            store,
            clock,
        }
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(
            self.store.as_ref(),
            self.clock.as_ref(),
            self.secret.as_ref(),
            self.config.store_timeout,
        )
    }

    /// Current watermark. Renders made with a previous logo are dropped the
    /// first time a new revision is seen.
    pub async fn watermark(&self) -> Watermark {
        let (watermark, changed) = self.watermarks.current().await;
        if changed {
            self.render_cache.purge_all();
            tracing::info!(revision = %watermark.revision, "Watermark changed; render cache purged");
        }
        watermark
    }
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    let admin_router = Router::new()
        .route("/links", get(handlers::admin::list_links))
        .route(
            "/links/:id",
            get(handlers::admin::get_link).delete(handlers::admin::delete_link),
        )
        .route("/links/:id/destination", put(handlers::admin::update_destination))
        .route("/links/:id/rotation", put(handlers::admin::update_rotation))
        .route("/links/:id/reset", post(handlers::admin::reset_stats))
        .route("/watermark", put(handlers::admin::set_watermark));

    Router::new()
        .route("/", get(handlers::redirect::index))
        // Health check, no auth
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .route("/qr-png", get(handlers::qr::qr_png))
        .route("/api/links", post(handlers::api::create_link))
        .route("/api/links/:id/current", get(handlers::api::current))
        .nest("/admin/api", admin_router)
        // Short-link redirect. Must come LAST so static routes take priority
        .route("/:slug", get(handlers::redirect::redirect))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent; env vars may already be set)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qrlink=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting qrlink on {}:{}", config.host, config.port);
    tracing::info!("Base URL: {}", config.base_url);

    let store = store::open(&config.database_url).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.site_offset));
    let bind_addr = format!("{}:{}", config.host, config.port);

    let state = Arc::new(AppState::new(config, store, clock));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
