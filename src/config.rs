use anyhow::{Context, Result};
use chrono::FixedOffset;
use std::{path::PathBuf, time::Duration};

use crate::compositor::DEFAULT_DARK_THRESHOLD;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// sqlite connection string, e.g. "sqlite:./qrlink.db", or "memory:"
    pub database_url: String,

    /// Bearer token required by the admin API
    pub admin_password: String,

    /// Secret salt mixed into rotation tokens. Changing it revokes every
    /// outstanding QR token immediately.
    pub token_secret: String,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL used when generating short links, e.g. "https://go.example.com"
    /// Must NOT have a trailing slash.
    pub base_url: String,

    /// URL to redirect visitors to when they hit the root path ("/").
    pub root_redirect_url: String,

    /// Offset used to derive the site-local day of a scan
    pub site_offset: FixedOffset,

    /// Lifetime of a rendered PNG in the render cache
    pub render_cache_ttl: Duration,

    /// Upper bound on the total size of cached PNGs, in bytes
    pub render_cache_max_bytes: u64,

    /// Pixels per QR module
    pub qr_module_scale: u32,

    /// Quiet-zone border, in modules
    pub qr_quiet_zone: u32,

    /// Pixels with every channel below this are recoloured
    pub dark_threshold: u8,

    /// Logo overlaid at the centre of rendered codes
    pub watermark_path: Option<PathBuf>,

    /// Upper bound on any single record-store call
    pub store_timeout: Duration,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn required(key: &str) -> Result<String> {
    let value = std::env::var(key)
        .with_context(|| format!("{key} must be set in the environment or .env file"))?;
    if value.trim().is_empty() {
        anyhow::bail!("{key} must not be empty");
    }
    Ok(value)
}

/// Parse "+07:00" / "-03:30" / "Z".
pub fn parse_offset(raw: &str) -> Result<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.is_empty() {
        return FixedOffset::east_opt(0).context("zero offset");
    }
    raw.parse::<FixedOffset>()
        .map_err(|e| anyhow::anyhow!("SITE_UTC_OFFSET '{raw}' is not a valid UTC offset: {e}"))
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let admin_password = required("ADMIN_PASSWORD")?;
        let token_secret = required("TOKEN_SECRET")?;

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let base_url = std::env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let root_redirect_url = std::env::var("ROOT_REDIRECT_URL")
            .unwrap_or_else(|_| base_url.clone())
            .trim_end_matches('/')
            .to_owned();

        let site_offset =
            parse_offset(&std::env::var("SITE_UTC_OFFSET").unwrap_or_else(|_| "+00:00".into()))?;

        let watermark_path = std::env::var("WATERMARK_PATH")
            .ok()
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./qrlink.db".into()),
            admin_password,
            token_secret,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            base_url,
            root_redirect_url,
            site_offset,
            render_cache_ttl: Duration::from_secs(env_or("QR_CACHE_TTL_SECS", 3600)),
            render_cache_max_bytes: env_or("QR_CACHE_MAX_BYTES", 64 * 1024 * 1024),
            qr_module_scale: env_or("QR_MODULE_SCALE", 8u32).max(1),
            qr_quiet_zone: env_or("QR_QUIET_ZONE", 2),
            dark_threshold: env_or("DARK_THRESHOLD", DEFAULT_DARK_THRESHOLD),
            watermark_path,
            store_timeout: Duration::from_millis(env_or("STORE_TIMEOUT_MS", 2000)),
        })
    }
}
