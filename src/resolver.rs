//! Per-request redirect decision.
//!
//! `LOOKUP → NOT_FOUND | FOUND`, `FOUND → ROTATION_DISABLED | ROTATION_CHECK`,
//! `ROTATION_CHECK → VALID | EXPIRED`. Only requests carrying the QR-scan
//! marker (`qr=1`) are ever checked; plain shared links always redirect.

use crate::{
    clock::Clock,
    models::ShortLink,
    store::{self, RecordStore, StoreError},
    token::{self, SecretProvider},
};
use std::time::Duration;

/// Query string of `GET /:slug`.
#[derive(Debug, Clone, Default)]
pub struct RedirectQuery {
    pub qr: Option<String>,
    pub t: Option<String>,
}

impl RedirectQuery {
    pub fn is_qr_scan(&self) -> bool {
        self.qr.as_deref() == Some("1")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Redirect { id: i64, destination: String },
    Gone,
    NotFound,
}

pub struct Resolver<'a> {
    store: &'a dyn RecordStore,
    clock: &'a dyn Clock,
    secret: &'a dyn SecretProvider,
    timeout: Duration,
}

impl<'a> Resolver<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        clock: &'a dyn Clock,
        secret: &'a dyn SecretProvider,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            secret,
            timeout,
        }
    }

    /// Decide the outcome for `slug`. A successful resolution has already
    /// attempted to record the scan; a store failure on the lookup itself is
    /// returned as an error.
    pub async fn resolve(&self, slug: &str, query: &RedirectQuery) -> Result<Resolution, StoreError> {
        let link = match store::bounded(self.timeout, self.store.get_by_slug(slug)).await? {
            Some(link) if !link.destination.is_empty() => link,
            _ => return Ok(Resolution::NotFound),
        };

        let now = self.clock.now();

        if query.is_qr_scan() && link.rotation_enabled() {
            let valid = query
                .t
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(|t| {
                    token::validate_token(link.id, t, link.rotation_interval, self.secret.salt(), now)
                })
                .unwrap_or(false);

            if !valid {
                tracing::debug!(slug, id = link.id, "Rejected expired or missing QR token");
                return Ok(Resolution::Gone);
            }
        }

        self.record_scan(&link, now).await;

        Ok(Resolution::Redirect {
            id: link.id,
            destination: link.destination,
        })
    }

    /// Best effort: a failed increment is logged and never blocks the redirect.
    async fn record_scan(&self, link: &ShortLink, now: i64) {
        let day = self.clock.today(now);
        match store::bounded(self.timeout, self.store.increment_scan(link.id, &day, now)).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(id = link.id, "Scan logging: link disappeared between lookup and increment");
            }
            Err(e) => {
                tracing::warn!(id = link.id, error = %e, "Scan logging failed");
            }
        }
    }
}
