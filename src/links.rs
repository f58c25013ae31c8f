use crate::{
    error::AppError,
    models::ShortLink,
    store::{self, RecordStore, StoreError},
};
use rand::Rng;
use std::time::Duration;

const SLUG_LEN: usize = 6;
const SLUG_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Validate a submitted destination: an absolute http(s) URL.
/// Returns the normalised serialisation.
pub fn validate_destination(raw: &str) -> Result<String, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::BadRequest("URL must not be empty.".into()));
    }
    let parsed = url::Url::parse(raw)
        .map_err(|e| AppError::BadRequest(format!("Invalid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(AppError::BadRequest(
            "URL must start with http:// or https://".into(),
        ));
    }
    Ok(parsed.to_string())
}

/// Custom slugs: letters, numbers and hyphens only.
pub fn validate_slug(raw: &str) -> Result<String, AppError> {
    let slug = raw.trim();
    if slug.is_empty() || slug.len() > 64 {
        return Err(AppError::BadRequest("Slug must be 1-64 characters.".into()));
    }
    if !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(AppError::BadRequest(
            "Slug may only contain letters, numbers, and hyphens.".into(),
        ));
    }
    Ok(slug.to_owned())
}

/// Generate a random alphanumeric string of the given length.
pub fn random_slug(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| SLUG_ALPHABET[rng.gen_range(0..SLUG_ALPHABET.len())] as char)
        .collect()
}

/// Outcome of a link submission.
#[derive(Debug, Clone)]
pub struct Submitted {
    pub link: ShortLink,
    /// `false` when an existing record for the same destination was reused.
    pub created: bool,
}

/// Create a link for `destination`, or hand back the existing one.
///
/// Without a custom slug a random one is generated; collisions are retried a
/// few times with a longer slug as the last resort (the store's uniqueness
/// check is the real guard).
pub async fn submit(
    store: &dyn RecordStore,
    timeout: Duration,
    destination: &str,
    custom_slug: Option<&str>,
    now: i64,
) -> Result<Submitted, AppError> {
    let destination = validate_destination(destination)?;
    let custom_slug = custom_slug
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(validate_slug)
        .transpose()?;

    if let Some(link) = store::bounded(timeout, store.find_by_destination(&destination)).await? {
        tracing::debug!(id = link.id, "Reusing existing link for destination");
        return Ok(Submitted {
            link,
            created: false,
        });
    }

    if let Some(slug) = custom_slug {
        let link = store::bounded(timeout, store.insert(&slug, &destination, now)).await?;
        tracing::info!(id = link.id, slug = %link.slug, "Link created");
        return Ok(Submitted { link, created: true });
    }

    for attempt in 0..10 {
        let len = if attempt < 9 { SLUG_LEN } else { SLUG_LEN + 3 };
        let slug = random_slug(len);
        match store::bounded(timeout, store.insert(&slug, &destination, now)).await {
            Ok(link) => {
                tracing::info!(id = link.id, slug = %link.slug, "Link created");
                return Ok(Submitted { link, created: true });
            }
            Err(StoreError::Conflict(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal(anyhow::anyhow!(
        "could not find a free slug after 10 attempts"
    )))
}
