//! Rotating QR access tokens.
//!
//! A token is the first [`TOKEN_LEN`] hex characters of
//! `SHA-256("{id}|{bucket}|" ++ secret)` where `bucket = floor(now / interval)`.
//! It is valid only inside its own bucket: there is no grace window for the
//! neighbouring bucket, so a scan that lands just after a boundary is
//! rejected even if the code was fetched a moment earlier.
//!
//! Rotating the secret salt invalidates every outstanding token at once and
//! is the emergency-revoke lever for printed codes.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Number of hex characters kept from the digest.
pub const TOKEN_LEN: usize = 10;

/// Process-wide secret mixed into every token.
pub trait SecretProvider: Send + Sync {
    fn salt(&self) -> &[u8];
}

/// Secret loaded once from configuration.
pub struct StaticSecret {
    salt: Vec<u8>,
}

impl StaticSecret {
    pub fn new(salt: impl Into<Vec<u8>>) -> Self {
        Self { salt: salt.into() }
    }
}

impl SecretProvider for StaticSecret {
    fn salt(&self) -> &[u8] {
        &self.salt
    }
}

/// Rotation window index for `now`. `interval` must be positive.
pub fn time_bucket(now: i64, interval: i64) -> i64 {
    now.div_euclid(interval)
}

/// Token for a specific bucket.
pub fn compute_token(id: i64, bucket: i64, secret: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{id}|{bucket}|").as_bytes());
    hasher.update(secret);
    let mut token = hex::encode(hasher.finalize());
    token.truncate(TOKEN_LEN);
    token
}

/// Token for the bucket containing `now`, or `None` when rotation is
/// disabled (`interval <= 0`).
pub fn token_at(id: i64, now: i64, interval: i64, secret: &[u8]) -> Option<String> {
    if interval <= 0 {
        return None;
    }
    Some(compute_token(id, time_bucket(now, interval), secret))
}

/// Check `supplied` against the token for the bucket containing `now`.
///
/// The comparison is constant-time over the token bytes.
pub fn validate_token(id: i64, supplied: &str, interval: i64, secret: &[u8], now: i64) -> bool {
    match token_at(id, now, interval, secret) {
        Some(expected) => supplied.as_bytes().ct_eq(expected.as_bytes()).into(),
        None => false,
    }
}

/// Current rotation window as presented to a client that re-fetches its code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationWindow {
    pub token: String,
    /// Seconds until the token flips, never zero.
    pub remaining_seconds: i64,
    pub next_change: i64,
}

impl RotationWindow {
    pub fn at(id: i64, now: i64, interval: i64, secret: &[u8]) -> Option<Self> {
        let token = token_at(id, now, interval, secret)?;
        let remaining_seconds = (interval - now.rem_euclid(interval)).max(1);
        Some(Self {
            token,
            remaining_seconds,
            next_change: now + remaining_seconds,
        })
    }
}
