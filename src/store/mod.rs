//! Record store adapter.
//!
//! The core only sees the narrow [`RecordStore`] interface; the sqlite and
//! in-memory backends are interchangeable and selected by `DATABASE_URL`.

use crate::models::ShortLink;
use async_trait::async_trait;
use std::{future::Future, sync::Arc, time::Duration};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("slug '{0}' is already taken")]
    Conflict(String),

    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_by_slug(&self, slug: &str) -> Result<Option<ShortLink>, StoreError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<ShortLink>, StoreError>;

    /// Existing record pointing at exactly `destination`, used to dedupe submissions.
    async fn find_by_destination(&self, destination: &str)
        -> Result<Option<ShortLink>, StoreError>;

    /// Create a record. A taken slug yields [`StoreError::Conflict`].
    async fn insert(&self, slug: &str, destination: &str, now: i64)
        -> Result<ShortLink, StoreError>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<ShortLink>, StoreError>;

    /// Bump the scan counter and the `day_key` histogram bucket together.
    /// Returns `false` if the record no longer exists.
    async fn increment_scan(&self, id: i64, day_key: &str, now: i64) -> Result<bool, StoreError>;

    async fn set_destination(&self, id: i64, destination: &str) -> Result<bool, StoreError>;

    async fn set_rotation_interval(&self, id: i64, interval: i64) -> Result<bool, StoreError>;

    async fn reset_stats(&self, id: i64) -> Result<bool, StoreError>;

    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    async fn destination(&self, id: i64) -> Result<Option<String>, StoreError> {
        Ok(self.get_by_id(id).await?.map(|link| link.destination))
    }

    async fn rotation_interval(&self, id: i64) -> Result<Option<i64>, StoreError> {
        Ok(self.get_by_id(id).await?.map(|link| link.rotation_interval))
    }
}

/// Run a store call with an upper bound on how long it may take.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Open the backend named by `database_url` (`memory:` or a sqlite URL).
pub async fn open(database_url: &str) -> anyhow::Result<Arc<dyn RecordStore>> {
    if database_url == "memory:" {
        tracing::warn!("Using the in-memory record store; links will not survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(SqliteStore::connect(database_url).await?))
}
