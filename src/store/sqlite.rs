use super::{RecordStore, StoreError};
use crate::models::ShortLink;
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::collections::{BTreeMap, HashMap};

const LINK_COLUMNS: &str =
    "id, slug, destination, rotation_interval, scan_count, last_scan_at, created_at";

#[derive(Debug, sqlx::FromRow)]
struct LinkRow {
    id: i64,
    slug: String,
    destination: String,
    rotation_interval: i64,
    scan_count: i64,
    last_scan_at: Option<i64>,
    created_at: i64,
}

impl LinkRow {
    fn into_link(self, daily_counts: BTreeMap<String, i64>) -> ShortLink {
        ShortLink {
            id: self.id,
            slug: self.slug,
            destination: self.destination,
            rotation_interval: self.rotation_interval,
            scan_count: self.scan_count,
            daily_counts,
            last_scan_at: self.last_scan_at,
            created_at: self.created_at,
        }
    }
}

/// sqlite-backed store. Scan history lives in `scan_days`, one row per
/// link per site-local day.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database and apply embedded migrations.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        // An in-memory database exists per connection, so keep exactly one.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 10 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(
                database_url
                    .parse::<SqliteConnectOptions>()?
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .foreign_keys(true),
            )
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");

        Ok(Self { pool })
    }

    async fn daily_counts(&self, id: i64) -> Result<BTreeMap<String, i64>, sqlx::Error> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT day, count FROM scan_days WHERE link_id = ?1")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn hydrate(&self, row: Option<LinkRow>) -> Result<Option<ShortLink>, StoreError> {
        match row {
            Some(row) => {
                let daily = self.daily_counts(row.id).await?;
                Ok(Some(row.into_link(daily)))
            }
            None => Ok(None),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get_by_slug(&self, slug: &str) -> Result<Option<ShortLink>, StoreError> {
        let row: Option<LinkRow> =
            sqlx::query_as(&format!("SELECT {LINK_COLUMNS} FROM links WHERE slug = ?1"))
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        self.hydrate(row).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ShortLink>, StoreError> {
        let row: Option<LinkRow> =
            sqlx::query_as(&format!("SELECT {LINK_COLUMNS} FROM links WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        self.hydrate(row).await
    }

    async fn find_by_destination(
        &self,
        destination: &str,
    ) -> Result<Option<ShortLink>, StoreError> {
        let row: Option<LinkRow> = sqlx::query_as(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE destination = ?1 ORDER BY id LIMIT 1"
        ))
        .bind(destination)
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate(row).await
    }

    async fn insert(
        &self,
        slug: &str,
        destination: &str,
        now: i64,
    ) -> Result<ShortLink, StoreError> {
        let id = sqlx::query("INSERT INTO links (slug, destination, created_at) VALUES (?1, ?2, ?3)")
            .bind(slug)
            .bind(destination)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(slug.to_owned())
                } else {
                    StoreError::Backend(e)
                }
            })?
            .last_insert_rowid();

        Ok(ShortLink::new(id, slug, destination, now))
    }

    async fn list(&self) -> Result<Vec<ShortLink>, StoreError> {
        let rows: Vec<LinkRow> =
            sqlx::query_as(&format!("SELECT {LINK_COLUMNS} FROM links ORDER BY id DESC"))
                .fetch_all(&self.pool)
                .await?;

        let days: Vec<(i64, String, i64)> =
            sqlx::query_as("SELECT link_id, day, count FROM scan_days")
                .fetch_all(&self.pool)
                .await?;

        let mut by_link: HashMap<i64, BTreeMap<String, i64>> = HashMap::new();
        for (link_id, day, count) in days {
            by_link.entry(link_id).or_default().insert(day, count);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let daily = by_link.remove(&row.id).unwrap_or_default();
                row.into_link(daily)
            })
            .collect())
    }

    async fn increment_scan(&self, id: i64, day_key: &str, now: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE links SET scan_count = scan_count + 1, last_scan_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO scan_days (link_id, day, count) VALUES (?1, ?2, 1)
             ON CONFLICT (link_id, day) DO UPDATE SET count = count + 1",
        )
        .bind(id)
        .bind(day_key)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn set_destination(&self, id: i64, destination: &str) -> Result<bool, StoreError> {
        let affected = sqlx::query("UPDATE links SET destination = ?2 WHERE id = ?1")
            .bind(id)
            .bind(destination)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn set_rotation_interval(&self, id: i64, interval: i64) -> Result<bool, StoreError> {
        let affected = sqlx::query("UPDATE links SET rotation_interval = ?2 WHERE id = ?1")
            .bind(id)
            .bind(interval.max(0))
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn reset_stats(&self, id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query(
            "UPDATE links SET scan_count = 0, last_scan_at = NULL WHERE id = ?1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM scan_days WHERE link_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(affected > 0)
    }

    /// Permanently delete a link (cascades to its scan days via FK).
    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let affected = sqlx::query("DELETE FROM links WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }
}
