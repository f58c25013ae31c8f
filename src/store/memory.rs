use super::{RecordStore, StoreError};
use crate::models::ShortLink;
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicI64, Ordering};

/// Process-local store backed by two DashMaps: records by id and a slug index.
///
/// Ids come from a monotonic counter and are never reused. Counter and
/// histogram are updated under the same shard lock, so they cannot drift.
#[derive(Debug)]
pub struct MemoryStore {
    links: DashMap<i64, ShortLink>,
    slugs: DashMap<String, i64>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            links: DashMap::new(),
            slugs: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    fn update<F>(&self, id: i64, apply: F) -> bool
    where
        F: FnOnce(&mut ShortLink),
    {
        match self.links.get_mut(&id) {
            Some(mut link) => {
                apply(link.value_mut());
                true
            }
            None => false,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_by_slug(&self, slug: &str) -> Result<Option<ShortLink>, StoreError> {
        let id = match self.slugs.get(slug) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ShortLink>, StoreError> {
        Ok(self.links.get(&id).map(|link| link.clone()))
    }

    async fn find_by_destination(
        &self,
        destination: &str,
    ) -> Result<Option<ShortLink>, StoreError> {
        Ok(self
            .links
            .iter()
            .filter(|link| link.destination == destination)
            .min_by_key(|link| link.id)
            .map(|link| link.clone()))
    }

    async fn insert(
        &self,
        slug: &str,
        destination: &str,
        now: i64,
    ) -> Result<ShortLink, StoreError> {
        match self.slugs.entry(slug.to_owned()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(slug.to_owned())),
            Entry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let link = ShortLink::new(id, slug, destination, now);
                self.links.insert(id, link.clone());
                vacant.insert(id);
                Ok(link)
            }
        }
    }

    async fn list(&self) -> Result<Vec<ShortLink>, StoreError> {
        let mut links: Vec<ShortLink> = self.links.iter().map(|link| link.clone()).collect();
        links.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(links)
    }

    async fn increment_scan(&self, id: i64, day_key: &str, now: i64) -> Result<bool, StoreError> {
        Ok(self.update(id, |link| link.record_scan(day_key, now)))
    }

    async fn set_destination(&self, id: i64, destination: &str) -> Result<bool, StoreError> {
        Ok(self.update(id, |link| link.destination = destination.to_owned()))
    }

    async fn set_rotation_interval(&self, id: i64, interval: i64) -> Result<bool, StoreError> {
        Ok(self.update(id, |link| link.rotation_interval = interval.max(0)))
    }

    async fn reset_stats(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.update(id, ShortLink::reset_stats))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        match self.links.remove(&id) {
            Some((_, link)) => {
                self.slugs.remove(&link.slug);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_rejects_taken_slug() {
        let store = MemoryStore::new();
        store.insert("abc123", "https://a.example", 1).await.unwrap();
        let err = store.insert("abc123", "https://b.example", 2).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let store = MemoryStore::new();
        let first = store.insert("abc123", "https://a.example", 1).await.unwrap();
        assert!(store.delete(first.id).await.unwrap());
        assert!(store.get_by_slug("abc123").await.unwrap().is_none());

        let second = store.insert("abc123", "https://a.example", 2).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn increments_and_resets() {
        let store = MemoryStore::new();
        let link = store.insert("abc123", "https://a.example", 1).await.unwrap();
        store.increment_scan(link.id, "2024-03-01", 10).await.unwrap();
        store.increment_scan(link.id, "2024-03-02", 20).await.unwrap();

        let scanned = store.get_by_slug("abc123").await.unwrap().unwrap();
        assert_eq!(scanned.scan_count, 2);
        assert_eq!(scanned.daily_counts.len(), 2);

        assert!(store.reset_stats(link.id).await.unwrap());
        let reset = store.get_by_id(link.id).await.unwrap().unwrap();
        assert_eq!(reset.scan_count, 0);
        assert!(reset.daily_counts.is_empty());
        assert!(!store.increment_scan(99, "2024-03-02", 20).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_increments_are_all_counted() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let id = store.insert("abc123", "https://a.example", 1).await.unwrap().id;

        let mut tasks = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.increment_scan(id, "2024-03-01", i).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let link = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(link.scan_count, 50);
        assert_eq!(link.daily_counts["2024-03-01"], 50);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = MemoryStore::new();
        store.insert("a", "https://a.example", 1).await.unwrap();
        store.insert("b", "https://b.example", 2).await.unwrap();
        let slugs: Vec<String> = store.list().await.unwrap().into_iter().map(|l| l.slug).collect();
        assert_eq!(slugs, ["b", "a"]);
    }
}
