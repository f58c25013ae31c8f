use crate::compositor::HexColor;
use bytes::Bytes;
use moka::sync::Cache;
use std::time::Duration;

/// Everything a rendered PNG depends on besides the link's public URL,
/// which is fixed for the lifetime of an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub id: i64,
    pub color: HexColor,
    pub watermark_revision: String,
}

impl RenderKey {
    pub fn new(id: i64, color: HexColor, watermark_revision: impl Into<String>) -> Self {
        Self {
            id,
            color,
            watermark_revision: watermark_revision.into(),
        }
    }
}

/// Thread-safe cache of finished QR PNGs, bounded by total PNG bytes.
///
/// Entries are derived state: dropping any of them only costs a re-render.
/// Concurrent misses on the same key may both render; the last `put` wins.
#[derive(Clone)]
pub struct RenderCache {
    inner: Cache<RenderKey, Bytes>,
}

fn png_weight(_key: &RenderKey, png: &Bytes) -> u32 {
    u32::try_from(png.len()).unwrap_or(u32::MAX)
}

impl RenderCache {
    pub fn new(ttl: Duration, max_bytes: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(png_weight)
            .time_to_live(ttl)
            .build();

        tracing::info!(
            ttl_secs = ttl.as_secs(),
            max_bytes,
            "render cache initialized"
        );

        Self { inner }
    }

    /// Look up a PNG. Returns a cheap clone of the bytes if present and fresh.
    pub fn get(&self, key: &RenderKey) -> Option<Bytes> {
        self.inner.get(key)
    }

    pub fn put(&self, key: RenderKey, png: Bytes) {
        self.inner.insert(key, png);
    }

    /// Drop every entry for one link (e.g. when the link is deleted).
    pub fn purge_id(&self, id: i64) -> usize {
        let keys: Vec<_> = self
            .inner
            .iter()
            .filter(|(key, _)| key.id == id)
            .map(|(key, _)| key)
            .collect();
        for key in &keys {
            self.inner.invalidate(key.as_ref());
        }
        keys.len()
    }

    /// Drop everything, e.g. after the watermark changed.
    pub fn purge_all(&self) {
        self.inner.invalidate_all();
    }

    /// Number of live entries, after applying pending evictions.
    pub fn len(&self) -> usize {
        self.inner.run_pending_tasks();
        self.inner.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
