use serde::Serialize;
use std::collections::BTreeMap;

/// A short link together with its scan telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortLink {
    pub id: i64,
    pub slug: String,
    pub destination: String,
    /// Seconds per token window; `0` disables rotation.
    pub rotation_interval: i64,
    pub scan_count: i64,
    /// Site-local `YYYY-MM-DD` → scans that day.
    pub daily_counts: BTreeMap<String, i64>,
    pub last_scan_at: Option<i64>,
    pub created_at: i64,
}

impl ShortLink {
    pub fn new(id: i64, slug: impl Into<String>, destination: impl Into<String>, now: i64) -> Self {
        Self {
            id,
            slug: slug.into(),
            destination: destination.into(),
            rotation_interval: 0,
            scan_count: 0,
            daily_counts: BTreeMap::new(),
            last_scan_at: None,
            created_at: now,
        }
    }

    pub fn rotation_enabled(&self) -> bool {
        self.rotation_interval > 0
    }

    /// Public URL printed into the QR code. Always routes through the
    /// resolver, never straight to the destination.
    pub fn short_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url, self.slug)
    }

    /// Record one scan on `day`. Keeps `scan_count` equal to the histogram sum.
    pub fn record_scan(&mut self, day: &str, now: i64) {
        self.scan_count += 1;
        *self.daily_counts.entry(day.to_owned()).or_insert(0) += 1;
        self.last_scan_at = Some(now);
    }

    pub fn reset_stats(&mut self) {
        self.scan_count = 0;
        self.daily_counts.clear();
        self.last_scan_at = None;
    }
}
