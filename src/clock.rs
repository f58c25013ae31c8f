use chrono::{DateTime, FixedOffset, Utc};

/// Source of "now" for rotation buckets and scan-day keys.
///
/// Handlers never call `Utc::now()` directly so that token windows and the
/// daily histogram can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    /// Current Unix time in seconds.
    fn now(&self) -> i64;

    /// Site-local calendar day containing `now`, formatted `YYYY-MM-DD`.
    fn today(&self, now: i64) -> String;
}

/// Wall clock with a fixed site-local UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }

    fn today(&self, now: i64) -> String {
        day_key(now, self.offset)
    }
}

/// Format the site-local date of a Unix timestamp.
pub fn day_key(now: i64, offset: FixedOffset) -> String {
    DateTime::<Utc>::from_timestamp(now, 0)
        .unwrap_or_default()
        .with_timezone(&offset)
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
pub use fixed::FixedClock;
