#![forbid(unsafe_code)]

//! Read-through TTL cache.
//!
//! A [`TtlCell`] holds one `{timestamp, value}` entry. Reads within the TTL
//! return the cached value; a miss or an expired entry runs the loader and
//! stores its result. Loader failures are passed through and leave the cell
//! untouched. There is no invalidation: entries only age out.

use std::sync::{Mutex, OnceLock};

use web_time::Duration;

use crate::coerce::StatusSummary;

/// Lifetime of the process-wide status summary.
pub const STATUS_CACHE_TTL: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, PartialEq)]
struct CacheEntry<T> {
    ts: i64,
    value: T,
}

#[derive(Debug, Clone)]
pub struct TtlCell<T> {
    ttl: Duration,
    entry: Option<CacheEntry<T>>,
}

impl<T: Clone> TtlCell<T> {
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// Cached value if it is younger than the TTL at `now_ms`. An entry
    /// stamped in the future counts as expired.
    #[must_use]
    pub fn get(&self, now_ms: i64) -> Option<T> {
        self.entry
            .as_ref()
            .filter(|entry| {
                let age = now_ms.saturating_sub(entry.ts);
                (0..self.ttl_ms()).contains(&age)
            })
            .map(|entry| entry.value.clone())
    }

    pub fn set(&mut self, value: T, now_ms: i64) {
        self.entry = Some(CacheEntry { ts: now_ms, value });
    }

    /// Timestamp of the stored entry, fresh or not.
    #[must_use]
    pub fn stored_at(&self) -> Option<i64> {
        self.entry.as_ref().map(|entry| entry.ts)
    }

    pub fn get_or_try_refresh<E, F>(&mut self, now_ms: i64, loader: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get(now_ms) {
            return Ok(value);
        }
        let value = loader()?;
        self.set(value.clone(), now_ms);
        Ok(value)
    }
}

fn status_cache() -> &'static Mutex<TtlCell<StatusSummary>> {
    static STATUS_CACHE: OnceLock<Mutex<TtlCell<StatusSummary>>> = OnceLock::new();
    STATUS_CACHE.get_or_init(|| Mutex::new(TtlCell::new(STATUS_CACHE_TTL)))
}

/// Status summary shared by every caller in the process, refreshed at most
/// once per [`STATUS_CACHE_TTL`].
pub fn cached_status_summary<E, F>(now_ms: i64, loader: F) -> Result<StatusSummary, E>
where
    F: FnOnce() -> Result<StatusSummary, E>,
{
    let mut cell = status_cache().lock().unwrap_or_else(|e| e.into_inner());
    cell.get_or_try_refresh(now_ms, loader)
}
