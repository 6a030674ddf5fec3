#![forbid(unsafe_code)]

//! Widget data quality.
//!
//! Quality summarizes how trustworthy a panel's data is, independent of how
//! the widget renders it: the health status plus the time of the last good
//! payload. Panels show the badge and a staleness marker from it.

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::query::WidgetQuery;
use crate::status::HealthStatus;

pub const DEFAULT_DOWN_AFTER_FAILURES: u32 = 3;
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPolicy {
    /// Consecutive failed polls that turn a panel DOWN.
    pub down_after_failures: u32,
    /// Age of the last success beyond which a panel is marked stale.
    pub stale_after: Duration,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            down_after_failures: DEFAULT_DOWN_AFTER_FAILURES,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetQuality {
    pub status: HealthStatus,
    pub last_success_ts: Option<i64>,
}

impl WidgetQuality {
    #[must_use]
    pub const fn new(status: HealthStatus, last_success_ts: Option<i64>) -> Self {
        Self {
            status,
            last_success_ts,
        }
    }

    /// De-duplication key, e.g. `OK-1700000000000` or `UNKNOWN-none`.
    #[must_use]
    pub fn token(&self) -> String {
        match self.last_success_ts {
            Some(ts) => format!("{}-{ts}", self.status),
            None => format!("{}-none", self.status),
        }
    }

    /// Milliseconds since the last success, if there was one.
    #[must_use]
    pub fn age_ms(&self, now_ms: i64) -> Option<i64> {
        self.last_success_ts.map(|ts| now_ms.saturating_sub(ts))
    }

    /// Whether the last success is older than the policy allows. Panels that
    /// never succeeded are not stale; they are UNKNOWN or DOWN instead.
    #[must_use]
    pub fn is_stale(&self, now_ms: i64, policy: &QualityPolicy) -> bool {
        let limit = i64::try_from(policy.stale_after.as_millis()).unwrap_or(i64::MAX);
        self.age_ms(now_ms).is_some_and(|age| age > limit)
    }
}

/// Derive a panel's quality from its query state.
///
/// `data_status` is what the widget reads out of its payload (for example
/// the overall status of a status summary); it applies only while the latest
/// poll succeeded.
#[must_use]
pub fn derive_quality<T>(
    query: &WidgetQuery<T>,
    data_status: Option<HealthStatus>,
    policy: &QualityPolicy,
) -> WidgetQuality {
    let last_success_ts = query.last_success().map(|s| s.ts);
    let status = if !query.has_completed() {
        HealthStatus::Unknown
    } else if query.result().ok {
        data_status.unwrap_or(HealthStatus::Ok)
    } else if query.consecutive_failures() >= policy.down_after_failures.max(1) {
        HealthStatus::Down
    } else if last_success_ts.is_some() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unknown
    };
    WidgetQuality::new(status, last_success_ts)
}

/// Forwards a quality report only when its token changes.
#[derive(Debug, Clone, Default)]
pub struct QualityReporter {
    last_token: Option<String>,
}

impl QualityReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `quality` differs from the last reported value.
    pub fn report(&mut self, quality: &WidgetQuality) -> bool {
        let token = quality.token();
        if self.last_token.as_deref() == Some(token.as_str()) {
            return false;
        }
        self.last_token = Some(token);
        true
    }

    #[must_use]
    pub fn last_token(&self) -> Option<&str> {
        self.last_token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;

    fn fail() -> Result<u32, FetchError> {
        Err(FetchError::Transport("connection refused".into()))
    }

    fn poll(query: &mut WidgetQuery<u32>, outcome: Result<u32, FetchError>, ts: i64) {
        let ticket = query.begin();
        query.complete(ticket, outcome, ts);
    }

    #[test]
    fn nothing_completed_is_unknown() {
        let query: WidgetQuery<u32> = WidgetQuery::new(0);
        let quality = derive_quality(&query, None, &QualityPolicy::default());
        assert_eq!(quality, WidgetQuality::new(HealthStatus::Unknown, None));
    }

    #[test]
    fn success_uses_data_status() {
        let mut query = WidgetQuery::new(0);
        poll(&mut query, Ok(1), 100);
        let policy = QualityPolicy::default();
        assert_eq!(
            derive_quality(&query, Some(HealthStatus::Degraded), &policy),
            WidgetQuality::new(HealthStatus::Degraded, Some(100))
        );
        assert_eq!(derive_quality(&query, None, &policy).status, HealthStatus::Ok);
    }

    #[test]
    fn failures_after_success_degrade_then_go_down() {
        let policy = QualityPolicy::default();
        let mut query = WidgetQuery::new(0);
        poll(&mut query, Ok(1), 100);
        poll(&mut query, fail(), 200);
        poll(&mut query, fail(), 300);

        let quality = derive_quality(&query, Some(HealthStatus::Ok), &policy);
        assert_eq!(quality, WidgetQuality::new(HealthStatus::Degraded, Some(100)));
        assert_eq!(query.source(), Some(&1));

        poll(&mut query, fail(), 400);
        let quality = derive_quality(&query, Some(HealthStatus::Ok), &policy);
        assert_eq!(quality, WidgetQuality::new(HealthStatus::Down, Some(100)));
        assert_eq!(query.last_success().map(|s| s.data), Some(1));
    }

    #[test]
    fn failing_without_success_is_unknown_until_threshold() {
        let policy = QualityPolicy::default();
        let mut query = WidgetQuery::new(0);
        poll(&mut query, fail(), 10);
        poll(&mut query, fail(), 20);
        assert_eq!(derive_quality(&query, None, &policy).status, HealthStatus::Unknown);
        poll(&mut query, fail(), 30);
        assert_eq!(derive_quality(&query, None, &policy).status, HealthStatus::Down);
    }

    #[test]
    fn token_format() {
        assert_eq!(WidgetQuality::new(HealthStatus::Ok, Some(42)).token(), "OK-42");
        assert_eq!(WidgetQuality::new(HealthStatus::Unknown, None).token(), "UNKNOWN-none");
    }

    #[test]
    fn staleness_is_strictly_after_threshold() {
        let policy = QualityPolicy::default();
        let quality = WidgetQuality::new(HealthStatus::Ok, Some(1_000));
        assert!(!quality.is_stale(31_000, &policy));
        assert!(quality.is_stale(31_001, &policy));
        assert!(!WidgetQuality::default().is_stale(i64::MAX, &policy));
    }

    #[test]
    fn reporter_dedupes_on_token() {
        let mut reporter = QualityReporter::new();
        let ok = WidgetQuality::new(HealthStatus::Ok, Some(1));
        assert!(reporter.report(&ok));
        assert!(!reporter.report(&ok));
        assert!(reporter.report(&WidgetQuality::new(HealthStatus::Ok, Some(2))));
        assert!(reporter.report(&WidgetQuality::new(HealthStatus::Degraded, Some(2))));
        assert_eq!(reporter.last_token(), Some("DEGRADED-2"));
    }
}
