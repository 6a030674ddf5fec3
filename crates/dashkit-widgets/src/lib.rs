#![forbid(unsafe_code)]

//! Widget runtime for dashkit.
//!
//! Widgets are registered [`WidgetDefinition`]s: a default size, an optional
//! endpoint to poll, and a render function producing a [`WidgetView`]. The
//! [`WidgetHost`] mounts panels, runs one [`PollWorker`] per polled panel,
//! and folds results into per-panel [`WidgetQuery`] state. Quality (health
//! plus last-success time) is derived separately from rendering so a panel
//! can show DEGRADED data while still displaying its last good payload.
//!
//! # Data flow
//!
//! ```text
//! Fetcher ──▶ PollWorker ──mpsc──▶ WidgetHost::pump ──▶ WidgetQuery
//!                                          │
//!                                          ├──▶ derive_quality ──▶ QualityEvent
//!                                          └──▶ WidgetDefinition::render ──▶ WidgetView
//! ```

pub mod abort;
pub mod builtin;
pub mod cache;
pub mod capabilities;
pub mod coerce;
pub mod fetch;
pub mod host;
pub mod poll;
pub mod quality;
pub mod query;
pub mod registry;
pub mod status;

pub use abort::RequestAbort;
pub use builtin::{BOTS_ENDPOINT, STATUS_SUMMARY_ENDPOINT};
pub use cache::{STATUS_CACHE_TTL, TtlCell, cached_status_summary};
pub use capabilities::{CapabilityGate, CapabilitySnapshot, Requirements, gate};
pub use coerce::{BotsSummary, ComponentHealth, StatusSummary};
pub use fetch::{DEFAULT_BASE_URL, FetchError, Fetcher, HttpFetcher, ScriptedFetcher};
pub use host::{HostConfig, HostError, QualityEvent, WidgetHost};
pub use poll::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, PollMessage, PollSpec, PollWorker};
pub use quality::{QualityPolicy, QualityReporter, WidgetQuality, derive_quality};
pub use query::{FetchResult, LastSuccess, PollApply, PollTicket, WidgetQuery};
pub use registry::{
    NavLink, WidgetCategory, WidgetDefinition, WidgetProps, WidgetRegistry, WidgetView,
};
pub use status::HealthStatus;

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
