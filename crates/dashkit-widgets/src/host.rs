#![forbid(unsafe_code)]

//! The widget host: owns every mounted panel's query state and poll worker.
//!
//! All state lives on the host thread. Workers only send [`PollMessage`]s;
//! [`WidgetHost::pump`] applies them in arrival order and re-derives each
//! affected panel's quality. Quality changes are queued as
//! [`QualityEvent`]s for the session to pick up.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::{Arc, mpsc};

use dashkit_model::{GlobalFilters, Panel};
use serde_json::Value;
use web_time::Duration;

use crate::builtin::STATUS_SUMMARY_ENDPOINT;
use crate::cache::cached_status_summary;
use crate::abort::RequestAbort;
use crate::capabilities::{CapabilityGate, CapabilitySnapshot, gate};
use crate::coerce::{self, StatusSummary};
use crate::fetch::{FetchError, Fetcher};
use crate::poll::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, PollMessage, PollSpec, PollWorker};
use crate::quality::{QualityPolicy, QualityReporter, WidgetQuality, derive_quality};
use crate::query::{PollApply, PollTicket, WidgetQuery};
use crate::registry::{WidgetProps, WidgetRegistry, WidgetView};
use crate::status::HealthStatus;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("failed to start poll worker for panel '{panel_id}': {source}")]
    Spawn {
        panel_id: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub quality: QualityPolicy,
    /// Spawn a worker per polled panel. When off, data only moves through
    /// [`WidgetHost::poll_once`].
    pub background: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            quality: QualityPolicy::default(),
            background: true,
        }
    }
}

impl HostConfig {
    /// Synchronous host for one-shot use.
    #[must_use]
    pub fn foreground() -> Self {
        Self {
            background: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityEvent {
    pub panel_id: String,
    pub quality: WidgetQuality,
}

#[derive(Debug)]
struct MountedWidget {
    panel: Panel,
    endpoint: Option<String>,
    interval: Duration,
    query: WidgetQuery<Value>,
    reporter: QualityReporter,
    quality: WidgetQuality,
    mounted_at: i64,
    worker: Option<PollWorker>,
}

impl MountedWidget {
    fn worker_id(&self) -> Option<u64> {
        self.worker.as_ref().map(PollWorker::id)
    }
}

pub struct WidgetHost {
    registry: WidgetRegistry,
    fetcher: Arc<dyn Fetcher>,
    config: HostConfig,
    sender: mpsc::Sender<PollMessage>,
    receiver: mpsc::Receiver<PollMessage>,
    mounted: BTreeMap<String, MountedWidget>,
    capabilities: CapabilitySnapshot,
    global_filters: GlobalFilters,
    changes: Vec<QualityEvent>,
}

impl std::fmt::Debug for WidgetHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetHost")
            .field("config", &self.config)
            .field("mounted", &self.mounted.keys().collect::<Vec<_>>())
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl WidgetHost {
    #[must_use]
    pub fn new(registry: WidgetRegistry, fetcher: Arc<dyn Fetcher>, config: HostConfig) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            registry,
            fetcher,
            config,
            sender,
            receiver,
            mounted: BTreeMap::new(),
            capabilities: CapabilitySnapshot::unknown(),
            global_filters: GlobalFilters::default(),
            changes: Vec::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &WidgetRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &HostConfig {
        &self.config
    }

    #[must_use]
    pub fn capabilities(&self) -> &CapabilitySnapshot {
        &self.capabilities
    }

    pub fn set_capabilities(&mut self, snapshot: CapabilitySnapshot) {
        self.capabilities = snapshot;
    }

    pub fn set_global_filters(&mut self, filters: GlobalFilters) {
        self.global_filters = filters;
    }

    /// Refresh the capability snapshot from the process-wide status cache,
    /// fetching the summary when the cache is cold.
    pub fn refresh_capabilities(&mut self, now_ms: i64) -> Result<&CapabilitySnapshot, FetchError> {
        let fetcher = Arc::clone(&self.fetcher);
        let timeout = self.config.poll_timeout;
        let summary: StatusSummary = cached_status_summary(now_ms, || {
            fetcher
                .fetch(STATUS_SUMMARY_ENDPOINT, timeout, &RequestAbort::unabortable())
                .map(|payload| coerce::status_summary(&payload))
        })?;
        self.capabilities = CapabilitySnapshot::from_summary(&summary);
        Ok(&self.capabilities)
    }

    // ========================================================================
    // Mounting
    // ========================================================================

    /// Mount `panel`, or update it in place when the widget and endpoint are
    /// unchanged. A changed widget restarts polling with fresh query state.
    pub fn mount(&mut self, panel: &Panel, now_ms: i64) -> Result<(), HostError> {
        let definition = self.registry.get_or_placeholder(&panel.widget_id);
        let endpoint = panel
            .data_spec
            .endpoint_ref()
            .or(definition.endpoint)
            .map(str::to_owned);
        let interval = panel
            .data_spec
            .refresh_ms()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .or(definition.refresh)
            .unwrap_or(self.config.poll_interval);

        if let Some(existing) = self.mounted.get_mut(&panel.id) {
            if existing.panel.widget_id == panel.widget_id
                && existing.endpoint == endpoint
                && existing.interval == interval
            {
                existing.panel = panel.clone();
                return Ok(());
            }
        }
        self.unmount(&panel.id);

        let worker = match (&endpoint, self.config.background) {
            (Some(endpoint), true) => {
                let spec = PollSpec::new(panel.id.clone(), endpoint.clone())
                    .with_interval(interval)
                    .with_timeout(self.config.poll_timeout);
                let worker = PollWorker::spawn(spec, Arc::clone(&self.fetcher), self.sender.clone())
                    .map_err(|source| HostError::Spawn {
                        panel_id: panel.id.clone(),
                        source,
                    })?;
                Some(worker)
            }
            _ => None,
        };
        tracing::debug!(
            panel_id = %panel.id,
            widget_id = %panel.widget_id,
            endpoint = endpoint.as_deref().unwrap_or("-"),
            "widget mounted"
        );
        self.mounted.insert(
            panel.id.clone(),
            MountedWidget {
                panel: panel.clone(),
                endpoint,
                interval,
                query: WidgetQuery::new(now_ms),
                reporter: QualityReporter::new(),
                quality: WidgetQuality::default(),
                mounted_at: now_ms,
                worker,
            },
        );
        Ok(())
    }

    /// Mount exactly `panels`: unmount everything else.
    pub fn sync<'a, I>(&mut self, panels: I, now_ms: i64) -> Result<(), HostError>
    where
        I: IntoIterator<Item = &'a Panel>,
    {
        let panels: Vec<&Panel> = panels.into_iter().collect();
        let stale: Vec<String> = self
            .mounted
            .keys()
            .filter(|id| !panels.iter().any(|p| &p.id == *id))
            .cloned()
            .collect();
        for id in stale {
            self.unmount(&id);
        }
        for panel in panels {
            self.mount(panel, now_ms)?;
        }
        Ok(())
    }

    /// Stop the panel's worker and forget its state. Returns whether it was
    /// mounted.
    pub fn unmount(&mut self, panel_id: &str) -> bool {
        let Some(mounted) = self.mounted.remove(panel_id) else {
            return false;
        };
        // Dropping the worker signals stop and aborts its in-flight request;
        // any message it already queued carries a stale worker id.
        drop(mounted.worker);
        tracing::debug!(panel_id, "widget unmounted");
        true
    }

    pub fn unmount_all(&mut self) {
        let ids: Vec<String> = self.mounted.keys().cloned().collect();
        for id in ids {
            self.unmount(&id);
        }
    }

    #[must_use]
    pub fn is_mounted(&self, panel_id: &str) -> bool {
        self.mounted.contains_key(panel_id)
    }

    pub fn mounted_ids(&self) -> impl Iterator<Item = &str> {
        self.mounted.keys().map(String::as_str)
    }

    /// Ask the panel's worker to abort and poll again. Returns `false` for
    /// unknown or unpolled panels.
    pub fn refresh_now(&self, panel_id: &str) -> bool {
        match self.mounted.get(panel_id).and_then(|m| m.worker.as_ref()) {
            Some(worker) => {
                worker.refresh_now();
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Data flow
    // ========================================================================

    /// Apply every queued worker message. Returns the number applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.receiver.try_recv() {
            if self.apply_message(message) {
                applied += 1;
            }
        }
        applied
    }

    /// Block up to `timeout` for the next message, then apply everything
    /// queued. Returns the number applied.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => usize::from(self.apply_message(message)) + self.pump(),
            Err(_) => 0,
        }
    }

    fn apply_message(&mut self, message: PollMessage) -> bool {
        let Some(mounted) = self.mounted.get_mut(message.panel_id()) else {
            return false;
        };
        if mounted.worker_id() != Some(message.worker_id()) {
            tracing::debug!(
                panel_id = message.panel_id(),
                worker_id = message.worker_id(),
                "ignoring message from retired worker"
            );
            return false;
        }
        match message {
            PollMessage::Issued { seq, .. } => {
                mounted.query.mark_issued(seq);
                true
            }
            PollMessage::Completed {
                panel_id,
                seq,
                outcome,
                ts,
                ..
            } => {
                let status_payload = match (&outcome, mounted.endpoint.as_deref()) {
                    (Ok(payload), Some(STATUS_SUMMARY_ENDPOINT)) => Some(payload.clone()),
                    _ => None,
                };
                let applied = mounted.query.complete(PollTicket { seq }, outcome, ts);
                if applied == PollApply::Superseded {
                    return false;
                }
                if let Some(payload) = status_payload {
                    self.capabilities =
                        CapabilitySnapshot::from_summary(&coerce::status_summary(&payload));
                }
                self.update_quality(&panel_id);
                true
            }
        }
    }

    /// Poll every mounted panel once on the calling thread.
    pub fn poll_once(&mut self, now_ms: i64) -> usize {
        let ids: Vec<String> = self
            .mounted
            .iter()
            .filter(|(_, m)| m.endpoint.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            let Some(mounted) = self.mounted.get_mut(id) else {
                continue;
            };
            let Some(endpoint) = mounted.endpoint.clone() else {
                continue;
            };
            let ticket = mounted.query.begin();
            let outcome =
                self.fetcher
                    .fetch(&endpoint, self.config.poll_timeout, &RequestAbort::unabortable());
            if let (Ok(payload), STATUS_SUMMARY_ENDPOINT) = (&outcome, endpoint.as_str()) {
                self.capabilities =
                    CapabilitySnapshot::from_summary(&coerce::status_summary(payload));
            }
            mounted.query.complete(ticket, outcome, now_ms);
            self.update_quality(id);
        }
        ids.len()
    }

    fn update_quality(&mut self, panel_id: &str) {
        let Some(mounted) = self.mounted.get_mut(panel_id) else {
            return;
        };
        let definition = self.registry.get_or_placeholder(&mounted.panel.widget_id);
        let data_status: Option<HealthStatus> = mounted
            .query
            .result()
            .data
            .as_ref()
            .and_then(definition.data_status);
        let quality = derive_quality(&mounted.query, data_status, &self.config.quality);
        record_quality(mounted, quality, &mut self.changes);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn quality(&self, panel_id: &str) -> Option<WidgetQuality> {
        self.mounted.get(panel_id).map(|m| m.quality)
    }

    #[must_use]
    pub fn is_stale(&self, panel_id: &str, now_ms: i64) -> bool {
        self.quality(panel_id)
            .is_some_and(|q| q.is_stale(now_ms, &self.config.quality))
    }

    #[must_use]
    pub fn query(&self, panel_id: &str) -> Option<&WidgetQuery<Value>> {
        self.mounted.get(panel_id).map(|m| &m.query)
    }

    /// Quality changes since the last drain, oldest first.
    pub fn drain_quality_events(&mut self) -> Vec<QualityEvent> {
        std::mem::take(&mut self.changes)
    }

    /// Render a mounted panel. Quality reported by the widget during render
    /// is recorded like any other change.
    pub fn render(&mut self, panel_id: &str, now_ms: i64) -> Option<WidgetView> {
        let mounted = self.mounted.get_mut(panel_id)?;
        let definition = self.registry.get_or_placeholder(&mounted.panel.widget_id);
        let panel_gate: Vec<&str> = mounted.panel.data_spec.capability_gate().into_iter().collect();
        let gate = gate(&self.capabilities, &definition.requires, &panel_gate);

        let reported: Cell<Option<WidgetQuality>> = Cell::new(None);
        let report = |quality: WidgetQuality| reported.set(Some(quality));
        let worker = mounted.worker.as_ref();
        let refresh = || {
            if let Some(worker) = worker {
                worker.refresh_now();
            }
        };
        let props = WidgetProps {
            panel: &mounted.panel,
            global_filters: &self.global_filters,
            capabilities: &self.capabilities,
            gate: &gate,
            data: &mounted.query,
            quality: mounted.quality,
            stale: mounted.quality.is_stale(now_ms, &self.config.quality),
            now_ms,
            mounted_at: mounted.mounted_at,
            refresh_now: &refresh,
            report_quality: &report,
        };
        let mut view = (definition.render)(&props);
        if let CapabilityGate::Unavailable { reason } = &gate {
            view.notice = Some(format!("Unavailable: {reason}"));
        }

        if let Some(quality) = reported.get() {
            record_quality(mounted, quality, &mut self.changes);
        }
        Some(view)
    }
}

fn record_quality(mounted: &mut MountedWidget, quality: WidgetQuality, changes: &mut Vec<QualityEvent>) {
    mounted.quality = quality;
    if mounted.reporter.report(&quality) {
        tracing::debug!(
            panel_id = %mounted.panel.id,
            status = %quality.status,
            last_success_ts = ?quality.last_success_ts,
            "widget quality changed"
        );
        changes.push(QualityEvent {
            panel_id: mounted.panel.id.clone(),
            quality,
        });
    }
}

impl Drop for WidgetHost {
    fn drop(&mut self) {
        self.unmount_all();
    }
}
