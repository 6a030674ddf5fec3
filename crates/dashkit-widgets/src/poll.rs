#![forbid(unsafe_code)]

//! Background poll workers.
//!
//! Each mounted panel with an endpoint gets one worker thread. The worker
//! issues a poll immediately, then again every interval, and reports over a
//! channel:
//!
//! ```text
//!  worker thread                         host thread
//!  ─────────────                         ───────────
//!  Issued{seq}      ──── mpsc ────▶      WidgetHost::pump()
//!  fetch(...)                              query.mark_issued / complete
//!  Completed{seq}   ──── mpsc ────▶        derive quality
//!  wait(interval | refresh | stop)
//! ```
//!
//! `refresh_now` cancels the in-flight request and wakes the loop; `stop`
//! (and drop) cancels it and ends the loop. A request whose abort flag was
//! set never produces a `Completed` message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, mpsc};
use std::thread;

use serde_json::Value;
use web_time::Duration;

use crate::abort::RequestAbort;
use crate::fetch::{FetchError, Fetcher};
use crate::now_ms;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(7);

/// Process-unique worker ids, so a remounted panel can tell its new worker's
/// messages from leftovers of the old one.
static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSpec {
    pub panel_id: String,
    pub endpoint: String,
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSpec {
    #[must_use]
    pub fn new(panel_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            panel_id: panel_id.into(),
            endpoint: endpoint.into(),
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollMessage {
    Issued {
        worker_id: u64,
        panel_id: String,
        seq: u64,
    },
    Completed {
        worker_id: u64,
        panel_id: String,
        seq: u64,
        outcome: Result<Value, FetchError>,
        ts: i64,
    },
}

impl PollMessage {
    #[must_use]
    pub fn worker_id(&self) -> u64 {
        match self {
            Self::Issued { worker_id, .. } | Self::Completed { worker_id, .. } => *worker_id,
        }
    }

    #[must_use]
    pub fn panel_id(&self) -> &str {
        match self {
            Self::Issued { panel_id, .. } | Self::Completed { panel_id, .. } => panel_id,
        }
    }
}

// ============================================================================
// Control block
// ============================================================================

#[derive(Debug, Default)]
struct ControlState {
    stopped: bool,
    refresh: bool,
}

#[derive(Default)]
struct PollControl {
    state: Mutex<ControlState>,
    wake: Condvar,
    in_flight: Mutex<Option<RequestAbort>>,
}

impl PollControl {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn abort_in_flight(&self) {
        let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(abort) = in_flight.as_ref() {
            abort.abort();
        }
    }

    fn stop(&self) {
        self.lock_state().stopped = true;
        self.abort_in_flight();
        self.wake.notify_all();
    }

    fn request_refresh(&self) {
        {
            let mut state = self.lock_state();
            if state.stopped {
                return;
            }
            state.refresh = true;
        }
        self.abort_in_flight();
        self.wake.notify_all();
    }

    fn is_stopped(&self) -> bool {
        self.lock_state().stopped
    }

    /// Start a request: clears any pending refresh and arms a fresh abort
    /// flag. `None` once stopped.
    fn begin_request(&self) -> Option<RequestAbort> {
        let mut state = self.lock_state();
        if state.stopped {
            return None;
        }
        state.refresh = false;
        let abort = RequestAbort::new();
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = Some(abort.clone());
        Some(abort)
    }

    fn end_request(&self) {
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Sleep until the interval passes or a refresh is requested. Returns
    /// `false` once stopped.
    fn wait(&self, interval: Duration) -> bool {
        let mut state = self.lock_state();
        if state.stopped {
            return false;
        }
        if state.refresh {
            return true;
        }
        let (next, _timeout) = self
            .wake
            .wait_timeout_while(state, interval, |s| !s.stopped && !s.refresh)
            .unwrap_or_else(|e| e.into_inner());
        state = next;
        !state.stopped
    }
}

// ============================================================================
// Worker
// ============================================================================

pub struct PollWorker {
    id: u64,
    panel_id: String,
    control: Arc<PollControl>,
    thread: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for PollWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollWorker")
            .field("id", &self.id)
            .field("panel_id", &self.panel_id)
            .field("stopped", &self.control.is_stopped())
            .finish()
    }
}

impl PollWorker {
    /// Start polling `spec.endpoint` on a new thread.
    pub fn spawn(
        spec: PollSpec,
        fetcher: Arc<dyn Fetcher>,
        sender: mpsc::Sender<PollMessage>,
    ) -> std::io::Result<Self> {
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
        let control = Arc::new(PollControl::default());
        let panel_id = spec.panel_id.clone();
        let thread_control = Arc::clone(&control);
        let thread = thread::Builder::new()
            .name(format!("dashkit-poll-{panel_id}"))
            .spawn(move || run(id, &spec, fetcher.as_ref(), &thread_control, &sender))?;
        tracing::debug!(worker_id = id, panel_id = %panel_id, "poll worker started");
        Ok(Self {
            id,
            panel_id,
            control,
            thread: Some(thread),
        })
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn panel_id(&self) -> &str {
        &self.panel_id
    }

    /// Abort the in-flight request, if any, and poll again right away.
    pub fn refresh_now(&self) {
        tracing::debug!(worker_id = self.id, panel_id = %self.panel_id, "refresh requested");
        self.control.request_refresh();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(thread::JoinHandle::is_finished)
    }

    /// Stop the loop and wait for the thread to exit.
    pub fn stop(mut self) {
        self.control.stop();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        tracing::debug!(worker_id = self.id, panel_id = %self.panel_id, "poll worker stopped");
    }
}

impl Drop for PollWorker {
    fn drop(&mut self) {
        // Signal only; joining here could block the host on a slow request.
        self.control.stop();
    }
}

fn run(
    worker_id: u64,
    spec: &PollSpec,
    fetcher: &dyn Fetcher,
    control: &PollControl,
    sender: &mpsc::Sender<PollMessage>,
) {
    let mut seq = 0u64;
    loop {
        let Some(abort) = control.begin_request() else {
            break;
        };
        seq += 1;
        let issued = PollMessage::Issued {
            worker_id,
            panel_id: spec.panel_id.clone(),
            seq,
        };
        if sender.send(issued).is_err() {
            control.end_request();
            break;
        }
        tracing::debug!(panel_id = %spec.panel_id, seq, endpoint = %spec.endpoint, "poll issued");

        let outcome = fetcher.fetch(&spec.endpoint, spec.timeout, &abort);
        control.end_request();

        if abort.is_aborted() {
            tracing::debug!(panel_id = %spec.panel_id, seq, "discarding aborted poll");
        } else {
            if let Err(error) = &outcome {
                tracing::debug!(panel_id = %spec.panel_id, seq, %error, "poll failed");
            }
            let completed = PollMessage::Completed {
                worker_id,
                panel_id: spec.panel_id.clone(),
                seq,
                outcome,
                ts: now_ms(),
            };
            if sender.send(completed).is_err() {
                break;
            }
        }

        if !control.wait(spec.interval) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ScriptedFetcher;
    use serde_json::json;

    const RECV: Duration = Duration::from_secs(5);

    fn recv(rx: &mpsc::Receiver<PollMessage>) -> PollMessage {
        rx.recv_timeout(RECV).expect("poll message")
    }

    #[test]
    fn polls_immediately_on_spawn() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond("/api/x", Ok(json!({"v": 1}))));
        let (tx, rx) = mpsc::channel();
        let spec = PollSpec::new("p1", "/api/x").with_interval(Duration::from_secs(60));
        let worker = PollWorker::spawn(spec, fetcher, tx).unwrap();

        match recv(&rx) {
            PollMessage::Issued { panel_id, seq, .. } => {
                assert_eq!(panel_id, "p1");
                assert_eq!(seq, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        match recv(&rx) {
            PollMessage::Completed {
                seq, outcome, worker_id, ..
            } => {
                assert_eq!(seq, 1);
                assert_eq!(worker_id, worker.id());
                assert_eq!(outcome, Ok(json!({"v": 1})));
            }
            other => panic!("unexpected {other:?}"),
        }
        worker.stop();
    }

    #[test]
    fn repeats_on_interval() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond("/a", Ok(json!(1))));
        let (tx, rx) = mpsc::channel();
        let spec = PollSpec::new("p", "/a").with_interval(Duration::from_millis(10));
        let worker = PollWorker::spawn(spec, fetcher, tx).unwrap();
        let mut completed = 0;
        while completed < 3 {
            if let PollMessage::Completed { .. } = recv(&rx) {
                completed += 1;
            }
        }
        worker.stop();
    }

    #[test]
    fn refresh_aborts_in_flight_and_repolls() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .with_latency(Duration::from_millis(300))
                .respond("/slow", Ok(json!("done"))),
        );
        let (tx, rx) = mpsc::channel();
        let spec = PollSpec::new("p", "/slow")
            .with_interval(Duration::from_secs(60))
            .with_timeout(Duration::from_secs(5));
        let worker = PollWorker::spawn(spec, fetcher, tx).unwrap();

        assert!(matches!(recv(&rx), PollMessage::Issued { seq: 1, .. }));
        worker.refresh_now();

        // The first request was aborted: the next message is the re-issue,
        // and only seq 2 ever completes.
        assert!(matches!(recv(&rx), PollMessage::Issued { seq: 2, .. }));
        match recv(&rx) {
            PollMessage::Completed { seq, outcome, .. } => {
                assert_eq!(seq, 2);
                assert_eq!(outcome, Ok(json!("done")));
            }
            other => panic!("unexpected {other:?}"),
        }
        worker.stop();
    }

    #[test]
    fn stop_aborts_in_flight_without_delivering() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .with_latency(Duration::from_secs(30))
                .respond("/slow", Ok(json!(1))),
        );
        let (tx, rx) = mpsc::channel();
        let spec = PollSpec::new("p", "/slow").with_timeout(Duration::from_secs(60));
        let worker = PollWorker::spawn(spec, fetcher, tx).unwrap();
        assert!(matches!(recv(&rx), PollMessage::Issued { .. }));
        worker.stop();
        // Worker thread has exited and dropped its sender.
        assert!(matches!(
            rx.recv_timeout(RECV),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn failures_are_delivered_as_outcomes() {
        let fetcher = Arc::new(
            ScriptedFetcher::new().respond("/down", Err(FetchError::Status { status: 502 })),
        );
        let (tx, rx) = mpsc::channel();
        let worker = PollWorker::spawn(PollSpec::new("p", "/down"), fetcher, tx).unwrap();
        let _ = recv(&rx);
        match recv(&rx) {
            PollMessage::Completed { outcome, .. } => {
                assert_eq!(outcome, Err(FetchError::Status { status: 502 }));
            }
            other => panic!("unexpected {other:?}"),
        }
        worker.stop();
    }

    #[test]
    fn dropped_receiver_ends_worker() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond("/a", Ok(json!(1))));
        let (tx, rx) = mpsc::channel();
        let spec = PollSpec::new("p", "/a").with_interval(Duration::from_millis(5));
        let worker = PollWorker::spawn(spec, fetcher, tx).unwrap();
        drop(rx);
        let deadline = web_time::Instant::now() + RECV;
        while !worker.is_finished() && web_time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(worker.is_finished());
    }
}
