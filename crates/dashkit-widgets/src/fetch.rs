#![forbid(unsafe_code)]

//! Transport for widget polls.
//!
//! [`Fetcher`] is the seam between the poll loop and the network. The
//! production [`HttpFetcher`] issues blocking GETs relative to a configured
//! upstream base URL; [`ScriptedFetcher`] replays canned responses for
//! offline runs and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Url;
use reqwest::blocking::Client;
use serde_json::Value;
use web_time::Duration;

use crate::abort::RequestAbort;

/// Default upstream when nothing is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
/// Header carrying the optional upstream admin token.
pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A failed poll. Contained by the widget runtime: it becomes
/// `FetchResult { ok: false, .. }`, never a panic or a propagated error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    Transport(String),

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("invalid JSON payload: {0}")]
    Decode(String),

    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("request aborted")]
    Cancelled,

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl FetchError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

pub trait Fetcher: Send + Sync {
    /// GET `endpoint` and decode it as JSON, giving up after `timeout`.
    fn fetch(&self, endpoint: &str, timeout: Duration, abort: &RequestAbort) -> Result<Value>;
}

// ============================================================================
// HTTP
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base: Url,
    admin_token: Option<String>,
}

impl HttpFetcher {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = parse_base(base_url)?;
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base,
            admin_token: None,
        })
    }

    #[must_use]
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for an endpoint such as `/api/status/summary`.
    pub fn resolve(&self, endpoint: &str) -> Result<Url> {
        self.base
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| FetchError::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                reason: e.to_string(),
            })
    }
}

/// Base URLs are treated as directories so that joins keep any path prefix.
fn parse_base(raw: &str) -> Result<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(&format!("{trimmed}/")).map_err(|e| FetchError::InvalidEndpoint {
        endpoint: raw.to_owned(),
        reason: e.to_string(),
    })
}

fn classify(error: &reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else if error.is_decode() {
        FetchError::Decode(error.to_string())
    } else {
        FetchError::Transport(error.to_string())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, endpoint: &str, timeout: Duration, abort: &RequestAbort) -> Result<Value> {
        if abort.is_aborted() {
            return Err(FetchError::Cancelled);
        }
        let url = self.resolve(endpoint)?;
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(token) = &self.admin_token {
            request = request.header(ADMIN_TOKEN_HEADER, token.as_str());
        }

        let response = request.send().map_err(|e| classify(&e, timeout))?;
        // The blocking client cannot be interrupted mid-request; check again
        // once it returns.
        if abort.is_aborted() {
            return Err(FetchError::Cancelled);
        }
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let payload = response
            .json::<Value>()
            .map_err(|e| classify(&e, timeout))?;
        if abort.is_aborted() {
            return Err(FetchError::Cancelled);
        }
        Ok(payload)
    }
}

// ============================================================================
// Scripted
// ============================================================================

/// In-memory fetcher that replays queued responses per endpoint.
///
/// The last queued response for an endpoint repeats once the queue is
/// drained. An optional latency makes requests block until either the delay
/// passes or the request is aborted.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, VecDeque<Result<Value>>>>,
    latency: Option<Duration>,
    calls: AtomicU64,
}

impl ScriptedFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a response for `endpoint`.
    pub fn push(&self, endpoint: &str, response: Result<Value>) {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        responses
            .entry(endpoint.to_owned())
            .or_default()
            .push_back(response);
    }

    /// Builder form of [`push`](Self::push).
    #[must_use]
    pub fn respond(self, endpoint: &str, response: Result<Value>) -> Self {
        self.push(endpoint, response);
        self
    }

    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Acquire)
    }

    fn next_response(&self, endpoint: &str) -> Result<Value> {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        let Some(queue) = responses.get_mut(endpoint) else {
            return Err(FetchError::Status { status: 404 });
        };
        if queue.len() > 1 {
            if let Some(next) = queue.pop_front() {
                return next;
            }
        }
        queue
            .front()
            .cloned()
            .unwrap_or(Err(FetchError::Status { status: 404 }))
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, endpoint: &str, timeout: Duration, abort: &RequestAbort) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        if let Some(latency) = self.latency {
            if latency > timeout {
                if abort.sleep(timeout) {
                    return Err(FetchError::Cancelled);
                }
                return Err(FetchError::Timeout(timeout));
            }
            if abort.sleep(latency) {
                return Err(FetchError::Cancelled);
            }
        }
        if abort.is_aborted() {
            return Err(FetchError::Cancelled);
        }
        self.next_response(endpoint)
    }
}
