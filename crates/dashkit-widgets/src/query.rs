#![forbid(unsafe_code)]

//! Per-panel query state: the latest poll result plus the last known good
//! payload.
//!
//! Every poll is identified by a monotonically increasing sequence number.
//! Only the completion of the most recently issued ticket is applied; a late
//! response for an older ticket is reported as [`PollApply::Superseded`] and
//! dropped, so a slow request can never overwrite a newer one.

use serde::{Deserialize, Serialize};

use crate::fetch::FetchError;

/// Outcome of the most recent poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    /// Completion time, milliseconds since the Unix epoch.
    pub ts: i64,
}

impl<T> FetchResult<T> {
    /// Placeholder before the first poll completes.
    #[must_use]
    pub fn pending(ts: i64) -> Self {
        Self {
            ok: false,
            data: None,
            error: None,
            ts,
        }
    }

    #[must_use]
    pub fn success(data: T, ts: i64) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            ts,
        }
    }

    #[must_use]
    pub fn failure(error: &FetchError, ts: i64) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.to_string()),
            ts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastSuccess<T> {
    pub data: T,
    pub ts: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PollTicket {
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollApply {
    Applied,
    /// A newer ticket was issued (or already completed); the result was dropped.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetQuery<T> {
    result: FetchResult<T>,
    last_success: Option<LastSuccess<T>>,
    issued: u64,
    completed: u64,
    consecutive_failures: u32,
}

impl<T> Default for WidgetQuery<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T> WidgetQuery<T> {
    #[must_use]
    pub fn new(created_ts: i64) -> Self {
        Self {
            result: FetchResult::pending(created_ts),
            last_success: None,
            issued: 0,
            completed: 0,
            consecutive_failures: 0,
        }
    }

    /// Issue the next ticket locally.
    pub fn begin(&mut self) -> PollTicket {
        self.issued += 1;
        PollTicket { seq: self.issued }
    }

    /// Record a ticket issued elsewhere (by a poll worker). Never moves the
    /// issued sequence backwards.
    pub fn mark_issued(&mut self, seq: u64) {
        self.issued = self.issued.max(seq);
    }

    #[must_use]
    pub fn result(&self) -> &FetchResult<T> {
        &self.result
    }

    #[must_use]
    pub fn last_success(&self) -> Option<&LastSuccess<T>> {
        self.last_success.as_ref()
    }

    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[must_use]
    pub const fn has_completed(&self) -> bool {
        self.completed > 0
    }

    #[must_use]
    pub const fn issued_seq(&self) -> u64 {
        self.issued
    }

    /// Whether a ticket is outstanding.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.issued > self.completed
    }

    /// Current payload, falling back to the last known good one.
    #[must_use]
    pub fn source(&self) -> Option<&T> {
        self.result
            .data
            .as_ref()
            .or_else(|| self.last_success.as_ref().map(|s| &s.data))
    }
}

impl<T: Clone> WidgetQuery<T> {
    /// Apply a poll outcome if `ticket` is still the latest one.
    pub fn complete(
        &mut self,
        ticket: PollTicket,
        outcome: Result<T, FetchError>,
        ts: i64,
    ) -> PollApply {
        if ticket.seq != self.issued || ticket.seq <= self.completed {
            tracing::debug!(
                seq = ticket.seq,
                issued = self.issued,
                completed = self.completed,
                "dropping superseded poll result"
            );
            return PollApply::Superseded;
        }
        self.completed = ticket.seq;
        match outcome {
            Ok(data) => {
                self.consecutive_failures = 0;
                self.last_success = Some(LastSuccess {
                    data: data.clone(),
                    ts,
                });
                self.result = FetchResult::success(data, ts);
            }
            Err(error) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.result = FetchResult::failure(&error, ts);
            }
        }
        PollApply::Applied
    }
}
