#![forbid(unsafe_code)]

//! Abort flag for one in-flight poll request.
//!
//! The poll worker arms a fresh [`RequestAbort`] per request and keeps a
//! clone in its control block; `refresh_now`, `stop` and unmount flip it. The
//! fetcher checks it between the stages of a request, and the worker drops
//! the outcome of any request whose flag is set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use web_time::{Duration, Instant};

/// Granularity of [`RequestAbort::sleep`].
const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// Shared abort flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct RequestAbort {
    aborted: Arc<AtomicBool>,
}

impl RequestAbort {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag for one-shot polls that nothing can abort.
    #[must_use]
    pub fn unabortable() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, waking early once aborted. Returns whether the
    /// request was aborted.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while !self.is_aborted() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_is_seen_by_clones() {
        let abort = RequestAbort::new();
        let seen_by_fetcher = abort.clone();
        assert!(!seen_by_fetcher.is_aborted());
        abort.abort();
        abort.abort();
        assert!(seen_by_fetcher.is_aborted());
    }

    #[test]
    fn sleep_runs_to_completion_when_not_aborted() {
        let start = Instant::now();
        assert!(!RequestAbort::unabortable().sleep(Duration::from_millis(15)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn sleep_returns_early_on_abort() {
        let abort = RequestAbort::new();
        let sleeper = abort.clone();
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        abort.abort();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn already_aborted_sleep_returns_immediately() {
        let abort = RequestAbort::new();
        abort.abort();
        let start = Instant::now();
        assert!(abort.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
