#![forbid(unsafe_code)]

//! Bounded snapshot history for undo/redo of workspace edits.
//!
//! [`EditHistory`] keeps whole-document snapshots rather than commands: the
//! caller pushes the state *before* each mutation, and undo/redo swap the
//! current state with the top of the opposite stack.
//!
//! # Invariants
//!
//! 1. `undo_depth() <= config.max_steps` after any operation
//! 2. The redo stack is cleared whenever a new state is pushed
//! 3. Stored snapshots are owned clones; callers never alias them
//!
//! ```text
//! push(s3)
//! ┌──────────────────────────────┐
//! │ Past:   [s0, s1, s2, s3]     │
//! │ Future: []                   │
//! └──────────────────────────────┘
//!
//! undo(cur) x2
//! ┌──────────────────────────────┐
//! │ Past:   [s0, s1]             │
//! │ Future: [cur, s3]            │
//! └──────────────────────────────┘
//!
//! push(s4)  <-- new branch, clears future
//! ┌──────────────────────────────┐
//! │ Past:   [s0, s1, s4]         │
//! │ Future: []                   │
//! └──────────────────────────────┘
//! ```

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default number of undo steps retained.
pub const DEFAULT_MAX_STEPS: usize = 100;

/// Configuration for [`EditHistory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of snapshots kept on the undo stack.
    pub max_steps: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl HistoryConfig {
    #[must_use]
    pub const fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }
}

/// Undo/redo stacks of document snapshots.
pub struct EditHistory<T> {
    /// Snapshots available for undo (newest at back).
    past: VecDeque<T>,
    /// Snapshots available for redo (newest at back).
    future: Vec<T>,
    config: HistoryConfig,
}

impl<T> fmt::Debug for EditHistory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditHistory")
            .field("undo_depth", &self.past.len())
            .field("redo_depth", &self.future.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<T> Default for EditHistory<T> {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl<T> EditHistory<T> {
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            past: VecDeque::new(),
            future: Vec::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> HistoryConfig {
        self.config
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.past.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }

    /// Drop both stacks.
    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    fn enforce_limit(&mut self) {
        while self.past.len() > self.config.max_steps {
            self.past.pop_front();
        }
    }
}

impl<T: Clone> EditHistory<T> {
    /// Record `state` as the pre-mutation snapshot.
    ///
    /// Evicts the oldest snapshot beyond `max_steps` and clears redo.
    pub fn push(&mut self, state: &T) {
        self.future.clear();
        self.past.push_back(state.clone());
        self.enforce_limit();
        tracing::debug!(undo_depth = self.past.len(), "history push");
    }

    /// Step back: returns the previous snapshot and parks `current` on the
    /// redo stack. `None` (and no change) when there is nothing to undo.
    pub fn undo(&mut self, current: &T) -> Option<T> {
        let previous = self.past.pop_back()?;
        self.future.push(current.clone());
        tracing::debug!(
            undo_depth = self.past.len(),
            redo_depth = self.future.len(),
            "history undo"
        );
        Some(previous)
    }

    /// Mirror of [`Self::undo`].
    pub fn redo(&mut self, current: &T) -> Option<T> {
        let next = self.future.pop()?;
        self.past.push_back(current.clone());
        self.enforce_limit();
        tracing::debug!(
            undo_depth = self.past.len(),
            redo_depth = self.future.len(),
            "history redo"
        );
        Some(next)
    }
}
