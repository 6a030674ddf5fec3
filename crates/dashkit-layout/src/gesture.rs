#![forbid(unsafe_code)]

//! Deterministic pointer drag/resize machine for grid panels.
//!
//! ```text
//!            pointer_down (editing, unlocked)
//!   Idle ───────────────────────────────────────▶ Active{start, last}
//!    ▲                                               │  pointer_move
//!    │  pointer_up        (keep last frame)          │  → FrameChange when the
//!    ├───────────────────────────────────────────────┤    cell rect changes
//!    │  escape / cancel   (restore start frame)      │
//!    └───────────────────────────────────────────────┘
//! ```
//!
//! The machine converts pixel deltas into whole-cell deltas through the live
//! [`GridMetrics`], clamps the candidate rectangle into the grid, and emits a
//! [`FrameChange`] for every distinct candidate. Overlap with other panels is
//! not prevented during a gesture. Every dispatch carries a
//! [`GestureLogEntry`] so hosts can trace the lifecycle.

use dashkit_model::GridRect;

use crate::grid::GridMetrics;

/// Pointer position in container pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

impl PointerPosition {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureKind {
    /// Move the panel; size is preserved.
    Drag,
    /// Grow or shrink from the bottom-right handle; origin is preserved.
    Resize,
}

/// What the host knows about the panel under the pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureTarget {
    pub panel_id: String,
    pub rect: GridRect,
    pub locked: bool,
}

impl GestureTarget {
    #[must_use]
    pub fn new(panel_id: impl Into<String>, rect: GridRect, locked: bool) -> Self {
        Self {
            panel_id: panel_id.into(),
            rect,
            locked,
        }
    }
}

/// Candidate rectangle for a panel, to be written into the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameChange {
    pub panel_id: String,
    pub rect: GridRect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    PointerDown,
    PointerMove,
    PointerUp,
    Escape,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureCancelReason {
    EscapeKey,
    PointerCancel,
    /// The panel or page went away mid-gesture.
    Unmount,
    Programmatic,
}

/// Deterministic reason why an incoming signal was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureIgnoredReason {
    NotEditing,
    PanelLocked,
    GestureInProgress,
    NoActiveGesture,
    PointerMismatch,
    /// The pointer moved but the clamped cell rectangle did not change.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureLogOutcome {
    Started,
    Updated,
    Committed,
    Reverted(GestureCancelReason),
    Ignored(GestureIgnoredReason),
}

/// Structured record of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureLogEntry {
    pub phase: GesturePhase,
    pub sequence: Option<u64>,
    pub pointer_id: Option<u32>,
    pub panel_id: Option<String>,
    pub kind: Option<GestureKind>,
    pub position: Option<PointerPosition>,
    pub outcome: GestureLogOutcome,
}

/// Result of one lifecycle dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureDispatch {
    pub frame_change: Option<FrameChange>,
    pub log: GestureLogEntry,
}

impl GestureDispatch {
    fn ignored(
        phase: GesturePhase,
        reason: GestureIgnoredReason,
        pointer_id: Option<u32>,
        panel_id: Option<&str>,
        position: Option<PointerPosition>,
    ) -> Self {
        Self {
            frame_change: None,
            log: GestureLogEntry {
                phase,
                sequence: None,
                pointer_id,
                panel_id: panel_id.map(str::to_owned),
                kind: None,
                position,
                outcome: GestureLogOutcome::Ignored(reason),
            },
        }
    }

    #[must_use]
    pub fn is_ignored(&self) -> bool {
        matches!(self.log.outcome, GestureLogOutcome::Ignored(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveGesture {
    pointer_id: u32,
    panel_id: String,
    kind: GestureKind,
    origin: PointerPosition,
    start: GridRect,
    last: GridRect,
}

/// Drag/resize lifecycle for one page. At most one gesture is active.
#[derive(Debug, Clone, Default)]
pub struct GridGestureMachine {
    active: Option<ActiveGesture>,
    next_sequence: u64,
}

impl GridGestureMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn active_panel_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.panel_id.as_str())
    }

    #[must_use]
    pub fn active_kind(&self) -> Option<GestureKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    /// Rectangle the panel had when the active gesture began.
    #[must_use]
    pub fn start_rect(&self) -> Option<GridRect> {
        self.active.as_ref().map(|a| a.start)
    }

    /// Begin a gesture on a drag or resize handle. Locked panels and
    /// non-edit mode never start one.
    pub fn pointer_down(
        &mut self,
        target: &GestureTarget,
        kind: GestureKind,
        pointer_id: u32,
        position: PointerPosition,
        editing: bool,
    ) -> GestureDispatch {
        let reject = if !editing {
            Some(GestureIgnoredReason::NotEditing)
        } else if target.locked {
            Some(GestureIgnoredReason::PanelLocked)
        } else if self.active.is_some() {
            Some(GestureIgnoredReason::GestureInProgress)
        } else {
            None
        };
        if let Some(reason) = reject {
            tracing::debug!(panel_id = %target.panel_id, ?reason, "gesture start ignored");
            return GestureDispatch::ignored(
                GesturePhase::PointerDown,
                reason,
                Some(pointer_id),
                Some(&target.panel_id),
                Some(position),
            );
        }

        self.active = Some(ActiveGesture {
            pointer_id,
            panel_id: target.panel_id.clone(),
            kind,
            origin: position,
            start: target.rect,
            last: target.rect,
        });
        let sequence = self.next_sequence();
        tracing::debug!(panel_id = %target.panel_id, ?kind, sequence, "gesture started");
        GestureDispatch {
            frame_change: None,
            log: GestureLogEntry {
                phase: GesturePhase::PointerDown,
                sequence: Some(sequence),
                pointer_id: Some(pointer_id),
                panel_id: Some(target.panel_id.clone()),
                kind: Some(kind),
                position: Some(position),
                outcome: GestureLogOutcome::Started,
            },
        }
    }

    /// Track the pointer and emit the clamped candidate rectangle when it
    /// differs from the last one emitted.
    pub fn pointer_move(
        &mut self,
        pointer_id: u32,
        position: PointerPosition,
        metrics: &GridMetrics,
    ) -> GestureDispatch {
        let phase = GesturePhase::PointerMove;
        let Some(active) = self.active.as_ref() else {
            return GestureDispatch::ignored(
                phase,
                GestureIgnoredReason::NoActiveGesture,
                Some(pointer_id),
                None,
                Some(position),
            );
        };
        if active.pointer_id != pointer_id {
            return GestureDispatch::ignored(
                phase,
                GestureIgnoredReason::PointerMismatch,
                Some(pointer_id),
                Some(&active.panel_id),
                Some(position),
            );
        }

        let (dx, dy) = metrics.cell_delta(position.x - active.origin.x, position.y - active.origin.y);
        let candidate = candidate_rect(active.kind, active.start, dx, dy, metrics.columns);
        if candidate == active.last {
            return GestureDispatch::ignored(
                phase,
                GestureIgnoredReason::Unchanged,
                Some(pointer_id),
                Some(&active.panel_id),
                Some(position),
            );
        }

        let kind = active.kind;
        let panel_id = active.panel_id.clone();
        if let Some(active) = self.active.as_mut() {
            active.last = candidate;
        }
        let sequence = self.next_sequence();
        tracing::trace!(panel_id = %panel_id, ?candidate, sequence, "gesture candidate");
        GestureDispatch {
            frame_change: Some(FrameChange {
                panel_id: panel_id.clone(),
                rect: candidate,
            }),
            log: GestureLogEntry {
                phase,
                sequence: Some(sequence),
                pointer_id: Some(pointer_id),
                panel_id: Some(panel_id),
                kind: Some(kind),
                position: Some(position),
                outcome: GestureLogOutcome::Updated,
            },
        }
    }

    /// End the gesture, keeping the last emitted rectangle.
    pub fn pointer_up(&mut self, pointer_id: u32) -> GestureDispatch {
        let phase = GesturePhase::PointerUp;
        let active = match self.active.take() {
            None => {
                return GestureDispatch::ignored(
                    phase,
                    GestureIgnoredReason::NoActiveGesture,
                    Some(pointer_id),
                    None,
                    None,
                );
            }
            Some(active) if active.pointer_id != pointer_id => {
                let dispatch = GestureDispatch::ignored(
                    phase,
                    GestureIgnoredReason::PointerMismatch,
                    Some(pointer_id),
                    Some(&active.panel_id),
                    None,
                );
                self.active = Some(active);
                return dispatch;
            }
            Some(active) => active,
        };
        let sequence = self.next_sequence();
        tracing::debug!(panel_id = %active.panel_id, rect = ?active.last, sequence, "gesture committed");
        GestureDispatch {
            frame_change: None,
            log: GestureLogEntry {
                phase,
                sequence: Some(sequence),
                pointer_id: Some(pointer_id),
                panel_id: Some(active.panel_id),
                kind: Some(active.kind),
                position: None,
                outcome: GestureLogOutcome::Committed,
            },
        }
    }

    /// Escape key: abandon the gesture and restore the start rectangle.
    pub fn escape(&mut self) -> GestureDispatch {
        self.revert(GesturePhase::Escape, GestureCancelReason::EscapeKey)
    }

    /// Interrupt the gesture (pointer cancel, unmount, programmatic) and
    /// restore the start rectangle.
    pub fn cancel(&mut self, reason: GestureCancelReason) -> GestureDispatch {
        self.revert(GesturePhase::Cancel, reason)
    }

    fn revert(&mut self, phase: GesturePhase, reason: GestureCancelReason) -> GestureDispatch {
        let Some(active) = self.active.take() else {
            return GestureDispatch::ignored(
                phase,
                GestureIgnoredReason::NoActiveGesture,
                None,
                None,
                None,
            );
        };
        let sequence = self.next_sequence();
        tracing::debug!(panel_id = %active.panel_id, ?reason, sequence, "gesture reverted");
        let frame_change = (active.last != active.start).then(|| FrameChange {
            panel_id: active.panel_id.clone(),
            rect: active.start,
        });
        GestureDispatch {
            frame_change,
            log: GestureLogEntry {
                phase,
                sequence: Some(sequence),
                pointer_id: Some(active.pointer_id),
                panel_id: Some(active.panel_id),
                kind: Some(active.kind),
                position: None,
                outcome: GestureLogOutcome::Reverted(reason),
            },
        }
    }

    fn next_sequence(&mut self) -> u64 {
        self.next_sequence = self.next_sequence.saturating_add(1);
        self.next_sequence
    }
}

/// Apply a cell delta to `start` and clamp into a `columns`-wide grid.
///
/// Drag keeps the size and clamps `x ∈ [0, columns − w]`, `y ≥ 0`.
/// Resize keeps the origin and clamps `w ∈ [1, columns − x]`, `h ≥ 1`.
fn candidate_rect(kind: GestureKind, start: GridRect, dx: i64, dy: i64, columns: u32) -> GridRect {
    let columns = i64::from(columns.max(1));
    let (x, y, w, h) = (
        i64::from(start.x),
        i64::from(start.y),
        i64::from(start.w),
        i64::from(start.h),
    );
    let (x, y, w, h) = match kind {
        GestureKind::Drag => {
            let w = w.clamp(1, columns);
            ((x + dx).clamp(0, columns - w), (y + dy).max(0), w, h.max(1))
        }
        GestureKind::Resize => {
            let x = x.clamp(0, columns - 1);
            (x, y, (w + dx).clamp(1, columns - x), (h + dy).max(1))
        }
    };
    GridRect::new(to_cell(x), to_cell(y), to_cell(w), to_cell(h))
}

fn to_cell(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashkit_model::GridSpec;

    // 12 columns, 100px wide, 12px gap → 112px pitch; rows 80 + 12 → 92px pitch.
    fn metrics() -> GridMetrics {
        GridMetrics::new(GridSpec::default(), 1332.0)
    }

    fn target(locked: bool) -> GestureTarget {
        GestureTarget::new("p1", GridRect::new(2, 1, 3, 2), locked)
    }

    fn pos(x: f64, y: f64) -> PointerPosition {
        PointerPosition::new(x, y)
    }

    fn started(kind: GestureKind) -> GridGestureMachine {
        let mut machine = GridGestureMachine::new();
        let dispatch = machine.pointer_down(&target(false), kind, 7, pos(0.0, 0.0), true);
        assert_eq!(dispatch.log.outcome, GestureLogOutcome::Started);
        machine
    }

    // ---- Start ----

    #[test]
    fn locked_panel_never_starts_gesture() {
        let mut machine = GridGestureMachine::new();
        let dispatch = machine.pointer_down(&target(true), GestureKind::Drag, 1, pos(0.0, 0.0), true);
        assert_eq!(
            dispatch.log.outcome,
            GestureLogOutcome::Ignored(GestureIgnoredReason::PanelLocked)
        );
        assert!(!machine.is_active());
        let moved = machine.pointer_move(1, pos(500.0, 300.0), &metrics());
        assert_eq!(moved.frame_change, None);
        assert!(moved.is_ignored());
    }

    #[test]
    fn view_mode_never_starts_gesture() {
        let mut machine = GridGestureMachine::new();
        let dispatch = machine.pointer_down(&target(false), GestureKind::Resize, 1, pos(0.0, 0.0), false);
        assert_eq!(
            dispatch.log.outcome,
            GestureLogOutcome::Ignored(GestureIgnoredReason::NotEditing)
        );
        assert_eq!(dispatch.frame_change, None);
    }

    #[test]
    fn second_pointer_down_is_ignored() {
        let mut machine = started(GestureKind::Drag);
        let other = GestureTarget::new("p2", GridRect::new(0, 0, 1, 1), false);
        let dispatch = machine.pointer_down(&other, GestureKind::Drag, 8, pos(0.0, 0.0), true);
        assert_eq!(
            dispatch.log.outcome,
            GestureLogOutcome::Ignored(GestureIgnoredReason::GestureInProgress)
        );
        assert_eq!(machine.active_panel_id(), Some("p1"));
    }

    // ---- Drag ----

    #[test]
    fn drag_moves_by_rounded_cells() {
        let mut machine = started(GestureKind::Drag);
        let dispatch = machine.pointer_move(7, pos(230.0, 100.0), &metrics());
        assert_eq!(
            dispatch.frame_change,
            Some(FrameChange {
                panel_id: "p1".into(),
                rect: GridRect::new(4, 2, 3, 2)
            })
        );
        assert_eq!(dispatch.log.outcome, GestureLogOutcome::Updated);
    }

    #[test]
    fn drag_clamps_to_grid_edges() {
        let mut machine = started(GestureKind::Drag);
        let right = machine.pointer_move(7, pos(5000.0, 0.0), &metrics());
        assert_eq!(right.frame_change.map(|c| c.rect), Some(GridRect::new(9, 1, 3, 2)));
        let left = machine.pointer_move(7, pos(-5000.0, -5000.0), &metrics());
        assert_eq!(left.frame_change.map(|c| c.rect), Some(GridRect::new(0, 0, 3, 2)));
    }

    #[test]
    fn sub_cell_moves_emit_nothing() {
        let mut machine = started(GestureKind::Drag);
        let dispatch = machine.pointer_move(7, pos(40.0, 30.0), &metrics());
        assert_eq!(dispatch.frame_change, None);
        assert_eq!(
            dispatch.log.outcome,
            GestureLogOutcome::Ignored(GestureIgnoredReason::Unchanged)
        );
    }

    #[test]
    fn candidates_are_emitted_continuously() {
        let mut machine = started(GestureKind::Drag);
        let first = machine.pointer_move(7, pos(112.0, 0.0), &metrics());
        let second = machine.pointer_move(7, pos(224.0, 0.0), &metrics());
        assert_eq!(first.frame_change.map(|c| c.rect.x), Some(3));
        assert_eq!(second.frame_change.map(|c| c.rect.x), Some(4));
        assert!(second.log.sequence > first.log.sequence);
    }

    #[test]
    fn foreign_pointer_is_ignored() {
        let mut machine = started(GestureKind::Drag);
        let dispatch = machine.pointer_move(99, pos(500.0, 0.0), &metrics());
        assert_eq!(
            dispatch.log.outcome,
            GestureLogOutcome::Ignored(GestureIgnoredReason::PointerMismatch)
        );
        assert!(machine.is_active());
    }

    // ---- Resize ----

    #[test]
    fn resize_keeps_origin_and_clamps_span() {
        let mut machine = started(GestureKind::Resize);
        let grow = machine.pointer_move(7, pos(5000.0, 200.0), &metrics());
        assert_eq!(grow.frame_change.map(|c| c.rect), Some(GridRect::new(2, 1, 10, 4)));
        let shrink = machine.pointer_move(7, pos(-5000.0, -5000.0), &metrics());
        assert_eq!(shrink.frame_change.map(|c| c.rect), Some(GridRect::new(2, 1, 1, 1)));
    }

    // ---- End / revert ----

    #[test]
    fn pointer_up_keeps_last_frame() {
        let mut machine = started(GestureKind::Drag);
        machine.pointer_move(7, pos(112.0, 0.0), &metrics());
        let up = machine.pointer_up(7);
        assert_eq!(up.log.outcome, GestureLogOutcome::Committed);
        assert_eq!(up.frame_change, None);
        assert!(!machine.is_active());
    }

    #[test]
    fn escape_restores_start_frame() {
        let mut machine = started(GestureKind::Drag);
        machine.pointer_move(7, pos(336.0, 184.0), &metrics());
        let escape = machine.escape();
        assert_eq!(
            escape.frame_change,
            Some(FrameChange {
                panel_id: "p1".into(),
                rect: GridRect::new(2, 1, 3, 2)
            })
        );
        assert_eq!(
            escape.log.outcome,
            GestureLogOutcome::Reverted(GestureCancelReason::EscapeKey)
        );
        assert!(!machine.is_active());
    }

    #[test]
    fn escape_without_movement_emits_nothing() {
        let mut machine = started(GestureKind::Resize);
        assert_eq!(machine.escape().frame_change, None);
    }

    #[test]
    fn unmount_mid_gesture_restores_start_frame() {
        let mut machine = started(GestureKind::Resize);
        machine.pointer_move(7, pos(224.0, 0.0), &metrics());
        let cancel = machine.cancel(GestureCancelReason::Unmount);
        assert_eq!(cancel.frame_change.map(|c| c.rect), Some(GridRect::new(2, 1, 3, 2)));
    }

    #[test]
    fn idle_signals_are_ignored() {
        let mut machine = GridGestureMachine::new();
        for dispatch in [machine.pointer_up(1), machine.escape(), machine.cancel(GestureCancelReason::Programmatic)] {
            assert_eq!(
                dispatch.log.outcome,
                GestureLogOutcome::Ignored(GestureIgnoredReason::NoActiveGesture)
            );
        }
    }

    #[test]
    fn oversized_start_rect_is_clamped_on_drag() {
        assert_eq!(
            candidate_rect(GestureKind::Drag, GridRect::new(4, 0, 20, 1), 0, 0, 12),
            GridRect::new(0, 0, 12, 1)
        );
    }
}
