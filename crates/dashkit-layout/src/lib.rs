#![forbid(unsafe_code)]

//! Grid layout engine for dashkit pages.
//!
//! - [`grid`]: cell ↔ pixel math for a live container width.
//! - [`placement`]: occupancy rasterization and first-fit slot search.
//! - [`arrange`]: render placements with pinned z-ordering.
//! - [`gesture`]: pointer-driven drag/resize state machine.
//!
//! Everything here is synchronous and host-driven: callers feed container
//! widths and pointer positions, the engine returns rectangles.

pub mod arrange;
pub mod gesture;
pub mod grid;
pub mod placement;

pub use arrange::{Arrangement, BASE_Z_INDEX, PINNED_Z_INDEX, PanelPlacement, arrange};
pub use gesture::{
    FrameChange, GestureCancelReason, GestureDispatch, GestureIgnoredReason, GestureKind,
    GestureLogEntry, GestureLogOutcome, GesturePhase, GestureTarget, GridGestureMachine,
    PointerPosition,
};
pub use grid::{GridMetrics, PixelRect};
pub use placement::{GridSize, Occupancy, PLACEMENT_SCAN_ROWS, find_free_slot, overlapping_pairs};

pub use dashkit_model::{GridRect, GridSpec};
