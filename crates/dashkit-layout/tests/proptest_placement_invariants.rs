#![forbid(unsafe_code)]

//! Property tests for grid placement and gestures.
//!
//! Validates:
//! - Repeated first-fit placement never produces overlapping rectangles and
//!   always stays inside the grid.
//! - First-fit picks the row-major earliest free slot.
//! - Gesture candidates always stay inside the grid, whatever the pointer does.

use proptest::prelude::*;

use dashkit_layout::{
    GestureKind, GestureTarget, GridGestureMachine, GridMetrics, GridRect, GridSize, GridSpec,
    Occupancy, PLACEMENT_SCAN_ROWS, PointerPosition, find_free_slot, overlapping_pairs,
};

// ============================================================================
// Strategy helpers
// ============================================================================

fn size_strategy() -> impl Strategy<Value = GridSize> {
    (1u32..=12, 1u32..=4).prop_map(|(w, h)| GridSize::new(w, h))
}

fn columns_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![Just(12u32), 4u32..=24]
}

// ============================================================================
// Placement
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn repeated_placement_never_overlaps(
        columns in columns_strategy(),
        sizes in prop::collection::vec(size_strategy(), 1..60),
    ) {
        let mut placed: Vec<GridRect> = Vec::new();
        for size in sizes {
            let rect = find_free_slot(columns, size, &placed);
            prop_assert!(rect.fits(columns), "{rect:?} outside {columns} columns");
            placed.push(rect);
        }
        prop_assert!(overlapping_pairs(&placed).is_empty());
    }

    #[test]
    fn first_fit_is_row_major_earliest(
        columns in columns_strategy(),
        sizes in prop::collection::vec(size_strategy(), 0..20),
        probe in size_strategy(),
    ) {
        let mut placed: Vec<GridRect> = Vec::new();
        for size in sizes {
            let rect = find_free_slot(columns, size, &placed);
            placed.push(rect);
        }
        let chosen = find_free_slot(columns, probe, &placed);
        let occupancy = Occupancy::from_rects(placed.iter().copied());
        let w = chosen.w;
        // No earlier (y, x) position inside the scan window fits the same size.
        for y in 0..=chosen.y.min(PLACEMENT_SCAN_ROWS - 1) {
            for x in 0..=columns - w {
                if (y, x) >= (chosen.y, chosen.x) {
                    break;
                }
                prop_assert!(!occupancy.is_free(GridRect::new(x, y, w, chosen.h)));
            }
        }
    }
}

// ============================================================================
// Gestures
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn gesture_candidates_stay_in_grid(
        resize in any::<bool>(),
        moves in prop::collection::vec((-3000.0f64..3000.0, -3000.0f64..3000.0), 1..30),
        width in 200.0f64..2400.0,
    ) {
        let metrics = GridMetrics::new(GridSpec::default(), width);
        let start = GridRect::new(4, 3, 3, 2);
        let kind = if resize { GestureKind::Resize } else { GestureKind::Drag };
        let mut machine = GridGestureMachine::new();
        machine.pointer_down(&GestureTarget::new("p", start, false), kind, 1, PointerPosition::default(), true);
        for (x, y) in moves {
            let dispatch = machine.pointer_move(1, PointerPosition::new(x, y), &metrics);
            if let Some(change) = dispatch.frame_change {
                prop_assert!(change.rect.fits(metrics.columns));
                if kind == GestureKind::Drag {
                    prop_assert_eq!((change.rect.w, change.rect.h), (start.w, start.h));
                } else {
                    prop_assert_eq!((change.rect.x, change.rect.y), (start.x, start.y));
                }
            }
        }
        let escape = machine.escape();
        if let Some(change) = escape.frame_change {
            prop_assert_eq!(change.rect, start);
        }
    }
}
