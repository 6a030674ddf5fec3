#![forbid(unsafe_code)]

//! Collision-aware placement of new panels.
//!
//! Existing rectangles are rasterized into an occupancy set of `(x, y)`
//! cells. [`find_free_slot`] then scans row-major (y outer, x inner) for the
//! first rectangle of the requested size that touches no occupied cell.
//! When nothing fits within [`PLACEMENT_SCAN_ROWS`] rows the panel goes
//! directly below everything, so placement never fails.
//!
//! Only cells inside the scan window are rasterized, so a hostile document
//! with a panel millions of rows tall costs no more than a normal one.

use dashkit_model::GridRect;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Rows searched before falling back to the bottom of the page.
pub const PLACEMENT_SCAN_ROWS: u32 = 40;

/// Width/height in cells, without a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub w: u32,
    pub h: u32,
}

impl GridSize {
    #[must_use]
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    #[must_use]
    pub const fn at(self, x: u32, y: u32) -> GridRect {
        GridRect::new(x, y, self.w, self.h)
    }
}

/// Set of occupied grid cells.
///
/// An occupancy built with [`Occupancy::windowed`] rasterizes only the cells
/// inside its window. The parts of rectangles that reach past the window are
/// kept as rectangles and checked by overlap instead.
#[derive(Debug, Clone)]
pub struct Occupancy {
    cells: FxHashSet<(u32, u32)>,
    overflow: Vec<GridRect>,
    bottom: u32,
    max_columns: u32,
    max_rows: u32,
}

impl Default for Occupancy {
    fn default() -> Self {
        Self::windowed(u32::MAX, u32::MAX)
    }
}

impl Occupancy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupancy whose raster covers `x < columns` and `y < rows`.
    #[must_use]
    pub fn windowed(columns: u32, rows: u32) -> Self {
        Self {
            cells: FxHashSet::default(),
            overflow: Vec::new(),
            bottom: 0,
            max_columns: columns,
            max_rows: rows,
        }
    }

    #[must_use]
    pub fn from_rects<I>(rects: I) -> Self
    where
        I: IntoIterator<Item = GridRect>,
    {
        let mut occupancy = Self::new();
        for rect in rects {
            occupancy.mark(rect);
        }
        occupancy
    }

    pub fn mark(&mut self, rect: GridRect) {
        for y in rect.y..rect.bottom().min(self.max_rows) {
            for x in rect.x..rect.right().min(self.max_columns) {
                self.cells.insert((x, y));
            }
        }
        if rect.bottom() > self.max_rows || rect.right() > self.max_columns {
            self.overflow.push(rect);
        }
        self.bottom = self.bottom.max(rect.bottom());
    }

    #[must_use]
    pub fn is_occupied(&self, x: u32, y: u32) -> bool {
        if x < self.max_columns && y < self.max_rows {
            return self.cells.contains(&(x, y));
        }
        let cell = GridRect::new(x, y, 1, 1);
        self.overflow.iter().any(|rect| rect.overlaps(&cell))
    }

    /// Whether every cell of `rect` is free.
    #[must_use]
    pub fn is_free(&self, rect: GridRect) -> bool {
        let inside = (rect.y..rect.bottom().min(self.max_rows)).all(|y| {
            (rect.x..rect.right().min(self.max_columns)).all(|x| !self.cells.contains(&(x, y)))
        });
        let spills = rect.bottom() > self.max_rows || rect.right() > self.max_columns;
        inside && !(spills && self.overflow.iter().any(|other| other.overlaps(&rect)))
    }

    /// First row below every marked rectangle.
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.bottom
    }

    #[must_use]
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }
}

/// First free slot for `size` in a `columns`-wide grid. Widths wider than the
/// grid are clamped to it; zero sizes are bumped to one cell.
///
/// The fallback row is the bottom edge of the lowest panel, not one past it,
/// so no empty row is left between it and the new panel.
#[must_use]
pub fn find_free_slot(columns: u32, size: GridSize, existing: &[GridRect]) -> GridRect {
    let columns = columns.max(1);
    let size = GridSize::new(size.w.clamp(1, columns), size.h.max(1));
    let window_rows = PLACEMENT_SCAN_ROWS.saturating_add(size.h.min(PLACEMENT_SCAN_ROWS));
    let mut occupancy = Occupancy::windowed(columns, window_rows);
    for rect in existing {
        occupancy.mark(*rect);
    }

    for y in 0..PLACEMENT_SCAN_ROWS {
        for x in 0..=columns - size.w {
            let candidate = size.at(x, y);
            if occupancy.is_free(candidate) {
                return candidate;
            }
        }
    }

    let fallback = size.at(0, occupancy.bottom());
    tracing::debug!(
        y = fallback.y,
        "no free slot within scan window; placing below existing panels"
    );
    fallback
}

/// Index pairs `(i, j)` with `i < j` whose rectangles overlap.
#[must_use]
pub fn overlapping_pairs(rects: &[GridRect]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (i, a) in rects.iter().enumerate() {
        for (j, b) in rects.iter().enumerate().skip(i + 1) {
            if a.overlaps(b) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}
