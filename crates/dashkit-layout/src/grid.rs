#![forbid(unsafe_code)]

//! Cell ↔ pixel conversion.
//!
//! ```text
//!  |<-- col -->|gap|<-- col -->|gap|<-- col -->|
//!  column_width = (container_width - gap * (columns - 1)) / columns
//! ```

use dashkit_model::{GridRect, GridSpec};
use serde::{Deserialize, Serialize};

/// Pixel rectangle relative to the grid container's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// A grid spec resolved against a concrete container width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMetrics {
    pub columns: u32,
    pub row_height: f64,
    pub gap: f64,
    pub container_width: f64,
}

impl GridMetrics {
    #[must_use]
    pub fn new(spec: GridSpec, container_width: f64) -> Self {
        Self {
            columns: spec.columns.max(1),
            row_height: f64::from(spec.row_height),
            gap: f64::from(spec.gap),
            container_width: container_width.max(0.0),
        }
    }

    #[must_use]
    pub fn column_width(&self) -> f64 {
        let columns = f64::from(self.columns.max(1));
        let gutters = self.gap * (columns - 1.0);
        ((self.container_width - gutters) / columns).max(0.0)
    }

    /// Horizontal distance between the left edges of adjacent columns.
    #[must_use]
    pub fn column_pitch(&self) -> f64 {
        self.column_width() + self.gap
    }

    #[must_use]
    pub fn row_pitch(&self) -> f64 {
        self.row_height + self.gap
    }

    #[must_use]
    pub fn pixel_rect(&self, rect: GridRect) -> PixelRect {
        PixelRect {
            left: f64::from(rect.x) * self.column_pitch(),
            top: f64::from(rect.y) * self.row_pitch(),
            width: span(rect.w, self.column_width(), self.gap),
            height: span(rect.h, self.row_height, self.gap),
        }
    }

    /// Height needed to show every rectangle; zero for an empty page.
    #[must_use]
    pub fn content_height<I>(&self, rects: I) -> f64
    where
        I: IntoIterator<Item = GridRect>,
    {
        let rows = rects.into_iter().map(|r| r.bottom()).max().unwrap_or(0);
        span(rows, self.row_height, self.gap)
    }

    /// Convert a pixel delta to whole-cell deltas, rounding to the nearest
    /// cell boundary.
    #[must_use]
    pub fn cell_delta(&self, dx: f64, dy: f64) -> (i64, i64) {
        (
            round_cells(dx, self.column_pitch()),
            round_cells(dy, self.row_pitch()),
        )
    }
}

fn span(cells: u32, cell: f64, gap: f64) -> f64 {
    if cells == 0 {
        return 0.0;
    }
    let cells = f64::from(cells);
    cells * cell + (cells - 1.0) * gap
}

fn round_cells(delta: f64, pitch: f64) -> i64 {
    if pitch <= 0.0 || !delta.is_finite() {
        return 0;
    }
    // Saturating float-to-int cast.
    (delta / pitch).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(width: f64) -> GridMetrics {
        GridMetrics::new(
            GridSpec {
                columns: 12,
                row_height: 80,
                gap: 12,
            },
            width,
        )
    }

    #[test]
    fn column_width_subtracts_gutters() {
        // 1332 = 12 * 100 + 11 * 12
        assert_eq!(metrics(1332.0).column_width(), 100.0);
        assert_eq!(metrics(1332.0).column_pitch(), 112.0);
    }

    #[test]
    fn narrow_container_never_goes_negative() {
        assert_eq!(metrics(50.0).column_width(), 0.0);
    }

    #[test]
    fn pixel_rect_spans_internal_gaps() {
        let px = metrics(1332.0).pixel_rect(GridRect::new(3, 1, 3, 2));
        assert_eq!(px.left, 336.0);
        assert_eq!(px.top, 92.0);
        assert_eq!(px.width, 324.0);
        assert_eq!(px.height, 172.0);
    }

    #[test]
    fn content_height_tracks_lowest_panel() {
        let m = metrics(1332.0);
        assert_eq!(m.content_height(Vec::<GridRect>::new()), 0.0);
        let h = m.content_height([GridRect::new(0, 0, 3, 2), GridRect::new(0, 2, 3, 1)]);
        assert_eq!(h, 3.0 * 80.0 + 2.0 * 12.0);
    }

    #[test]
    fn cell_delta_rounds_to_nearest_cell() {
        let m = metrics(1332.0);
        assert_eq!(m.cell_delta(55.0, 45.0), (0, 0));
        assert_eq!(m.cell_delta(57.0, 47.0), (1, 1));
        assert_eq!(m.cell_delta(-230.0, -190.0), (-2, -2));
    }

    #[test]
    fn zero_width_container_yields_no_movement() {
        let m = GridMetrics::new(
            GridSpec {
                columns: 12,
                row_height: 80,
                gap: 0,
            },
            0.0,
        );
        assert_eq!(m.cell_delta(500.0, 0.0).0, 0);
    }
}
