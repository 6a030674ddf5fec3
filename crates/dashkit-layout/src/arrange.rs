#![forbid(unsafe_code)]

//! Render-time arrangement of a page's panels.

use dashkit_model::{GridRect, Panel};

use crate::grid::{GridMetrics, PixelRect};
use crate::placement::overlapping_pairs;

pub const BASE_Z_INDEX: u8 = 1;
/// Pinned panels render above unpinned ones where they overlap.
pub const PINNED_Z_INDEX: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct PanelPlacement {
    pub panel_id: String,
    pub widget_id: String,
    pub rect: GridRect,
    pub pixel: PixelRect,
    pub z_index: u8,
    pub locked: bool,
}

/// Placements for one page, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Arrangement {
    pub placements: Vec<PanelPlacement>,
    pub content_height: f64,
}

impl Arrangement {
    /// Placements sorted for painting: lower z first, document order within
    /// a z level.
    #[must_use]
    pub fn paint_order(&self) -> Vec<&PanelPlacement> {
        let mut ordered: Vec<&PanelPlacement> = self.placements.iter().collect();
        ordered.sort_by_key(|p| p.z_index);
        ordered
    }

    /// Panel id pairs whose grid rectangles overlap.
    #[must_use]
    pub fn overlaps(&self) -> Vec<(&str, &str)> {
        let rects: Vec<GridRect> = self.placements.iter().map(|p| p.rect).collect();
        overlapping_pairs(&rects)
            .into_iter()
            .map(|(i, j)| {
                (
                    self.placements[i].panel_id.as_str(),
                    self.placements[j].panel_id.as_str(),
                )
            })
            .collect()
    }

    #[must_use]
    pub fn placement(&self, panel_id: &str) -> Option<&PanelPlacement> {
        self.placements.iter().find(|p| p.panel_id == panel_id)
    }
}

/// Resolve every panel to a grid rectangle and pixel box. Panels without a
/// grid frame get the default rectangle.
#[must_use]
pub fn arrange(panels: &[Panel], metrics: &GridMetrics) -> Arrangement {
    let placements: Vec<PanelPlacement> = panels
        .iter()
        .map(|panel| {
            let rect = panel.grid_rect();
            PanelPlacement {
                panel_id: panel.id.clone(),
                widget_id: panel.widget_id.clone(),
                rect,
                pixel: metrics.pixel_rect(rect),
                z_index: if panel.pinned {
                    PINNED_Z_INDEX
                } else {
                    BASE_Z_INDEX
                },
                locked: panel.locked,
            }
        })
        .collect();
    let content_height = metrics.content_height(placements.iter().map(|p| p.rect));
    Arrangement {
        placements,
        content_height,
    }
}
