#![forbid(unsafe_code)]

//! Typed workspace schema v1.
//!
//! ```text
//! Workspace ─┬─ Page ── Layout ─┬─ Panel ─┬─ DataSpec   (opaque)
//!            ├─ Page            ├─ Panel  ├─ ViewSpec   (opaque)
//!            └─ ...             └─ ...    └─ PanelFrame { grid: GridRect }
//! ```
//!
//! Serialized field names are camelCase. `freeformSpec`, `splitSpec` and the
//! panel `frame.freeform` record are carried verbatim for round-tripping; the
//! engine only lays out grid pages.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Current workspace schema version.
pub const WORKSPACE_SCHEMA_VERSION: u32 = 1;

/// Widget id every unknown widget is coerced to.
pub const PLACEHOLDER_WIDGET_ID: &str = "placeholder";

/// Rectangle used for panels that carry no grid frame.
pub const DEFAULT_PANEL_RECT: GridRect = GridRect {
    x: 0,
    y: 0,
    w: 3,
    h: 2,
};

/// Current UTC time as an RFC 3339 timestamp with millisecond precision.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Fresh opaque identifier with a readable prefix (`panel-…`, `ws-…`).
#[must_use]
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

// =========================================================================
// Workspace / Page
// =========================================================================

/// A persisted dashboard workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub pages: Vec<Page>,
    pub default_page_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub schema_version: u32,
}

impl Workspace {
    /// Create a single-page workspace stamped with the current version.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, page: Page) -> Self {
        let now = now_timestamp();
        Self {
            id: id.into(),
            name: name.into(),
            default_page_id: page.id.clone(),
            pages: vec![page],
            created_at: now.clone(),
            updated_at: now,
            schema_version: WORKSPACE_SCHEMA_VERSION,
        }
    }

    #[must_use]
    pub fn page(&self, id: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == id)
    }

    pub fn page_mut(&mut self, id: &str) -> Option<&mut Page> {
        self.pages.iter_mut().find(|p| p.id == id)
    }

    /// The page named by `defaultPageId`, falling back to the first page when
    /// the reference is stale.
    #[must_use]
    pub fn default_page(&self) -> Option<&Page> {
        self.page(&self.default_page_id).or_else(|| self.pages.first())
    }

    /// Resolve a requested page id, falling back to [`Self::default_page`].
    #[must_use]
    pub fn resolve_page(&self, requested: Option<&str>) -> Option<&Page> {
        requested
            .and_then(|id| self.page(id))
            .or_else(|| self.default_page())
    }

    /// Total number of panels across all pages.
    #[must_use]
    pub fn panel_count(&self) -> usize {
        self.pages.iter().map(|p| p.layout.panels.len()).sum()
    }

    /// Refresh `updatedAt`.
    pub fn touch(&mut self) {
        self.updated_at = now_timestamp();
    }
}

/// One page: an independent layout namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub title: String,
    pub layout: Layout,
}

impl Page {
    /// Empty grid page.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            layout: Layout::grid(Vec::new()),
        }
    }

    #[must_use]
    pub fn panel(&self, id: &str) -> Option<&Panel> {
        self.layout.panels.iter().find(|p| p.id == id)
    }

    pub fn panel_mut(&mut self, id: &str) -> Option<&mut Panel> {
        self.layout.panels.iter_mut().find(|p| p.id == id)
    }

    #[must_use]
    pub fn panel_index(&self, id: &str) -> Option<usize> {
        self.layout.panels.iter().position(|p| p.id == id)
    }
}

// =========================================================================
// Layout
// =========================================================================

/// Layout strategy for a page. Only `Grid` is laid out by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Grid,
    Freeform,
    Split,
}

impl LayoutKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::Freeform => "freeform",
            Self::Split => "split",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "grid" => Some(Self::Grid),
            "freeform" => Some(Self::Freeform),
            "split" => Some(Self::Split),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub kind: LayoutKind,
    pub panels: Vec<Panel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_spec: Option<GridSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform_spec: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_spec: Option<Value>,
}

impl Layout {
    #[must_use]
    pub fn grid(panels: Vec<Panel>) -> Self {
        Self {
            kind: LayoutKind::Grid,
            panels,
            grid_spec: None,
            freeform_spec: None,
            split_spec: None,
        }
    }

    /// The page's grid spec, or the engine default when none is stored.
    #[must_use]
    pub fn grid_spec_or(&self, fallback: GridSpec) -> GridSpec {
        self.grid_spec.unwrap_or(fallback)
    }
}

/// Grid dimensions: column count plus pixel row height and gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSpec {
    pub columns: u32,
    pub row_height: u32,
    pub gap: u32,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            columns: 12,
            row_height: 80,
            gap: 12,
        }
    }
}

// =========================================================================
// Panel
// =========================================================================

/// Grid-cell rectangle. `x`/`y` are the top-left cell, `w`/`h` the span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl GridRect {
    #[must_use]
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// One past the last column.
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    /// One past the last row.
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    #[must_use]
    pub const fn overlaps(&self, other: &GridRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Whether the rectangle is non-degenerate and fits within `columns`.
    #[must_use]
    pub const fn fits(&self, columns: u32) -> bool {
        self.w >= 1 && self.h >= 1 && self.right() <= columns
    }

    /// Pull the rectangle back inside a `columns`-wide grid, keeping `w,h >= 1`.
    #[must_use]
    pub fn clamped(&self, columns: u32) -> Self {
        let columns = columns.max(1);
        let w = self.w.clamp(1, columns);
        let x = self.x.min(columns - w);
        Self {
            x,
            y: self.y,
            w,
            h: self.h.max(1),
        }
    }
}

/// Positioning record. Only `grid` is laid out; `freeform` round-trips.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PanelFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridRect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform: Option<Value>,
}

impl PanelFrame {
    #[must_use]
    pub fn grid(rect: GridRect) -> Self {
        Self {
            grid: Some(rect),
            freeform: None,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A widget instance placed on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    pub id: String,
    pub widget_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub data_spec: DataSpec,
    pub view_spec: ViewSpec,
    pub frame: PanelFrame,
    #[serde(default, skip_serializing_if = "is_false")]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub protected: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Panel {
    /// New unlocked panel for `widget_id` at `rect`.
    #[must_use]
    pub fn new(id: impl Into<String>, widget_id: impl Into<String>, rect: GridRect) -> Self {
        let now = now_timestamp();
        let widget_id = widget_id.into();
        Self {
            id: id.into(),
            data_spec: DataSpec::for_widget(&widget_id),
            view_spec: ViewSpec::default_variant(),
            widget_id,
            title: None,
            frame: PanelFrame::grid(rect),
            locked: false,
            pinned: false,
            protected: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Grid rectangle, or [`DEFAULT_PANEL_RECT`] when the frame has none.
    #[must_use]
    pub fn grid_rect(&self) -> GridRect {
        self.frame.grid.unwrap_or(DEFAULT_PANEL_RECT)
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.widget_id == PLACEHOLDER_WIDGET_ID
    }

    pub fn touch(&mut self) {
        self.updated_at = now_timestamp();
    }
}

// =========================================================================
// Opaque specs
// =========================================================================

/// Widget-specific data parameters. Carried verbatim; widgets read the keys
/// they understand through the accessors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSpec(pub Map<String, Value>);

impl DataSpec {
    /// `{ "queryKey": "placeholder" }`
    #[must_use]
    pub fn placeholder() -> Self {
        Self::for_widget(PLACEHOLDER_WIDGET_ID)
    }

    #[must_use]
    pub fn for_widget(query_key: &str) -> Self {
        let mut map = Map::new();
        map.insert("queryKey".into(), Value::String(query_key.to_owned()));
        Self(map)
    }

    #[must_use]
    pub fn query_key(&self) -> Option<&str> {
        self.0.get("queryKey").and_then(Value::as_str)
    }

    #[must_use]
    pub fn endpoint_ref(&self) -> Option<&str> {
        self.0.get("endpointRef").and_then(Value::as_str)
    }

    /// Per-panel poll interval override in milliseconds.
    #[must_use]
    pub fn refresh_ms(&self) -> Option<u64> {
        self.0.get("refreshMs").and_then(Value::as_u64)
    }

    #[must_use]
    pub fn capability_gate(&self) -> Option<&str> {
        self.0.get("capabilityGate").and_then(Value::as_str)
    }
}

/// Presentation parameters. Carried verbatim like [`DataSpec`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewSpec(pub Map<String, Value>);

impl ViewSpec {
    /// `{ "variant": "placeholder" }`
    #[must_use]
    pub fn placeholder() -> Self {
        let mut map = Map::new();
        map.insert(
            "variant".into(),
            Value::String(PLACEHOLDER_WIDGET_ID.to_owned()),
        );
        Self(map)
    }

    /// `{ "variant": "default" }`
    #[must_use]
    pub fn default_variant() -> Self {
        let mut map = Map::new();
        map.insert("variant".into(), Value::String("default".to_owned()));
        Self(map)
    }

    #[must_use]
    pub fn variant(&self) -> Option<&str> {
        self.0.get("variant").and_then(Value::as_str)
    }

    #[must_use]
    pub fn compact_mode(&self) -> bool {
        self.0
            .get("compactMode")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn show_badges(&self) -> bool {
        self.0
            .get("showBadges")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}
