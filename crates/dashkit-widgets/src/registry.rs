#![forbid(unsafe_code)]

//! Widget registry: what can be placed on a page, how big it starts, where
//! its data comes from, and how it renders.

use std::collections::BTreeMap;
use std::fmt;

use dashkit_layout::GridSize;
use dashkit_model::{GlobalFilters, PLACEHOLDER_WIDGET_ID, Panel, ValidateMode, ValidateOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use web_time::Duration;

use crate::builtin;
use crate::capabilities::{CapabilityGate, CapabilitySnapshot, Requirements};
use crate::quality::WidgetQuality;
use crate::query::WidgetQuery;
use crate::status::HealthStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WidgetCategory {
    Status,
    Ops,
    Bots,
    Markets,
    Utility,
}

impl WidgetCategory {
    pub const ALL: [WidgetCategory; 5] = [
        Self::Status,
        Self::Ops,
        Self::Bots,
        Self::Markets,
        Self::Utility,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::Ops => "Ops",
            Self::Bots => "Bots",
            Self::Markets => "Markets",
            Self::Utility => "Utility",
        }
    }

    /// Case-insensitive.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for WidgetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a widget's render function may look at.
pub struct WidgetProps<'a> {
    pub panel: &'a Panel,
    pub global_filters: &'a GlobalFilters,
    pub capabilities: &'a CapabilitySnapshot,
    pub gate: &'a CapabilityGate,
    pub data: &'a WidgetQuery<Value>,
    pub quality: WidgetQuality,
    pub stale: bool,
    pub now_ms: i64,
    pub mounted_at: i64,
    pub refresh_now: &'a dyn Fn(),
    pub report_quality: &'a dyn Fn(WidgetQuality),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavLink {
    pub label: String,
    pub href: String,
}

/// Renderer-independent output of a widget.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WidgetView {
    pub title: String,
    pub status: Option<HealthStatus>,
    pub headline: String,
    pub lines: Vec<String>,
    pub links: Vec<NavLink>,
    /// Shown above the body, e.g. an error or a gating reason.
    pub notice: Option<String>,
}

impl WidgetView {
    #[must_use]
    pub fn new(title: impl Into<String>, headline: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            headline: headline.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: HealthStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    pub fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

pub type RenderFn = fn(&WidgetProps<'_>) -> WidgetView;
pub type DataStatusFn = fn(&Value) -> Option<HealthStatus>;

#[derive(Debug, Clone, Copy)]
pub struct WidgetDefinition {
    pub id: &'static str,
    pub title: &'static str,
    pub category: WidgetCategory,
    pub default_grid: GridSize,
    pub min_grid: GridSize,
    pub description: &'static str,
    pub requires: Requirements,
    /// Endpoint polled for the widget's data; `None` for static widgets.
    pub endpoint: Option<&'static str>,
    /// Poll interval override.
    pub refresh: Option<Duration>,
    /// Status read out of a successful payload.
    pub data_status: DataStatusFn,
    pub render: RenderFn,
    /// Known id without an implementation in this build. Accepted by the
    /// validator, hidden from the catalog, rendered as a placeholder.
    pub reserved: bool,
}

impl WidgetDefinition {
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.id == PLACEHOLDER_WIDGET_ID
    }

    #[must_use]
    pub fn is_pickable(&self) -> bool {
        !self.reserved && !self.is_placeholder()
    }

    fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty()
            || self.title.to_lowercase().contains(&query)
            || self.id.contains(&query)
            || self.description.to_lowercase().contains(&query)
    }
}

static PLACEHOLDER_FALLBACK: WidgetDefinition = builtin::PLACEHOLDER;

#[derive(Debug, Clone, Default)]
pub struct WidgetRegistry {
    widgets: BTreeMap<&'static str, WidgetDefinition>,
}

impl WidgetRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in widgets plus the reserved ids.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for definition in builtin::definitions() {
            registry.register(definition);
        }
        registry
    }

    /// Add or replace a definition. Returns the replaced one.
    pub fn register(&mut self, definition: WidgetDefinition) -> Option<WidgetDefinition> {
        self.widgets.insert(definition.id, definition)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&WidgetDefinition> {
        self.widgets.get(id)
    }

    /// The definition for `id`, or the placeholder for unknown ids.
    #[must_use]
    pub fn get_or_placeholder(&self, id: &str) -> &WidgetDefinition {
        self.widgets
            .get(id)
            .or_else(|| self.widgets.get(PLACEHOLDER_WIDGET_ID))
            .unwrap_or(&PLACEHOLDER_FALLBACK)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.widgets.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.widgets.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// Every definition, sorted by title.
    #[must_use]
    pub fn list(&self) -> Vec<&WidgetDefinition> {
        let mut all: Vec<&WidgetDefinition> = self.widgets.values().collect();
        all.sort_by(|a, b| a.title.cmp(b.title).then_with(|| a.id.cmp(b.id)));
        all
    }

    /// Pickable widgets, sorted by title, optionally narrowed to a category
    /// and a case-insensitive text match on title, id or description.
    #[must_use]
    pub fn catalog(&self, category: Option<WidgetCategory>, query: Option<&str>) -> Vec<&WidgetDefinition> {
        self.list()
            .into_iter()
            .filter(|d| d.is_pickable())
            .filter(|d| category.is_none_or(|c| d.category == c))
            .filter(|d| query.is_none_or(|q| d.matches(q)))
            .collect()
    }

    /// Validator options accepting exactly this registry's ids.
    #[must_use]
    pub fn validate_options(&self, mode: ValidateMode) -> ValidateOptions {
        let base = match mode {
            ValidateMode::Strict => ValidateOptions::strict(),
            ValidateMode::SafeImport => ValidateOptions::safe_import(),
        };
        base.with_known_widgets(self.ids())
    }
}
