#![forbid(unsafe_code)]

//! Structural validation of workspace documents.
//!
//! The validator walks a raw JSON document depth-first and builds the typed
//! [`Workspace`]. The first failure short-circuits with a dotted path such as
//! `$.pages[1].layout.panels[0].widgetId`.
//!
//! Two modes share the walk:
//!
//! | Input                        | Strict  | SafeImport                          |
//! |------------------------------|---------|-------------------------------------|
//! | unknown `widgetId`           | failure | `placeholder` + warning             |
//! | missing `dataSpec`/`viewSpec`| failure | placeholder spec                    |
//! | missing `frame`              | failure | `{grid:{x:0,y:0,w:3,h:1}}`          |
//! | unknown `layout.kind`        | failure | `grid` + warning                    |
//! | grid rect out of range       | failure | clamped into the grid + warning     |
//! | non-boolean flag             | failure | `false` + warning                   |
//!
//! A `schemaVersion` newer than this build is always the distinct
//! [`ValidationError::UnsupportedSchemaVersion`] failure, in both modes.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::migrate::{MigrationError, migrate_document};
use crate::model::{
    DataSpec, GridRect, GridSpec, Layout, LayoutKind, PLACEHOLDER_WIDGET_ID, Page, Panel,
    PanelFrame, ViewSpec, WORKSPACE_SCHEMA_VERSION, Workspace, now_timestamp,
};

/// Widget ids accepted when no registry supplies its own list.
pub const DEFAULT_WIDGET_IDS: &[&str] = &[
    "system-status",
    "bots-overview",
    "degraded-components",
    "quick-nav",
    "markets-overview",
    "commands-summary",
    "incident-feed",
    PLACEHOLDER_WIDGET_ID,
];

/// Frame given to panels that arrive without one in safe-import mode.
const SAFE_IMPORT_RECT: GridRect = GridRect::new(0, 0, 3, 1);

// =========================================================================
// Options / results
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidateMode {
    /// Reject anything malformed.
    #[default]
    Strict,
    /// Coerce recoverable problems and record warnings.
    SafeImport,
}

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub mode: ValidateMode,
    pub known_widgets: BTreeSet<String>,
    /// Grid used to range-check frames on pages without a `gridSpec`.
    pub grid_defaults: GridSpec,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            mode: ValidateMode::Strict,
            known_widgets: DEFAULT_WIDGET_IDS.iter().map(|id| (*id).to_owned()).collect(),
            grid_defaults: GridSpec::default(),
        }
    }
}

impl ValidateOptions {
    #[must_use]
    pub fn strict() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn safe_import() -> Self {
        Self {
            mode: ValidateMode::SafeImport,
            ..Self::default()
        }
    }

    /// Replace the known widget set. `placeholder` is always accepted.
    #[must_use]
    pub fn with_known_widgets<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_widgets = ids.into_iter().map(Into::into).collect();
        self.known_widgets.insert(PLACEHOLDER_WIDGET_ID.to_owned());
        self
    }

    #[must_use]
    pub fn with_grid_defaults(mut self, grid: GridSpec) -> Self {
        self.grid_defaults = grid;
        self
    }
}

/// A validated document plus the coercions that were applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub workspace: Workspace,
    pub warnings: Vec<String>,
}

// =========================================================================
// Errors
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Structural failure at a document path.
    #[error("{message} (at {path})")]
    Schema { message: String, path: String },

    #[error("unsupported workspace schema version {found} (this build supports up to {supported})")]
    UnsupportedSchemaVersion { found: u64, supported: u32 },

    /// The payload is not parseable JSON at all.
    #[error("workspace JSON is corrupted: {reason}")]
    Corrupted { reason: String },
}

impl ValidationError {
    #[must_use]
    pub fn schema(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Document path of a schema failure.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Schema { path, .. } => Some(path),
            Self::UnsupportedSchemaVersion { .. } => Some("$.schemaVersion"),
            Self::Corrupted { .. } => None,
        }
    }

    #[must_use]
    pub fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }
}

impl From<MigrationError> for ValidationError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::InvalidPayload => Self::schema("workspace must be an object", "$"),
            MigrationError::InvalidVersion { .. } => Self::schema(
                "schemaVersion must be a non-negative integer",
                "$.schemaVersion",
            ),
            MigrationError::UnsupportedSchemaVersion { found, supported } => {
                Self::UnsupportedSchemaVersion { found, supported }
            }
        }
    }
}

type Result<T> = std::result::Result<T, ValidationError>;

// =========================================================================
// Entry points
// =========================================================================

/// Validate an already-migrated document.
pub fn validate_workspace(input: &Value, options: &ValidateOptions) -> Result<Validated> {
    let mut walker = Walker::new(options);
    let workspace = walker.workspace(input)?;
    Ok(Validated {
        workspace,
        warnings: walker.warnings,
    })
}

/// Parse raw JSON, migrate it, then validate it. Malformed JSON is reported
/// as [`ValidationError::Corrupted`], distinct from schema failures.
pub fn parse_and_validate(raw: &str, options: &ValidateOptions) -> Result<Validated> {
    let value: Value = serde_json::from_str(raw).map_err(|err| ValidationError::Corrupted {
        reason: err.to_string(),
    })?;
    let migration = migrate_document(value)?;
    let mut validated = validate_workspace(&migration.document, options)?;
    if !migration.warnings.is_empty() {
        let mut warnings = migration.warnings;
        warnings.append(&mut validated.warnings);
        validated.warnings = warnings;
    }
    Ok(validated)
}

// =========================================================================
// Walker
// =========================================================================

/// Dotted document path, built lazily per field.
#[derive(Clone)]
struct Path(String);

impl Path {
    fn root() -> Self {
        Self("$".into())
    }

    fn key(&self, key: &str) -> Self {
        Self(format!("{}.{key}", self.0))
    }

    fn index(&self, index: usize) -> Self {
        Self(format!("{}[{index}]", self.0))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct Walker<'a> {
    options: &'a ValidateOptions,
    warnings: Vec<String>,
    now: String,
}

impl<'a> Walker<'a> {
    fn new(options: &'a ValidateOptions) -> Self {
        Self {
            options,
            warnings: Vec::new(),
            now: now_timestamp(),
        }
    }

    fn safe(&self) -> bool {
        self.options.mode == ValidateMode::SafeImport
    }

    fn warn(&mut self, path: &Path, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(path = %path, "{message}");
        self.warnings.push(format!("{message} (at {path})"));
    }

    fn fail<T>(path: &Path, message: impl Into<String>) -> Result<T> {
        Err(ValidationError::schema(message, path.0.clone()))
    }

    fn object<'v>(value: &'v Value, path: &Path, what: &str) -> Result<&'v Map<String, Value>> {
        match value.as_object() {
            Some(obj) => Ok(obj),
            None => Self::fail(path, format!("{what} must be an object")),
        }
    }

    fn required_str(obj: &Map<String, Value>, key: &str, path: &Path) -> Result<String> {
        match obj.get(key).and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => Ok(s.to_owned()),
            _ => Self::fail(&path.key(key), format!("{key} must be a non-empty string")),
        }
    }

    fn workspace(&mut self, input: &Value) -> Result<Workspace> {
        let root = Path::root();
        let obj = Self::object(input, &root, "workspace")?;

        let schema_version = self.schema_version(obj, &root)?;
        let id = Self::required_str(obj, "id", &root)?;
        let name = Self::required_str(obj, "name", &root)?;

        let pages_path = root.key("pages");
        let Some(raw_pages) = obj.get("pages").and_then(Value::as_array) else {
            return Self::fail(&pages_path, "pages must be an array");
        };
        if raw_pages.is_empty() {
            return Self::fail(&pages_path, "pages must not be empty");
        }

        let mut pages = Vec::with_capacity(raw_pages.len());
        let mut seen = HashSet::new();
        for (index, raw) in raw_pages.iter().enumerate() {
            let path = pages_path.index(index);
            let page = self.page(raw, &path)?;
            if !seen.insert(page.id.clone()) {
                return Self::fail(&path.key("id"), format!("duplicate page id '{}'", page.id));
            }
            pages.push(page);
        }

        let default_page_id = match obj.get("defaultPageId").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => s.to_owned(),
            _ if self.safe() => {
                let first = pages[0].id.clone();
                self.warn(
                    &root.key("defaultPageId"),
                    format!("Missing defaultPageId; using '{first}'"),
                );
                first
            }
            _ => {
                return Self::fail(
                    &root.key("defaultPageId"),
                    "defaultPageId must be a non-empty string",
                );
            }
        };

        let created_at = self.timestamp(obj, "createdAt", &root)?;
        let updated_at = self.timestamp(obj, "updatedAt", &root)?;

        Ok(Workspace {
            id,
            name,
            pages,
            default_page_id,
            created_at,
            updated_at,
            schema_version,
        })
    }

    fn schema_version(&mut self, obj: &Map<String, Value>, root: &Path) -> Result<u32> {
        let path = root.key("schemaVersion");
        let Some(raw) = obj.get("schemaVersion") else {
            return Self::fail(&path, "schemaVersion is required");
        };
        let Some(found) = raw.as_u64() else {
            return Self::fail(&path, "schemaVersion must be a non-negative integer");
        };
        if found > u64::from(WORKSPACE_SCHEMA_VERSION) {
            return Err(ValidationError::UnsupportedSchemaVersion {
                found,
                supported: WORKSPACE_SCHEMA_VERSION,
            });
        }
        // Bounded by the check above.
        Ok(found as u32)
    }

    fn timestamp(&mut self, obj: &Map<String, Value>, key: &str, path: &Path) -> Result<String> {
        match obj.get(key) {
            None | Some(Value::Null) => Ok(self.now.clone()),
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(_) if self.safe() => {
                self.warn(&path.key(key), format!("Invalid {key} reset to now"));
                Ok(self.now.clone())
            }
            Some(_) => Self::fail(&path.key(key), format!("{key} must be a timestamp string")),
        }
    }

    fn page(&mut self, raw: &Value, path: &Path) -> Result<Page> {
        let obj = Self::object(raw, path, "page")?;
        let id = Self::required_str(obj, "id", path)?;
        let title = match obj.get("title").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => s.to_owned(),
            _ if self.safe() => {
                self.warn(&path.key("title"), format!("Missing page title; using '{id}'"));
                id.clone()
            }
            _ => return Self::fail(&path.key("title"), "title must be a non-empty string"),
        };
        let layout_path = path.key("layout");
        let Some(raw_layout) = obj.get("layout") else {
            return Self::fail(&layout_path, "layout is required");
        };
        let layout = self.layout(raw_layout, &layout_path)?;
        Ok(Page { id, title, layout })
    }

    fn layout(&mut self, raw: &Value, path: &Path) -> Result<Layout> {
        let obj = Self::object(raw, path, "layout")?;

        let kind_path = path.key("kind");
        let kind = match obj.get("kind").and_then(Value::as_str) {
            Some(raw_kind) => match LayoutKind::parse(raw_kind) {
                Some(kind) => kind,
                None if self.safe() => {
                    self.warn(
                        &kind_path,
                        format!("Unknown layout kind '{raw_kind}' converted to grid"),
                    );
                    LayoutKind::Grid
                }
                None => {
                    return Self::fail(&kind_path, format!("unknown layout kind '{raw_kind}'"));
                }
            },
            None if self.safe() => LayoutKind::Grid,
            None => return Self::fail(&kind_path, "kind must be one of grid, freeform, split"),
        };

        let grid_spec = self.grid_spec(obj, path)?;
        let columns = grid_spec.unwrap_or(self.options.grid_defaults).columns;

        let panels_path = path.key("panels");
        let panels = match obj.get("panels") {
            Some(Value::Array(raw_panels)) => {
                let mut panels = Vec::with_capacity(raw_panels.len());
                let mut seen = HashSet::new();
                for (index, raw_panel) in raw_panels.iter().enumerate() {
                    let panel_path = panels_path.index(index);
                    let panel = self.panel(raw_panel, &panel_path, columns)?;
                    if !seen.insert(panel.id.clone()) {
                        return Self::fail(
                            &panel_path.key("id"),
                            format!("duplicate panel id '{}'", panel.id),
                        );
                    }
                    panels.push(panel);
                }
                panels
            }
            None | Some(Value::Null) if self.safe() => Vec::new(),
            _ => return Self::fail(&panels_path, "panels must be an array"),
        };

        Ok(Layout {
            kind,
            panels,
            grid_spec,
            freeform_spec: passthrough(obj, "freeformSpec"),
            split_spec: passthrough(obj, "splitSpec"),
        })
    }

    fn grid_spec(&mut self, obj: &Map<String, Value>, path: &Path) -> Result<Option<GridSpec>> {
        let spec_path = path.key("gridSpec");
        let Some(raw) = obj.get("gridSpec").filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let parsed = raw.as_object().and_then(|spec| {
            let columns = u32_field(spec, "columns")?;
            let row_height = u32_field(spec, "rowHeight")?;
            let gap = u32_field(spec, "gap")?;
            (columns >= 1 && row_height >= 1).then_some(GridSpec {
                columns,
                row_height,
                gap,
            })
        });
        match parsed {
            Some(spec) => Ok(Some(spec)),
            None if self.safe() => {
                self.warn(&spec_path, "Invalid gridSpec replaced by the default grid");
                Ok(None)
            }
            None => Self::fail(
                &spec_path,
                "gridSpec needs integer columns >= 1, rowHeight >= 1 and gap >= 0",
            ),
        }
    }

    fn panel(&mut self, raw: &Value, path: &Path, columns: u32) -> Result<Panel> {
        let obj = Self::object(raw, path, "panel")?;
        let id = Self::required_str(obj, "id", path)?;

        let widget_path = path.key("widgetId");
        let raw_widget = Self::required_str(obj, "widgetId", path)?;
        let widget_id = if self.options.known_widgets.contains(&raw_widget)
            || raw_widget == PLACEHOLDER_WIDGET_ID
        {
            raw_widget
        } else if self.safe() {
            self.warn(
                &widget_path,
                format!("Unknown widget '{raw_widget}' converted to placeholder"),
            );
            PLACEHOLDER_WIDGET_ID.to_owned()
        } else {
            return Self::fail(&widget_path, format!("unknown widget '{raw_widget}'"));
        };

        let title = match obj.get("title") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) if self.safe() => {
                self.warn(&path.key("title"), "Non-string panel title dropped");
                None
            }
            Some(_) => return Self::fail(&path.key("title"), "title must be a string"),
        };

        let data_spec = match self.spec(obj, "dataSpec", path)? {
            Some(map) => DataSpec(map),
            None => DataSpec::placeholder(),
        };
        let view_spec = match self.spec(obj, "viewSpec", path)? {
            Some(map) => ViewSpec(map),
            None => ViewSpec::placeholder(),
        };
        let frame = self.frame(obj, path, columns)?;

        let locked = self.flag(obj, "locked", path)?;
        let pinned = self.flag(obj, "pinned", path)?;
        let protected = self.flag(obj, "protected", path)?;
        let created_at = self.timestamp(obj, "createdAt", path)?;
        let updated_at = self.timestamp(obj, "updatedAt", path)?;

        Ok(Panel {
            id,
            widget_id,
            title,
            data_spec,
            view_spec,
            frame,
            locked,
            pinned,
            protected,
            created_at,
            updated_at,
        })
    }

    /// `Ok(None)` means "use the placeholder" and only happens in safe mode.
    fn spec(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &Path,
    ) -> Result<Option<Map<String, Value>>> {
        match obj.get(key) {
            Some(Value::Object(map)) => Ok(Some(map.clone())),
            _ if self.safe() => Ok(None),
            None | Some(Value::Null) => Self::fail(&path.key(key), format!("{key} is required")),
            Some(_) => Self::fail(&path.key(key), format!("{key} must be an object")),
        }
    }

    fn frame(&mut self, obj: &Map<String, Value>, path: &Path, columns: u32) -> Result<PanelFrame> {
        let frame_path = path.key("frame");
        let frame = match obj.get("frame") {
            Some(Value::Object(frame)) => frame,
            _ if self.safe() => return Ok(PanelFrame::grid(SAFE_IMPORT_RECT)),
            None | Some(Value::Null) => return Self::fail(&frame_path, "frame is required"),
            Some(_) => return Self::fail(&frame_path, "frame must be an object"),
        };

        let grid_path = frame_path.key("grid");
        let grid = match frame.get("grid") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(self.grid_rect(raw, &grid_path, columns)?),
        };
        Ok(PanelFrame {
            grid,
            freeform: passthrough(frame, "freeform"),
        })
    }

    fn grid_rect(&mut self, raw: &Value, path: &Path, columns: u32) -> Result<GridRect> {
        let Some(obj) = raw.as_object() else {
            if self.safe() {
                self.warn(path, "Invalid grid frame replaced by the default frame");
                return Ok(SAFE_IMPORT_RECT);
            }
            return Self::fail(path, "grid must be an object");
        };

        let mut fields = [0u32; 4];
        for (slot, key) in fields.iter_mut().zip(["x", "y", "w", "h"]) {
            match u32_field(obj, key) {
                Some(v) => *slot = v,
                None if self.safe() => {
                    self.warn(&path.key(key), format!("Invalid frame {key} reset"));
                    *slot = match key {
                        "w" => SAFE_IMPORT_RECT.w,
                        "h" => SAFE_IMPORT_RECT.h,
                        _ => 0,
                    };
                }
                None => {
                    return Self::fail(
                        &path.key(key),
                        format!("{key} must be a non-negative integer"),
                    );
                }
            }
        }
        let rect = GridRect::new(fields[0], fields[1], fields[2], fields[3]);

        if rect.fits(columns) {
            return Ok(rect);
        }
        if self.safe() {
            let clamped = rect.clamped(columns);
            self.warn(
                path,
                format!(
                    "Frame {{x:{},y:{},w:{},h:{}}} clamped into a {columns}-column grid",
                    rect.x, rect.y, rect.w, rect.h
                ),
            );
            return Ok(clamped);
        }
        let (key, message) = if rect.w == 0 {
            ("w", "w must be >= 1".to_owned())
        } else if rect.h == 0 {
            ("h", "h must be >= 1".to_owned())
        } else {
            ("w", format!("x + w must not exceed {columns} columns"))
        };
        Self::fail(&path.key(key), message)
    }

    fn flag(&mut self, obj: &Map<String, Value>, key: &str, path: &Path) -> Result<bool> {
        match obj.get(key) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) if self.safe() => {
                self.warn(&path.key(key), format!("Non-boolean {key} reset to false"));
                Ok(false)
            }
            Some(_) => Self::fail(&path.key(key), format!("{key} must be a boolean")),
        }
    }
}

fn u32_field(obj: &Map<String, Value>, key: &str) -> Option<u32> {
    obj.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

fn passthrough(obj: &Map<String, Value>, key: &str) -> Option<Value> {
    obj.get(key).filter(|v| !v.is_null()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn panel(widget: &str) -> Value {
        json!({
            "id": "p1",
            "widgetId": widget,
            "dataSpec": {"queryKey": "status"},
            "viewSpec": {"variant": "default"},
            "frame": {"grid": {"x": 0, "y": 0, "w": 3, "h": 2}},
            "createdAt": "2024-01-01T00:00:00.000Z",
            "updatedAt": "2024-01-01T00:00:00.000Z"
        })
    }

    fn doc_with_panels(panels: Vec<Value>) -> Value {
        json!({
            "id": "ws-1",
            "name": "Ops",
            "schemaVersion": 1,
            "defaultPageId": "main",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "updatedAt": "2024-01-01T00:00:00.000Z",
            "pages": [
                {"id": "main", "title": "Main", "layout": {"kind": "grid", "panels": []}},
                {"id": "ops", "title": "Ops", "layout": {"kind": "grid", "panels": panels}}
            ]
        })
    }

    fn schema_path(err: &ValidationError) -> &str {
        err.path().unwrap_or("")
    }

    // ---- Happy path ----

    #[test]
    fn strict_accepts_well_formed_document() {
        let doc = doc_with_panels(vec![panel("system-status")]);
        let out = validate_workspace(&doc, &ValidateOptions::strict()).unwrap();
        assert!(out.warnings.is_empty());
        assert_eq!(out.workspace.pages.len(), 2);
        let p = &out.workspace.pages[1].layout.panels[0];
        assert_eq!(p.widget_id, "system-status");
        assert_eq!(p.grid_rect(), GridRect::new(0, 0, 3, 2));
    }

    #[test]
    fn typed_round_trip_is_stable() {
        let doc = doc_with_panels(vec![panel("quick-nav")]);
        let first = validate_workspace(&doc, &ValidateOptions::strict()).unwrap();
        let exported = serde_json::to_value(&first.workspace).unwrap();
        let second = validate_workspace(&exported, &ValidateOptions::strict()).unwrap();
        assert_eq!(first.workspace, second.workspace);
    }

    #[test]
    fn missing_timestamps_default_to_now() {
        let mut doc = doc_with_panels(vec![]);
        doc.as_object_mut().unwrap().remove("createdAt");
        let out = validate_workspace(&doc, &ValidateOptions::strict()).unwrap();
        assert!(!out.workspace.created_at.is_empty());
    }

    #[test]
    fn pass_through_specs_survive() {
        let mut doc = doc_with_panels(vec![]);
        doc["pages"][0]["layout"]["kind"] = json!("split");
        doc["pages"][0]["layout"]["splitSpec"] = json!({"ratio": [1, 2]});
        let out = validate_workspace(&doc, &ValidateOptions::strict()).unwrap();
        let layout = &out.workspace.pages[0].layout;
        assert_eq!(layout.kind, LayoutKind::Split);
        assert_eq!(layout.split_spec, Some(json!({"ratio": [1, 2]})));
    }

    // ---- Strict failures ----

    #[test]
    fn strict_unknown_widget_reports_path() {
        let doc = doc_with_panels(vec![panel("legacy-widget")]);
        let err = validate_workspace(&doc, &ValidateOptions::strict()).unwrap_err();
        assert_eq!(schema_path(&err), "$.pages[1].layout.panels[0].widgetId");
    }

    #[test]
    fn strict_missing_specs_fail() {
        for key in ["dataSpec", "viewSpec", "frame"] {
            let mut p = panel("system-status");
            p.as_object_mut().unwrap().remove(key);
            let err = validate_workspace(&doc_with_panels(vec![p]), &ValidateOptions::strict())
                .unwrap_err();
            assert_eq!(
                schema_path(&err),
                format!("$.pages[1].layout.panels[0].{key}")
            );
        }
    }

    #[test]
    fn strict_unknown_layout_kind_fails() {
        let mut doc = doc_with_panels(vec![]);
        doc["pages"][0]["layout"]["kind"] = json!("masonry");
        let err = validate_workspace(&doc, &ValidateOptions::strict()).unwrap_err();
        assert_eq!(schema_path(&err), "$.pages[0].layout.kind");
    }

    #[test]
    fn strict_out_of_range_frame_fails() {
        let mut p = panel("system-status");
        p["frame"]["grid"] = json!({"x": 10, "y": 0, "w": 4, "h": 1});
        let err = validate_workspace(&doc_with_panels(vec![p]), &ValidateOptions::strict())
            .unwrap_err();
        assert_eq!(
            schema_path(&err),
            "$.pages[1].layout.panels[0].frame.grid.w"
        );
    }

    #[test]
    fn strict_non_boolean_flag_fails() {
        let mut p = panel("system-status");
        p["locked"] = json!("yes");
        let err = validate_workspace(&doc_with_panels(vec![p]), &ValidateOptions::strict())
            .unwrap_err();
        assert_eq!(schema_path(&err), "$.pages[1].layout.panels[0].locked");
    }

    #[test]
    fn empty_pages_fail_in_both_modes() {
        let mut doc = doc_with_panels(vec![]);
        doc["pages"] = json!([]);
        for options in [ValidateOptions::strict(), ValidateOptions::safe_import()] {
            let err = validate_workspace(&doc, &options).unwrap_err();
            assert_eq!(schema_path(&err), "$.pages");
        }
    }

    #[test]
    fn empty_identifiers_fail() {
        let mut doc = doc_with_panels(vec![]);
        doc["name"] = json!("  ");
        let err = validate_workspace(&doc, &ValidateOptions::safe_import()).unwrap_err();
        assert_eq!(schema_path(&err), "$.name");
    }

    #[test]
    fn future_version_is_distinct_failure_in_both_modes() {
        let mut doc = doc_with_panels(vec![]);
        doc["schemaVersion"] = json!(2);
        for options in [ValidateOptions::strict(), ValidateOptions::safe_import()] {
            assert_eq!(
                validate_workspace(&doc, &options).unwrap_err(),
                ValidationError::UnsupportedSchemaVersion {
                    found: 2,
                    supported: WORKSPACE_SCHEMA_VERSION
                }
            );
        }
    }

    #[test]
    fn first_failure_short_circuits() {
        let mut bad_kind = doc_with_panels(vec![panel("nope")]);
        bad_kind["pages"][0]["layout"]["kind"] = json!("masonry");
        let err = validate_workspace(&bad_kind, &ValidateOptions::strict()).unwrap_err();
        assert_eq!(schema_path(&err), "$.pages[0].layout.kind");
    }

    #[test]
    fn duplicate_panel_ids_fail() {
        let doc = doc_with_panels(vec![panel("quick-nav"), panel("quick-nav")]);
        let err = validate_workspace(&doc, &ValidateOptions::safe_import()).unwrap_err();
        assert_eq!(schema_path(&err), "$.pages[1].layout.panels[1].id");
    }

    // ---- Safe import ----

    #[test]
    fn safe_import_coerces_unknown_widget_to_placeholder() {
        let doc = doc_with_panels(vec![panel("legacy-widget")]);
        let out = validate_workspace(&doc, &ValidateOptions::safe_import()).unwrap();
        let p = &out.workspace.pages[1].layout.panels[0];
        assert_eq!(p.widget_id, PLACEHOLDER_WIDGET_ID);
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("Unknown widget 'legacy-widget' converted to placeholder"));
    }

    #[test]
    fn safe_import_fills_missing_specs() {
        let mut p = panel("system-status");
        let obj = p.as_object_mut().unwrap();
        obj.remove("dataSpec");
        obj.remove("viewSpec");
        obj.remove("frame");
        let out = validate_workspace(&doc_with_panels(vec![p]), &ValidateOptions::safe_import())
            .unwrap();
        let p = &out.workspace.pages[1].layout.panels[0];
        assert_eq!(p.data_spec, DataSpec::placeholder());
        assert_eq!(p.view_spec, ViewSpec::placeholder());
        assert_eq!(p.frame.grid, Some(GridRect::new(0, 0, 3, 1)));
    }

    #[test]
    fn safe_import_clamps_frames_and_flags() {
        let mut p = panel("system-status");
        p["frame"]["grid"] = json!({"x": 11, "y": 2, "w": 4, "h": 0});
        p["pinned"] = json!(1);
        let out = validate_workspace(&doc_with_panels(vec![p]), &ValidateOptions::safe_import())
            .unwrap();
        let p = &out.workspace.pages[1].layout.panels[0];
        assert_eq!(p.grid_rect(), GridRect::new(8, 2, 4, 1));
        assert!(!p.pinned);
        assert_eq!(out.warnings.len(), 2);
    }

    #[test]
    fn safe_import_unknown_kind_becomes_grid() {
        let mut doc = doc_with_panels(vec![]);
        doc["pages"][0]["layout"]["kind"] = json!("masonry");
        let out = validate_workspace(&doc, &ValidateOptions::safe_import()).unwrap();
        assert_eq!(out.workspace.pages[0].layout.kind, LayoutKind::Grid);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn custom_known_widget_set_is_respected() {
        let doc = doc_with_panels(vec![panel("heatmap")]);
        let options = ValidateOptions::strict().with_known_widgets(["heatmap"]);
        assert!(validate_workspace(&doc, &options).is_ok());
        let err = validate_workspace(
            &doc_with_panels(vec![panel("system-status")]),
            &options,
        )
        .unwrap_err();
        assert_eq!(schema_path(&err), "$.pages[1].layout.panels[0].widgetId");
    }

    #[test]
    fn grid_spec_narrows_frame_check() {
        let mut doc = doc_with_panels(vec![panel("system-status")]);
        doc["pages"][1]["layout"]["gridSpec"] = json!({"columns": 2, "rowHeight": 60, "gap": 8});
        let err = validate_workspace(&doc, &ValidateOptions::strict()).unwrap_err();
        assert_eq!(
            schema_path(&err),
            "$.pages[1].layout.panels[0].frame.grid.w"
        );
    }

    // ---- parse_and_validate ----

    #[test]
    fn malformed_json_is_corrupted_not_schema() {
        let err = parse_and_validate("{not json", &ValidateOptions::safe_import()).unwrap_err();
        assert!(err.is_corrupted());
        assert_eq!(err.path(), None);
    }

    #[test]
    fn parse_and_validate_migrates_first() {
        let mut doc = doc_with_panels(vec![]);
        doc.as_object_mut().unwrap().remove("schemaVersion");
        let out = parse_and_validate(&doc.to_string(), &ValidateOptions::strict()).unwrap();
        assert_eq!(out.workspace.schema_version, WORKSPACE_SCHEMA_VERSION);
        assert_eq!(out.warnings[0], "Migrated workspace schema 0 -> 1");
    }

    #[test]
    fn snake_case_current_version_validates() {
        let mut doc = doc_with_panels(vec![]);
        let obj = doc.as_object_mut().unwrap();
        obj.remove("schemaVersion");
        obj.insert("schema_version".into(), json!(1));
        for options in [ValidateOptions::strict(), ValidateOptions::safe_import()] {
            let out = parse_and_validate(&doc.to_string(), &options).unwrap();
            assert_eq!(out.workspace.schema_version, WORKSPACE_SCHEMA_VERSION);
            assert!(out.warnings.is_empty());
        }
    }

    #[test]
    fn non_object_payload_is_schema_failure_at_root() {
        let err = parse_and_validate("[]", &ValidateOptions::strict()).unwrap_err();
        assert_eq!(err.path(), Some("$"));
    }
}
