#![forbid(unsafe_code)]

//! Workspace session: the edit/apply/cancel workflow around one workspace.
//!
//! A session owns the committed document, a mutable draft, the undo history
//! and the route state (active page, focus, filters). Every draft mutation
//! goes through [`WorkspaceSession::patch_draft`], which snapshots the
//! previous draft into history, applies the change to a clone, and flushes
//! the result to the draft slot.
//!
//! ```text
//!            begin_edit                 apply
//!   View ───────────────▶ Edit ───────────────────▶ View
//!    ▲                     │  patch_draft / undo      (draft → committed,
//!    │        cancel       │  redo                     history cleared)
//!    └─────────────────────┘
//!      (draft ← committed, history cleared)
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use dashkit_layout::{
    Arrangement, FrameChange, GridMetrics, GridSize, arrange, find_free_slot,
};
use dashkit_model::{
    DashboardRoute, GlobalFilters, GridRect, GridSpec, PLACEHOLDER_WIDGET_ID, Page, Panel,
    ValidateMode, ValidationError, ViewSpec, Workspace, new_id, parse_and_validate,
};
use dashkit_widgets::WidgetRegistry;
use thiserror::Error;

use crate::config::DashConfig;
use crate::history::{EditHistory, HistoryConfig};
use crate::persistence::{StorageError, WorkspaceSource, WorkspaceStore};
use crate::templates;

/// Size of panels added through [`WorkspaceSession::add_placeholder_panel`].
pub const PLACEHOLDER_SIZE: GridSize = GridSize::new(3, 1);

const NEW_PANEL_TITLE: &str = "New Panel";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no workspace loaded; pick a template or import a file")]
    NoWorkspace,

    #[error("workspace is not in edit mode")]
    NotEditing,

    #[error("panel '{0}' not found")]
    PanelNotFound(String),

    #[error("page '{0}' not found")]
    PageNotFound(String),

    #[error("panel '{0}' is locked")]
    PanelLocked(String),

    #[error("panel '{0}' is protected; confirm to remove it")]
    ConfirmationRequired(String),

    #[error("widget '{0}' is not available")]
    UnknownWidget(String),

    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    /// The workspace was left unchanged.
    #[error("import failed: {0}")]
    Import(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to serialize workspace: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SessionError {
    /// Document path of an import failure, when the validator reported one.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Import(err) => err.path(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

// ============================================================================
// Configuration / values
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionConfig {
    pub history: HistoryConfig,
    /// Grid used for pages that carry no `gridSpec`.
    pub grid: GridSpec,
}

impl From<&DashConfig> for SessionConfig {
    fn from(config: &DashConfig) -> Self {
        Self {
            history: config.history_config(),
            grid: config.grid_spec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    View,
    Edit,
}

impl Mode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pretty-printed workspace ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub contents: String,
}

impl ExportFile {
    /// Write into `dir`, returning the full path.
    pub fn write_into(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.contents)?;
        Ok(path)
    }
}

/// `dashboard-workspace-<id>.json`, with path separators and other unsafe
/// characters in the id replaced by `_`.
#[must_use]
pub fn export_file_name(workspace_id: &str) -> String {
    let safe: String = workspace_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("dashboard-workspace-{safe}.json")
}

// ============================================================================
// Session
// ============================================================================

pub struct WorkspaceSession {
    store: WorkspaceStore,
    registry: WidgetRegistry,
    config: SessionConfig,
    committed: Option<Workspace>,
    draft: Option<Workspace>,
    source: WorkspaceSource,
    mode: Mode,
    history: EditHistory<Workspace>,
    active_page_id: Option<String>,
    focus: bool,
    filters: GlobalFilters,
    warnings: Vec<String>,
}

impl fmt::Debug for WorkspaceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceSession")
            .field("store", &self.store)
            .field("mode", &self.mode)
            .field("source", &self.source)
            .field("workspace", &self.workspace().map(|ws| ws.id.as_str()))
            .field("active_page_id", &self.active_page_id)
            .field("history", &self.history)
            .field("warnings", &self.warnings.len())
            .finish()
    }
}

impl WorkspaceSession {
    /// Load committed + draft + preferences and apply route state on top.
    ///
    /// Slots are validated against `registry` in safe-import mode. Route
    /// filters override stored preferences and the merged result is written
    /// back. When only a draft survived, the session opens in edit mode so
    /// the draft stays reachable.
    pub fn open(
        store: WorkspaceStore,
        registry: WidgetRegistry,
        config: SessionConfig,
        route: &DashboardRoute,
    ) -> Self {
        let options = registry
            .validate_options(ValidateMode::SafeImport)
            .with_grid_defaults(config.grid);
        let store = store.with_validate_options(options);

        let reconciled = store.load();
        let warnings = reconciled
            .warnings
            .iter()
            .map(|w| w.message.clone())
            .collect();
        let committed = reconciled.committed;
        let draft = reconciled.workspace;
        let mode = if committed.is_none() && draft.is_some() {
            Mode::Edit
        } else {
            Mode::View
        };

        let filters = store.load_preferences().merged_with(&route.filters);
        if let Err(err) = store.save_preferences(&filters) {
            tracing::warn!(error = %err, "failed to persist merged filters");
        }

        let active_page_id = route.page_id.clone().or_else(|| {
            committed
                .as_ref()
                .or(draft.as_ref())
                .map(|ws| ws.default_page_id.clone())
        });

        tracing::debug!(
            source = ?reconciled.source,
            mode = %mode,
            page = ?active_page_id,
            "session opened"
        );

        Self {
            store,
            registry,
            history: EditHistory::new(config.history),
            config,
            committed,
            draft,
            source: reconciled.source,
            mode,
            active_page_id,
            focus: route.focus,
            filters,
            warnings,
        }
    }

    // ---- Accessors ----

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Which slot the working copy came from when the session opened.
    #[must_use]
    pub fn source(&self) -> WorkspaceSource {
        self.source
    }

    /// The draft in edit mode, the committed document in view mode.
    #[must_use]
    pub fn workspace(&self) -> Option<&Workspace> {
        match self.mode {
            Mode::Edit => self.draft.as_ref(),
            Mode::View => self.committed.as_ref(),
        }
    }

    #[must_use]
    pub fn committed(&self) -> Option<&Workspace> {
        self.committed.as_ref()
    }

    #[must_use]
    pub fn draft(&self) -> Option<&Workspace> {
        self.draft.as_ref()
    }

    /// The routed page, falling back to the default page.
    #[must_use]
    pub fn active_page(&self) -> Option<&Page> {
        self.workspace()?
            .resolve_page(self.active_page_id.as_deref())
    }

    #[must_use]
    pub fn focus(&self) -> bool {
        self.focus
    }

    #[must_use]
    pub fn filters(&self) -> &GlobalFilters {
        &self.filters
    }

    #[must_use]
    pub fn registry(&self) -> &WidgetRegistry {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> SessionConfig {
        self.config
    }

    /// Load, import and storage warnings accumulated so far.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.mode == Mode::Edit && self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.mode == Mode::Edit && self.history.can_redo()
    }

    /// Current route state, with the page resolved to the one displayed.
    #[must_use]
    pub fn route(&self) -> DashboardRoute {
        DashboardRoute {
            page_id: self.active_page().map(|page| page.id.clone()),
            focus: self.focus,
            filters: self.filters.clone(),
        }
    }

    /// Lay out the active page for a container `container_width` pixels wide.
    #[must_use]
    pub fn arrangement(&self, container_width: f64) -> Option<Arrangement> {
        let page = self.active_page()?;
        let metrics = GridMetrics::new(page.layout.grid_spec_or(self.config.grid), container_width);
        Some(arrange(&page.layout.panels, &metrics))
    }

    // ---- Navigation ----

    pub fn set_active_page(&mut self, page_id: &str) -> Result<()> {
        let workspace = self.workspace().ok_or(SessionError::NoWorkspace)?;
        if workspace.page(page_id).is_none() {
            return Err(SessionError::PageNotFound(page_id.to_owned()));
        }
        self.active_page_id = Some(page_id.to_owned());
        Ok(())
    }

    pub fn set_focus(&mut self, focus: bool) {
        self.focus = focus;
    }

    /// Replace the global filters and persist them as preferences.
    pub fn set_filters(&mut self, filters: GlobalFilters) -> Result<()> {
        self.filters = filters;
        self.store.save_preferences(&self.filters)?;
        Ok(())
    }

    // ---- Mode ----

    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        match mode {
            Mode::Edit => self.begin_edit(),
            Mode::View => {
                self.mode = Mode::View;
                Ok(())
            }
        }
    }

    /// Enter edit mode, seeding the draft from the committed document when no
    /// draft exists yet.
    pub fn begin_edit(&mut self) -> Result<()> {
        if self.draft.is_none() {
            self.draft = Some(self.committed.clone().ok_or(SessionError::NoWorkspace)?);
        }
        self.mode = Mode::Edit;
        Ok(())
    }

    /// Promote the draft to committed and return to view mode.
    pub fn apply(&mut self) -> Result<()> {
        self.require_edit()?;
        let draft = self.draft.as_ref().ok_or(SessionError::NoWorkspace)?;
        let committed = self.store.commit(draft)?;
        self.draft = Some(committed.clone());
        self.committed = Some(committed);
        self.mode = Mode::View;
        self.history.clear();
        Ok(())
    }

    /// Discard the draft back to the committed document.
    pub fn cancel(&mut self) -> Result<()> {
        self.require_edit()?;
        self.draft = self.committed.clone();
        if let Err(err) = self.store.clear_draft() {
            tracing::warn!(error = %err, "failed to clear draft slot on cancel");
            self.warnings.push(format!("Failed to clear draft: {err}"));
        }
        self.mode = Mode::View;
        self.history.clear();
        Ok(())
    }

    // ---- Templates / import / export ----

    /// Replace the workspace with a built-in template, committed immediately.
    pub fn pick_template(&mut self, template_id: &str) -> Result<()> {
        let template = templates::find(template_id)
            .ok_or_else(|| SessionError::UnknownTemplate(template_id.to_owned()))?;
        let validated = template.instantiate(self.store.validate_options())?;
        tracing::info!(template = template.id, "picked template");
        self.install(validated.workspace, validated.warnings)
    }

    /// Safe-import `raw`. On failure nothing changes; on success the imported
    /// document replaces both draft and committed and its coercion warnings
    /// are appended.
    pub fn import(&mut self, raw: &str) -> Result<()> {
        let validated = parse_and_validate(raw, self.store.validate_options())?;
        tracing::info!(
            workspace = %validated.workspace.id,
            warnings = validated.warnings.len(),
            "imported workspace"
        );
        self.install(validated.workspace, validated.warnings)
    }

    fn install(&mut self, workspace: Workspace, warnings: Vec<String>) -> Result<()> {
        let committed = self.store.commit(&workspace)?;
        self.active_page_id = committed.default_page().map(|page| page.id.clone());
        self.draft = Some(committed.clone());
        self.committed = Some(committed);
        self.history.clear();
        self.warnings.extend(warnings);
        Ok(())
    }

    /// The displayed workspace as pretty JSON.
    pub fn export(&self) -> Result<ExportFile> {
        let workspace = self.workspace().ok_or(SessionError::NoWorkspace)?;
        Ok(ExportFile {
            file_name: export_file_name(&workspace.id),
            contents: serde_json::to_string_pretty(workspace)?,
        })
    }

    // ---- Draft mutation ----

    /// The only way the draft changes. Runs `mutator` on a clone; if it
    /// succeeds the previous draft is pushed to history, the clone becomes the
    /// draft (with `updatedAt` refreshed) and is flushed to storage. A failing
    /// mutator leaves everything untouched.
    pub fn patch_draft<R, F>(&mut self, mutator: F) -> Result<R>
    where
        F: FnOnce(&mut Workspace) -> Result<R>,
    {
        self.require_edit()?;
        let current = self.draft.as_ref().ok_or(SessionError::NoWorkspace)?;
        let mut next = current.clone();
        let out = mutator(&mut next)?;
        next.touch();
        self.history.push(current);
        self.draft = Some(next);
        self.flush_draft();
        Ok(out)
    }

    /// Add `widget_id` at its default size in the first free slot of the
    /// active page. Returns the new panel id.
    pub fn add_widget_panel(&mut self, widget_id: &str) -> Result<String> {
        let page_id = self.edit_page()?.id.clone();
        let definition = self
            .registry
            .get(widget_id)
            .filter(|d| d.is_pickable())
            .copied()
            .ok_or_else(|| SessionError::UnknownWidget(widget_id.to_owned()))?;
        let grid = self.config.grid;

        self.patch_draft(|ws| {
            let page = page_mut(ws, &page_id)?;
            let columns = page.layout.grid_spec_or(grid).columns;
            let rect = first_fit(page, columns, definition.default_grid);
            let panel = Panel::new(new_id("panel"), definition.id, rect).with_title(definition.title);
            tracing::debug!(panel_id = %panel.id, widget_id = definition.id, ?rect, "added panel");
            let id = panel.id.clone();
            page.layout.panels.push(panel);
            Ok(id)
        })
    }

    /// Add an empty placeholder slot in the first free 3×1 position.
    pub fn add_placeholder_panel(&mut self) -> Result<String> {
        let page_id = self.edit_page()?.id.clone();
        let grid = self.config.grid;

        self.patch_draft(|ws| {
            let page = page_mut(ws, &page_id)?;
            let columns = page.layout.grid_spec_or(grid).columns;
            let rect = first_fit(page, columns, PLACEHOLDER_SIZE);
            let mut panel =
                Panel::new(new_id("panel"), PLACEHOLDER_WIDGET_ID, rect).with_title(NEW_PANEL_TITLE);
            panel.view_spec = ViewSpec::placeholder();
            let id = panel.id.clone();
            page.layout.panels.push(panel);
            Ok(id)
        })
    }

    /// Remove a panel. Protected panels need `confirmed`.
    pub fn remove_panel(&mut self, panel_id: &str, confirmed: bool) -> Result<Panel> {
        let page_id = self.edit_page()?.id.clone();
        self.patch_draft(|ws| {
            let page = page_mut(ws, &page_id)?;
            let index = page
                .panel_index(panel_id)
                .ok_or_else(|| SessionError::PanelNotFound(panel_id.to_owned()))?;
            if page.layout.panels[index].protected && !confirmed {
                return Err(SessionError::ConfirmationRequired(panel_id.to_owned()));
            }
            Ok(page.layout.panels.remove(index))
        })
    }

    /// Copy a panel (same widget, specs and size) into the first free slot.
    pub fn duplicate_panel(&mut self, panel_id: &str) -> Result<String> {
        let page_id = self.edit_page()?.id.clone();
        let grid = self.config.grid;
        self.patch_draft(|ws| {
            let page = page_mut(ws, &page_id)?;
            let mut copy = page
                .panel(panel_id)
                .cloned()
                .ok_or_else(|| SessionError::PanelNotFound(panel_id.to_owned()))?;
            let columns = page.layout.grid_spec_or(grid).columns;
            let source = copy.grid_rect();
            copy.id = new_id("panel");
            copy.frame.grid = Some(first_fit(page, columns, GridSize::new(source.w, source.h)));
            copy.created_at = dashkit_model::now_timestamp();
            copy.updated_at = copy.created_at.clone();
            let id = copy.id.clone();
            page.layout.panels.push(copy);
            Ok(id)
        })
    }

    /// Move `source_id` to `target_id`'s position in document order.
    pub fn reorder_panels(&mut self, source_id: &str, target_id: &str) -> Result<()> {
        let page = self.edit_page()?;
        for id in [source_id, target_id] {
            if page.panel(id).is_none() {
                return Err(SessionError::PanelNotFound(id.to_owned()));
            }
        }
        if source_id == target_id {
            return Ok(());
        }
        let page_id = page.id.clone();
        self.patch_draft(|ws| {
            let panels = &mut page_mut(ws, &page_id)?.layout.panels;
            let from = position(panels, source_id)?;
            let item = panels.remove(from);
            let to = position(panels, target_id)?;
            // Dropping onto a later panel lands after it, matching the
            // remove-then-insert index shift.
            let to = if from <= to { to + 1 } else { to };
            panels.insert(to, item);
            Ok(())
        })
    }

    /// Grow or shrink a panel's width, clamped to `[1, columns - x]`.
    /// Returns the resulting width; a clamped no-op records no history.
    pub fn resize_panel_width(&mut self, panel_id: &str, delta: i32) -> Result<u32> {
        let page = self.edit_page()?;
        let panel = page
            .panel(panel_id)
            .ok_or_else(|| SessionError::PanelNotFound(panel_id.to_owned()))?;
        if panel.locked {
            return Err(SessionError::PanelLocked(panel_id.to_owned()));
        }
        let columns = page.layout.grid_spec_or(self.config.grid).columns;
        let current = panel.grid_rect();
        let max_w = i64::from(columns.saturating_sub(current.x).max(1));
        let target = (i64::from(current.w) + i64::from(delta)).clamp(1, max_w);
        let w = u32::try_from(target).unwrap_or(current.w);
        if panel.frame.grid.is_some() && w == current.w {
            return Ok(w);
        }
        self.set_panel_frame(panel_id, GridRect { w, ..current })
            .map(|rect| rect.w)
    }

    /// Gesture sink: move/resize a panel to `rect` (clamped into the grid).
    /// Locked panels are rejected.
    pub fn set_panel_frame(&mut self, panel_id: &str, rect: GridRect) -> Result<GridRect> {
        let page = self.edit_page()?;
        let panel = page
            .panel(panel_id)
            .ok_or_else(|| SessionError::PanelNotFound(panel_id.to_owned()))?;
        if panel.locked {
            return Err(SessionError::PanelLocked(panel_id.to_owned()));
        }
        let columns = page.layout.grid_spec_or(self.config.grid).columns;
        let rect = rect.clamped(columns);
        if panel.frame.grid == Some(rect) {
            return Ok(rect);
        }
        let page_id = page.id.clone();
        self.patch_draft(|ws| {
            let panel = panel_mut(page_mut(ws, &page_id)?, panel_id)?;
            panel.frame.grid = Some(rect);
            panel.touch();
            Ok(())
        })?;
        tracing::debug!(panel_id, ?rect, "panel frame set");
        Ok(rect)
    }

    /// Apply a committed drag/resize from the gesture machine.
    pub fn apply_frame_change(&mut self, change: &FrameChange) -> Result<GridRect> {
        self.set_panel_frame(&change.panel_id, change.rect)
    }

    /// Returns the new `locked` value.
    pub fn toggle_lock(&mut self, panel_id: &str) -> Result<bool> {
        self.toggle_flag(panel_id, locked_flag)
    }

    /// Returns the new `pinned` value.
    pub fn toggle_pin(&mut self, panel_id: &str) -> Result<bool> {
        self.toggle_flag(panel_id, pinned_flag)
    }

    /// Returns the new `protected` value.
    pub fn toggle_protect(&mut self, panel_id: &str) -> Result<bool> {
        self.toggle_flag(panel_id, protected_flag)
    }

    fn toggle_flag(&mut self, panel_id: &str, flag: fn(&mut Panel) -> &mut bool) -> Result<bool> {
        let page_id = self.edit_page()?.id.clone();
        self.patch_draft(|ws| {
            let panel = panel_mut(page_mut(ws, &page_id)?, panel_id)?;
            let value = flag(panel);
            *value = !*value;
            let value = *value;
            panel.touch();
            Ok(value)
        })
    }

    // ---- History ----

    /// Step the draft back one edit. `Ok(false)` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        self.require_edit()?;
        let current = self.draft.as_ref().ok_or(SessionError::NoWorkspace)?;
        let Some(previous) = self.history.undo(current) else {
            return Ok(false);
        };
        self.draft = Some(previous);
        self.flush_draft();
        Ok(true)
    }

    /// Re-apply an undone edit. `Ok(false)` when there is nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        self.require_edit()?;
        let current = self.draft.as_ref().ok_or(SessionError::NoWorkspace)?;
        let Some(next) = self.history.redo(current) else {
            return Ok(false);
        };
        self.draft = Some(next);
        self.flush_draft();
        Ok(true)
    }

    // ---- Internals ----

    fn require_edit(&self) -> Result<()> {
        if self.mode == Mode::Edit {
            Ok(())
        } else {
            Err(SessionError::NotEditing)
        }
    }

    /// The active page of the draft, in edit mode only.
    fn edit_page(&self) -> Result<&Page> {
        self.require_edit()?;
        let draft = self.draft.as_ref().ok_or(SessionError::NoWorkspace)?;
        draft
            .resolve_page(self.active_page_id.as_deref())
            .ok_or(SessionError::NoWorkspace)
    }

    fn flush_draft(&mut self) {
        let Some(draft) = &self.draft else {
            return;
        };
        if let Err(err) = self.store.save_draft(draft) {
            tracing::warn!(error = %err, "failed to save draft");
            self.warnings.push(format!("Failed to save draft: {err}"));
        }
    }
}

fn page_mut<'a>(ws: &'a mut Workspace, page_id: &str) -> Result<&'a mut Page> {
    ws.page_mut(page_id)
        .ok_or_else(|| SessionError::PageNotFound(page_id.to_owned()))
}

fn panel_mut<'a>(page: &'a mut Page, panel_id: &str) -> Result<&'a mut Panel> {
    page.panel_mut(panel_id)
        .ok_or_else(|| SessionError::PanelNotFound(panel_id.to_owned()))
}

fn position(panels: &[Panel], panel_id: &str) -> Result<usize> {
    panels
        .iter()
        .position(|p| p.id == panel_id)
        .ok_or_else(|| SessionError::PanelNotFound(panel_id.to_owned()))
}

fn first_fit(page: &Page, columns: u32, size: GridSize) -> GridRect {
    let existing: Vec<GridRect> = page.layout.panels.iter().map(Panel::grid_rect).collect();
    find_free_slot(columns, size, &existing)
}

fn locked_flag(panel: &mut Panel) -> &mut bool {
    &mut panel.locked
}

fn pinned_flag(panel: &mut Panel) -> &mut bool {
    &mut panel.pinned
}

fn protected_flag(panel: &mut Panel) -> &mut bool {
    &mut panel.protected
}
