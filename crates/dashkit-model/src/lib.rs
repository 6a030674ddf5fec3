#![forbid(unsafe_code)]

//! Workspace document model for dashkit.
//!
//! A [`Workspace`] is a versioned JSON document: pages of grid-placed panels,
//! each panel naming a widget plus opaque data/view specs. This crate owns the
//! typed model, the forward-only [`migrate`] chain, the [`schema`] validator
//! (strict and safe-import modes), and the small value types shared with the
//! layout and widget crates ([`filters`], [`route`]).
//!
//! ```
//! use dashkit_model::schema::{ValidateOptions, validate_workspace};
//! use serde_json::json;
//!
//! let doc = json!({
//!     "id": "ws-1",
//!     "name": "Ops",
//!     "schemaVersion": 1,
//!     "defaultPageId": "main",
//!     "pages": [{
//!         "id": "main",
//!         "title": "Main",
//!         "layout": {"kind": "grid", "panels": []}
//!     }]
//! });
//! let validated = validate_workspace(&doc, &ValidateOptions::strict()).unwrap();
//! assert_eq!(validated.workspace.default_page().map(|p| p.id.as_str()), Some("main"));
//! ```

pub mod filters;
pub mod migrate;
pub mod model;
pub mod route;
pub mod schema;

pub use filters::{GlobalFilters, TimeRange};
pub use migrate::{Migration, MigrationError, migrate_document, needs_migration};
pub use model::{
    DEFAULT_PANEL_RECT, DataSpec, GridRect, GridSpec, Layout, LayoutKind, PLACEHOLDER_WIDGET_ID,
    Page, Panel, PanelFrame, ViewSpec, WORKSPACE_SCHEMA_VERSION, Workspace, new_id, now_timestamp,
};
pub use route::DashboardRoute;
pub use schema::{
    DEFAULT_WIDGET_IDS, ValidateMode, ValidateOptions, Validated, ValidationError,
    parse_and_validate, validate_workspace,
};
