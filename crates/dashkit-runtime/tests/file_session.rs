#![forbid(unsafe_code)]

//! End-to-end session flows against on-disk storage.

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use dashkit_model::DashboardRoute;
use dashkit_runtime::{
    DashConfig, FileStorage, Mode, SessionConfig, WorkspaceSession, WorkspaceSource,
    WorkspaceStore,
};
use dashkit_widgets::WidgetRegistry;

fn open_at(dir: &TempDir) -> WorkspaceSession {
    let store = WorkspaceStore::new(Box::new(FileStorage::new(dir.path().join("state.json"))));
    WorkspaceSession::open(
        store,
        WidgetRegistry::builtin(),
        SessionConfig::default(),
        &DashboardRoute::default(),
    )
}

#[test]
fn applied_edits_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let mut session = open_at(&dir);
    session.pick_template("execution").unwrap();
    session.begin_edit().unwrap();
    let added = session.add_widget_panel("quick-nav").unwrap();
    session.apply().unwrap();
    let committed = session.committed().cloned().unwrap();
    drop(session);

    let reopened = open_at(&dir);
    assert_eq!(reopened.source(), WorkspaceSource::Committed);
    assert_eq!(reopened.mode(), Mode::View);
    assert_eq!(reopened.committed(), Some(&committed));
    assert!(reopened.active_page().unwrap().panel(&added).is_some());
}

#[test]
fn unapplied_draft_is_recovered_on_reopen() {
    let dir = TempDir::new().unwrap();
    let mut session = open_at(&dir);
    session.pick_template("incident").unwrap();
    session.begin_edit().unwrap();
    session.add_placeholder_panel().unwrap();
    let draft = session.draft().cloned().unwrap();
    drop(session);

    let mut reopened = open_at(&dir);
    assert_eq!(reopened.source(), WorkspaceSource::Draft);
    reopened.begin_edit().unwrap();
    assert_eq!(reopened.draft(), Some(&draft));
    // History does not persist across sessions.
    assert!(!reopened.can_undo());
}

#[test]
fn corrupted_state_file_starts_empty_with_warning() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("state.json"), "not json").unwrap();
    let mut session = open_at(&dir);
    assert!(session.workspace().is_none());
    assert_eq!(session.warnings().len(), 2);
    assert!(
        session
            .warnings()
            .iter()
            .all(|w| w.starts_with("Storage read failed for dashkit.workspace."))
    );

    // The next write replaces the corrupted file.
    session.pick_template("marketdata").unwrap();
    let reopened = open_at(&dir);
    assert_eq!(reopened.workspace().map(|ws| ws.name.as_str()), Some("Market Data Desk"));
}

#[test]
fn safe_import_accepts_what_strict_rejects() {
    let dir = TempDir::new().unwrap();
    let mut session = open_at(&dir);
    let raw = r#"{
        "id": "legacy",
        "name": "Legacy",
        "schemaVersion": 0,
        "pages": [{"id": "p", "layout": {"kind": "tabs", "panels": []}}]
    }"#;

    let strict = WidgetRegistry::builtin().validate_options(dashkit_model::ValidateMode::Strict);
    assert!(dashkit_model::parse_and_validate(raw, &strict).is_err());

    session.import(raw).unwrap();
    let ws = session.workspace().unwrap();
    assert_eq!(ws.default_page_id, "p");
    assert_eq!(ws.schema_version, dashkit_model::WORKSPACE_SCHEMA_VERSION);
    assert!(!session.warnings().is_empty());
}

#[test]
fn config_drives_session_grid() {
    let dir = TempDir::new().unwrap();
    let config = DashConfig::from_toml_str(&format!(
        "[grid]\ncolumns = 6\n\n[storage]\nbackend = \"file\"\npath = {:?}\n",
        dir.path().join("cfg-state.json")
    ))
    .unwrap();
    assert!(config.validate().is_empty());

    let store = WorkspaceStore::new(config.storage_backend()).with_keys(config.storage_keys());
    let session = WorkspaceSession::open(
        store,
        WidgetRegistry::builtin(),
        SessionConfig::from(&config),
        &DashboardRoute::default(),
    );
    assert_eq!(session.config().grid.columns, 6);
    assert_eq!(session.store().backend_name(), "FileStorage");
}
