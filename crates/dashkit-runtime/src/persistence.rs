#![forbid(unsafe_code)]

//! Draft/commit persistence for workspaces.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     WorkspaceStore                        │
//! │   - draft / committed / preferences slots                 │
//! │   - Migrate → Validate(safe-import) on every read         │
//! │   - never fails a read: problems become StorageWarnings   │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                     StorageBackend                        │
//! │   - MemoryStorage: in-memory (tests, ephemeral sessions)  │
//! │   - FileStorage: one JSON object of key → string          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Slot holds malformed JSON | `None` + "Corrupted JSON in {key}; reset to defaults." |
//! | Slot fails validation or has a newer schema | `None` + "Validation failed for {key}: …" |
//! | Backend read error | `None` + "Storage read failed for {key}: …" |
//! | Committed write fails | `Err`, draft slot untouched |
//! | Draft removal after commit fails | logged; the stale draft loses on next reconcile |

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::DateTime;
use dashkit_model::{
    GlobalFilters, ValidateOptions, ValidationError, WORKSPACE_SCHEMA_VERSION, Workspace,
    parse_and_validate,
};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing store exists but cannot be read as a key/value map.
    #[error("storage corruption: {0}")]
    Corruption(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// ─────────────────────────────────────────────────────────────────────────────
// Backend trait
// ─────────────────────────────────────────────────────────────────────────────

/// String key/value store the workspace slots live in.
///
/// Implementations must be `Send + Sync`; the store may be shared with a
/// background flusher.
pub trait StorageBackend: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// `Ok(None)` when the key has never been written.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Overwrite `key`. Last write wins.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key`; removing a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;

    fn is_available(&self) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory storage
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory backend. Contents are lost when dropped.
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated storage, handy for seeding corrupted slots in tests.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            data: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().map(|g| g.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "MemoryStorage"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let guard = self
            .data
            .read()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        guard.remove(key);
        Ok(())
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("entries", &self.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File storage
// ─────────────────────────────────────────────────────────────────────────────

/// Single JSON document of `key → string`, rewritten atomically on every
/// mutation.
///
/// ```json
/// {
///   "dashkit.workspace.committed.v1": "{\"id\":\"ws-1\",…}",
///   "dashkit.prefs.v1": "{\"venue\":\"\",…}"
/// }
/// ```
///
/// Writes go to `{path}.tmp`, are flushed and synced, then renamed over
/// `{path}`.
pub struct FileStorage {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// The file does not need to exist; it is created on first write.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// `$XDG_STATE_HOME/dashkit/workspace.json`, falling back to
    /// `~/.local/state` and finally the current directory.
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(state_dir().join("dashkit").join("workspace.json"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    fn read_map(&self) -> StorageResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            StorageError::Corruption(format!("{} is not a key/value map: {e}", self.path.display()))
        })
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.temp_path();
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, map)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(path = %self.path.display(), entries = map.len(), "saved storage file");
        Ok(())
    }

    /// Read-modify-write under the process-local lock. A corrupted file is
    /// replaced rather than blocking every future write.
    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> StorageResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = match self.read_map() {
            Ok(map) => map,
            Err(StorageError::Corruption(reason)) => {
                tracing::warn!(path = %self.path.display(), %reason, "replacing corrupted storage file");
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };
        apply(&mut map);
        self.write_map(&map)
    }
}

fn state_dir() -> PathBuf {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("state");
    }
    PathBuf::from(".")
}

impl StorageBackend for FileStorage {
    fn name(&self) -> &str {
        "FileStorage"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.update(|map| {
            map.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(|map| {
            map.remove(key);
        })
    }

    fn is_available(&self) -> bool {
        let Some(parent) = self.path.parent() else {
            return false;
        };
        if parent.as_os_str().is_empty() {
            return true;
        }
        if !parent.exists() {
            return fs::create_dir_all(parent).is_ok();
        }
        let probe = parent.join(".dashkit_write_probe");
        if fs::write(&probe, b"probe").is_ok() {
            let _ = fs::remove_file(&probe);
            return true;
        }
        false
    }
}

impl fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStorage")
            .field("path", &self.path)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Workspace store
// ─────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_DRAFT_KEY: &str = "dashkit.workspace.v1";
pub const DEFAULT_COMMITTED_KEY: &str = "dashkit.workspace.committed.v1";
pub const DEFAULT_PREFERENCES_KEY: &str = "dashkit.prefs.v1";

/// Slot names inside the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub draft: String,
    pub committed: String,
    pub preferences: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            draft: DEFAULT_DRAFT_KEY.to_owned(),
            committed: DEFAULT_COMMITTED_KEY.to_owned(),
            preferences: DEFAULT_PREFERENCES_KEY.to_owned(),
        }
    }
}

/// A non-fatal problem found while reading a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageWarning {
    pub key: String,
    pub message: String,
}

impl StorageWarning {
    fn new(key: &str, message: impl Into<String>) -> Self {
        Self {
            key: key.to_owned(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StorageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedWorkspace {
    pub workspace: Option<Workspace>,
    pub warnings: Vec<StorageWarning>,
}

/// Which slot the working copy came from after [`WorkspaceStore::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceSource {
    Draft,
    Committed,
    /// Neither slot held a usable workspace.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// The working copy: the draft when it wins, else the committed document.
    pub workspace: Option<Workspace>,
    pub committed: Option<Workspace>,
    pub source: WorkspaceSource,
    pub warnings: Vec<StorageWarning>,
}

/// The three workspace slots over a [`StorageBackend`].
pub struct WorkspaceStore {
    backend: Box<dyn StorageBackend>,
    keys: StorageKeys,
    options: ValidateOptions,
}

impl fmt::Debug for WorkspaceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceStore")
            .field("backend", &self.backend.name())
            .field("keys", &self.keys)
            .finish()
    }
}

impl WorkspaceStore {
    /// Store with default keys, validating reads in safe-import mode against
    /// the built-in widget list.
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            keys: StorageKeys::default(),
            options: ValidateOptions::safe_import(),
        }
    }

    /// Ephemeral store, mostly for tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStorage::new()))
    }

    #[must_use]
    pub fn with_keys(mut self, keys: StorageKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Options used when reading slots back. Callers normally pass the
    /// registry's safe-import options so custom widgets survive a reload.
    #[must_use]
    pub fn with_validate_options(mut self, options: ValidateOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    #[must_use]
    pub fn validate_options(&self) -> &ValidateOptions {
        &self.options
    }

    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    // ── Workspace slots ─────────────────────────────────────────────────────

    pub fn load_draft(&self) -> LoadedWorkspace {
        self.read_workspace(&self.keys.draft)
    }

    pub fn load_committed(&self) -> LoadedWorkspace {
        self.read_workspace(&self.keys.committed)
    }

    fn read_workspace(&self, key: &str) -> LoadedWorkspace {
        let raw = match self.backend.get(key) {
            Ok(Some(raw)) if !raw.trim().is_empty() => raw,
            Ok(_) => return LoadedWorkspace::default(),
            Err(err) => {
                tracing::warn!(key = %key, backend = %self.backend.name(), error = %err, "storage read failed");
                return LoadedWorkspace {
                    workspace: None,
                    warnings: vec![StorageWarning::new(
                        key,
                        format!("Storage read failed for {key}: {err}"),
                    )],
                };
            }
        };

        match parse_and_validate(&raw, &self.options) {
            Ok(validated) => LoadedWorkspace {
                workspace: Some(validated.workspace),
                warnings: validated
                    .warnings
                    .into_iter()
                    .map(|message| StorageWarning::new(key, message))
                    .collect(),
            },
            Err(ValidationError::Corrupted { reason }) => {
                tracing::warn!(key = %key, %reason, "corrupted workspace slot");
                LoadedWorkspace {
                    workspace: None,
                    warnings: vec![StorageWarning::new(
                        key,
                        format!("Corrupted JSON in {key}; reset to defaults."),
                    )],
                }
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "invalid workspace slot");
                LoadedWorkspace {
                    workspace: None,
                    warnings: vec![StorageWarning::new(
                        key,
                        format!("Validation failed for {key}: {err}"),
                    )],
                }
            }
        }
    }

    fn write_workspace(&self, key: &str, workspace: &Workspace) -> StorageResult<()> {
        let raw = serde_json::to_string(workspace)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.backend.set(key, &raw)
    }

    /// Overwrite the draft slot.
    pub fn save_draft(&self, workspace: &Workspace) -> StorageResult<()> {
        self.write_workspace(&self.keys.draft, workspace)
    }

    /// Promote `workspace` to the committed slot, stamped with the current
    /// schema version and `updatedAt`. The draft slot is cleared only once the
    /// committed write has succeeded.
    pub fn commit(&self, workspace: &Workspace) -> StorageResult<Workspace> {
        let mut committed = workspace.clone();
        committed.schema_version = WORKSPACE_SCHEMA_VERSION;
        committed.touch();

        self.write_workspace(&self.keys.committed, &committed)?;
        if let Err(err) = self.backend.remove(&self.keys.draft) {
            tracing::warn!(key = %self.keys.draft, error = %err, "draft not cleared after commit");
        }
        tracing::debug!(workspace = %committed.id, "committed workspace");
        Ok(committed)
    }

    pub fn clear_draft(&self) -> StorageResult<()> {
        self.backend.remove(&self.keys.draft)
    }

    // ── Preferences ─────────────────────────────────────────────────────────

    pub fn save_preferences(&self, filters: &GlobalFilters) -> StorageResult<()> {
        self.backend
            .set(&self.keys.preferences, &filters.to_storage_string())
    }

    /// Stored filters; anything unreadable yields empty filters.
    pub fn load_preferences(&self) -> GlobalFilters {
        match self.backend.get(&self.keys.preferences) {
            Ok(Some(raw)) => GlobalFilters::from_storage_str(&raw),
            Ok(None) => GlobalFilters::default(),
            Err(err) => {
                tracing::warn!(key = %self.keys.preferences, error = %err, "preferences unreadable");
                GlobalFilters::default()
            }
        }
    }

    // ── Reconciliation ──────────────────────────────────────────────────────

    /// Read both slots and pick the working copy.
    pub fn load(&self) -> Reconciled {
        let committed = self.load_committed();
        let draft = self.load_draft();
        self.reconcile(committed, draft)
    }

    /// Decide between a committed document and a leftover draft:
    ///
    /// - draft absent: committed
    /// - committed absent: draft
    /// - draft equal to committed (ignoring `updatedAt`): committed, draft slot cleared
    /// - draft `updatedAt` older than committed: committed, warning, draft slot cleared
    /// - otherwise: draft
    pub fn reconcile(&self, committed: LoadedWorkspace, draft: LoadedWorkspace) -> Reconciled {
        let mut warnings = committed.warnings;
        warnings.extend(draft.warnings);
        let committed = committed.workspace;

        let (workspace, source) = match (draft.workspace, committed.as_ref()) {
            (None, Some(base)) => (Some(base.clone()), WorkspaceSource::Committed),
            (None, None) => (None, WorkspaceSource::Empty),
            (Some(draft), None) => (Some(draft), WorkspaceSource::Draft),
            (Some(draft), Some(base)) => {
                if same_content(&draft, base) {
                    self.discard_draft_slot();
                    (Some(base.clone()), WorkspaceSource::Committed)
                } else if is_older(&draft.updated_at, &base.updated_at) {
                    tracing::warn!(
                        key = %self.keys.draft,
                        draft = %draft.updated_at,
                        committed = %base.updated_at,
                        "discarding stale draft"
                    );
                    warnings.push(StorageWarning::new(
                        &self.keys.draft,
                        format!(
                            "Discarded stale draft in {}; the committed workspace is newer.",
                            self.keys.draft
                        ),
                    ));
                    self.discard_draft_slot();
                    (Some(base.clone()), WorkspaceSource::Committed)
                } else {
                    (Some(draft), WorkspaceSource::Draft)
                }
            }
        };

        Reconciled {
            workspace,
            committed,
            source,
            warnings,
        }
    }

    fn discard_draft_slot(&self) {
        if let Err(err) = self.backend.remove(&self.keys.draft) {
            tracing::warn!(key = %self.keys.draft, error = %err, "failed to clear draft slot");
        }
    }
}

fn same_content(a: &Workspace, b: &Workspace) -> bool {
    a.id == b.id
        && a.name == b.name
        && a.pages == b.pages
        && a.default_page_id == b.default_page_id
        && a.schema_version == b.schema_version
}

/// `a` strictly before `b`. Unparseable timestamps never count as older.
fn is_older(a: &str, b: &str) -> bool {
    match (
        DateTime::parse_from_rfc3339(a),
        DateTime::parse_from_rfc3339(b),
    ) {
        (Ok(a), Ok(b)) => a < b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashkit_model::{GridRect, Page, Panel, TimeRange};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn sample(id: &str) -> Workspace {
        let mut page = Page::new("main", "Main");
        page.layout
            .panels
            .push(Panel::new("p1", "system-status", GridRect::new(0, 0, 3, 2)));
        Workspace::new(id, "Sample", page)
    }

    fn stamped(mut ws: Workspace, updated_at: &str) -> Workspace {
        ws.updated_at = updated_at.to_owned();
        ws
    }

    /// Backend wrapper whose writes to one key can be made to fail.
    struct FlakyStorage {
        inner: Arc<MemoryStorage>,
        failing_key: String,
        fail: AtomicBool,
    }

    impl StorageBackend for FlakyStorage {
        fn name(&self) -> &str {
            "FlakyStorage"
        }
        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            if key == self.failing_key && self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("quota exceeded".into()));
            }
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key)
        }
    }

    impl StorageBackend for Arc<MemoryStorage> {
        fn name(&self) -> &str {
            "SharedMemoryStorage"
        }
        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            StorageBackend::get(&**self, key)
        }
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            StorageBackend::set(&**self, key, value)
        }
        fn remove(&self, key: &str) -> StorageResult<()> {
            StorageBackend::remove(&**self, key)
        }
    }

    // ---- Backends ----

    #[test]
    fn memory_storage_get_set_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("k").unwrap(), None);
        storage.set("k", "v1").unwrap();
        storage.set("k", "v2").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v2"));
        storage.remove("k").unwrap();
        storage.remove("k").unwrap();
        assert!(storage.is_empty());
        assert!(format!("{storage:?}").contains("entries: 0"));
    }

    #[test]
    fn file_storage_round_trips_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let storage = FileStorage::new(&path);
        assert!(storage.is_available());
        assert_eq!(storage.get("a").unwrap(), None);

        storage.set("a", "{\"x\":1}").unwrap();
        storage.set("b", "2").unwrap();
        storage.remove("b").unwrap();

        let reopened = FileStorage::new(&path);
        assert_eq!(reopened.get("a").unwrap().as_deref(), Some("{\"x\":1}"));
        assert_eq!(reopened.get("b").unwrap(), None);
        assert!(!storage.temp_path().exists());
    }

    #[test]
    fn file_storage_reports_and_replaces_corrupted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();
        let storage = FileStorage::new(&path);

        assert!(matches!(storage.get("a"), Err(StorageError::Corruption(_))));
        storage.set("a", "1").unwrap();
        assert_eq!(storage.get("a").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn file_storage_remove_without_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("missing.json"));
        storage.remove("a").unwrap();
        assert!(!storage.path().exists());
    }

    // ---- Slots ----

    #[test]
    fn empty_slots_load_as_none_without_warnings() {
        let store = WorkspaceStore::in_memory();
        assert_eq!(store.load_draft(), LoadedWorkspace::default());
        assert_eq!(store.load_committed(), LoadedWorkspace::default());
    }

    #[test]
    fn corrupted_slot_warns_and_resets() {
        let store = WorkspaceStore::new(Box::new(MemoryStorage::with_entries([(
            DEFAULT_DRAFT_KEY,
            "{not json",
        )])));
        let loaded = store.load_draft();
        assert!(loaded.workspace.is_none());
        assert_eq!(
            loaded.warnings,
            vec![StorageWarning {
                key: DEFAULT_DRAFT_KEY.into(),
                message: "Corrupted JSON in dashkit.workspace.v1; reset to defaults.".into(),
            }]
        );
    }

    #[test]
    fn invalid_slot_warns_with_validation_message() {
        let store = WorkspaceStore::new(Box::new(MemoryStorage::with_entries([(
            DEFAULT_COMMITTED_KEY,
            r#"{"id":"ws","name":"x","schemaVersion":1,"defaultPageId":"a","pages":[]}"#,
        )])));
        let loaded = store.load_committed();
        assert!(loaded.workspace.is_none());
        assert_eq!(loaded.warnings.len(), 1);
        assert!(
            loaded.warnings[0]
                .message
                .starts_with("Validation failed for dashkit.workspace.committed.v1:")
        );
    }

    #[test]
    fn newer_schema_is_rejected_on_load() {
        let mut doc = serde_json::to_value(sample("ws")).unwrap();
        doc["schemaVersion"] = serde_json::json!(99);
        let store = WorkspaceStore::new(Box::new(MemoryStorage::with_entries([(
            DEFAULT_COMMITTED_KEY,
            doc.to_string(),
        )])));
        let loaded = store.load_committed();
        assert!(loaded.workspace.is_none());
        assert!(loaded.warnings[0].message.contains("unsupported workspace schema version 99"));
    }

    #[test]
    fn legacy_slot_is_migrated_with_warning() {
        let mut doc = serde_json::to_value(sample("ws")).unwrap();
        let obj = doc.as_object_mut().unwrap();
        obj.remove("schemaVersion");
        obj.insert("schema_version".into(), serde_json::json!(0));
        let store = WorkspaceStore::new(Box::new(MemoryStorage::with_entries([(
            DEFAULT_COMMITTED_KEY,
            doc.to_string(),
        )])));
        let loaded = store.load_committed();
        let ws = loaded.workspace.unwrap();
        assert_eq!(ws.schema_version, WORKSPACE_SCHEMA_VERSION);
        assert_eq!(loaded.warnings[0].message, "Migrated workspace schema 0 -> 1");
    }

    #[test]
    fn unknown_widget_in_slot_is_coerced() {
        let mut ws = sample("ws");
        ws.pages[0].layout.panels[0].widget_id = "retired-widget".into();
        let store = WorkspaceStore::in_memory();
        store.save_draft(&ws).unwrap();
        let loaded = store.load_draft();
        assert_eq!(
            loaded.workspace.unwrap().pages[0].layout.panels[0].widget_id,
            "placeholder"
        );
        assert_eq!(loaded.warnings.len(), 1);
    }

    #[test]
    fn commit_stamps_and_clears_draft() {
        let store = WorkspaceStore::in_memory();
        let mut ws = stamped(sample("ws"), "2020-01-01T00:00:00.000Z");
        ws.schema_version = 0;
        store.save_draft(&ws).unwrap();

        let committed = store.commit(&ws).unwrap();
        assert_eq!(committed.schema_version, WORKSPACE_SCHEMA_VERSION);
        assert_ne!(committed.updated_at, ws.updated_at);
        assert!(store.load_draft().workspace.is_none());
        assert_eq!(store.load_committed().workspace, Some(committed));
    }

    #[test]
    fn failed_commit_keeps_draft() {
        let inner = Arc::new(MemoryStorage::new());
        let store = WorkspaceStore::new(Box::new(FlakyStorage {
            inner: Arc::clone(&inner),
            failing_key: DEFAULT_COMMITTED_KEY.into(),
            fail: AtomicBool::new(true),
        }));
        let ws = sample("ws");
        store.save_draft(&ws).unwrap();

        assert!(store.commit(&ws).is_err());
        assert!(inner.get(DEFAULT_DRAFT_KEY).unwrap().is_some());
        assert!(inner.get(DEFAULT_COMMITTED_KEY).unwrap().is_none());
    }

    #[test]
    fn custom_keys_are_used() {
        let keys = StorageKeys {
            draft: "d".into(),
            committed: "c".into(),
            preferences: "p".into(),
        };
        let inner = Arc::new(MemoryStorage::new());
        let store = WorkspaceStore::new(Box::new(Arc::clone(&inner))).with_keys(keys);
        store.save_draft(&sample("ws")).unwrap();
        store.save_preferences(&GlobalFilters::default()).unwrap();
        assert!(inner.get("d").unwrap().is_some());
        assert!(inner.get("p").unwrap().is_some());
        assert!(inner.get(DEFAULT_DRAFT_KEY).unwrap().is_none());
    }

    // ---- Preferences ----

    #[test]
    fn preferences_round_trip_and_tolerate_garbage() {
        let store = WorkspaceStore::in_memory();
        assert_eq!(store.load_preferences(), GlobalFilters::default());

        let filters = GlobalFilters::new(Some("binance"), None, Some(" BTC "), Some("1d"));
        store.save_preferences(&filters).unwrap();
        let loaded = store.load_preferences();
        assert_eq!(loaded.symbol.as_deref(), Some("BTC"));
        assert_eq!(loaded.time_range, Some(TimeRange::OneDay));

        let broken = WorkspaceStore::new(Box::new(MemoryStorage::with_entries([(
            DEFAULT_PREFERENCES_KEY,
            "][",
        )])));
        assert_eq!(broken.load_preferences(), GlobalFilters::default());
    }

    // ---- Reconcile ----

    fn loaded(ws: Option<Workspace>) -> LoadedWorkspace {
        LoadedWorkspace {
            workspace: ws,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn reconcile_prefers_newer_draft() {
        let store = WorkspaceStore::in_memory();
        let committed = stamped(sample("ws"), "2024-01-01T00:00:00.000Z");
        let mut draft = stamped(sample("ws"), "2024-01-02T00:00:00.000Z");
        draft.name = "Edited".into();

        let result = store.reconcile(loaded(Some(committed.clone())), loaded(Some(draft.clone())));
        assert_eq!(result.source, WorkspaceSource::Draft);
        assert_eq!(result.workspace, Some(draft));
        assert_eq!(result.committed, Some(committed));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn reconcile_discards_stale_draft() {
        let store = WorkspaceStore::in_memory();
        let committed = stamped(sample("ws"), "2024-01-02T00:00:00.000Z");
        let mut draft = stamped(sample("ws"), "2024-01-01T00:00:00.000Z");
        draft.name = "Old edit".into();
        store.save_draft(&draft).unwrap();

        let result = store.reconcile(loaded(Some(committed.clone())), loaded(Some(draft)));
        assert_eq!(result.source, WorkspaceSource::Committed);
        assert_eq!(result.workspace, Some(committed));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].message.starts_with("Discarded stale draft"));
        assert!(store.load_draft().workspace.is_none());
    }

    #[test]
    fn reconcile_equal_draft_is_harmless() {
        let store = WorkspaceStore::in_memory();
        let committed = stamped(sample("ws"), "2024-01-01T00:00:00.000Z");
        let draft = stamped(committed.clone(), "2024-01-03T00:00:00.000Z");
        store.save_draft(&draft).unwrap();

        let result = store.reconcile(loaded(Some(committed.clone())), loaded(Some(draft)));
        assert_eq!(result.source, WorkspaceSource::Committed);
        assert_eq!(result.workspace, Some(committed));
        assert!(result.warnings.is_empty());
        assert!(store.load_draft().workspace.is_none());
    }

    #[test]
    fn reconcile_falls_back_either_way() {
        let store = WorkspaceStore::in_memory();
        let ws = sample("ws");
        let only_draft = store.reconcile(loaded(None), loaded(Some(ws.clone())));
        assert_eq!(only_draft.source, WorkspaceSource::Draft);
        assert!(only_draft.committed.is_none());

        let nothing = store.reconcile(loaded(None), loaded(None));
        assert_eq!(nothing.source, WorkspaceSource::Empty);
        assert!(nothing.workspace.is_none());
    }

    #[test]
    fn load_collects_warnings_from_both_slots() {
        let store = WorkspaceStore::new(Box::new(MemoryStorage::with_entries([
            (DEFAULT_COMMITTED_KEY, "garbage"),
            (DEFAULT_DRAFT_KEY, "also garbage"),
        ])));
        let result = store.load();
        assert_eq!(result.source, WorkspaceSource::Empty);
        let keys: Vec<&str> = result.warnings.iter().map(|w| w.key.as_str()).collect();
        assert_eq!(keys, vec![DEFAULT_COMMITTED_KEY, DEFAULT_DRAFT_KEY]);
    }

    #[test]
    fn older_compares_instants() {
        assert!(is_older("2024-01-01T00:00:00Z", "2024-01-01T00:00:01Z"));
        assert!(!is_older("2024-01-01T00:00:01Z", "2024-01-01T00:00:00Z"));
        assert!(!is_older("yesterday", "2024-01-01T00:00:00Z"));
    }
}
