#![forbid(unsafe_code)]

//! Workspace lifecycle for dashkit.
//!
//! - [`persistence`]: storage backends and the draft/committed slot store
//! - [`history`]: bounded undo/redo of draft snapshots
//! - [`templates`]: built-in starter workspaces
//! - [`session`]: the view/edit/apply/cancel workflow tying them together
//! - [`config`]: TOML/JSON settings for all of the above

pub mod config;
pub mod history;
pub mod persistence;
pub mod session;
pub mod templates;

pub use config::{DashConfig, DashConfigError, StorageKind};
pub use history::{DEFAULT_MAX_STEPS, EditHistory, HistoryConfig};
pub use persistence::{
    DEFAULT_COMMITTED_KEY, DEFAULT_DRAFT_KEY, DEFAULT_PREFERENCES_KEY, FileStorage,
    LoadedWorkspace, MemoryStorage, Reconciled, StorageBackend, StorageError, StorageKeys,
    StorageResult, StorageWarning, WorkspaceSource, WorkspaceStore,
};
pub use session::{ExportFile, Mode, SessionConfig, SessionError, WorkspaceSession};
pub use templates::{BUILTIN_TEMPLATES, BuiltinTemplate};
