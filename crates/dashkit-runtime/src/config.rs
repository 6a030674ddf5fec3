#![forbid(unsafe_code)]

//! Engine configuration loaded from TOML or JSON.
//!
//! Every field has a default matching the engine's built-in constants, so an
//! empty file (or no file) behaves exactly like `DashConfig::default()`.
//!
//! ```toml
//! # dashkit.toml
//! [history]
//! max_steps = 50
//!
//! [storage]
//! backend = "file"
//! path = "/var/lib/dashkit/workspace.json"
//!
//! [grid]
//! columns = 12
//! row_height = 80
//! gap = 12
//!
//! [polling]
//! interval_ms = 10000
//! timeout_ms = 7000
//! down_after_failures = 3
//! stale_after_ms = 30000
//!
//! [upstream]
//! base_url = "http://localhost:8000"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use dashkit_model::GridSpec;
use dashkit_widgets::{
    DEFAULT_BASE_URL, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, HostConfig, QualityPolicy,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::{DEFAULT_MAX_STEPS, HistoryConfig};
use crate::persistence::{
    DEFAULT_COMMITTED_KEY, DEFAULT_DRAFT_KEY, DEFAULT_PREFERENCES_KEY, FileStorage, MemoryStorage,
    StorageBackend, StorageKeys,
};

#[derive(Debug, Error)]
pub enum DashConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    pub max_steps: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    #[default]
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageKind,
    /// Storage file for the `file` backend; `None` means the per-user state
    /// directory.
    pub path: Option<PathBuf>,
    pub draft_key: String,
    pub committed_key: String,
    pub preferences_key: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageKind::default(),
            path: None,
            draft_key: DEFAULT_DRAFT_KEY.to_owned(),
            committed_key: DEFAULT_COMMITTED_KEY.to_owned(),
            preferences_key: DEFAULT_PREFERENCES_KEY.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSection {
    pub columns: u32,
    pub row_height: u32,
    pub gap: u32,
}

impl Default for GridSection {
    fn default() -> Self {
        let spec = GridSpec::default();
        Self {
            columns: spec.columns,
            row_height: spec.row_height,
            gap: spec.gap,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub down_after_failures: u32,
    pub stale_after_ms: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        let quality = QualityPolicy::default();
        Self {
            interval_ms: duration_ms(DEFAULT_POLL_INTERVAL),
            timeout_ms: duration_ms(DEFAULT_POLL_TIMEOUT),
            down_after_failures: quality.down_after_failures,
            stale_after_ms: duration_ms(quality.stale_after),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSection {
    pub base_url: String,
    /// Sent as `X-Admin-Token` when set.
    pub admin_token: Option<String>,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            admin_token: None,
        }
    }
}

// ============================================================================
// DashConfig
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashConfig {
    pub history: HistorySection,
    pub storage: StorageSection,
    pub grid: GridSection,
    pub polling: PollingSection,
    pub upstream: UpstreamSection,
}

impl DashConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, DashConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, DashConfigError> {
        Self::from_toml_str(&read(path.as_ref())?)
    }

    pub fn from_json_str(s: &str) -> Result<Self, DashConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DashConfigError> {
        Self::from_json_str(&read(path.as_ref())?)
    }

    /// Load by extension (`.json` is JSON, anything else TOML) and reject
    /// configurations that fail [`Self::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DashConfigError> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_file(path)?
        } else {
            Self::from_toml_file(path)?
        };
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(DashConfigError::Validation(errors));
        }
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Range-check every section. An empty list means the config is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.grid.columns == 0 {
            errors.push("grid.columns must be > 0".into());
        }
        if self.grid.row_height == 0 {
            errors.push("grid.row_height must be > 0".into());
        }

        if self.polling.interval_ms == 0 {
            errors.push("polling.interval_ms must be > 0".into());
        }
        if self.polling.timeout_ms == 0 {
            errors.push("polling.timeout_ms must be > 0".into());
        }
        if self.polling.down_after_failures == 0 {
            errors.push("polling.down_after_failures must be > 0".into());
        }

        let keys = [
            ("storage.draft_key", &self.storage.draft_key),
            ("storage.committed_key", &self.storage.committed_key),
            ("storage.preferences_key", &self.storage.preferences_key),
        ];
        for (name, key) in keys {
            if key.trim().is_empty() {
                errors.push(format!("{name} must not be empty"));
            }
        }
        if self.storage.draft_key == self.storage.committed_key {
            errors.push(format!(
                "storage.draft_key and storage.committed_key must differ, both are {:?}",
                self.storage.draft_key
            ));
        }

        if let Err(err) = url::Url::parse(&self.upstream.base_url) {
            errors.push(format!(
                "upstream.base_url is not a valid URL ({err}): {:?}",
                self.upstream.base_url
            ));
        }

        errors
    }

    // ---- Conversions ----

    #[must_use]
    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig::new(self.history.max_steps)
    }

    #[must_use]
    pub fn grid_spec(&self) -> GridSpec {
        GridSpec {
            columns: self.grid.columns,
            row_height: self.grid.row_height,
            gap: self.grid.gap,
        }
    }

    #[must_use]
    pub fn storage_keys(&self) -> StorageKeys {
        StorageKeys {
            draft: self.storage.draft_key.clone(),
            committed: self.storage.committed_key.clone(),
            preferences: self.storage.preferences_key.clone(),
        }
    }

    #[must_use]
    pub fn quality_policy(&self) -> QualityPolicy {
        QualityPolicy {
            down_after_failures: self.polling.down_after_failures,
            stale_after: Duration::from_millis(self.polling.stale_after_ms),
        }
    }

    #[must_use]
    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            poll_interval: Duration::from_millis(self.polling.interval_ms),
            poll_timeout: Duration::from_millis(self.polling.timeout_ms),
            quality: self.quality_policy(),
            ..HostConfig::default()
        }
    }

    /// Instantiate the configured storage backend.
    #[must_use]
    pub fn storage_backend(&self) -> Box<dyn StorageBackend> {
        match self.storage.backend {
            StorageKind::Memory => Box::new(MemoryStorage::new()),
            StorageKind::File => match &self.storage.path {
                Some(path) => Box::new(FileStorage::new(path)),
                None => Box::new(FileStorage::default_location()),
            },
        }
    }
}

fn read(path: &Path) -> Result<String, DashConfigError> {
    std::fs::read_to_string(path).map_err(|source| DashConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
