#![forbid(unsafe_code)]

//! Forward-only schema migration.
//!
//! Migration runs on raw JSON before validation so that documents written by
//! older builds (missing fields, legacy key names) can still be read. Each
//! step upgrades exactly one version; [`migrate_document`] chains them from
//! the stored version up to [`WORKSPACE_SCHEMA_VERSION`].
//!
//! # Versioning policy
//!
//! - Documents without a version are treated as version 0.
//! - Documents newer than this build are rejected, never downgraded.
//! - Migrating an already current document is a no-op, so the operation is
//!   idempotent.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{WORKSPACE_SCHEMA_VERSION, Workspace, now_timestamp};

/// Legacy snake_case version key written by pre-v1 builds.
const LEGACY_VERSION_KEY: &str = "schema_version";
const VERSION_KEY: &str = "schemaVersion";

/// Output of a migration attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    /// The (possibly upgraded) document.
    pub document: Value,
    /// Whether any step ran.
    pub migrated: bool,
    pub from_version: u32,
    pub to_version: u32,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("workspace payload must be a JSON object")]
    InvalidPayload,

    #[error("schemaVersion must be a non-negative integer, got {found}")]
    InvalidVersion { found: String },

    #[error("unsupported workspace schema version {found} (this build supports up to {supported})")]
    UnsupportedSchemaVersion { found: u64, supported: u32 },
}

type Step = fn(&mut Map<String, Value>);

/// `STEPS[n]` upgrades a version-`n` document to version `n + 1`.
const STEPS: &[Step] = &[step_v0_to_v1];

/// v0 documents carried the version under `schema_version`.
fn step_v0_to_v1(doc: &mut Map<String, Value>) {
    doc.remove(LEGACY_VERSION_KEY);
}

/// Read the stored version. Absent means 0.
pub fn stored_version(doc: &Map<String, Value>) -> Result<u64, MigrationError> {
    let raw = doc.get(VERSION_KEY).or_else(|| doc.get(LEGACY_VERSION_KEY));
    match raw {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value.as_u64().ok_or_else(|| MigrationError::InvalidVersion {
            found: value.to_string(),
        }),
    }
}

/// Upgrade `input` to the current schema version.
pub fn migrate_document(input: Value) -> Result<Migration, MigrationError> {
    let Value::Object(mut doc) = input else {
        return Err(MigrationError::InvalidPayload);
    };

    let found = stored_version(&doc)?;
    if found > u64::from(WORKSPACE_SCHEMA_VERSION) {
        return Err(MigrationError::UnsupportedSchemaVersion {
            found,
            supported: WORKSPACE_SCHEMA_VERSION,
        });
    }
    // Bounded by the check above.
    let from_version = found as u32;

    if from_version == WORKSPACE_SCHEMA_VERSION {
        // Current documents may still spell the version the old way.
        if let Some(legacy) = doc.remove(LEGACY_VERSION_KEY) {
            doc.entry(VERSION_KEY).or_insert(legacy);
        }
        return Ok(Migration {
            document: Value::Object(doc),
            migrated: false,
            from_version,
            to_version: from_version,
            warnings: Vec::new(),
        });
    }

    for step in &STEPS[from_version as usize..WORKSPACE_SCHEMA_VERSION as usize] {
        step(&mut doc);
    }
    doc.insert(VERSION_KEY.into(), Value::from(WORKSPACE_SCHEMA_VERSION));
    doc.insert("updatedAt".into(), Value::String(now_timestamp()));

    let warning = format!("Migrated workspace schema {from_version} -> {WORKSPACE_SCHEMA_VERSION}");
    tracing::info!(
        from = from_version,
        to = WORKSPACE_SCHEMA_VERSION,
        "workspace migrated"
    );

    Ok(Migration {
        document: Value::Object(doc),
        migrated: true,
        from_version,
        to_version: WORKSPACE_SCHEMA_VERSION,
        warnings: vec![warning],
    })
}

/// Typed migration for documents that already deserialized.
pub fn migrate_workspace(mut workspace: Workspace) -> Result<Migration, MigrationError> {
    if workspace.schema_version > WORKSPACE_SCHEMA_VERSION {
        return Err(MigrationError::UnsupportedSchemaVersion {
            found: u64::from(workspace.schema_version),
            supported: WORKSPACE_SCHEMA_VERSION,
        });
    }
    let from_version = workspace.schema_version;
    let migrated = from_version < WORKSPACE_SCHEMA_VERSION;
    let mut warnings = Vec::new();
    if migrated {
        workspace.schema_version = WORKSPACE_SCHEMA_VERSION;
        workspace.touch();
        warnings.push(format!(
            "Migrated workspace schema {from_version} -> {WORKSPACE_SCHEMA_VERSION}"
        ));
    }
    let document =
        serde_json::to_value(&workspace).map_err(|_| MigrationError::InvalidPayload)?;
    Ok(Migration {
        document,
        migrated,
        from_version,
        to_version: WORKSPACE_SCHEMA_VERSION,
        warnings,
    })
}

/// Whether a raw document is older than this build. Non-objects and invalid
/// versions report `false`; they fail in [`migrate_document`] instead.
#[must_use]
pub fn needs_migration(input: &Value) -> bool {
    input
        .as_object()
        .and_then(|doc| stored_version(doc).ok())
        .is_some_and(|v| v < u64::from(WORKSPACE_SCHEMA_VERSION))
}
