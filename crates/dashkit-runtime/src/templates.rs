#![forbid(unsafe_code)]

//! Built-in starter workspaces.
//!
//! Templates are embedded JSON documents and go through the same
//! Migrate → Validate path as imported files.

use dashkit_model::{
    ValidateOptions, Validated, ValidationError, WORKSPACE_SCHEMA_VERSION, now_timestamp,
    parse_and_validate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinTemplate {
    pub id: &'static str,
    pub name: &'static str,
    source: &'static str,
}

pub const MARKETDATA: BuiltinTemplate = BuiltinTemplate {
    id: "marketdata",
    name: "Market Data Desk",
    source: include_str!("../templates/marketdata.json"),
};

pub const EXECUTION: BuiltinTemplate = BuiltinTemplate {
    id: "execution",
    name: "Execution Monitor",
    source: include_str!("../templates/execution.json"),
};

pub const INCIDENT: BuiltinTemplate = BuiltinTemplate {
    id: "incident",
    name: "Incident Response",
    source: include_str!("../templates/incident.json"),
};

pub const BUILTIN_TEMPLATES: [BuiltinTemplate; 3] = [MARKETDATA, EXECUTION, INCIDENT];

/// Look up a template by id (case-insensitive).
#[must_use]
pub fn find(id: &str) -> Option<BuiltinTemplate> {
    let id = id.trim();
    BUILTIN_TEMPLATES
        .into_iter()
        .find(|t| t.id.eq_ignore_ascii_case(id))
}

impl BuiltinTemplate {
    #[must_use]
    pub fn source(&self) -> &'static str {
        self.source
    }

    /// Parse and validate the template, then restamp it as a fresh document:
    /// `createdAt`/`updatedAt` set to now at the current schema version.
    pub fn instantiate(&self, options: &ValidateOptions) -> Result<Validated, ValidationError> {
        let mut validated = parse_and_validate(self.source, options)?;
        let now = now_timestamp();
        let workspace = &mut validated.workspace;
        workspace.created_at = now.clone();
        workspace.updated_at = now;
        workspace.schema_version = WORKSPACE_SCHEMA_VERSION;
        Ok(validated)
    }
}
