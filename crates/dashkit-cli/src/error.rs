use std::path::PathBuf;

use dashkit_model::{MigrationError, ValidationError};
use dashkit_runtime::{DashConfigError, SessionError};
use dashkit_widgets::{FetchError, HostError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] DashConfigError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Migration(#[from] MigrationError),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("upstream error: {0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Host(#[from] HostError),

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("required path does not exist: {path}")]
    MissingPath { path: PathBuf },
}

impl CliError {
    /// Process exit code: 2 for usage problems, 3 for documents that fail
    /// validation, 4 for configuration errors, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } | Self::MissingPath { .. } => 2,
            Self::Validation(_) | Self::Migration(_) => 3,
            Self::Session(SessionError::Import(_)) => 3,
            Self::Config(_) => 4,
            _ => 1,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
