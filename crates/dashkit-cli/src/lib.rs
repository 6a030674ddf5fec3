#![forbid(unsafe_code)]

//! `dashkit` command-line front end.
//!
//! Every subcommand resolves a [`commands::Context`] (configuration file,
//! optional state-file override, built-in widget registry) and then works
//! through a [`dashkit_runtime::WorkspaceSession`], so the CLI exercises the
//! same draft/commit path as any embedding UI.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;

pub use cli::{Cli, Commands, run, run_from_env};
pub use error::{CliError, Result};
