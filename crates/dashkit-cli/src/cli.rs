use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::commands;
use crate::error::Result;
use crate::logging;

/// Environment variable consulted when `--config` is not given.
pub const CONFIG_ENV: &str = "DASHKIT_CONFIG";

#[derive(Debug, Parser)]
#[command(
    name = "dashkit",
    about = "Inspect, edit, and poll dashboard workspaces",
    version
)]
pub struct Cli {
    /// TOML or JSON settings file (falls back to $DASHKIT_CONFIG).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Workspace state file; overrides the configured storage.
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// Log at debug level regardless of RUST_LOG.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check a workspace file against the schema.
    Validate(ValidateArgs),

    /// Upgrade a workspace file to the current schema version.
    Migrate(MigrateArgs),

    /// Replace the stored workspace with a built-in template.
    Init(InitArgs),

    /// Replace the stored workspace with a file (safe import).
    Import(ImportArgs),

    /// Write the stored workspace as pretty JSON.
    Export(ExportArgs),

    /// Print pages and the laid-out panels of one page.
    Show(ShowArgs),

    /// Add a widget panel to a page and commit it.
    Add(AddArgs),

    /// List pickable widgets.
    Widgets(WidgetsArgs),

    /// Poll every widget on a page once and print its quality.
    Status(StatusArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ValidateArgs {
    pub file: PathBuf,

    /// Reject unknown widgets and malformed fields instead of coercing them.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Clone, Args)]
pub struct MigrateArgs {
    pub file: PathBuf,

    /// Destination; prints to stdout when omitted.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct InitArgs {
    /// Template id; lists the templates when omitted.
    #[arg(long)]
    pub template: Option<String>,

    /// Overwrite an existing workspace.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    pub file: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// Directory for `dashboard-workspace-<id>.json`; prints to stdout when
    /// omitted.
    #[arg(long = "out-dir")]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct ShowArgs {
    #[arg(long)]
    pub page: Option<String>,

    /// Container width in pixels used for the pixel layout.
    #[arg(long, default_value_t = 1200.0)]
    pub width: f64,
}

#[derive(Debug, Clone, Args)]
pub struct AddArgs {
    pub widget_id: String,

    #[arg(long)]
    pub page: Option<String>,

    /// Leave the change in the draft instead of committing it.
    #[arg(long)]
    pub draft: bool,
}

#[derive(Debug, Clone, Args)]
pub struct WidgetsArgs {
    #[arg(long)]
    pub category: Option<String>,

    /// Case-insensitive match on title, id or description.
    #[arg(long)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    #[arg(long)]
    pub page: Option<String>,

    /// Upstream API root; overrides the configured one.
    #[arg(long = "base-url")]
    pub base_url: Option<String>,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(cli, &mut out)
}

pub fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let ctx = commands::Context::load(config_path.as_deref(), cli.state.as_deref())?;

    match cli.command {
        Commands::Validate(args) => commands::validate(&ctx, &args, out),
        Commands::Migrate(args) => commands::migrate(&args, out),
        Commands::Init(args) => commands::init(&ctx, &args, out),
        Commands::Import(args) => commands::import(&ctx, &args, out),
        Commands::Export(args) => commands::export(&ctx, &args, out),
        Commands::Show(args) => commands::show(&ctx, &args, out),
        Commands::Add(args) => commands::add(&ctx, &args, out),
        Commands::Widgets(args) => commands::widgets(&ctx, &args, out),
        Commands::Status(args) => commands::status(&ctx, &args, out),
    }
}
