//! Subcommand implementations. Each writes its report to `out`; storage and
//! coercion warnings go to stderr so exported JSON stays clean.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use dashkit_layout::overlapping_pairs;
use dashkit_model::{
    DashboardRoute, GridRect, Panel, ValidateMode, migrate_document, parse_and_validate,
};
use dashkit_runtime::{
    BUILTIN_TEMPLATES, DashConfig, SessionConfig, SessionError, StorageKind, WorkspaceSession,
    WorkspaceStore,
};
use dashkit_widgets::{
    Fetcher, HealthStatus, HostConfig, HttpFetcher, WidgetCategory, WidgetHost, WidgetRegistry,
    now_ms,
};
use serde_json::Value;

use crate::cli::{
    AddArgs, ExportArgs, ImportArgs, InitArgs, MigrateArgs, ShowArgs, StatusArgs, ValidateArgs,
    WidgetsArgs,
};
use crate::error::{CliError, Result};

/// Resolved configuration shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: DashConfig,
    pub registry: WidgetRegistry,
}

impl Context {
    /// Load `config_path` (defaults when `None`) and point file storage at
    /// `state` when given.
    pub fn load(config_path: Option<&Path>, state: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) if !path.exists() => {
                return Err(CliError::MissingPath {
                    path: path.to_path_buf(),
                });
            }
            Some(path) => DashConfig::load(path)?,
            None => DashConfig::default(),
        };
        if let Some(state) = state {
            config.storage.backend = StorageKind::File;
            config.storage.path = Some(state.to_path_buf());
        }
        Ok(Self::new(config))
    }

    #[must_use]
    pub fn new(config: DashConfig) -> Self {
        Self {
            config,
            registry: WidgetRegistry::builtin(),
        }
    }

    /// Open the configured store, routed to `page` when given. An unknown
    /// page is an error rather than a silent fallback.
    pub fn open_session(&self, page: Option<&str>) -> Result<WorkspaceSession> {
        let store = WorkspaceStore::new(self.config.storage_backend())
            .with_keys(self.config.storage_keys());
        let mut session = WorkspaceSession::open(
            store,
            self.registry.clone(),
            SessionConfig::from(&self.config),
            &DashboardRoute::default(),
        );
        if let Some(page) = page {
            session.set_active_page(page)?;
        }
        Ok(session)
    }
}

fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(CliError::MissingPath {
            path: path.to_path_buf(),
        });
    }
    Ok(std::fs::read_to_string(path)?)
}

fn report_warnings(session: &mut WorkspaceSession) {
    for warning in session.take_warnings() {
        eprintln!("warning: {warning}");
    }
}

fn describe_rect(rect: GridRect) -> String {
    format!("{},{} {}x{}", rect.x, rect.y, rect.w, rect.h)
}

// ============================================================================
// Documents
// ============================================================================

pub fn validate(ctx: &Context, args: &ValidateArgs, out: &mut dyn Write) -> Result<()> {
    let raw = read_file(&args.file)?;
    let mode = if args.strict {
        ValidateMode::Strict
    } else {
        ValidateMode::SafeImport
    };
    let options = ctx
        .registry
        .validate_options(mode)
        .with_grid_defaults(ctx.config.grid_spec());
    let validated = parse_and_validate(&raw, &options)?;
    let ws = &validated.workspace;

    writeln!(
        out,
        "ok: {} '{}' (schema {}, {} pages, {} panels)",
        ws.id,
        ws.name,
        ws.schema_version,
        ws.pages.len(),
        ws.panel_count()
    )?;
    for warning in &validated.warnings {
        writeln!(out, "warning: {warning}")?;
    }
    for page in &ws.pages {
        let rects: Vec<GridRect> = page.layout.panels.iter().map(Panel::grid_rect).collect();
        for (a, b) in overlapping_pairs(&rects) {
            writeln!(
                out,
                "overlap: page '{}' panels '{}' and '{}'",
                page.id, page.layout.panels[a].id, page.layout.panels[b].id
            )?;
        }
    }
    Ok(())
}

pub fn migrate(args: &MigrateArgs, out: &mut dyn Write) -> Result<()> {
    let raw = read_file(&args.file)?;
    let document: Value = serde_json::from_str(&raw)?;
    let migration = migrate_document(document)?;
    let pretty = serde_json::to_string_pretty(&migration.document)?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, format!("{pretty}\n"))?;
            if migration.migrated {
                writeln!(
                    out,
                    "{}: schema {} -> {}",
                    path.display(),
                    migration.from_version,
                    migration.to_version
                )?;
            } else {
                writeln!(
                    out,
                    "{}: already at schema {}",
                    path.display(),
                    migration.to_version
                )?;
            }
        }
        None => writeln!(out, "{pretty}")?,
    }
    Ok(())
}

// ============================================================================
// Stored workspace
// ============================================================================

pub fn init(ctx: &Context, args: &InitArgs, out: &mut dyn Write) -> Result<()> {
    let Some(template_id) = args.template.as_deref() else {
        for template in BUILTIN_TEMPLATES {
            writeln!(out, "{:<12} {}", template.id, template.name)?;
        }
        return Ok(());
    };

    let mut session = ctx.open_session(None)?;
    if (session.committed().is_some() || session.draft().is_some()) && !args.force {
        return Err(CliError::invalid(
            "a workspace already exists; pass --force to replace it",
        ));
    }
    session.pick_template(template_id)?;
    report_warnings(&mut session);

    let name = session.workspace().map_or("", |ws| ws.name.as_str());
    writeln!(out, "initialized '{name}' from template {template_id}")?;
    Ok(())
}

pub fn import(ctx: &Context, args: &ImportArgs, out: &mut dyn Write) -> Result<()> {
    let raw = read_file(&args.file)?;
    let mut session = ctx.open_session(None)?;
    session.take_warnings();
    session.import(&raw)?;

    let warnings = session.take_warnings();
    let id = session.workspace().map_or("", |ws| ws.id.as_str());
    writeln!(out, "imported '{id}' ({} warnings)", warnings.len())?;
    for warning in warnings {
        writeln!(out, "warning: {warning}")?;
    }
    Ok(())
}

pub fn export(ctx: &Context, args: &ExportArgs, out: &mut dyn Write) -> Result<()> {
    let mut session = ctx.open_session(None)?;
    report_warnings(&mut session);
    let file = session.export()?;
    match &args.out_dir {
        Some(dir) => {
            let path = file.write_into(dir)?;
            writeln!(out, "wrote {}", path.display())?;
        }
        None => writeln!(out, "{}", file.contents)?,
    }
    Ok(())
}

pub fn show(ctx: &Context, args: &ShowArgs, out: &mut dyn Write) -> Result<()> {
    let mut session = ctx.open_session(args.page.as_deref())?;
    report_warnings(&mut session);
    let ws = session.workspace().ok_or(SessionError::NoWorkspace)?;
    let active = session.active_page().map(|page| page.id.as_str());

    writeln!(
        out,
        "{} '{}' [{}] updated {}",
        ws.id,
        ws.name,
        session.mode(),
        ws.updated_at
    )?;
    for page in &ws.pages {
        let marker = if Some(page.id.as_str()) == active { '*' } else { ' ' };
        writeln!(
            out,
            "{marker} {} '{}' ({} panels)",
            page.id,
            page.title,
            page.layout.panels.len()
        )?;
    }

    let Some(arrangement) = session.arrangement(args.width) else {
        return Ok(());
    };
    writeln!(
        out,
        "layout {:.0}px wide, {:.0}px tall:",
        args.width, arrangement.content_height
    )?;
    for placement in arrangement.paint_order() {
        let mut flags = String::new();
        if placement.locked {
            flags.push_str(" locked");
        }
        if placement.z_index > dashkit_layout::BASE_Z_INDEX {
            flags.push_str(" pinned");
        }
        writeln!(
            out,
            "  {:<20} {:<22} grid {:<10} px {:.0},{:.0} {:.0}x{:.0}{flags}",
            placement.panel_id,
            placement.widget_id,
            describe_rect(placement.rect),
            placement.pixel.left,
            placement.pixel.top,
            placement.pixel.width,
            placement.pixel.height,
        )?;
    }
    Ok(())
}

pub fn add(ctx: &Context, args: &AddArgs, out: &mut dyn Write) -> Result<()> {
    let mut session = ctx.open_session(args.page.as_deref())?;
    report_warnings(&mut session);
    session.begin_edit()?;
    let panel_id = session.add_widget_panel(&args.widget_id)?;
    let rect = session
        .active_page()
        .and_then(|page| page.panel(&panel_id))
        .map(Panel::grid_rect);
    if !args.draft {
        session.apply()?;
    }
    report_warnings(&mut session);

    write!(out, "added {panel_id} ({})", args.widget_id)?;
    if let Some(rect) = rect {
        write!(out, " at {}", describe_rect(rect))?;
    }
    writeln!(out, "{}", if args.draft { " [draft]" } else { "" })?;
    Ok(())
}

// ============================================================================
// Widgets
// ============================================================================

pub fn widgets(ctx: &Context, args: &WidgetsArgs, out: &mut dyn Write) -> Result<()> {
    let category = match args.category.as_deref() {
        Some(raw) => Some(
            WidgetCategory::parse(raw)
                .ok_or_else(|| CliError::invalid(format!("unknown widget category '{raw}'")))?,
        ),
        None => None,
    };
    let catalog = ctx.registry.catalog(category, args.query.as_deref());
    if catalog.is_empty() {
        writeln!(out, "no widgets match")?;
        return Ok(());
    }
    for definition in catalog {
        writeln!(
            out,
            "{:<22} {:<22} {:<8} {}x{}  {}",
            definition.id,
            definition.title,
            definition.category.as_str(),
            definition.default_grid.w,
            definition.default_grid.h,
            definition.description
        )?;
    }
    Ok(())
}

pub fn status(ctx: &Context, args: &StatusArgs, out: &mut dyn Write) -> Result<()> {
    let base_url = args
        .base_url
        .as_deref()
        .unwrap_or(&ctx.config.upstream.base_url);
    let mut fetcher = HttpFetcher::new(base_url)?;
    if let Some(token) = &ctx.config.upstream.admin_token {
        fetcher = fetcher.with_admin_token(token.clone());
    }
    status_with(ctx, args, Arc::new(fetcher), out)
}

/// [`status`] against an explicit fetcher.
pub fn status_with(
    ctx: &Context,
    args: &StatusArgs,
    fetcher: Arc<dyn Fetcher>,
    out: &mut dyn Write,
) -> Result<()> {
    let mut session = ctx.open_session(args.page.as_deref())?;
    report_warnings(&mut session);
    let page = session.active_page().ok_or(SessionError::NoWorkspace)?;

    let config = HostConfig {
        background: false,
        ..ctx.config.host_config()
    };
    let mut host = WidgetHost::new(ctx.registry.clone(), fetcher, config);
    let now = now_ms();
    host.set_global_filters(session.filters().clone());
    if let Err(err) = host.refresh_capabilities(now) {
        tracing::warn!(error = %err, "capability refresh failed");
    }
    host.sync(page.layout.panels.iter(), now)?;
    let polled = host.poll_once(now);
    tracing::debug!(page = %page.id, polled, "status poll complete");

    writeln!(out, "page {} ({} panels)", page.id, page.layout.panels.len())?;
    for panel in &page.layout.panels {
        let status = host
            .quality(&panel.id)
            .map_or(HealthStatus::Unknown, |q| q.status);
        let Some(view) = host.render(&panel.id, now) else {
            continue;
        };
        writeln!(
            out,
            "{:<20} {:<9} {}: {}",
            panel.id,
            status.as_str(),
            view.title,
            view.headline
        )?;
        for line in &view.lines {
            writeln!(out, "    {line}")?;
        }
        if let Some(notice) = &view.notice {
            writeln!(out, "    ! {notice}")?;
        }
    }
    Ok(())
}
