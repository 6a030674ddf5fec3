#![forbid(unsafe_code)]

//! Built-in widgets.

use chrono::DateTime;
use dashkit_layout::GridSize;
use dashkit_model::PLACEHOLDER_WIDGET_ID;
use serde_json::Value;
use web_time::Duration;

use crate::capabilities::{CapabilityGate, Requirements};
use crate::coerce;
use crate::quality::WidgetQuality;
use crate::registry::{NavLink, WidgetCategory, WidgetDefinition, WidgetProps, WidgetView};
use crate::status::HealthStatus;

pub const STATUS_SUMMARY_ENDPOINT: &str = "/api/status/summary";
pub const BOTS_ENDPOINT: &str = "/api/bots?page=1&page_size=50";

const STANDARD_REFRESH: Duration = Duration::from_secs(10);

const QUICK_LINKS: &[(&str, &str)] = &[
    ("Bots", "/bots"),
    ("Markets", "/markets"),
    ("Portfolio", "/portfolio"),
    ("Commands", "/commands"),
    ("Analytics", "/analytics"),
    ("Modules", "/admin/modules"),
];

pub const SYSTEM_STATUS: WidgetDefinition = WidgetDefinition {
    id: "system-status",
    title: "System Status",
    category: WidgetCategory::Status,
    default_grid: GridSize::new(3, 2),
    min_grid: GridSize::new(2, 1),
    description: "Overall dashboard and component status.",
    requires: Requirements::NONE,
    endpoint: Some(STATUS_SUMMARY_ENDPOINT),
    refresh: Some(STANDARD_REFRESH),
    data_status: summary_status,
    render: render_system_status,
    reserved: false,
};

pub const DEGRADED_COMPONENTS: WidgetDefinition = WidgetDefinition {
    id: "degraded-components",
    title: "Degraded Components",
    category: WidgetCategory::Status,
    default_grid: GridSize::new(6, 2),
    min_grid: GridSize::new(3, 1),
    description: "Lists non-OK components with reasons.",
    requires: Requirements::NONE,
    endpoint: Some(STATUS_SUMMARY_ENDPOINT),
    refresh: Some(STANDARD_REFRESH),
    data_status: summary_status,
    render: render_degraded_components,
    reserved: false,
};

pub const BOTS_OVERVIEW: WidgetDefinition = WidgetDefinition {
    id: "bots-overview",
    title: "Bots KPI",
    category: WidgetCategory::Bots,
    default_grid: GridSize::new(3, 2),
    min_grid: GridSize::new(2, 1),
    description: "Summary of bot counts and degraded state.",
    requires: Requirements::NONE,
    endpoint: Some(BOTS_ENDPOINT),
    refresh: Some(STANDARD_REFRESH),
    data_status: bots_status,
    render: render_bots_overview,
    reserved: false,
};

pub const QUICK_NAV: WidgetDefinition = WidgetDefinition {
    id: "quick-nav",
    title: "Quick Links",
    category: WidgetCategory::Utility,
    default_grid: GridSize::new(4, 1),
    min_grid: GridSize::new(2, 1),
    description: "One-click navigation links.",
    requires: Requirements::NONE,
    endpoint: None,
    refresh: None,
    data_status: no_status,
    render: render_quick_nav,
    reserved: false,
};

pub const PLACEHOLDER: WidgetDefinition = WidgetDefinition {
    id: PLACEHOLDER_WIDGET_ID,
    title: "Placeholder",
    category: WidgetCategory::Utility,
    default_grid: GridSize::new(3, 1),
    min_grid: GridSize::new(1, 1),
    description: "Empty slot; pick a widget in edit mode.",
    requires: Requirements::NONE,
    endpoint: None,
    refresh: None,
    data_status: no_status,
    render: render_placeholder,
    reserved: false,
};

const fn reserved(id: &'static str, title: &'static str, category: WidgetCategory) -> WidgetDefinition {
    WidgetDefinition {
        id,
        title,
        category,
        default_grid: GridSize::new(3, 2),
        min_grid: GridSize::new(2, 1),
        description: "Not available in this build.",
        requires: Requirements::NONE,
        endpoint: None,
        refresh: None,
        data_status: no_status,
        render: render_placeholder,
        reserved: true,
    }
}

pub const MARKETS_OVERVIEW: WidgetDefinition =
    reserved("markets-overview", "Markets Overview", WidgetCategory::Markets);
pub const COMMANDS_SUMMARY: WidgetDefinition =
    reserved("commands-summary", "Commands Summary", WidgetCategory::Ops);
pub const INCIDENT_FEED: WidgetDefinition = reserved("incident-feed", "Incident Feed", WidgetCategory::Ops);

#[must_use]
pub fn definitions() -> [WidgetDefinition; 8] {
    [
        SYSTEM_STATUS,
        DEGRADED_COMPONENTS,
        BOTS_OVERVIEW,
        QUICK_NAV,
        PLACEHOLDER,
        MARKETS_OVERVIEW,
        COMMANDS_SUMMARY,
        INCIDENT_FEED,
    ]
}

// ============================================================================
// Data status
// ============================================================================

fn summary_status(payload: &Value) -> Option<HealthStatus> {
    Some(coerce::status_summary(payload).overall_status)
}

fn bots_status(payload: &Value) -> Option<HealthStatus> {
    let summary = coerce::bots_summary(payload);
    Some(if summary.degraded_count() > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    })
}

fn no_status(_: &Value) -> Option<HealthStatus> {
    None
}

// ============================================================================
// Rendering
// ============================================================================

fn clock(ts: i64) -> String {
    DateTime::from_timestamp_millis(ts)
        .map_or_else(|| "--:--:--".to_owned(), |t| t.format("%H:%M:%S").to_string())
}

fn panel_title(props: &WidgetProps<'_>, fallback: &str) -> String {
    props
        .panel
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| fallback.to_owned())
}

/// `None` when there is something to show; otherwise the "unavailable" view.
fn unavailable(props: &WidgetProps<'_>, title: &str, label: &str) -> Option<WidgetView> {
    if !props.data.has_completed() {
        return Some(WidgetView::new(title, "LOADING"));
    }
    if !props.data.result().ok && props.data.last_success().is_none() {
        let mut view = WidgetView::new(title, format!("{label} UNAVAILABLE"));
        if let Some(error) = &props.data.result().error {
            view.notice = Some(error.clone());
        }
        return Some(view);
    }
    None
}

/// Error notice and refresh timestamps shared by polled widgets.
fn footer(props: &WidgetProps<'_>, label: &str, view: &mut WidgetView) {
    let result = props.data.result();
    if !result.ok {
        let error = result.error.as_deref().unwrap_or("request failed");
        view.notice = Some(format!("{label} UNAVAILABLE ({error})"));
    }
    if let CapabilityGate::Degraded { unhealthy } = props.gate {
        view.line(format!("Degraded capabilities: {}", unhealthy.join(", ")));
    }
    view.line(format!("Last refresh: {}", clock(result.ts)));
    if let Some(success) = props.data.last_success() {
        view.line(format!("Last success: {}", clock(success.ts)));
    }
}

fn render_system_status(props: &WidgetProps<'_>) -> WidgetView {
    let title = panel_title(props, SYSTEM_STATUS.title);
    if let Some(view) = unavailable(props, &title, "STATUS") {
        return view;
    }
    let summary = props
        .data
        .source()
        .map(coerce::status_summary)
        .unwrap_or_default();
    let mut view =
        WidgetView::new(&title, summary.overall_status.as_str()).with_status(summary.overall_status);
    if !props.panel.view_spec.compact_mode() {
        let degraded = summary.degraded_components().len();
        view.line(format!(
            "{} components, {degraded} not OK",
            summary.components.len()
        ));
    }
    footer(props, "STATUS", &mut view);
    view
}

fn render_degraded_components(props: &WidgetProps<'_>) -> WidgetView {
    let title = panel_title(props, DEGRADED_COMPONENTS.title);
    if let Some(view) = unavailable(props, &title, "STATUS") {
        return view;
    }
    let summary = props
        .data
        .source()
        .map(coerce::status_summary)
        .unwrap_or_default();
    let degraded = summary.degraded_components();
    let headline = if degraded.is_empty() {
        "No degraded components.".to_owned()
    } else {
        format!("{} degraded", degraded.len())
    };
    let mut view = WidgetView::new(&title, headline).with_status(summary.overall_status);
    let show_badges = props.panel.view_spec.show_badges();
    for component in degraded {
        let mut line = component.name.clone();
        if show_badges {
            line.push_str(&format!(" [{}]", component.status));
        }
        if let Some(reason) = &component.reason {
            line.push_str(&format!(" {reason}"));
        }
        view.line(line);
    }
    footer(props, "STATUS", &mut view);
    view
}

fn render_bots_overview(props: &WidgetProps<'_>) -> WidgetView {
    let title = panel_title(props, BOTS_OVERVIEW.title);
    if let Some(view) = unavailable(props, &title, "BOTS") {
        return view;
    }
    let Some(payload) = props.data.source() else {
        return WidgetView::new(&title, "UNKNOWN").with_status(HealthStatus::Unknown);
    };
    let summary = coerce::bots_summary(payload);
    let degraded = summary.degraded_count();
    let status = if degraded > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };
    let mut view = WidgetView::new(&title, format!("Total {}", summary.total)).with_status(status);
    if let Some(bot) = props.global_filters.bot.as_deref() {
        view.line(format!("Filter: bot {bot}"));
    }
    view.line(format!("Active {}", summary.active_count()));
    view.line(format!("Degraded {degraded}"));
    footer(props, "BOTS", &mut view);
    view
}

fn render_quick_nav(props: &WidgetProps<'_>) -> WidgetView {
    (props.report_quality)(WidgetQuality::new(HealthStatus::Ok, Some(props.mounted_at)));
    let mut view = WidgetView::new(panel_title(props, QUICK_NAV.title), "");
    view.links = QUICK_LINKS
        .iter()
        .map(|(label, href)| NavLink {
            label: (*label).to_owned(),
            href: (*href).to_owned(),
        })
        .collect();
    view
}

fn render_placeholder(props: &WidgetProps<'_>) -> WidgetView {
    let widget_id = props.panel.widget_id.as_str();
    let view = WidgetView::new(panel_title(props, "Placeholder"), "Placeholder");
    if widget_id == PLACEHOLDER_WIDGET_ID {
        view.with_notice("Empty slot. Pick a widget in edit mode.")
    } else {
        view.with_notice(format!("Widget '{widget_id}' is not available in this build."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CapabilitySnapshot;
    use crate::fetch::FetchError;
    use crate::query::WidgetQuery;
    use dashkit_model::{GlobalFilters, GridRect, Panel};
    use serde_json::json;
    use std::cell::Cell;

    struct Harness {
        panel: Panel,
        filters: GlobalFilters,
        capabilities: CapabilitySnapshot,
        gate: CapabilityGate,
        query: WidgetQuery<Value>,
    }

    impl Harness {
        fn new(widget_id: &str) -> Self {
            Self {
                panel: Panel::new("p1", widget_id, GridRect::new(0, 0, 3, 2)),
                filters: GlobalFilters::default(),
                capabilities: CapabilitySnapshot::unknown(),
                gate: CapabilityGate::Enabled,
                query: WidgetQuery::new(0),
            }
        }

        fn poll(&mut self, outcome: Result<Value, FetchError>, ts: i64) {
            let ticket = self.query.begin();
            self.query.complete(ticket, outcome, ts);
        }

        fn render(&self, definition: &WidgetDefinition) -> (WidgetView, Option<WidgetQuality>) {
            let reported = Cell::new(None);
            let report = |q: WidgetQuality| reported.set(Some(q));
            let refresh = || {};
            let props = WidgetProps {
                panel: &self.panel,
                global_filters: &self.filters,
                capabilities: &self.capabilities,
                gate: &self.gate,
                data: &self.query,
                quality: WidgetQuality::default(),
                stale: false,
                now_ms: 0,
                mounted_at: 77,
                refresh_now: &refresh,
                report_quality: &report,
            };
            let view = (definition.render)(&props);
            (view, reported.get())
        }
    }

    #[test]
    fn system_status_unavailable_without_success() {
        let mut h = Harness::new("system-status");
        assert_eq!(h.render(&SYSTEM_STATUS).0.headline, "LOADING");
        h.poll(Err(FetchError::Status { status: 502 }), 10);
        let (view, _) = h.render(&SYSTEM_STATUS);
        assert_eq!(view.headline, "STATUS UNAVAILABLE");
        assert_eq!(view.notice.as_deref(), Some("HTTP 502"));
    }

    #[test]
    fn system_status_keeps_last_good_payload_on_failure() {
        let mut h = Harness::new("system-status");
        h.poll(Ok(json!({"overall_status": "ok", "components": []})), 1_000);
        h.poll(Err(FetchError::Transport("refused".into())), 2_000);
        let (view, _) = h.render(&SYSTEM_STATUS);
        assert_eq!(view.headline, "OK");
        assert_eq!(view.status, Some(HealthStatus::Ok));
        assert_eq!(view.notice.as_deref(), Some("STATUS UNAVAILABLE (refused)"));
        assert!(view.lines.iter().any(|l| l.starts_with("Last success:")));
    }

    #[test]
    fn degraded_components_lists_non_ok() {
        let mut h = Harness::new("degraded-components");
        h.poll(
            Ok(json!({
                "overall_status": "DEGRADED",
                "components": [
                    {"name": "db", "status": "OK"},
                    {"name": "feed", "status": "DOWN", "reason": "stalled"}
                ]
            })),
            1,
        );
        let (view, _) = h.render(&DEGRADED_COMPONENTS);
        assert_eq!(view.headline, "1 degraded");
        assert_eq!(view.lines[0], "feed [DOWN] stalled");
    }

    #[test]
    fn degraded_components_empty_message() {
        let mut h = Harness::new("degraded-components");
        h.poll(Ok(json!({"overall_status": "OK", "components": [{"name": "db", "status": "OK"}]})), 1);
        assert_eq!(h.render(&DEGRADED_COMPONENTS).0.headline, "No degraded components.");
    }

    #[test]
    fn bots_overview_counts() {
        let mut h = Harness::new("bots-overview");
        h.poll(
            Ok(json!({"total": 3, "items": [
                {"state": "RUNNING"}, {"state": "RUNNING", "degraded": true}, {"state": "STOPPED"}
            ]})),
            1,
        );
        let (view, _) = h.render(&BOTS_OVERVIEW);
        assert_eq!(view.headline, "Total 3");
        assert_eq!(view.status, Some(HealthStatus::Degraded));
        assert_eq!(view.lines[..2], ["Active 2".to_owned(), "Degraded 1".to_owned()]);
        assert_eq!(bots_status(&json!({"items": []})), Some(HealthStatus::Ok));
    }

    #[test]
    fn bots_overview_unavailable_label() {
        let mut h = Harness::new("bots-overview");
        h.poll(Err(FetchError::Timeout(Duration::from_secs(7))), 1);
        assert_eq!(h.render(&BOTS_OVERVIEW).0.headline, "BOTS UNAVAILABLE");
    }

    #[test]
    fn quick_nav_reports_ok_at_mount_time() {
        let h = Harness::new("quick-nav");
        let (view, reported) = h.render(&QUICK_NAV);
        assert_eq!(view.links.len(), QUICK_LINKS.len());
        assert_eq!(view.links[0].href, "/bots");
        assert_eq!(reported, Some(WidgetQuality::new(HealthStatus::Ok, Some(77))));
    }

    #[test]
    fn reserved_and_placeholder_render_notices() {
        let h = Harness::new("markets-overview");
        let (view, reported) = h.render(&MARKETS_OVERVIEW);
        assert_eq!(
            view.notice.as_deref(),
            Some("Widget 'markets-overview' is not available in this build.")
        );
        assert_eq!(reported, None);
        let h = Harness::new(PLACEHOLDER_WIDGET_ID);
        assert!(h.render(&PLACEHOLDER).0.notice.unwrap().starts_with("Empty slot"));
    }

    #[test]
    fn custom_panel_title_wins() {
        let mut h = Harness::new("quick-nav");
        h.panel.title = Some("Jump".into());
        assert_eq!(h.render(&QUICK_NAV).0.title, "Jump");
    }
}
