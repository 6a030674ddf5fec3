#![forbid(unsafe_code)]

//! Dashboard route state carried in the URL query.
//!
//! Recognized parameters: `pageId`, `focus` (`1` = focus mode), `venue`,
//! `bot`, `symbol`, `range`. Route filters override stored preferences when
//! a session opens.

use url::Url;
use url::form_urlencoded;

use crate::filters::{GlobalFilters, TimeRange, normalize_value};

/// Path the dashboard is mounted at.
pub const DASHBOARD_PATH: &str = "/dashboard";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardRoute {
    pub page_id: Option<String>,
    pub focus: bool,
    pub filters: GlobalFilters,
}

impl DashboardRoute {
    /// Parse a query string, with or without the leading `?`. Unknown keys are
    /// ignored; repeated keys keep the last value.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let mut page_id = None;
        let mut focus = false;
        let (mut venue, mut bot, mut symbol, mut range) = (None, None, None, None);

        let query = query.strip_prefix('?').unwrap_or(query);
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match &*key {
                "pageId" => page_id = normalize_value(Some(&*value)),
                "focus" => focus = value.trim() == "1",
                "venue" => venue = Some(value.into_owned()),
                "bot" => bot = Some(value.into_owned()),
                "symbol" => symbol = Some(value.into_owned()),
                "range" => range = Some(value.into_owned()),
                _ => {}
            }
        }

        Self {
            page_id,
            focus,
            filters: GlobalFilters::new(
                venue.as_deref(),
                bot.as_deref(),
                symbol.as_deref(),
                range.as_deref(),
            ),
        }
    }

    /// Parse an absolute URL or a path such as `/dashboard?pageId=ops`.
    pub fn from_url(raw: &str) -> Result<Self, url::ParseError> {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse("http://localhost")?.join(raw)?
            }
            Err(err) => return Err(err),
        };
        Ok(Self::from_query(url.query().unwrap_or("")))
    }

    /// Encoded query string without the leading `?`; empty when nothing is set.
    #[must_use]
    pub fn to_query(&self) -> String {
        let mut out = form_urlencoded::Serializer::new(String::new());
        if let Some(page_id) = &self.page_id {
            out.append_pair("pageId", page_id);
        }
        if self.focus {
            out.append_pair("focus", "1");
        }
        if let Some(venue) = &self.filters.venue {
            out.append_pair("venue", venue);
        }
        if let Some(bot) = &self.filters.bot {
            out.append_pair("bot", bot);
        }
        if let Some(symbol) = &self.filters.symbol {
            out.append_pair("symbol", symbol);
        }
        if let Some(range) = self.filters.time_range {
            out.append_pair("range", range.as_str());
        }
        out.finish()
    }

    /// `/dashboard` plus the query, if any.
    #[must_use]
    pub fn to_url(&self) -> String {
        let query = self.to_query();
        if query.is_empty() {
            DASHBOARD_PATH.to_owned()
        } else {
            format!("{DASHBOARD_PATH}?{query}")
        }
    }

    #[must_use]
    pub fn with_time_range(mut self, range: Option<TimeRange>) -> Self {
        self.filters.time_range = range;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_known_parameters() {
        let route =
            DashboardRoute::from_query("?pageId=ops&focus=1&venue=binance&bot=alpha&symbol=BTC%2FUSD&range=15m");
        assert_eq!(route.page_id.as_deref(), Some("ops"));
        assert!(route.focus);
        assert_eq!(route.filters.venue.as_deref(), Some("binance"));
        assert_eq!(route.filters.bot.as_deref(), Some("alpha"));
        assert_eq!(route.filters.symbol.as_deref(), Some("BTC/USD"));
        assert_eq!(route.filters.time_range, Some(TimeRange::FifteenMinutes));
    }

    #[test]
    fn blank_and_invalid_values_are_absent() {
        let route = DashboardRoute::from_query("pageId=&focus=yes&venue=%20%20&range=2y&other=1");
        assert_eq!(route, DashboardRoute::default());
    }

    #[test]
    fn builds_url_in_stable_order() {
        let route = DashboardRoute {
            page_id: Some("main".into()),
            focus: true,
            filters: GlobalFilters::new(Some("kraken"), None, Some("ETH USD"), Some("7d")),
        };
        assert_eq!(
            route.to_url(),
            "/dashboard?pageId=main&focus=1&venue=kraken&symbol=ETH+USD&range=7d"
        );
        assert_eq!(DashboardRoute::from_url(&route.to_url()).unwrap(), route);
    }

    #[test]
    fn empty_route_is_bare_path() {
        assert_eq!(DashboardRoute::default().to_url(), "/dashboard");
    }

    #[test]
    fn absolute_urls_are_accepted() {
        let route = DashboardRoute::from_url("https://ops.example/dashboard?bot=b1").unwrap();
        assert_eq!(route.filters.bot.as_deref(), Some("b1"));
    }
}
