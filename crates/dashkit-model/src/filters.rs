#![forbid(unsafe_code)]

//! Global filter state shared by every widget on a page.
//!
//! Values are trimmed and empty strings collapse to `None`. The stored
//! preferences form writes absent values as `""` and is read tolerantly: a
//! corrupted or partial record yields whatever fields could be recovered.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
}

impl TimeRange {
    pub const ALL: [TimeRange; 4] = [
        Self::FifteenMinutes,
        Self::OneHour,
        Self::OneDay,
        Self::SevenDays,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
            Self::SevenDays => "7d",
        }
    }

    /// Parse a trimmed range token; anything else is `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == raw.trim())
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page-wide filters passed to every widget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GlobalFilters {
    pub venue: Option<String>,
    pub bot: Option<String>,
    pub symbol: Option<String>,
    pub time_range: Option<TimeRange>,
}

/// Trim, mapping empty to `None`.
#[must_use]
pub fn normalize_value(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

impl GlobalFilters {
    #[must_use]
    pub fn new(
        venue: Option<&str>,
        bot: Option<&str>,
        symbol: Option<&str>,
        time_range: Option<&str>,
    ) -> Self {
        Self {
            venue: normalize_value(venue),
            bot: normalize_value(bot),
            symbol: normalize_value(symbol),
            time_range: time_range.and_then(TimeRange::parse),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.venue.is_none()
            && self.bot.is_none()
            && self.symbol.is_none()
            && self.time_range.is_none()
    }

    /// Overlay `over` on top of `self`; fields set in `over` win.
    #[must_use]
    pub fn merged_with(&self, over: &GlobalFilters) -> Self {
        Self {
            venue: over.venue.clone().or_else(|| self.venue.clone()),
            bot: over.bot.clone().or_else(|| self.bot.clone()),
            symbol: over.symbol.clone().or_else(|| self.symbol.clone()),
            time_range: over.time_range.or(self.time_range),
        }
    }

    /// Preferences record: `{venue, bot, symbol, timeRange}` with `""` for
    /// absent values.
    #[must_use]
    pub fn to_storage_value(&self) -> Value {
        json!({
            "venue": self.venue.as_deref().unwrap_or(""),
            "bot": self.bot.as_deref().unwrap_or(""),
            "symbol": self.symbol.as_deref().unwrap_or(""),
            "timeRange": self.time_range.map(TimeRange::as_str).unwrap_or(""),
        })
    }

    #[must_use]
    pub fn to_storage_string(&self) -> String {
        self.to_storage_value().to_string()
    }

    /// Tolerant read of a preferences record. Non-objects give empty filters;
    /// non-string fields are ignored.
    #[must_use]
    pub fn from_storage_value(value: &Value) -> Self {
        let field = |key: &str| value.get(key).and_then(Value::as_str);
        Self::new(
            field("venue"),
            field("bot"),
            field("symbol"),
            field("timeRange"),
        )
    }

    /// Tolerant parse of the stored string form. Corrupted JSON yields empty
    /// filters.
    #[must_use]
    pub fn from_storage_str(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_storage_value(&value),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring corrupted filter preferences");
                Self::default()
            }
        }
    }
}
