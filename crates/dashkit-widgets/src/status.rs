#![forbid(unsafe_code)]

//! Health status shared by widgets, quality reports, and capabilities.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Down,
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Case-insensitive parse. Anything unrecognized is `Unknown`.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OK" => Self::Ok,
            "DEGRADED" => Self::Degraded,
            "DOWN" => Self::Down,
            _ => Self::Unknown,
        }
    }

    /// Like [`normalize`](Self::normalize), treating a missing value as `Unknown`.
    #[must_use]
    pub fn normalize_opt(raw: Option<&str>) -> Self {
        raw.map_or(Self::Unknown, Self::normalize)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Degraded => "DEGRADED",
            Self::Down => "DOWN",
            Self::Unknown => "UNKNOWN",
        }
    }

    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_case_insensitive() {
        assert_eq!(HealthStatus::normalize("ok"), HealthStatus::Ok);
        assert_eq!(HealthStatus::normalize(" Degraded "), HealthStatus::Degraded);
        assert_eq!(HealthStatus::normalize("DOWN"), HealthStatus::Down);
    }

    #[test]
    fn unrecognized_values_are_unknown() {
        assert_eq!(HealthStatus::normalize("healthy"), HealthStatus::Unknown);
        assert_eq!(HealthStatus::normalize(""), HealthStatus::Unknown);
        assert_eq!(HealthStatus::normalize_opt(None), HealthStatus::Unknown);
    }

    #[test]
    fn serializes_uppercase() {
        let json = serde_json::to_string(&HealthStatus::Degraded).unwrap();
        assert_eq!(json, "\"DEGRADED\"");
        assert_eq!(HealthStatus::Down.to_string(), "DOWN");
    }
}
