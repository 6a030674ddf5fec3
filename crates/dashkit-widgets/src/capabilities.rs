#![forbid(unsafe_code)]

//! Capability gating.
//!
//! The status summary doubles as a capability map: every component it
//! reports is a capability, healthy or not. Widgets declare what they need
//! and are gated against the latest snapshot before rendering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coerce::StatusSummary;
use crate::status::HealthStatus;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    pub status: HealthStatus,
    pub components: BTreeMap<String, HealthStatus>,
}

impl CapabilitySnapshot {
    /// Nothing known yet.
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_summary(summary: &StatusSummary) -> Self {
        Self {
            status: summary.overall_status,
            components: summary
                .components
                .iter()
                .map(|c| (c.name.clone(), c.status))
                .collect(),
        }
    }

    #[must_use]
    pub fn has(&self, capability: &str) -> bool {
        self.components.contains_key(capability)
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }
}

/// What a widget needs from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requirements {
    /// Overall statuses the widget works under. Empty means any.
    pub status: &'static [HealthStatus],
    /// Components that must be reported by the status summary.
    pub capabilities: &'static [&'static str],
}

impl Requirements {
    pub const NONE: Self = Self {
        status: &[],
        capabilities: &[],
    };

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.status.is_empty() && self.capabilities.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityGate {
    Enabled,
    /// Every required capability exists but some are not OK.
    Degraded { unhealthy: Vec<String> },
    Unavailable { reason: String },
}

impl CapabilityGate {
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Gate `requires` plus any `extra` capability names (a panel's
/// `dataSpec.capabilityGate`) against `snapshot`.
#[must_use]
pub fn gate(snapshot: &CapabilitySnapshot, requires: &Requirements, extra: &[&str]) -> CapabilityGate {
    let needed: Vec<&str> = requires
        .capabilities
        .iter()
        .copied()
        .chain(extra.iter().copied())
        .collect();
    if requires.status.is_empty() && needed.is_empty() {
        return CapabilityGate::Enabled;
    }

    let missing: Vec<&str> = needed
        .iter()
        .copied()
        .filter(|name| !snapshot.has(name))
        .collect();
    if !missing.is_empty() {
        return CapabilityGate::Unavailable {
            reason: format!("missing capability: {}", missing.join(", ")),
        };
    }

    if !requires.status.is_empty() && !requires.status.contains(&snapshot.status) {
        return CapabilityGate::Unavailable {
            reason: format!("platform status is {}", snapshot.status),
        };
    }

    let unhealthy: Vec<String> = needed
        .iter()
        .filter(|name| {
            snapshot
                .components
                .get(**name)
                .is_some_and(|status| !status.is_ok())
        })
        .map(|name| (*name).to_owned())
        .collect();
    if unhealthy.is_empty() {
        CapabilityGate::Enabled
    } else {
        CapabilityGate::Degraded { unhealthy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::status_summary;
    use serde_json::json;

    fn snapshot() -> CapabilitySnapshot {
        CapabilitySnapshot::from_summary(&status_summary(&json!({
            "overall_status": "DEGRADED",
            "components": [
                {"name": "bots", "status": "OK"},
                {"name": "markets", "status": "DOWN"}
            ]
        })))
    }

    #[test]
    fn snapshot_from_summary() {
        let snap = snapshot();
        assert_eq!(snap.status, HealthStatus::Degraded);
        assert_eq!(snap.component_names().collect::<Vec<_>>(), vec!["bots", "markets"]);
    }

    #[test]
    fn no_requirements_is_enabled_even_when_unknown() {
        let gate = gate(&CapabilitySnapshot::unknown(), &Requirements::NONE, &[]);
        assert_eq!(gate, CapabilityGate::Enabled);
    }

    #[test]
    fn missing_capability_is_unavailable() {
        const REQ: Requirements = Requirements {
            status: &[],
            capabilities: &["commands"],
        };
        let result = gate(&snapshot(), &REQ, &[]);
        assert_eq!(
            result,
            CapabilityGate::Unavailable {
                reason: "missing capability: commands".into()
            }
        );
    }

    #[test]
    fn unhealthy_capability_is_degraded() {
        const REQ: Requirements = Requirements {
            status: &[],
            capabilities: &["bots"],
        };
        assert_eq!(gate(&snapshot(), &REQ, &[]), CapabilityGate::Enabled);
        assert_eq!(
            gate(&snapshot(), &REQ, &["markets"]),
            CapabilityGate::Degraded {
                unhealthy: vec!["markets".into()]
            }
        );
    }

    #[test]
    fn disallowed_overall_status_is_unavailable() {
        const REQ: Requirements = Requirements {
            status: &[HealthStatus::Ok],
            capabilities: &[],
        };
        assert!(gate(&snapshot(), &REQ, &[]).is_unavailable());
    }
}
