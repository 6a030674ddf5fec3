#![forbid(unsafe_code)]

//! Tolerant decoding of upstream payloads.
//!
//! Upstream services disagree on field names, so every lookup walks a fixed
//! precedence list and the first key holding a usable value wins:
//!
//! | Field | Keys, in order |
//! |-------|----------------|
//! | overall status | `overall_status`, `overallStatus`, `status`, `state` |
//! | component list | `components`, `items`, `services` (array, or object keyed by name) |
//! | component name | `name`, `component`, `id` |
//! | component status | `status`, `state`, `health` |
//! | component reason | `reason`, `message`, `detail` |
//! | bot list | root array, else `items`, `bots`, `data`, `results` |
//! | bot total | `total`, `count`, else the list length |
//! | bot state | `state`, `status` |
//! | bot degraded | `degraded`, `is_degraded`, `isDegraded` |
//!
//! Nothing here fails: missing or mistyped fields fall back to empty values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::status::HealthStatus;

const OVERALL_STATUS_KEYS: &[&str] = &["overall_status", "overallStatus", "status", "state"];
const COMPONENT_LIST_KEYS: &[&str] = &["components", "items", "services"];
const COMPONENT_NAME_KEYS: &[&str] = &["name", "component", "id"];
const COMPONENT_STATUS_KEYS: &[&str] = &["status", "state", "health"];
const COMPONENT_REASON_KEYS: &[&str] = &["reason", "message", "detail"];
const BOT_LIST_KEYS: &[&str] = &["items", "bots", "data", "results"];
const BOT_TOTAL_KEYS: &[&str] = &["total", "count"];
const BOT_STATE_KEYS: &[&str] = &["state", "status"];
const BOT_DEGRADED_KEYS: &[&str] = &["degraded", "is_degraded", "isDegraded"];

/// Bot states counted as active.
const ACTIVE_BOT_STATES: &[&str] = &["RUNNING", "ACTIVE", "OK"];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSummary {
    pub overall_status: HealthStatus,
    pub components: Vec<ComponentHealth>,
}

impl StatusSummary {
    /// Components whose status is anything but OK, in payload order.
    #[must_use]
    pub fn degraded_components(&self) -> Vec<&ComponentHealth> {
        self.components
            .iter()
            .filter(|c| !c.status.is_ok())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BotItem {
    pub state: Option<String>,
    pub degraded: bool,
}

impl BotItem {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.as_deref().is_some_and(|state| {
            let upper = state.trim().to_ascii_uppercase();
            ACTIVE_BOT_STATES.contains(&upper.as_str())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BotsSummary {
    pub total: u64,
    pub items: Vec<BotItem>,
}

impl BotsSummary {
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.items.iter().filter(|b| b.is_active()).count()
    }

    #[must_use]
    pub fn degraded_count(&self) -> usize {
        self.items.iter().filter(|b| b.degraded).count()
    }
}

// ============================================================================
// Lookup helpers
// ============================================================================

fn first_str<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn first_u64(map: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// `true`, `"true"`, `"1"` and `1` are truthy; the first present key decides.
fn first_flag(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter()
        .find_map(|key| map.get(*key))
        .is_some_and(|value| match value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_i64() == Some(1),
            Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
            _ => false,
        })
}

fn first_array<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter().find_map(|key| map.get(*key).and_then(Value::as_array))
}

// ============================================================================
// Status summary
// ============================================================================

#[must_use]
pub fn status_summary(payload: &Value) -> StatusSummary {
    let Some(root) = payload.as_object() else {
        return StatusSummary::default();
    };
    StatusSummary {
        overall_status: HealthStatus::normalize_opt(first_str(root, OVERALL_STATUS_KEYS)),
        components: components(root),
    }
}

fn components(root: &Map<String, Value>) -> Vec<ComponentHealth> {
    let Some(list) = COMPONENT_LIST_KEYS
        .iter()
        .find_map(|key| root.get(*key).filter(|v| v.is_array() || v.is_object()))
    else {
        return Vec::new();
    };
    match list {
        Value::Array(items) => items.iter().filter_map(|item| component(None, item)).collect(),
        Value::Object(by_name) => by_name
            .iter()
            .filter_map(|(name, item)| component(Some(name.as_str()), item))
            .collect(),
        _ => Vec::new(),
    }
}

fn component(key_name: Option<&str>, item: &Value) -> Option<ComponentHealth> {
    match item {
        // `{"db": "OK"}`
        Value::String(status) => Some(ComponentHealth {
            name: key_name?.to_owned(),
            status: HealthStatus::normalize(status),
            reason: None,
        }),
        Value::Object(fields) => {
            let name = first_str(fields, COMPONENT_NAME_KEYS)
                .or(key_name)
                .filter(|n| !n.is_empty())?;
            Some(ComponentHealth {
                name: name.to_owned(),
                status: HealthStatus::normalize_opt(first_str(fields, COMPONENT_STATUS_KEYS)),
                reason: first_str(fields, COMPONENT_REASON_KEYS).map(str::to_owned),
            })
        }
        _ => None,
    }
}

// ============================================================================
// Bots
// ============================================================================

#[must_use]
pub fn bots_summary(payload: &Value) -> BotsSummary {
    let (items, root) = match payload {
        Value::Array(items) => (Some(items), None),
        Value::Object(root) => (first_array(root, BOT_LIST_KEYS), Some(root)),
        _ => (None, None),
    };
    let items: Vec<BotItem> = items
        .map(|items| items.iter().filter_map(Value::as_object).map(bot_item).collect())
        .unwrap_or_default();
    let total = root
        .and_then(|root| first_u64(root, BOT_TOTAL_KEYS))
        .unwrap_or(items.len() as u64);
    BotsSummary { total, items }
}

fn bot_item(fields: &Map<String, Value>) -> BotItem {
    BotItem {
        state: first_str(fields, BOT_STATE_KEYS).map(str::to_owned),
        degraded: first_flag(fields, BOT_DEGRADED_KEYS),
    }
}
