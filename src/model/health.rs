use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of a liveness probe against one teammate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Alive,
    /// Terminal backend only: process alive but pane content unchanged past
    /// the hung threshold.
    Hung,
    Dead,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Alive => "alive",
            HealthStatus::Hung => "hung",
            HealthStatus::Dead => "dead",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Probe result reported to the caller of the health tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentHealth {
    pub agent_name: String,
    pub status: HealthStatus,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
}

/// Persisted per-agent probe record (`teams/<team>/health.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change_ms: Option<i64>,
}

/// Health probe state for one team: agent name → last observed record.
pub type HealthState = BTreeMap<String, ProbeRecord>;
