//! Incident lifecycle types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an incident.
///
/// Transitions are monotonic: `suspect -> confirmed -> resolved`. Only
/// `confirmed` produces operator-visible alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    /// At least one vantage crossed its failure threshold; no quorum yet.
    Suspect,
    /// A quorum of vantages independently observed the failure.
    Confirmed,
    /// A quorum of vantages observed recovery.
    Resolved,
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suspect => write!(f, "suspect"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// A detected outage for one monitor.
///
/// At most one non-resolved incident exists per monitor at any instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Opaque unique id.
    pub id: String,
    /// Monitor this incident belongs to.
    pub monitor_id: String,
    /// Lifecycle state.
    pub status: IncidentStatus,
    /// When the first suspect observation was recorded, Unix milliseconds.
    pub started_at: i64,
    /// Set when (and only when) the incident reached `confirmed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<i64>,
    /// Set when (and only when) the incident reached `resolved`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    /// Vantages that formed the confirming quorum.
    #[serde(default)]
    pub confirming_nodes: Vec<String>,
    /// Creation time, Unix milliseconds.
    pub created_at: i64,
    /// Last update time, Unix milliseconds.
    pub updated_at: i64,
}

impl Incident {
    /// Whether the incident is still open.
    pub fn is_active(&self) -> bool {
        self.status != IncidentStatus::Resolved
    }
}
