//! Check execution results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single check execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// The target responded as expected.
    Up,
    /// The target failed the check.
    Down,
    /// The target responded but with a soft failure (e.g. a certificate
    /// close to expiry). Counts as non-`up` for failure streaks.
    Degraded,
}

impl CheckStatus {
    /// Whether this status counts as a success for streak accounting.
    pub fn is_up(self) -> bool {
        self == Self::Up
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// A stored check execution record for one `(monitor, node)` pair.
///
/// Append-only; ids are assigned by the store on insert and timestamps within
/// a pair are non-decreasing from a single scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Store-assigned monotonic id (0 until inserted).
    #[serde(default)]
    pub id: i64,
    /// Monitor this result belongs to.
    pub monitor_id: String,
    /// Vantage that executed the check.
    pub node_id: String,
    /// Verdict.
    pub status: CheckStatus,
    /// Wall-clock latency from just-before-send to just-after-receive,
    /// float milliseconds.
    pub latency_ms: f64,
    /// HTTP status code where applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Diagnostic message for non-`up` results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Checker-specific detail blob (RTT stats, TLS expiry, DNS answers...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Execution completion time, Unix milliseconds.
    pub timestamp: i64,
}
