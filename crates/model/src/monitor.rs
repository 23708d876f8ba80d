//! Monitor definitions: what to check, how often, and when to alert.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// The kind of probe a monitor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    /// ICMP echo.
    Icmp,
    /// TCP connect.
    Tcp,
    /// HTTP GET with status verdict.
    Http,
    /// HTTPS GET with status verdict and leaf-certificate expiry inspection.
    Https,
    /// DNS query against an upstream resolver.
    Dns,
    /// HTTP GET that must contain a keyword in the body.
    HttpKeyword,
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Icmp => write!(f, "icmp"),
            Self::Tcp => write!(f, "tcp"),
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
            Self::Dns => write!(f, "dns"),
            Self::HttpKeyword => write!(f, "http_keyword"),
        }
    }
}

/// How the failing-vantage count is turned into an incident decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuorumType {
    /// Strictly more than half of the online nodes (ties fail).
    #[default]
    Majority,
    /// At least `quorum_n` nodes.
    NOfM,
}

/// A monitoring check configuration.
///
/// Defaults are applied on creation via [`Monitor::apply_defaults`]; the
/// admin API accepts sparse JSON bodies, so most fields carry serde defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    /// Opaque unique id.
    #[serde(default)]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional grouping label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Probe kind.
    pub check_type: CheckType,
    /// Host name, IP address, or URL host to probe.
    pub target: String,
    /// Port for TCP/HTTP-family checks; for DNS, a non-default port selects
    /// the upstream resolver (`target:port`) while `target` stays the query
    /// name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Scheduling interval, milliseconds (clamped to >= 1000).
    #[serde(default)]
    pub interval_ms: u64,
    /// Per-attempt deadline, milliseconds.
    #[serde(default)]
    pub timeout_ms: u64,
    /// Attempts per scheduled run; stops early on the first `up`.
    #[serde(default)]
    pub retries: u32,
    /// Expected HTTP status; when unset, any status below 400 passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<u16>,
    /// Substring the body must contain (`http_keyword` checks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_keyword: Option<String>,
    /// DNS record type to query: A, AAAA, CNAME, MX, or TXT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_record_type: Option<String>,
    /// Expected textual form of some answer record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_expected: Option<String>,
    /// Consecutive non-`up` results a vantage needs before it counts as
    /// failing.
    #[serde(default)]
    pub failure_threshold: u32,
    /// Consecutive `up` results a vantage needs before it counts as
    /// recovered.
    #[serde(default)]
    pub recovery_threshold: u32,
    /// Quorum predicate over the failing/recovered vantage set.
    #[serde(default)]
    pub quorum_type: QuorumType,
    /// Threshold for `n_of_m` quorums.
    #[serde(default)]
    pub quorum_n: u32,
    /// Advisory re-alert suppression window passed through to alert
    /// channels, milliseconds.
    #[serde(default)]
    pub cooldown_ms: u64,
    /// Whether the monitor is scheduled.
    #[serde(default)]
    pub enabled: bool,
    /// Creation time, Unix milliseconds.
    #[serde(default)]
    pub created_at: i64,
    /// Last update time, Unix milliseconds.
    #[serde(default)]
    pub updated_at: i64,
}

impl Monitor {
    /// Minimum scheduling interval.
    pub const MIN_INTERVAL_MS: u64 = 1000;

    /// Fill unset fields with creation defaults and clamp out-of-range
    /// values.
    pub fn apply_defaults(&mut self) {
        if self.interval_ms == 0 {
            self.interval_ms = 60_000;
        }
        if self.interval_ms < Self::MIN_INTERVAL_MS {
            self.interval_ms = Self::MIN_INTERVAL_MS;
        }
        if self.timeout_ms == 0 {
            self.timeout_ms = 5_000;
        }
        if self.retries == 0 {
            self.retries = 1;
        }
        if self.failure_threshold == 0 {
            self.failure_threshold = 3;
        }
        if self.recovery_threshold == 0 {
            self.recovery_threshold = 2;
        }
        if self.cooldown_ms == 0 {
            self.cooldown_ms = 300_000;
        }
    }

    /// The effective scheduling interval after clamping.
    pub fn effective_interval_ms(&self) -> u64 {
        self.interval_ms.max(Self::MIN_INTERVAL_MS)
    }

    /// The effective attempt count (at least one).
    pub fn effective_retries(&self) -> u32 {
        self.retries.max(1)
    }

    /// Reject definitions the engine cannot execute.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("monitor name is required".into()));
        }
        if self.target.trim().is_empty() {
            return Err(Error::Validation("monitor target is required".into()));
        }
        if self.check_type == CheckType::Tcp && self.port.is_none() {
            return Err(Error::Validation("tcp monitors require a port".into()));
        }
        if self.check_type == CheckType::HttpKeyword
            && self.expected_keyword.as_deref().unwrap_or("").is_empty()
        {
            return Err(Error::Validation(
                "http_keyword monitors require expected_keyword".into(),
            ));
        }
        if let Some(rt) = &self.dns_record_type {
            match rt.to_ascii_uppercase().as_str() {
                "A" | "AAAA" | "CNAME" | "MX" | "TXT" => {}
                other => {
                    return Err(Error::Validation(format!(
                        "unsupported dns record type: {other}"
                    )))
                }
            }
        }
        Ok(())
    }
}
