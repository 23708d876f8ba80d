//! Check strategies for PingMesh monitors.
//!
//! One [`Checker`] per check type, dispatched through a constructor-built
//! [`Registry`]. Checkers never return errors and never panic: every failure
//! mode is folded into a [`CheckOutcome`] with `down` (or `degraded`)
//! status so the scheduler can persist it like any other observation.

mod dns;
mod http;
mod icmp;
mod keyword;
mod tcp;
mod tls;

pub use dns::DnsChecker;
pub use http::HttpChecker;
pub use icmp::IcmpChecker;
pub use keyword::KeywordChecker;
pub use tcp::TcpChecker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use pingmesh_model::{CheckStatus, CheckType, Monitor};

/// User agent sent by HTTP-family checkers.
pub const USER_AGENT: &str = concat!("PingMesh/", env!("CARGO_PKG_VERSION"));

/// Outcome of one check attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    /// Verdict.
    pub status: CheckStatus,
    /// Wall-clock latency, float milliseconds.
    pub latency_ms: f64,
    /// HTTP status code where applicable.
    pub status_code: Option<u16>,
    /// Diagnostic message for non-`up` outcomes.
    pub error: Option<String>,
    /// Checker-specific details.
    pub details: Option<serde_json::Value>,
}

impl CheckOutcome {
    /// A successful outcome with the given latency.
    pub fn up(latency_ms: f64) -> Self {
        Self {
            status: CheckStatus::Up,
            latency_ms,
            status_code: None,
            error: None,
            details: None,
        }
    }

    /// A failed outcome with a diagnostic message.
    pub fn down(error: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Down,
            latency_ms: 0.0,
            status_code: None,
            error: Some(error.into()),
            details: None,
        }
    }

    /// Attach a latency measurement.
    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Attach a details blob.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// A single check strategy.
#[async_trait]
pub trait Checker: Send + Sync {
    /// The check type this strategy serves.
    fn check_type(&self) -> CheckType;

    /// Execute one check attempt against the monitor's target.
    ///
    /// Implementations bound their own I/O with the monitor's `timeout_ms`;
    /// the scheduler additionally enforces the deadline from outside.
    async fn check(&self, monitor: &Monitor) -> CheckOutcome;
}

/// Type-to-strategy dispatch table, built at construction time and owned by
/// the agent. Tests inject fakes through [`Registry::register`].
#[derive(Default)]
pub struct Registry {
    checkers: HashMap<CheckType, Arc<dyn Checker>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with all built-in checkers registered.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(IcmpChecker));
        registry.register(Arc::new(TcpChecker));
        registry.register(Arc::new(HttpChecker::new(CheckType::Http)));
        registry.register(Arc::new(HttpChecker::new(CheckType::Https)));
        registry.register(Arc::new(DnsChecker));
        registry.register(Arc::new(KeywordChecker));
        registry
    }

    /// Register (or replace) a checker under its declared type.
    pub fn register(&mut self, checker: Arc<dyn Checker>) {
        self.checkers.insert(checker.check_type(), checker);
    }

    /// Look up the checker for a type.
    pub fn get(&self, check_type: CheckType) -> Option<Arc<dyn Checker>> {
        self.checkers.get(&check_type).cloned()
    }
}

/// Elapsed wall-clock milliseconds since `start`.
pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Strip any scheme prefix and trailing slashes the operator may have pasted
/// into the target field.
pub(crate) fn normalize_host(target: &str) -> &str {
    target
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
}
