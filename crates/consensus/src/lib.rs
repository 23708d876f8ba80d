//! Quorum consensus and incident lifecycle (coordinator only).
//!
//! The [`Engine`] is stateless between ticks: every evaluation recomputes
//! failing and recovering vantage sets from the store's streak counters, so
//! repeated ticks over an unchanged store are idempotent.

mod engine;
mod incident;
mod quorum;

pub use engine::Engine;
pub use incident::IncidentManager;
pub use quorum::quorum_met;

use pingmesh_model::{Incident, Monitor};

/// Result type for consensus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for consensus operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Store access failed; the current tick is aborted and the next one
    /// retries.
    #[error(transparent)]
    Store(#[from] pingmesh_store::Error),

    /// Membership lookup failed.
    #[error(transparent)]
    Cluster(#[from] pingmesh_cluster::Error),
}

/// Downstream alert delivery seam.
///
/// The engine calls these exactly once per lifecycle transition and treats
/// delivery as fire-and-forget; `cooldown_ms` on the monitor is advisory
/// metadata for implementations.
pub trait Alerter: Send + Sync {
    /// An incident reached `confirmed`.
    fn on_confirmed(&self, incident: &Incident, monitor: &Monitor);
    /// An incident reached `resolved`.
    fn on_resolved(&self, incident: &Incident, monitor: &Monitor);
}

/// Alerter that drops every notification. Useful in tests and on nodes with
/// no channels configured.
pub struct NoopAlerter;

impl Alerter for NoopAlerter {
    fn on_confirmed(&self, _incident: &Incident, _monitor: &Monitor) {}
    fn on_resolved(&self, _incident: &Incident, _monitor: &Monitor) {}
}
