//! Persistence contract and SQLite implementation for PingMesh.
//!
//! The [`Store`] trait is the single seam between the control plane and
//! durable state. Operations are synchronous: the backing store serialises
//! writes behind one connection and every call is short, so async callers
//! simply tolerate the brief lock.

mod error;
mod migrations;
mod sqlite;

pub use error::{Error, Result};
pub use sqlite::SqliteStore;

use pingmesh_model::{
    AlertChannel, AlertRecord, CheckResult, Incident, Monitor, Node, NodeStatus,
};

/// Query filter for [`Store::list_check_results`].
#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    /// Restrict to one monitor.
    pub monitor_id: Option<String>,
    /// Restrict to one node.
    pub node_id: Option<String>,
    /// Only results at or after this Unix-millisecond timestamp.
    pub since: Option<i64>,
    /// Maximum number of rows, newest first.
    pub limit: Option<u32>,
}

/// The persistence contract.
///
/// Every method either succeeds or fails with a typed [`Error`]; "not found"
/// is expressed as `Ok(None)` rather than an error. Implementations must
/// provide single-writer atomicity; `validate_and_consume_token` in
/// particular must let at most one caller observe `true` per hash.
pub trait Store: Send + Sync {
    // --- Nodes ---

    /// Insert a new node record.
    fn create_node(&self, node: &Node) -> Result<()>;
    /// Fetch a node by id.
    fn get_node(&self, id: &str) -> Result<Option<Node>>;
    /// All nodes, oldest first.
    fn list_nodes(&self) -> Result<Vec<Node>>;
    /// Overwrite a node record.
    fn update_node(&self, node: &Node) -> Result<()>;
    /// Remove a node record.
    fn delete_node(&self, id: &str) -> Result<()>;
    /// Update liveness fields only.
    fn update_node_status(&self, id: &str, status: NodeStatus, last_seen: i64) -> Result<()>;

    // --- Monitors ---

    /// Insert a new monitor.
    fn create_monitor(&self, monitor: &Monitor) -> Result<()>;
    /// Fetch a monitor by id.
    fn get_monitor(&self, id: &str) -> Result<Option<Monitor>>;
    /// Monitors, optionally filtered by group, ordered by name.
    fn list_monitors(&self, group: Option<&str>) -> Result<Vec<Monitor>>;
    /// Overwrite a monitor.
    fn update_monitor(&self, monitor: &Monitor) -> Result<()>;
    /// Remove a monitor.
    fn delete_monitor(&self, id: &str) -> Result<()>;
    /// Enabled monitors only, ordered by name.
    fn list_enabled_monitors(&self) -> Result<Vec<Monitor>>;

    // --- Check results ---

    /// Append a check result, assigning its id; the caller's timestamp is
    /// preserved.
    fn insert_check_result(&self, result: &CheckResult) -> Result<()>;
    /// Most recent result for a `(monitor, node)` pair.
    fn get_latest_result(&self, monitor_id: &str, node_id: &str) -> Result<Option<CheckResult>>;
    /// Number of contiguous non-`up` results, newest first, bounded by the
    /// scan cap. Zero when the latest result is `up`.
    fn count_consecutive_failures(&self, monitor_id: &str, node_id: &str) -> Result<u32>;
    /// Number of contiguous `up` results, newest first, bounded by the scan
    /// cap.
    fn count_consecutive_successes(&self, monitor_id: &str, node_id: &str) -> Result<u32>;
    /// Filtered result history, newest first.
    fn list_check_results(&self, filter: &ResultFilter) -> Result<Vec<CheckResult>>;

    // --- Incidents ---

    /// Insert a new incident.
    fn create_incident(&self, incident: &Incident) -> Result<()>;
    /// Fetch an incident by id.
    fn get_incident(&self, id: &str) -> Result<Option<Incident>>;
    /// Most recent non-resolved incident for a monitor.
    fn get_active_incident(&self, monitor_id: &str) -> Result<Option<Incident>>;
    /// Overwrite an incident.
    fn update_incident(&self, incident: &Incident) -> Result<()>;
    /// Incidents, newest first; optionally only non-resolved ones.
    fn list_incidents(&self, active_only: bool) -> Result<Vec<Incident>>;

    // --- Join tokens ---

    /// Record a minted token by secret hash.
    fn store_join_token(&self, token_hash: &str, expires_at: i64) -> Result<()>;
    /// Atomically consume a token: returns `true` iff it existed, was unused,
    /// and had not expired. Concurrent callers see at most one `true`.
    fn validate_and_consume_token(&self, token_hash: &str) -> Result<bool>;

    // --- Alert channels ---

    /// Insert a new alert channel.
    fn create_alert_channel(&self, channel: &AlertChannel) -> Result<()>;
    /// Fetch an alert channel by id.
    fn get_alert_channel(&self, id: &str) -> Result<Option<AlertChannel>>;
    /// All alert channels, oldest first.
    fn list_alert_channels(&self) -> Result<Vec<AlertChannel>>;
    /// Enabled alert channels only.
    fn list_enabled_alert_channels(&self) -> Result<Vec<AlertChannel>>;
    /// Overwrite an alert channel.
    fn update_alert_channel(&self, channel: &AlertChannel) -> Result<()>;
    /// Remove an alert channel.
    fn delete_alert_channel(&self, id: &str) -> Result<()>;

    // --- Alert history ---

    /// Append a delivery record.
    fn insert_alert_record(&self, record: &AlertRecord) -> Result<()>;
    /// Delivery history, newest first, optionally for one channel.
    fn list_alert_history(&self, channel_id: Option<&str>, limit: u32) -> Result<Vec<AlertRecord>>;
}
