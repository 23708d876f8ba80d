//! Peer RPC and bootstrap payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Incident, Monitor, Node};

/// Periodic liveness report sent from workers to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Reporting node.
    pub node_id: String,
    /// Send time, RFC 3339.
    pub timestamp: String,
    /// Monitors currently scheduled on the reporting node.
    pub active_monitors: usize,
    /// Estimated check executions per minute on the reporting node.
    pub checks_per_minute: u32,
}

/// Configuration snapshot fanned out from the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSync {
    /// Snapshot version (coordinator wall clock, Unix milliseconds).
    pub version: i64,
    /// Full monitor set.
    pub monitors: Vec<Monitor>,
    /// Full membership view.
    pub nodes: Vec<Node>,
}

/// The decoded contents of a join-token envelope.
///
/// The operator-facing form is base64(JSON) of this structure. Only a hash
/// of `secret` is ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinToken {
    /// Coordinator peer address the new node should contact.
    pub addr: String,
    /// One-time 32-byte secret.
    #[serde(with = "crate::base64_bytes")]
    pub secret: Vec<u8>,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Join request sent by a new node to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    /// The token secret.
    #[serde(with = "crate::base64_bytes")]
    pub secret: Vec<u8>,
    /// Display name of the joining node.
    pub name: String,
    /// Peer listen address the joining node will serve.
    pub listen_addr: String,
    /// Admin listen address of the joining node.
    pub cli_addr: String,
}

/// Credential bundle returned by the coordinator after a successful join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    /// Freshly minted node id.
    pub node_id: String,
    /// PEM-encoded cluster CA certificate.
    pub ca_cert: String,
    /// PEM-encoded node certificate.
    pub node_cert: String,
    /// PEM-encoded node private key.
    pub node_key: String,
    /// The coordinator's node id.
    pub coordinator_id: String,
}

/// Cluster overview returned by the admin `status` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// The answering node.
    pub node_id: String,
    /// The answering node's role.
    pub role: crate::NodeRole,
    /// Full membership view.
    pub nodes: Vec<Node>,
    /// Number of configured monitors.
    pub monitor_count: usize,
    /// Currently open incidents.
    pub active_incidents: Vec<Incident>,
}

/// Reachability probe result for one peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerStatus {
    /// Probed node.
    pub node_id: String,
    /// Probed node's display name.
    pub name: String,
    /// Probed address.
    pub address: String,
    /// Stored liveness state.
    pub status: crate::NodeStatus,
    /// Whether a TCP dial succeeded.
    pub reachable: bool,
    /// Dial latency in float milliseconds when reachable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    /// Dial error when unreachable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Local node health, served by the admin `health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    /// This node's id.
    pub node_id: String,
    /// This node's display name.
    pub name: String,
    /// This node's role.
    pub role: crate::NodeRole,
    /// Agent uptime in whole seconds.
    pub uptime_secs: u64,
    /// Crate version.
    pub version: String,
    /// Monitors currently scheduled.
    pub active_monitors: usize,
    /// Store file size in megabytes.
    pub db_size_mb: f64,
    /// Last heartbeat send time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<String>,
    /// Last config sync time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_config_sync: Option<String>,
    /// Configured coordinator address (workers only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<String>,
    /// Peer reachability probes.
    pub peers: Vec<PeerStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn join_token_secret_roundtrips_as_base64() {
        let token = JoinToken {
            addr: "10.0.0.1:7433".into(),
            secret: vec![1, 2, 3, 250, 251, 252],
            expires_at: Utc.timestamp_opt(2_000_000_000, 0).unwrap(),
        };
        let json = serde_json::to_string(&token).unwrap();
        assert!(json.contains("\"secret\":\"AQID+vv8\""));
        let back: JoinToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back.secret, token.secret);
        assert_eq!(back.expires_at, token.expires_at);
    }
}
