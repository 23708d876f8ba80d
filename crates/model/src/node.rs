//! Cluster member types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// The single coordination point: holds the CA key, runs consensus.
    Coordinator,
    /// A checking vantage that reads config from and pushes results to the
    /// coordinator.
    #[default]
    Worker,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinator => write!(f, "coordinator"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

/// Liveness state of a node, driven by heartbeats and the offline sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Heartbeating within the grace window.
    #[default]
    Online,
    /// Missed heartbeats past the grace window.
    Offline,
    /// Reachable but not trusted for consensus.
    Suspect,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Suspect => write!(f, "suspect"),
        }
    }
}

/// A member of the PingMesh cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Opaque unique id, generated when the node is initialized or joins.
    pub id: String,
    /// Display name (defaults to the host name at bootstrap).
    pub name: String,
    /// `host:port` of the node's peer API endpoint.
    pub address: String,
    /// Role in the cluster.
    pub role: NodeRole,
    /// Liveness state.
    pub status: NodeStatus,
    /// Last heartbeat, Unix milliseconds.
    pub last_seen: i64,
    /// Creation time, Unix milliseconds.
    pub created_at: i64,
}

impl Node {
    /// Whether this node currently counts as a consensus vantage.
    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_and_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&NodeRole::Coordinator).unwrap(),
            "\"coordinator\""
        );
        assert_eq!(serde_json::to_string(&NodeRole::Worker).unwrap(), "\"worker\"");
        assert_eq!(
            serde_json::to_string(&NodeStatus::Offline).unwrap(),
            "\"offline\""
        );
        let role: NodeRole = serde_json::from_str("\"worker\"").unwrap();
        assert_eq!(role, NodeRole::Worker);
    }
}
