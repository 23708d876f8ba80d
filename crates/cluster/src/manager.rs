//! Cluster membership view and liveness bookkeeping.

use std::sync::Arc;

use tracing::info;

use pingmesh_model::{now_ms, Node, NodeStatus};
use pingmesh_store::Store;

use crate::Result;

/// Membership and liveness over the store's node table.
#[derive(Clone)]
pub struct Manager {
    store: Arc<dyn Store>,
}

impl Manager {
    /// Create a manager over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Nodes currently counted as consensus vantages.
    pub fn online_nodes(&self) -> Result<Vec<Node>> {
        let nodes = self.store.list_nodes()?;
        Ok(nodes.into_iter().filter(Node::is_online).collect())
    }

    /// Record a heartbeat: mark the node online now.
    pub fn update_heartbeat(&self, node_id: &str) -> Result<()> {
        self.store
            .update_node_status(node_id, NodeStatus::Online, now_ms())?;
        Ok(())
    }

    /// Transition every online node not seen within `timeout_ms` to offline.
    /// Returns the nodes that transitioned.
    pub fn detect_offline(&self, timeout_ms: i64) -> Result<Vec<Node>> {
        let cutoff = now_ms() - timeout_ms;
        let mut transitioned = Vec::new();

        for node in self.store.list_nodes()? {
            if node.status == NodeStatus::Online && node.last_seen < cutoff {
                info!(node_id = %node.id, name = %node.name, "marking node offline");
                self.store
                    .update_node_status(&node.id, NodeStatus::Offline, node.last_seen)?;
                transitioned.push(node);
            }
        }
        Ok(transitioned)
    }
}
