//! Applying configuration snapshots to the local store.

use tracing::{info, warn};

use pingmesh_model::ConfigSync;
use pingmesh_store::Store;

use crate::Result;

/// Upsert the monitors and nodes of a snapshot into the local store.
///
/// Used both by workers applying a coordinator push and by the pull loop.
/// Individual row failures are logged and skipped so one bad entry cannot
/// block the rest of the snapshot. Returns `(monitors, nodes)` applied.
pub fn apply_config_sync(store: &dyn Store, sync: &ConfigSync) -> Result<(usize, usize)> {
    let mut monitors_applied = 0;
    for monitor in &sync.monitors {
        let result = match store.get_monitor(&monitor.id)? {
            Some(_) => store.update_monitor(monitor),
            None => store.create_monitor(monitor),
        };
        match result {
            Ok(()) => monitors_applied += 1,
            Err(e) => warn!(monitor_id = %monitor.id, error = %e, "config-sync: monitor upsert failed"),
        }
    }

    let mut nodes_applied = 0;
    for node in &sync.nodes {
        let result = match store.get_node(&node.id)? {
            Some(_) => store.update_node(node),
            None => store.create_node(node),
        };
        match result {
            Ok(()) => nodes_applied += 1,
            Err(e) => warn!(node_id = %node.id, error = %e, "config-sync: node upsert failed"),
        }
    }

    info!(
        version = sync.version,
        monitors = monitors_applied,
        nodes = nodes_applied,
        "config-sync applied"
    );
    Ok((monitors_applied, nodes_applied))
}
