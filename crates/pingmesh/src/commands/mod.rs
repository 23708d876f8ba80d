//! CLI subcommand implementations.

pub mod admin;
pub mod agent;
pub mod alert;
pub mod init;
pub mod join;
pub mod monitor;
pub mod token;

use pingmesh_model::{Error as ModelError, Config};
use std::path::Path;

/// Fail fast when a node is already bootstrapped.
pub(crate) fn ensure_uninitialized(data_dir: &Path) -> anyhow::Result<()> {
    match Config::load(data_dir) {
        Ok(_) => anyhow::bail!(
            "already initialized (config exists at {})",
            data_dir.display()
        ),
        Err(ModelError::NotInitialized(_)) => Ok(()),
        Err(other) => Err(other.into()),
    }
}

/// Node name fallback: the host name, or a fixed label when unavailable.
pub(crate) fn default_node_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "pingmesh-node".to_string())
}
