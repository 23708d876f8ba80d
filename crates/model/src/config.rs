//! On-disk node configuration (`config.json` in the data directory).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, NodeRole, Result};

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/pingmesh";
/// Default peer API listen address (mutual TLS, wildcard bind).
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:7433";
/// Default admin API listen address (loopback only).
pub const DEFAULT_ADMIN_ADDR: &str = "127.0.0.1:7434";
/// Configuration file name inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Coordinator connection settings carried by worker nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Coordinator peer address (`host:port`).
    pub address: String,
}

/// Paths to the node's TLS material, relative to the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsPaths {
    /// Cluster CA certificate.
    pub ca_path: String,
    /// This node's certificate.
    pub cert_path: String,
    /// This node's private key.
    pub key_path: String,
}

impl Default for TlsPaths {
    fn default() -> Self {
        Self {
            ca_path: "certs/ca.crt".into(),
            cert_path: "certs/node.crt".into(),
            key_path: "certs/node.key".into(),
        }
    }
}

/// Full configuration for one PingMesh node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// This node's id.
    pub node_id: String,
    /// This node's display name.
    pub node_name: String,
    /// This node's role.
    pub role: NodeRole,
    /// Data directory holding the store, certs, and this file.
    pub data_dir: PathBuf,
    /// Peer API listen address.
    pub listen_addr: String,
    /// Admin API listen address.
    pub cli_addr: String,
    /// Coordinator settings (workers only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<CoordinatorConfig>,
    /// TLS material paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsPaths>,
}

impl Config {
    /// Load configuration from `<data_dir>/config.json`.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotInitialized(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let mut cfg: Config = serde_json::from_slice(&data)?;
        if cfg.data_dir.as_os_str().is_empty() {
            cfg.data_dir = data_dir.to_path_buf();
        }
        Ok(cfg)
    }

    /// Write configuration to `<data_dir>/config.json` with mode 600.
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let path = self.data_dir.join(CONFIG_FILE_NAME);
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(&path, data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Path of the SQLite store file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("pingmesh.db")
    }

    /// Path of the certificate directory.
    pub fn certs_dir(&self) -> PathBuf {
        self.data_dir.join("certs")
    }

    /// Whether this node is the cluster coordinator.
    pub fn is_coordinator(&self) -> bool {
        self.role == NodeRole::Coordinator
    }
}
