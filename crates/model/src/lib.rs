//! Core data model for the PingMesh cluster.
//!
//! Every type that crosses a crate boundary, the wire, or the store lives
//! here: cluster members, monitor definitions, check results, incidents,
//! join/bootstrap payloads, and the on-disk node configuration.

mod alert;
mod check;
mod config;
mod error;
mod incident;
mod monitor;
mod node;
mod wire;

pub use alert::{AlertChannel, AlertRecord, ChannelKind, EmailConfig, WebhookConfig};
pub use check::{CheckResult, CheckStatus};
pub use config::{Config, CoordinatorConfig, TlsPaths, CONFIG_FILE_NAME, DEFAULT_ADMIN_ADDR, DEFAULT_DATA_DIR, DEFAULT_LISTEN_ADDR};
pub use error::{Error, Result};
pub use incident::{Incident, IncidentStatus};
pub use monitor::{CheckType, Monitor, QuorumType};
pub use node::{Node, NodeRole, NodeStatus};
pub use wire::{
    ClusterStatus, ConfigSync, HealthInfo, Heartbeat, JoinRequest, JoinResponse, JoinToken,
    PeerStatus,
};

/// Current wall-clock time as Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// serde adapter encoding byte slices as standard base64 strings.
///
/// Used for the join-token secret so the envelope stays a compact JSON blob.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
