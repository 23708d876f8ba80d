//! The node's HTTP surfaces.
//!
//! Two listeners with very different trust models:
//!
//! - the **peer API** speaks JSON over mutual TLS on the wildcard-bound peer
//!   port; every route except `join` requires a client certificate verified
//!   against the cluster CA;
//! - the **admin API** binds loopback only and serves the CLI and dashboard
//!   contract (CRUD, status, health, logs, peer probes).

mod admin;
mod error;
mod mtls;
mod peer;

pub use admin::{admin_router, serve_admin, AdminContext, AgentInfo, AlertTester};
pub use error::{ApiError, ApiResult};
pub use mtls::{serve_peer, PeerConn};
pub use peer::{peer_router, PeerContext};
