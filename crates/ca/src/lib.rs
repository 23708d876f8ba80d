//! Internal certificate authority for the PingMesh cluster.
//!
//! The coordinator generates a self-signed ECDSA P-256 root at `init` and
//! issues every node certificate from it. The CA key stays on the
//! coordinator's disk (mode 600) and is never part of any RPC payload; peers
//! receive only the CA certificate as their trust root.

mod error;
mod issue;
mod tls;

pub use error::{Error, Result};
pub use issue::{init_ca, issue_node_cert, write_node_cert, CA_CERT_FILE, CA_KEY_FILE, NODE_CERT_FILE, NODE_KEY_FILE};
pub use tls::{client_identity_pem, server_tls_config, TlsMaterial};
