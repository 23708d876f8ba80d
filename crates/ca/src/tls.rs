//! rustls configuration assembly from on-disk PEM material.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};

use crate::{Error, Result, CA_CERT_FILE, NODE_CERT_FILE, NODE_KEY_FILE};

/// The PEM material a node needs for peer TLS.
#[derive(Clone)]
pub struct TlsMaterial {
    /// Cluster CA certificate.
    pub ca_pem: String,
    /// This node's certificate.
    pub cert_pem: String,
    /// This node's private key.
    pub key_pem: String,
}

impl TlsMaterial {
    /// Load the standard file layout from a certs directory.
    pub fn load(certs_dir: &Path) -> Result<Self> {
        Ok(Self {
            ca_pem: fs::read_to_string(certs_dir.join(CA_CERT_FILE))?,
            cert_pem: fs::read_to_string(certs_dir.join(NODE_CERT_FILE))?,
            key_pem: fs::read_to_string(certs_dir.join(NODE_KEY_FILE))?,
        })
    }
}

/// Concatenated certificate + key PEM, the form HTTP client identities
/// consume.
pub fn client_identity_pem(material: &TlsMaterial) -> String {
    format!("{}{}", material.cert_pem, material.key_pem)
}

fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<std::io::Result<_>>()
        .map_err(|e| Error::Pem(format!("parsing certificates: {e}")))?;
    if certs.is_empty() {
        return Err(Error::Pem("no certificates in pem".into()));
    }
    Ok(certs)
}

fn parse_key(pem: &str) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut pem.as_bytes())
        .map_err(|e| Error::Pem(format!("parsing private key: {e}")))?
        .ok_or_else(|| Error::Pem("no private key in pem".into()))
}

/// Build the peer server's TLS configuration.
///
/// Client certificates are verified against the cluster CA when presented.
/// Anonymous clients are admitted at the TLS layer so the join endpoint
/// stays reachable; every other peer route rejects them at the HTTP layer.
pub fn server_tls_config(material: &TlsMaterial) -> Result<ServerConfig> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certs(&material.ca_pem)? {
        roots
            .add(cert)
            .map_err(|e| Error::Pem(format!("adding ca root: {e}")))?;
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .allow_unauthenticated()
        .build()?;

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_client_cert_verifier(verifier)
        .with_single_cert(parse_certs(&material.cert_pem)?, parse_key(&material.key_pem)?)?;

    Ok(config)
}
