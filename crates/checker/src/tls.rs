//! Leaf-certificate inspection for HTTPS checks.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rustls::pki_types::ServerName;
use rustls::RootCertStore;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use x509_cert::der::Decode;
use x509_cert::Certificate;

/// Validity summary of a server's leaf certificate.
pub(crate) struct LeafCertInfo {
    /// Whole days until `notAfter` (negative once expired).
    pub expiry_days: i64,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Subject distinguished name.
    pub subject: String,
}

/// Handshake with `host:port` and summarise the presented leaf certificate.
///
/// Best-effort: any failure returns `None` and the HTTP verdict stands on its
/// own. The request that produced the verdict has already exercised the
/// chain; this second connection only exists to read the certificate, which
/// the HTTP client API does not expose.
pub(crate) async fn inspect_leaf_certificate(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Option<LeafCertInfo> {
    match tokio::time::timeout(timeout, handshake_and_parse(host, port)).await {
        Ok(Some(info)) => Some(info),
        Ok(None) => None,
        Err(_) => {
            debug!(host, port, "tls inspection timed out");
            None
        }
    }
}

async fn handshake_and_parse(host: &str, port: u16) -> Option<LeafCertInfo> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .ok()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_string()).ok()?;
    let stream = TcpStream::connect((host, port)).await.ok()?;
    let tls = TlsConnector::from(Arc::new(config))
        .connect(server_name, stream)
        .await
        .ok()?;

    let (_, session) = tls.get_ref();
    let leaf = session.peer_certificates()?.first()?;
    let cert = Certificate::from_der(leaf.as_ref()).ok()?;

    let validity = &cert.tbs_certificate.validity;
    let not_after = validity.not_after.to_unix_duration().as_secs() as i64;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    Some(LeafCertInfo {
        expiry_days: (not_after - now) / 86_400,
        issuer: cert.tbs_certificate.issuer.to_string(),
        subject: cert.tbs_certificate.subject.to_string(),
    })
}
