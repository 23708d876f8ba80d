//! Mutual-TLS accept loop for the peer API.
//!
//! Standard TLS-terminating stacks hide the client certificate from the
//! application, but the join endpoint must admit anonymous clients while
//! every other peer route rejects them. This loop terminates TLS itself,
//! inspects the verified client certificate, and serves the router per
//! connection with a [`PeerConn`] extension carrying the result.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Extension, Router};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use x509_cert::der::Decode;
use x509_cert::Certificate;

/// Per-connection peer identity, available to handlers as an extension.
#[derive(Debug, Clone)]
pub struct PeerConn {
    /// Remote socket address.
    pub remote_addr: SocketAddr,
    /// Whether the client presented a certificate verified against the
    /// cluster CA.
    pub authenticated: bool,
    /// Common name of the verified client certificate.
    pub peer_common_name: Option<String>,
}

/// Serve the peer router over mutual TLS until `shutdown` fires.
pub async fn serve_peer(
    listener: TcpListener,
    tls: Arc<rustls::ServerConfig>,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let local = listener.local_addr()?;
    info!(addr = %local, "peer api listening");

    let acceptor = TlsAcceptor::from(tls);
    let tracker = TaskTracker::new();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accepting peer connection failed");
                        continue;
                    }
                };

                let acceptor = acceptor.clone();
                let router = router.clone();
                let conn_shutdown = shutdown.clone();
                tracker.spawn(async move {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(tls_stream) => tls_stream,
                        Err(e) => {
                            debug!(remote = %remote_addr, error = %e, "tls handshake failed");
                            return;
                        }
                    };

                    let conn = peer_conn(remote_addr, tls_stream.get_ref().1);
                    let service =
                        TowerToHyperService::new(router.layer(Extension(conn)));

                    let conn_builder = ConnBuilder::new(TokioExecutor::new());
                    let serving =
                        conn_builder.serve_connection(TokioIo::new(tls_stream), service);
                    tokio::pin!(serving);

                    tokio::select! {
                        result = &mut serving => {
                            if let Err(e) = result {
                                debug!(remote = %remote_addr, error = %e, "peer connection error");
                            }
                        }
                        () = conn_shutdown.cancelled() => {}
                    }
                });
            }
        }
    }

    tracker.close();
    tracker.wait().await;
    info!(addr = %local, "peer api stopped");
    Ok(())
}

fn peer_conn(remote_addr: SocketAddr, session: &rustls::ServerConnection) -> PeerConn {
    let leaf = session
        .peer_certificates()
        .and_then(|certs| certs.first().cloned());

    match leaf {
        // rustls only surfaces certificates that passed CA verification.
        Some(cert) => PeerConn {
            remote_addr,
            authenticated: true,
            peer_common_name: common_name(cert.as_ref()),
        },
        None => PeerConn {
            remote_addr,
            authenticated: false,
            peer_common_name: None,
        },
    }
}

fn common_name(der: &[u8]) -> Option<String> {
    let cert = Certificate::from_der(der).ok()?;
    let subject = cert.tbs_certificate.subject.to_string();
    subject.split(',').find_map(|part| {
        part.trim()
            .strip_prefix("CN=")
            .map(|cn| cn.trim().to_string())
    })
}
