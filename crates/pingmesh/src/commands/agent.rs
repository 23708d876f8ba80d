//! `pingmesh agent`: run the node daemon.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use pingmesh_agent::Agent;
use pingmesh_alert::Dispatcher;
use pingmesh_ca::{client_identity_pem, server_tls_config, TlsMaterial};
use pingmesh_checker::Registry;
use pingmesh_cluster::PeerClient;
use pingmesh_logbuf::LogBuffer;
use pingmesh_model::Config;
use pingmesh_server::{
    admin_router, peer_router, serve_admin, serve_peer, AdminContext, AgentInfo, AlertTester,
    PeerContext,
};
use pingmesh_store::{SqliteStore, Store};

struct AgentInfoAdapter(Agent);

impl AgentInfo for AgentInfoAdapter {
    fn uptime_secs(&self) -> u64 {
        self.0.uptime_secs()
    }

    fn last_heartbeat(&self) -> Option<i64> {
        self.0.last_heartbeat()
    }

    fn last_config_sync(&self) -> Option<i64> {
        self.0.last_config_sync()
    }

    fn active_monitors(&self) -> usize {
        self.0.active_monitors()
    }
}

struct AlertTesterAdapter(Arc<Dispatcher>);

#[async_trait]
impl AlertTester for AlertTesterAdapter {
    async fn send_test(&self, channel_id: &str) -> Result<(), String> {
        self.0.send_test(channel_id).await.map_err(|e| e.to_string())
    }
}

pub async fn run(data_dir: &Path) -> Result<()> {
    // Pin the TLS provider before any rustls config is built.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let logbuf = LogBuffer::default();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .with(logbuf.layer())
        .init();

    let config = Arc::new(Config::load(data_dir)?);
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.db_path()).context("opening database")?,
    );

    let dispatcher = Arc::new(Dispatcher::new(store.clone()));

    let tls_material = match TlsMaterial::load(&config.certs_dir()) {
        Ok(material) => Some(material),
        Err(e) => {
            warn!(error = %e, "no TLS material; peer API and result push disabled");
            None
        }
    };
    let peer_client = tls_material.as_ref().and_then(|material| {
        PeerClient::new_mtls(&material.ca_pem, &client_identity_pem(material))
            .map_err(|e| error!(error = %e, "building peer client failed"))
            .ok()
    });

    let agent = Agent::new(
        config.clone(),
        store.clone(),
        Registry::with_builtin(),
        dispatcher.clone(),
        peer_client,
    );

    let shutdown = CancellationToken::new();

    // Admin API (loopback).
    let admin_ctx = AdminContext::new(config.clone(), store.clone())
        .with_logbuf(logbuf)
        .with_agent_info(Arc::new(AgentInfoAdapter(agent.clone())))
        .with_alert_tester(Arc::new(AlertTesterAdapter(dispatcher)));
    let admin_listener = TcpListener::bind(&config.cli_addr)
        .await
        .with_context(|| format!("binding admin api on {}", config.cli_addr))?;
    tokio::spawn(serve_admin(
        admin_listener,
        admin_router(admin_ctx),
        shutdown.clone(),
    ));

    // Peer API (mutual TLS) once the node holds certificates.
    if let Some(material) = &tls_material {
        let tls = Arc::new(server_tls_config(material).context("assembling peer tls")?);
        let peer_listener = TcpListener::bind(&config.listen_addr)
            .await
            .with_context(|| format!("binding peer api on {}", config.listen_addr))?;
        let router = peer_router(PeerContext::new(config.clone(), store.clone()));
        tokio::spawn(serve_peer(peer_listener, tls, router, shutdown.clone()));
    }

    agent.start();

    wait_for_shutdown_signal().await;

    shutdown.cancel();
    agent.stop().await;
    // The store closes when the last Arc drops, after every loop has
    // observed cancellation.
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("installing SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c");
    }
}
