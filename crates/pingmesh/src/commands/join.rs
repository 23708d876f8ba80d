//! `pingmesh join`: enroll this node in an existing cluster.

use std::path::Path;

use anyhow::{Context, Result};

use pingmesh_cluster::{decode_token, PeerClient};
use pingmesh_model::{
    now_ms, Config, CoordinatorConfig, JoinRequest, Node, NodeRole, NodeStatus, TlsPaths,
};
use pingmesh_store::{SqliteStore, Store};

pub async fn run(
    data_dir: &Path,
    token: &str,
    name: Option<String>,
    listen: &str,
    cli_addr: &str,
) -> Result<()> {
    super::ensure_uninitialized(data_dir)?;

    let token = decode_token(token).context("invalid token")?;
    println!("Coordinator:   {}", token.addr);
    println!("Token expires: {}", token.expires_at.to_rfc3339());

    let node_name = name.unwrap_or_else(super::default_node_name);

    println!("Joining cluster...");
    let client = PeerClient::new_join().context("building join client")?;
    let response = client
        .join(
            &token.addr,
            &JoinRequest {
                secret: token.secret.clone(),
                name: node_name.clone(),
                listen_addr: listen.to_string(),
                cli_addr: cli_addr.to_string(),
            },
        )
        .await
        .context("join failed")?;

    let config = Config {
        node_id: response.node_id.clone(),
        node_name: node_name.clone(),
        role: NodeRole::Worker,
        data_dir: data_dir.to_path_buf(),
        listen_addr: listen.to_string(),
        cli_addr: cli_addr.to_string(),
        coordinator: Some(CoordinatorConfig {
            address: token.addr.clone(),
        }),
        tls: Some(TlsPaths::default()),
    };

    let certs_dir = config.certs_dir();
    std::fs::create_dir_all(&certs_dir).context("creating certs directory")?;
    std::fs::write(certs_dir.join(pingmesh_ca::CA_CERT_FILE), &response.ca_cert)
        .context("writing CA cert")?;
    pingmesh_ca::write_node_cert(&certs_dir, &response.node_cert, &response.node_key)
        .context("writing node cert")?;

    config.save().context("saving config")?;

    let store = SqliteStore::open(&config.db_path()).context("initializing database")?;
    store
        .create_node(&Node {
            id: response.node_id.clone(),
            name: node_name.clone(),
            address: listen.to_string(),
            role: NodeRole::Worker,
            status: NodeStatus::Online,
            last_seen: now_ms(),
            created_at: now_ms(),
        })
        .context("registering node")?;

    println!();
    println!("Joined cluster successfully!");
    println!("  Node ID:      {}", response.node_id);
    println!("  Node Name:    {node_name}");
    println!("  Role:         worker");
    println!("  Data Dir:     {}", data_dir.display());
    println!("  Listen:       {listen}");
    println!("  Coordinator:  {}", token.addr);
    println!();
    println!("Next: run `pingmesh agent` to start this node.");

    Ok(())
}
