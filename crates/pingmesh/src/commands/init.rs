//! `pingmesh init`: bootstrap a coordinator.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use uuid::Uuid;

use pingmesh_model::{
    now_ms, Config, Node, NodeRole, NodeStatus, TlsPaths, DEFAULT_ADMIN_ADDR,
};
use pingmesh_store::{SqliteStore, Store};

pub fn run(data_dir: &Path, listen: &str, name: Option<String>) -> Result<()> {
    super::ensure_uninitialized(data_dir)?;

    let node_name = name.unwrap_or_else(super::default_node_name);
    let node_id = Uuid::new_v4().to_string();

    let config = Config {
        node_id: node_id.clone(),
        node_name: node_name.clone(),
        role: NodeRole::Coordinator,
        data_dir: data_dir.to_path_buf(),
        listen_addr: listen.to_string(),
        cli_addr: DEFAULT_ADMIN_ADDR.to_string(),
        coordinator: None,
        tls: Some(TlsPaths::default()),
    };

    std::fs::create_dir_all(data_dir).context("creating data directory")?;

    let certs_dir = config.certs_dir();
    println!("Generating internal CA...");
    pingmesh_ca::init_ca(&certs_dir).context("generating CA")?;

    println!("Generating coordinator certificate...");
    let sans = cert_sans(listen);
    let (cert, key) =
        pingmesh_ca::issue_node_cert(&certs_dir, &node_id, &sans).context("issuing node cert")?;
    pingmesh_ca::write_node_cert(&certs_dir, &cert, &key).context("writing node cert")?;

    config.save().context("saving config")?;

    let store = SqliteStore::open(&config.db_path()).context("initializing database")?;
    store
        .create_node(&Node {
            id: node_id.clone(),
            name: node_name.clone(),
            address: listen.to_string(),
            role: NodeRole::Coordinator,
            status: NodeStatus::Online,
            last_seen: now_ms(),
            created_at: now_ms(),
        })
        .context("registering node")?;

    println!();
    println!("PingMesh initialized successfully!");
    println!("  Node ID:    {node_id}");
    println!("  Node Name:  {node_name}");
    println!("  Role:       coordinator");
    println!("  Data Dir:   {}", data_dir.display());
    println!("  Listen:     {listen}");
    println!();
    println!("Next steps:");
    println!("  1. Start the agent:     pingmesh agent");
    println!("  2. Add a monitor:       pingmesh monitor add --name 'My Site' --kind http --target example.com");
    println!("  3. Mint a join token:   pingmesh token new");

    Ok(())
}

/// The coordinator certificate covers loopback plus any concrete listen
/// host.
fn cert_sans(listen: &str) -> Vec<String> {
    let mut sans = vec!["127.0.0.1".to_string()];
    if let Some((host, _)) = listen.rsplit_once(':') {
        match host.parse::<IpAddr>() {
            Ok(ip) if !ip.is_loopback() && !ip.is_unspecified() => sans.push(host.to_string()),
            Ok(_) => {}
            Err(_) if !host.is_empty() => sans.push(host.to_string()),
            Err(_) => {}
        }
    }
    sans
}
