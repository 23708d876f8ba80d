//! `pingmesh token new`: mint a one-time join token.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Duration;

use pingmesh_cluster::mint_join_token;
use pingmesh_model::Config;
use pingmesh_store::SqliteStore;

pub fn new_token(data_dir: &Path, ttl_hours: u32, addr: Option<String>) -> Result<()> {
    let config = Config::load(data_dir)?;
    if !config.is_coordinator() {
        bail!("join tokens can only be minted on the coordinator");
    }

    let coordinator_addr = match addr {
        Some(addr) => addr,
        None => {
            let listen = &config.listen_addr;
            if listen.starts_with("0.0.0.0") || listen.starts_with(':') {
                eprintln!(
                    "note: listen address {listen} is a wildcard; pass --addr with an address \
                     workers can reach"
                );
            }
            listen.clone()
        }
    };

    let store = SqliteStore::open(&config.db_path()).context("opening database")?;
    let envelope = mint_join_token(
        &store,
        &coordinator_addr,
        Duration::hours(i64::from(ttl_hours)),
    )?;

    println!("Join token (valid {ttl_hours}h, single use):");
    println!();
    println!("  {envelope}");
    println!();
    println!("On the new node, run:");
    println!("  pingmesh join {envelope}");

    Ok(())
}
