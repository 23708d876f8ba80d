//! Read-only admin commands: status, incidents, history, health, logs,
//! peer probes.

use std::path::Path;

use anyhow::Result;
use serde_json::Value;

use crate::admin_client::AdminClient;

pub async fn status(data_dir: &Path) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    let status = client.get("/api/v1/status").await?;

    println!("Node:     {}", status["node_id"].as_str().unwrap_or("?"));
    println!("Role:     {}", status["role"].as_str().unwrap_or("?"));
    println!("Monitors: {}", status["monitor_count"]);
    println!();

    let nodes = status["nodes"].as_array().cloned().unwrap_or_default();
    println!("{:<38} {:<20} {:<22} {}", "NODE", "NAME", "ADDRESS", "STATUS");
    for node in &nodes {
        println!(
            "{:<38} {:<20} {:<22} {}",
            node["id"].as_str().unwrap_or("?"),
            node["name"].as_str().unwrap_or("?"),
            node["address"].as_str().unwrap_or("?"),
            node["status"].as_str().unwrap_or("?"),
        );
    }

    let incidents = status["active_incidents"].as_array().cloned().unwrap_or_default();
    if !incidents.is_empty() {
        println!();
        println!("Active incidents:");
        for incident in &incidents {
            println!(
                "  {} monitor={} status={}",
                incident["id"].as_str().unwrap_or("?"),
                incident["monitor_id"].as_str().unwrap_or("?"),
                incident["status"].as_str().unwrap_or("?"),
            );
        }
    }
    Ok(())
}

pub async fn incidents(data_dir: &Path, active: bool) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    let path = if active {
        "/api/v1/incidents?active=true"
    } else {
        "/api/v1/incidents"
    };
    print_json(&client.get(path).await?);
    Ok(())
}

pub async fn history(
    data_dir: &Path,
    monitor: Option<String>,
    node: Option<String>,
    limit: u32,
) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    let mut path = format!("/api/v1/history?limit={limit}");
    if let Some(monitor) = monitor {
        path.push_str(&format!("&monitor={monitor}"));
    }
    if let Some(node) = node {
        path.push_str(&format!("&node={node}"));
    }

    let rows = client.get(&path).await?;
    let rows = rows.as_array().cloned().unwrap_or_default();
    if rows.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "{:<26} {:<38} {:<38} {:<10} {}",
        "TIMESTAMP", "MONITOR", "NODE", "STATUS", "LATENCY_MS"
    );
    for row in rows {
        let ts = row["timestamp"].as_i64().unwrap_or(0);
        let rendered = chrono::DateTime::from_timestamp_millis(ts)
            .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
            .unwrap_or_else(|| ts.to_string());
        println!(
            "{:<26} {:<38} {:<38} {:<10} {:.1}",
            rendered,
            row["monitor_id"].as_str().unwrap_or("?"),
            row["node_id"].as_str().unwrap_or("?"),
            row["status"].as_str().unwrap_or("?"),
            row["latency_ms"].as_f64().unwrap_or(0.0),
        );
    }
    Ok(())
}

pub async fn health(data_dir: &Path) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    print_json(&client.get("/api/v1/health").await?);
    Ok(())
}

pub async fn logs(data_dir: &Path, lines: usize) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    let entries = client.get(&format!("/api/v1/logs?lines={lines}")).await?;
    for entry in entries.as_array().cloned().unwrap_or_default() {
        println!(
            "{} {:<5} {} {}",
            entry["time"].as_str().unwrap_or("?"),
            entry["level"].as_str().unwrap_or("?"),
            entry["target"].as_str().unwrap_or("?"),
            entry["message"].as_str().unwrap_or(""),
        );
    }
    Ok(())
}

pub async fn test_peer(data_dir: &Path, node: Option<String>) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    let path = match node {
        Some(node) => format!("/api/v1/test-peer?node={node}"),
        None => "/api/v1/test-peer".to_string(),
    };
    let peers = client.get(&path).await?;

    for peer in peers.as_array().cloned().unwrap_or_default() {
        let reachable = peer["reachable"].as_bool().unwrap_or(false);
        if reachable {
            println!(
                "{} ({}) reachable, {:.1}ms",
                peer["name"].as_str().unwrap_or("?"),
                peer["address"].as_str().unwrap_or("?"),
                peer["latency_ms"].as_f64().unwrap_or(0.0),
            );
        } else {
            println!(
                "{} ({}) UNREACHABLE: {}",
                peer["name"].as_str().unwrap_or("?"),
                peer["address"].as_str().unwrap_or("?"),
                peer["error"].as_str().unwrap_or("unknown"),
            );
        }
    }
    Ok(())
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
