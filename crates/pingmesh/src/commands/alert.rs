//! `pingmesh alert`: alert channel management through the admin API.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use crate::admin_client::AdminClient;

pub async fn list(data_dir: &Path) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    let channels = client.get("/api/v1/alerts/channels").await?;

    let list = channels.as_array().cloned().unwrap_or_default();
    if list.is_empty() {
        println!("No alert channels configured.");
        return Ok(());
    }

    println!("{:<38} {:<20} {:<10} {}", "ID", "NAME", "TYPE", "ENABLED");
    for channel in list {
        println!(
            "{:<38} {:<20} {:<10} {}",
            channel["id"].as_str().unwrap_or("?"),
            channel["name"].as_str().unwrap_or("?"),
            channel["type"].as_str().unwrap_or("?"),
            channel["enabled"].as_bool().unwrap_or(false),
        );
    }
    Ok(())
}

pub async fn add(data_dir: &Path, name: &str, kind: &str, config: &str) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    let channel = client
        .post(
            "/api/v1/alerts/channels",
            &json!({
                "name": name,
                "type": kind,
                "config": config,
            }),
        )
        .await?;
    println!(
        "Created alert channel {} ({})",
        channel["id"].as_str().unwrap_or("?"),
        name
    );
    Ok(())
}

pub async fn remove(data_dir: &Path, id: &str) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    client
        .delete(&format!("/api/v1/alerts/channels/{id}"))
        .await?;
    println!("Deleted alert channel {id}");
    Ok(())
}

pub async fn test(data_dir: &Path, id: &str) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    client
        .post(&format!("/api/v1/alerts/channels/{id}/test"), &json!({}))
        .await?;
    println!("Test alert sent through channel {id}");
    Ok(())
}

pub async fn history(data_dir: &Path, channel: Option<String>, limit: u32) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    let mut path = format!("/api/v1/alerts/history?limit={limit}");
    if let Some(channel) = channel {
        path.push_str(&format!("&channel={channel}"));
    }

    let records = client.get(&path).await?;
    for record in records.as_array().cloned().unwrap_or_default() {
        println!(
            "{} channel={} event={} status={}{}",
            record["sent_at"],
            record["channel_id"].as_str().unwrap_or("?"),
            record["event_type"].as_str().unwrap_or("?"),
            record["status"].as_str().unwrap_or("?"),
            record["error"]
                .as_str()
                .map(|e| format!(" error={e}"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}
