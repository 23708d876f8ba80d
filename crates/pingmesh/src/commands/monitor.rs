//! `pingmesh monitor`: monitor management through the admin API.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use serde_json::{json, Value};

use crate::admin_client::AdminClient;

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Display name.
    #[arg(long)]
    pub name: String,
    /// Check type: icmp, tcp, http, https, dns, or http_keyword.
    #[arg(long, value_name = "TYPE")]
    pub kind: String,
    /// Target host, IP, or name to probe.
    #[arg(long)]
    pub target: String,
    /// Port (tcp/http-family; selects the upstream resolver for dns).
    #[arg(long)]
    pub port: Option<u16>,
    /// Grouping label.
    #[arg(long)]
    pub group: Option<String>,
    /// Scheduling interval in milliseconds.
    #[arg(long)]
    pub interval_ms: Option<u64>,
    /// Per-attempt timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// Attempts per run.
    #[arg(long)]
    pub retries: Option<u32>,
    /// Expected HTTP status.
    #[arg(long)]
    pub expected_status: Option<u16>,
    /// Keyword the body must contain (http_keyword).
    #[arg(long)]
    pub keyword: Option<String>,
    /// DNS record type: A, AAAA, CNAME, MX, or TXT.
    #[arg(long)]
    pub dns_type: Option<String>,
    /// Expected DNS answer.
    #[arg(long)]
    pub dns_expected: Option<String>,
    /// Consecutive failures before a vantage counts as failing.
    #[arg(long)]
    pub failure_threshold: Option<u32>,
    /// Consecutive successes before a vantage counts as recovered.
    #[arg(long)]
    pub recovery_threshold: Option<u32>,
    /// Quorum type: majority or n_of_m.
    #[arg(long)]
    pub quorum: Option<String>,
    /// Threshold for n_of_m quorums.
    #[arg(long)]
    pub quorum_n: Option<u32>,
}

pub async fn add(data_dir: &Path, args: AddArgs) -> Result<()> {
    let mut body = json!({
        "name": args.name,
        "check_type": args.kind,
        "target": args.target,
    });
    let object = body.as_object_mut().unwrap();
    let mut set = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            object.insert(key.to_string(), value);
        }
    };
    set("port", args.port.map(Value::from));
    set("group", args.group.map(Value::from));
    set("interval_ms", args.interval_ms.map(Value::from));
    set("timeout_ms", args.timeout_ms.map(Value::from));
    set("retries", args.retries.map(Value::from));
    set("expected_status", args.expected_status.map(Value::from));
    set("expected_keyword", args.keyword.map(Value::from));
    set("dns_record_type", args.dns_type.map(Value::from));
    set("dns_expected", args.dns_expected.map(Value::from));
    set(
        "failure_threshold",
        args.failure_threshold.map(Value::from),
    );
    set(
        "recovery_threshold",
        args.recovery_threshold.map(Value::from),
    );
    set("quorum_type", args.quorum.map(Value::from));
    set("quorum_n", args.quorum_n.map(Value::from));

    let client = AdminClient::from_data_dir(data_dir)?;
    let monitor = client.post("/api/v1/monitors", &body).await?;

    println!(
        "Created monitor {} ({})",
        monitor["id"].as_str().unwrap_or("?"),
        monitor["name"].as_str().unwrap_or("?")
    );
    Ok(())
}

pub async fn list(data_dir: &Path, group: Option<String>) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    let path = match group {
        Some(group) => format!("/api/v1/monitors?group={group}"),
        None => "/api/v1/monitors".to_string(),
    };
    let monitors = client.get(&path).await?;

    let list = monitors.as_array().cloned().unwrap_or_default();
    if list.is_empty() {
        println!("No monitors configured.");
        return Ok(());
    }

    println!(
        "{:<38} {:<24} {:<12} {:<28} {}",
        "ID", "NAME", "TYPE", "TARGET", "ENABLED"
    );
    for monitor in list {
        println!(
            "{:<38} {:<24} {:<12} {:<28} {}",
            monitor["id"].as_str().unwrap_or("?"),
            monitor["name"].as_str().unwrap_or("?"),
            monitor["check_type"].as_str().unwrap_or("?"),
            monitor["target"].as_str().unwrap_or("?"),
            monitor["enabled"].as_bool().unwrap_or(false),
        );
    }
    Ok(())
}

pub async fn remove(data_dir: &Path, id: &str) -> Result<()> {
    let client = AdminClient::from_data_dir(data_dir)?;
    client.delete(&format!("/api/v1/monitors/{id}")).await?;
    println!("Deleted monitor {id}");
    Ok(())
}
