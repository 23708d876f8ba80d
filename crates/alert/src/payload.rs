//! Outbound alert payload shapes.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use pingmesh_model::{Incident, Monitor};

/// JSON body posted to webhook channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// `incident.confirmed` or `incident.resolved`.
    pub event: String,
    /// Send time, RFC 3339.
    pub timestamp: String,
    /// Incident summary.
    pub incident: IncidentDetail,
    /// Monitor summary.
    pub monitor: MonitorSummary,
}

/// Incident fields exposed to alert consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentDetail {
    /// Incident id.
    pub id: String,
    /// Lifecycle state at send time.
    pub status: String,
    /// Start time, RFC 3339.
    pub started_at: String,
    /// Confirmation time, RFC 3339, when confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<String>,
    /// Resolution time, RFC 3339, when resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    /// Outage duration in whole seconds, once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<i64>,
    /// Vantages that confirmed the incident.
    pub confirming_nodes: Vec<String>,
}

/// Monitor fields exposed to alert consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSummary {
    /// Monitor id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Check type label.
    pub check_type: String,
    /// Probe target.
    pub target: String,
    /// Grouping label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Advisory re-alert suppression window, milliseconds.
    pub cooldown_ms: u64,
}

fn rfc3339(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Build the webhook payload for one event.
pub fn build(incident: &Incident, monitor: &Monitor, event_type: &str) -> WebhookPayload {
    let event = if event_type == "recovery" {
        "incident.resolved"
    } else {
        "incident.confirmed"
    };

    WebhookPayload {
        event: event.to_string(),
        timestamp: rfc3339(pingmesh_model::now_ms()),
        incident: IncidentDetail {
            id: incident.id.clone(),
            status: incident.status.to_string(),
            started_at: rfc3339(incident.started_at),
            confirmed_at: incident.confirmed_at.map(rfc3339),
            resolved_at: incident.resolved_at.map(rfc3339),
            duration_sec: incident
                .resolved_at
                .map(|resolved| (resolved - incident.started_at) / 1000),
            confirming_nodes: incident.confirming_nodes.clone(),
        },
        monitor: MonitorSummary {
            id: monitor.id.clone(),
            name: monitor.name.clone(),
            check_type: monitor.check_type.to_string(),
            target: monitor.target.clone(),
            group: monitor.group.clone(),
            cooldown_ms: monitor.cooldown_ms,
        },
    }
}

/// Plain-text body for email channels.
pub fn email_body(incident: &Incident, monitor: &Monitor, event_type: &str) -> String {
    let mut body = format!(
        "PingMesh Alert\n\nEvent: {event_type}\nMonitor: {}\nType: {}\nTarget: {}\nGroup: {}\n\n\
         Incident ID: {}\nStarted At: {}\nConfirming Nodes: {}\n",
        monitor.name,
        monitor.check_type,
        monitor.target,
        monitor.group.as_deref().unwrap_or(""),
        incident.id,
        rfc3339(incident.started_at),
        incident.confirming_nodes.len(),
    );
    if let Some(confirmed) = incident.confirmed_at {
        body.push_str(&format!("Confirmed At: {}\n", rfc3339(confirmed)));
    }
    if let Some(resolved) = incident.resolved_at {
        body.push_str(&format!("Resolved At: {}\n", rfc3339(resolved)));
        body.push_str(&format!(
            "Duration: {}s\n",
            (resolved - incident.started_at) / 1000
        ));
    }
    body
}
