//! Alert dispatch for confirmed and resolved incidents.
//!
//! The [`Dispatcher`] implements the consensus [`Alerter`] seam: each
//! enabled channel gets its own fire-and-forget delivery task, and every
//! attempt lands in the append-only delivery journal. Supported transports
//! are webhooks (JSON payload with optional HMAC-SHA256 signature) and SMTP
//! email.

mod payload;
mod webhook;

pub use payload::{IncidentDetail, MonitorSummary, WebhookPayload};

use std::sync::Arc;
use std::time::Duration;

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{error, info, warn};

use pingmesh_consensus::Alerter;
use pingmesh_model::{
    now_ms, AlertChannel, AlertRecord, ChannelKind, EmailConfig, Incident, Monitor, WebhookConfig,
};
use pingmesh_store::Store;

/// Result type for alert operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for alert operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] pingmesh_store::Error),

    /// The referenced channel does not exist.
    #[error("alert channel not found: {0}")]
    ChannelNotFound(String),

    /// Delivery to the channel's destination failed.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Event labels recorded in the delivery journal.
const EVENT_ALERT: &str = "alert";
const EVENT_RECOVERY: &str = "recovery";
const EVENT_TEST: &str = "test";

/// Dispatches incident notifications to all enabled channels.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn Store>,
    client: reqwest::Client,
}

impl Dispatcher {
    /// Create a dispatcher over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("PingMesh/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { store, client }
    }

    /// Send a test notification through one channel, synchronously.
    pub async fn send_test(&self, channel_id: &str) -> Result<()> {
        let channel = self
            .store
            .get_alert_channel(channel_id)?
            .ok_or_else(|| Error::ChannelNotFound(channel_id.to_string()))?;

        let now = now_ms();
        let incident = Incident {
            id: format!("test-{now}"),
            monitor_id: "test-monitor".into(),
            status: pingmesh_model::IncidentStatus::Confirmed,
            started_at: now - 120_000,
            confirmed_at: Some(now),
            resolved_at: None,
            confirming_nodes: vec!["test-node-1".into(), "test-node-2".into()],
            created_at: now,
            updated_at: now,
        };
        let monitor: Monitor = serde_json::from_value(serde_json::json!({
            "id": "test-monitor",
            "name": "Test Monitor",
            "check_type": "http",
            "target": "example.com",
            "group": "test",
        }))
        .map_err(|e| Error::Delivery(e.to_string()))?;

        let outcome = self
            .deliver(&channel, &incident, &monitor, EVENT_TEST)
            .await;
        self.record(&channel, &incident, &monitor, EVENT_TEST, &outcome);
        outcome
    }

    fn dispatch(&self, incident: &Incident, monitor: &Monitor, event_type: &'static str) {
        let channels = match self.store.list_enabled_alert_channels() {
            Ok(channels) => channels,
            Err(e) => {
                error!(error = %e, "loading alert channels failed");
                return;
            }
        };
        if channels.is_empty() {
            return;
        }

        for channel in channels {
            let dispatcher = self.clone();
            let incident = incident.clone();
            let monitor = monitor.clone();
            tokio::spawn(async move {
                let outcome = dispatcher
                    .deliver(&channel, &incident, &monitor, event_type)
                    .await;
                match &outcome {
                    Ok(()) => info!(
                        channel = %channel.name,
                        kind = %channel.kind,
                        event = event_type,
                        "alert delivered"
                    ),
                    Err(e) => warn!(
                        channel = %channel.name,
                        kind = %channel.kind,
                        error = %e,
                        "alert delivery failed"
                    ),
                }
                dispatcher.record(&channel, &incident, &monitor, event_type, &outcome);
            });
        }
    }

    async fn deliver(
        &self,
        channel: &AlertChannel,
        incident: &Incident,
        monitor: &Monitor,
        event_type: &str,
    ) -> Result<()> {
        match channel.kind {
            ChannelKind::Webhook => {
                let config: WebhookConfig = serde_json::from_str(&channel.config)
                    .map_err(|e| Error::Delivery(format!("parsing webhook config: {e}")))?;
                webhook::send(&self.client, &config, incident, monitor, event_type).await
            }
            ChannelKind::Email => {
                let config: EmailConfig = serde_json::from_str(&channel.config)
                    .map_err(|e| Error::Delivery(format!("parsing email config: {e}")))?;
                self.send_email(&config, incident, monitor, event_type).await
            }
        }
    }

    async fn send_email(
        &self,
        config: &EmailConfig,
        incident: &Incident,
        monitor: &Monitor,
        event_type: &str,
    ) -> Result<()> {
        let (label, state) = if event_type == EVENT_RECOVERY {
            ("RECOVERY", "RECOVERED")
        } else {
            ("ALERT", "DOWN")
        };
        let subject = format!(
            "[PingMesh] {label}: {} ({}) is {state}",
            monitor.name, monitor.target
        );
        let body = payload::email_body(incident, monitor, event_type);

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| Error::Delivery(format!("from address: {e}")))?;
        let to: Mailbox = config
            .to
            .parse()
            .map_err(|e| Error::Delivery(format!("to address: {e}")))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .body(body)
            .map_err(|e| Error::Delivery(format!("building message: {e}")))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| Error::Delivery(format!("smtp relay: {e}")))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        transport
            .send(email)
            .await
            .map_err(|e| Error::Delivery(format!("smtp send: {e}")))?;
        Ok(())
    }

    fn record(
        &self,
        channel: &AlertChannel,
        incident: &Incident,
        monitor: &Monitor,
        event_type: &str,
        outcome: &Result<()>,
    ) {
        let record = AlertRecord {
            id: 0,
            channel_id: channel.id.clone(),
            incident_id: incident.id.clone(),
            monitor_id: monitor.id.clone(),
            event_type: event_type.to_string(),
            status: if outcome.is_ok() { "success" } else { "failed" }.to_string(),
            error: outcome.as_ref().err().map(ToString::to_string),
            sent_at: now_ms(),
        };
        if let Err(e) = self.store.insert_alert_record(&record) {
            error!(error = %e, "recording alert history failed");
        }
    }
}

impl Alerter for Dispatcher {
    fn on_confirmed(&self, incident: &Incident, monitor: &Monitor) {
        info!(
            monitor = %monitor.name,
            target = %monitor.target,
            incident_id = %incident.id,
            confirming = ?incident.confirming_nodes,
            "INCIDENT CONFIRMED"
        );
        self.dispatch(incident, monitor, EVENT_ALERT);
    }

    fn on_resolved(&self, incident: &Incident, monitor: &Monitor) {
        info!(
            monitor = %monitor.name,
            target = %monitor.target,
            incident_id = %incident.id,
            "INCIDENT RESOLVED"
        );
        self.dispatch(incident, monitor, EVENT_RECOVERY);
    }
}
