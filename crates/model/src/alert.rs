//! Alert channel configuration and delivery journal types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported alert delivery transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// HTTP POST with an optional HMAC signature header.
    Webhook,
    /// SMTP email.
    Email,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Webhook => write!(f, "webhook"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// A configured alert destination. The `config` blob is transport-specific
/// JSON parsed by the dispatcher at delivery time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertChannel {
    /// Opaque unique id.
    #[serde(default)]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Delivery transport.
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    /// Whether the channel receives alerts.
    #[serde(default)]
    pub enabled: bool,
    /// Transport-specific configuration as a JSON string.
    #[serde(default)]
    pub config: String,
    /// Creation time, Unix milliseconds.
    #[serde(default)]
    pub created_at: i64,
    /// Last update time, Unix milliseconds.
    #[serde(default)]
    pub updated_at: i64,
}

/// Webhook channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Destination URL.
    pub url: String,
    /// Optional HMAC-SHA256 signing secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Email channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP server host.
    pub smtp_host: String,
    /// SMTP server port.
    pub smtp_port: u16,
    /// SMTP username.
    #[serde(default)]
    pub username: String,
    /// SMTP password.
    #[serde(default)]
    pub password: String,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
}

/// One entry in the append-only alert delivery journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Store-assigned id (0 until inserted).
    #[serde(default)]
    pub id: i64,
    /// Channel the delivery was attempted on.
    pub channel_id: String,
    /// Incident that triggered the delivery.
    pub incident_id: String,
    /// Monitor the incident belongs to.
    pub monitor_id: String,
    /// `alert`, `recovery`, or `test`.
    pub event_type: String,
    /// `success` or `failed`.
    pub status: String,
    /// Delivery error when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Delivery attempt time, Unix milliseconds.
    pub sent_at: i64,
}
