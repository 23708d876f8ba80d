//! Webhook delivery with optional HMAC signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use pingmesh_model::{Incident, Monitor, WebhookConfig};

use crate::payload;
use crate::{Error, Result};

/// Signature header carried on signed webhook deliveries.
pub const SIGNATURE_HEADER: &str = "X-PingMesh-Signature";

pub(crate) async fn send(
    client: &reqwest::Client,
    config: &WebhookConfig,
    incident: &Incident,
    monitor: &Monitor,
    event_type: &str,
) -> Result<()> {
    let payload = payload::build(incident, monitor, event_type);
    let body = serde_json::to_vec(&payload).map_err(|e| Error::Delivery(e.to_string()))?;

    let mut request = client
        .post(&config.url)
        .header(reqwest::header::CONTENT_TYPE, "application/json");

    if let Some(secret) = config.secret.as_deref().filter(|s| !s.is_empty()) {
        // Signature covers the exact bytes on the wire.
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|e| Error::Delivery(format!("hmac key: {e}")))?;
        mac.update(&body);
        let signature = hex::encode(mac.finalize().into_bytes());
        request = request.header(SIGNATURE_HEADER, format!("sha256={signature}"));
    }

    let response = request
        .body(body)
        .send()
        .await
        .map_err(|e| Error::Delivery(format!("sending webhook: {e}")))?;

    let status = response.status();
    if status.as_u16() >= 300 {
        return Err(Error::Delivery(format!("webhook returned status {status}")));
    }
    Ok(())
}
