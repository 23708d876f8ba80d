//! Outbound peer RPC client.
//!
//! JSON over mutual TLS. Heartbeat and config-sync calls are idempotent and
//! safe to retry on the next loop tick; result pushes are best-effort
//! (duplicates are tolerated because result ids are server-assigned and
//! consensus works from streak counts).

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use pingmesh_model::{CheckResult, ConfigSync, Heartbeat, JoinRequest, JoinResponse};

use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Typed client for the peer API.
#[derive(Clone)]
pub struct PeerClient {
    client: reqwest::Client,
}

impl PeerClient {
    /// Client for an enrolled node: pins the cluster CA as the only trust
    /// root and presents this node's certificate.
    pub fn new_mtls(ca_pem: &str, identity_pem: &str) -> Result<Self> {
        let ca = reqwest::Certificate::from_pem(ca_pem.as_bytes())?;
        let identity = reqwest::Identity::from_pem(identity_pem.as_bytes())?;

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .identity(identity)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Client for the join call only. The joining node does not hold the
    /// cluster CA yet, so the coordinator's certificate is accepted
    /// unverified (trust on first use); every later call goes through the
    /// mTLS client.
    pub fn new_join() -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Request cluster admission with a join token.
    pub async fn join(&self, addr: &str, request: &JoinRequest) -> Result<JoinResponse> {
        self.post_json(addr, "/api/v1/peer/join", request).await
    }

    /// Report liveness to a peer.
    pub async fn send_heartbeat(&self, addr: &str, heartbeat: &Heartbeat) -> Result<()> {
        let _: serde_json::Value = self
            .post_json(addr, "/api/v1/peer/heartbeat", heartbeat)
            .await?;
        Ok(())
    }

    /// Push a check result to the coordinator.
    pub async fn push_result(&self, addr: &str, result: &CheckResult) -> Result<()> {
        let _: serde_json::Value = self.post_json(addr, "/api/v1/peer/result", result).await?;
        Ok(())
    }

    /// Push a configuration snapshot to a worker.
    pub async fn push_config_sync(&self, addr: &str, sync: &ConfigSync) -> Result<()> {
        let _: serde_json::Value = self
            .post_json(addr, "/api/v1/peer/config-sync", sync)
            .await?;
        Ok(())
    }

    /// Pull the coordinator's current configuration snapshot.
    pub async fn pull_config_sync(&self, addr: &str) -> Result<ConfigSync> {
        let url = format!("https://{addr}/api/v1/peer/config-sync");
        let response = self.client.get(&url).send().await?;
        Self::decode(response, "/api/v1/peer/config-sync").await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        addr: &str,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("https://{addr}{path}");
        let response = self.client.post(&url).json(body).send().await?;
        Self::decode(response, path).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, path: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let mut body = body.trim().to_string();
            body.truncate(256);
            return Err(Error::PeerStatus {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
