//! Thin client for the local admin API.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use pingmesh_model::Config;

pub struct AdminClient {
    base: String,
    http: reqwest::Client,
}

impl AdminClient {
    /// Build a client against the admin address from this node's config.
    pub fn from_data_dir(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        Ok(Self {
            base: format!("http://{}", config.cli_addr),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .context("building http client")?,
        })
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .context("is the agent running? (`pingmesh agent`)")?;
        Self::decode(response).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}{path}", self.base))
            .json(body)
            .send()
            .await
            .context("is the agent running? (`pingmesh agent`)")?;
        Self::decode(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        let response = self
            .http
            .delete(format!("{}{path}", self.base))
            .send()
            .await
            .context("is the agent running? (`pingmesh agent`)")?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .unwrap_or_else(|_| Value::String("<no body>".into()));
        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            bail!("HTTP {status}: {message}");
        }
        Ok(body)
    }
}
