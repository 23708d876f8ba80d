//! HTTP keyword checks: the body must contain a configured substring.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use pingmesh_model::{CheckStatus, CheckType, Monitor};

use crate::http::build_client;
use crate::{elapsed_ms, normalize_host, CheckOutcome, Checker};

/// Cap on how much of the body is read when searching for the keyword.
const MAX_BODY_BYTES: usize = 1 << 20;

/// HTTP GET whose body must contain `expected_keyword`. A missing keyword is
/// `down` regardless of status code; status codes >= 400 are `down` as well.
pub struct KeywordChecker;

#[async_trait]
impl Checker for KeywordChecker {
    fn check_type(&self) -> CheckType {
        CheckType::HttpKeyword
    }

    async fn check(&self, monitor: &Monitor) -> CheckOutcome {
        let keyword = monitor.expected_keyword.as_deref().unwrap_or("");
        if keyword.is_empty() {
            return CheckOutcome::down("keyword check requires expected_keyword");
        }

        let timeout = Duration::from_millis(monitor.timeout_ms);
        let host = normalize_host(&monitor.target);
        let port = monitor.port.unwrap_or(80);
        let url = format!("http://{host}:{port}/");

        let client = match build_client(timeout) {
            Ok(client) => client,
            Err(e) => return CheckOutcome::down(format!("building http client: {e}")),
        };

        let start = Instant::now();
        let mut response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                return CheckOutcome::down(format!("request failed: {e}"))
                    .with_latency(elapsed_ms(start))
            }
        };
        let latency = elapsed_ms(start);
        let status = response.status().as_u16();

        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if body.len() >= MAX_BODY_BYTES {
                        body.truncate(MAX_BODY_BYTES);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let mut outcome = CheckOutcome::down(format!("reading body: {e}"))
                        .with_latency(latency);
                    outcome.status_code = Some(status);
                    return outcome;
                }
            }
        }

        let keyword_found = String::from_utf8_lossy(&body).contains(keyword);

        let mut outcome = CheckOutcome::up(latency).with_details(json!({
            "status_code": status,
            "keyword_found": keyword_found,
            "body_length": body.len(),
        }));
        outcome.status_code = Some(status);

        if !keyword_found {
            outcome.status = CheckStatus::Down;
            outcome.error = Some(format!("keyword {keyword:?} not found in response"));
        }
        if status >= 400 {
            outcome.status = CheckStatus::Down;
            if outcome.error.is_none() {
                outcome.error = Some(format!("HTTP {status}"));
            }
        }

        outcome
    }
}
