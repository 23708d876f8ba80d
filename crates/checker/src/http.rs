//! HTTP and HTTPS status checks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use pingmesh_model::{CheckStatus, CheckType, Monitor};

use crate::tls::inspect_leaf_certificate;
use crate::{elapsed_ms, normalize_host, CheckOutcome, Checker, USER_AGENT};

/// Leaf certificates closer to expiry than this degrade the check.
const TLS_EXPIRY_WARN_DAYS: i64 = 7;

/// `GET scheme://target[:port]/` with a status-code verdict; the HTTPS
/// variant additionally inspects the leaf certificate's remaining lifetime.
pub struct HttpChecker {
    check_type: CheckType,
}

impl HttpChecker {
    /// Build a checker for `CheckType::Http` or `CheckType::Https`.
    pub fn new(check_type: CheckType) -> Self {
        debug_assert!(matches!(check_type, CheckType::Http | CheckType::Https));
        Self { check_type }
    }

    fn scheme(&self) -> &'static str {
        match self.check_type {
            CheckType::Https => "https",
            _ => "http",
        }
    }
}

pub(crate) fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .pool_max_idle_per_host(0)
        .user_agent(USER_AGENT)
        .build()
}

/// Status verdict shared by the plain and keyword HTTP checkers: an explicit
/// expectation must match exactly; otherwise anything below 400 passes.
pub(crate) fn status_verdict(status: u16, expected: Option<u16>) -> Option<String> {
    match expected {
        Some(want) if status != want => Some(format!("expected status {want}, got {status}")),
        Some(_) => None,
        None if status >= 400 => Some(format!("HTTP {status}")),
        None => None,
    }
}

#[async_trait]
impl Checker for HttpChecker {
    fn check_type(&self) -> CheckType {
        self.check_type
    }

    async fn check(&self, monitor: &Monitor) -> CheckOutcome {
        let timeout = Duration::from_millis(monitor.timeout_ms);
        let host = normalize_host(&monitor.target);
        let port = monitor.port.unwrap_or(match self.check_type {
            CheckType::Https => 443,
            _ => 80,
        });
        let url = format!("{}://{host}:{port}/", self.scheme());

        let client = match build_client(timeout) {
            Ok(client) => client,
            Err(e) => return CheckOutcome::down(format!("building http client: {e}")),
        };

        let start = Instant::now();
        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                return CheckOutcome::down(format!("request failed: {e}"))
                    .with_latency(elapsed_ms(start))
            }
        };
        let latency = elapsed_ms(start);
        let status = response.status().as_u16();
        drop(response);

        let mut details = json!({ "status_code": status });
        let mut outcome = CheckOutcome::up(latency);
        outcome.status_code = Some(status);

        if let Some(reason) = status_verdict(status, monitor.expected_status) {
            outcome.status = CheckStatus::Down;
            outcome.error = Some(reason);
        }

        if self.check_type == CheckType::Https {
            if let Some(tls) = inspect_leaf_certificate(host, port, timeout).await {
                details["tls_expiry_days"] = json!(tls.expiry_days);
                details["tls_issuer"] = json!(tls.issuer);
                details["tls_subject"] = json!(tls.subject);

                if tls.expiry_days < TLS_EXPIRY_WARN_DAYS && outcome.status == CheckStatus::Up {
                    outcome.status = CheckStatus::Degraded;
                    outcome.error = Some(format!(
                        "TLS certificate expires in {} days",
                        tls.expiry_days
                    ));
                }
            }
        }

        outcome.with_details(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn monitor(addr: SocketAddr, expected_status: Option<u16>) -> Monitor {
        serde_json::from_value(serde_json::json!({
            "name": "web",
            "check_type": "http",
            "target": addr.ip().to_string(),
            "port": addr.port(),
            "timeout_ms": 2000,
            "expected_status": expected_status,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn ok_response_is_up() {
        let addr = serve(Router::new().route("/", get(|| async { "hello" }))).await;
        let outcome = HttpChecker::new(CheckType::Http).check(&monitor(addr, None)).await;
        assert_eq!(outcome.status, CheckStatus::Up);
        assert_eq!(outcome.status_code, Some(200));
        assert!(outcome.latency_ms > 0.0);
    }

    #[tokio::test]
    async fn server_error_is_down() {
        let addr = serve(Router::new().route(
            "/",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ))
        .await;
        let outcome = HttpChecker::new(CheckType::Http).check(&monitor(addr, None)).await;
        assert_eq!(outcome.status, CheckStatus::Down);
        assert_eq!(outcome.status_code, Some(500));
        assert_eq!(outcome.error.as_deref(), Some("HTTP 500"));
    }

    #[tokio::test]
    async fn explicit_expected_status_must_match() {
        let addr = serve(Router::new().route("/", get(|| async { StatusCode::NOT_FOUND }))).await;

        let ok = HttpChecker::new(CheckType::Http)
            .check(&monitor(addr, Some(404)))
            .await;
        assert_eq!(ok.status, CheckStatus::Up);

        let bad = HttpChecker::new(CheckType::Http)
            .check(&monitor(addr, Some(200)))
            .await;
        assert_eq!(bad.status, CheckStatus::Down);
    }

    #[tokio::test]
    async fn unreachable_target_is_down() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = HttpChecker::new(CheckType::Http).check(&monitor(addr, None)).await;
        assert_eq!(outcome.status, CheckStatus::Down);
        assert!(outcome.error.unwrap().contains("request failed"));
    }

    #[test]
    fn verdict_table() {
        assert_eq!(status_verdict(200, None), None);
        assert_eq!(status_verdict(399, None), None);
        assert!(status_verdict(400, None).is_some());
        assert_eq!(status_verdict(301, Some(301)), None);
        assert!(status_verdict(200, Some(204)).is_some());
    }
}
