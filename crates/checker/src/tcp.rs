//! TCP connect checks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;

use pingmesh_model::{CheckType, Monitor};

use crate::{elapsed_ms, CheckOutcome, Checker};

/// Connects to `target:port` and reports `up` iff the connect succeeds
/// within the timeout. The connection is closed immediately.
pub struct TcpChecker;

#[async_trait]
impl Checker for TcpChecker {
    fn check_type(&self) -> CheckType {
        CheckType::Tcp
    }

    async fn check(&self, monitor: &Monitor) -> CheckOutcome {
        let Some(port) = monitor.port else {
            return CheckOutcome::down("tcp check requires a port");
        };
        let timeout = Duration::from_millis(monitor.timeout_ms);
        let address = format!("{}:{}", monitor.target, port);

        let start = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => {
                let latency = elapsed_ms(start);
                drop(stream);
                CheckOutcome::up(latency)
            }
            Ok(Err(e)) => {
                CheckOutcome::down(format!("tcp connect failed: {e}")).with_latency(elapsed_ms(start))
            }
            Err(_) => CheckOutcome::down(format!("tcp connect timed out after {}ms", monitor.timeout_ms))
                .with_latency(elapsed_ms(start)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingmesh_model::CheckStatus;

    fn monitor(target: &str, port: u16) -> Monitor {
        serde_json::from_value(serde_json::json!({
            "name": "tcp",
            "check_type": "tcp",
            "target": target,
            "port": port,
            "timeout_ms": 2000,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn open_port_is_up() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let outcome = TcpChecker.check(&monitor("127.0.0.1", port)).await;
        assert_eq!(outcome.status, CheckStatus::Up);
        assert!(outcome.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn closed_port_is_down() {
        // Bind then drop to find a port that refuses connections.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let outcome = TcpChecker.check(&monitor("127.0.0.1", port)).await;
        assert_eq!(outcome.status, CheckStatus::Down);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn missing_port_is_down() {
        let mut m = monitor("127.0.0.1", 80);
        m.port = None;
        let outcome = TcpChecker.check(&m).await;
        assert_eq!(outcome.status, CheckStatus::Down);
    }
}
