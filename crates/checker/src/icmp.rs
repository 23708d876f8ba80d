//! ICMP echo checks.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};

use pingmesh_model::{CheckType, Monitor};

use crate::{CheckOutcome, Checker};

const ECHO_PAYLOAD: [u8; 56] = [0; 56];

/// One ICMP echo with the monitor timeout; `up` iff a reply arrives.
/// Latency is the echo round-trip time.
pub struct IcmpChecker;

async fn resolve_target(target: &str) -> Option<IpAddr> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Some(ip);
    }
    // lookup_host needs a port; it is discarded.
    tokio::net::lookup_host((target, 0))
        .await
        .ok()?
        .map(|addr| addr.ip())
        .next()
}

#[async_trait]
impl Checker for IcmpChecker {
    fn check_type(&self) -> CheckType {
        CheckType::Icmp
    }

    async fn check(&self, monitor: &Monitor) -> CheckOutcome {
        let timeout = Duration::from_millis(monitor.timeout_ms);

        let Some(addr) = resolve_target(&monitor.target).await else {
            return CheckOutcome::down(format!("resolving {} failed", monitor.target));
        };

        let config = match addr {
            IpAddr::V4(_) => Config::default(),
            IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
        };
        let client = match Client::new(&config) {
            Ok(client) => client,
            Err(e) => return CheckOutcome::down(format!("creating pinger: {e}")),
        };

        let mut pinger = client.pinger(addr, PingIdentifier(rand::random())).await;
        pinger.timeout(timeout);

        match pinger.ping(PingSequence(0), &ECHO_PAYLOAD).await {
            Ok((_packet, rtt)) => {
                let rtt_ms = rtt.as_secs_f64() * 1000.0;
                CheckOutcome::up(rtt_ms).with_details(json!({
                    "packets_sent": 1,
                    "packets_recv": 1,
                    "min_rtt_ms": rtt_ms,
                    "max_rtt_ms": rtt_ms,
                    "avg_rtt_ms": rtt_ms,
                }))
            }
            Err(e) => CheckOutcome::down(format!("ping failed: {e}")).with_details(json!({
                "packets_sent": 1,
                "packets_recv": 0,
            })),
        }
    }
}
