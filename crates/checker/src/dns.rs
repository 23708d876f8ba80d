//! DNS resolution checks.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_proto::rr::{RData, RecordType};
use hickory_proto::xfer::Protocol;
use hickory_resolver::config::{NameServerConfig, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::Resolver;
use serde_json::json;

use pingmesh_model::{CheckStatus, CheckType, Monitor};

use crate::{elapsed_ms, CheckOutcome, Checker};

/// Upstream used when the monitor does not name one.
const DEFAULT_UPSTREAM: &str = "8.8.8.8:53";

/// Queries `target` for the configured record type.
///
/// `up` iff the query answers NOERROR and, when `dns_expected` is set, the
/// textual form of some answer equals it. A non-default `port` selects the
/// upstream resolver (`target:port`) while `target` remains the query name.
pub struct DnsChecker;

pub(crate) fn record_type_from(name: Option<&str>) -> Option<RecordType> {
    match name.unwrap_or("A").to_ascii_uppercase().as_str() {
        "A" => Some(RecordType::A),
        "AAAA" => Some(RecordType::AAAA),
        "CNAME" => Some(RecordType::CNAME),
        "MX" => Some(RecordType::MX),
        "TXT" => Some(RecordType::TXT),
        _ => None,
    }
}

/// Query names are always fully qualified.
pub(crate) fn fqdn(target: &str) -> String {
    if target.ends_with('.') {
        target.to_string()
    } else {
        format!("{target}.")
    }
}

pub(crate) fn rdata_text(rdata: &RData) -> String {
    match rdata {
        RData::A(a) => a.to_string(),
        RData::AAAA(a) => a.to_string(),
        RData::CNAME(name) => name.to_string(),
        RData::MX(mx) => format!("{} {}", mx.preference(), mx.exchange()),
        RData::TXT(txt) => txt
            .txt_data()
            .iter()
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

async fn upstream_addr(monitor: &Monitor) -> Option<SocketAddr> {
    match monitor.port {
        Some(port) => {
            let server = format!("{}:{}", monitor.target, port);
            tokio::net::lookup_host(server).await.ok()?.next()
        }
        None => DEFAULT_UPSTREAM.parse().ok(),
    }
}

#[async_trait]
impl Checker for DnsChecker {
    fn check_type(&self) -> CheckType {
        CheckType::Dns
    }

    async fn check(&self, monitor: &Monitor) -> CheckOutcome {
        let timeout = Duration::from_millis(monitor.timeout_ms);

        let Some(record_type) = record_type_from(monitor.dns_record_type.as_deref()) else {
            return CheckOutcome::down(format!(
                "unsupported dns record type: {}",
                monitor.dns_record_type.as_deref().unwrap_or_default()
            ));
        };

        let Some(upstream) = upstream_addr(monitor).await else {
            return CheckOutcome::down("resolving upstream dns server failed");
        };

        let name_server = NameServerConfig::new(upstream, Protocol::Udp);
        let config = ResolverConfig::from_parts(None, vec![], vec![name_server]);
        let resolver =
            Resolver::builder_with_config(config, TokioConnectionProvider::default()).build();

        let query = fqdn(&monitor.target);
        let start = Instant::now();
        let lookup = match tokio::time::timeout(timeout, resolver.lookup(query, record_type)).await
        {
            Ok(Ok(lookup)) => lookup,
            Ok(Err(e)) => {
                return CheckOutcome::down(format!("dns query failed: {e}"))
                    .with_latency(elapsed_ms(start))
            }
            Err(_) => {
                return CheckOutcome::down(format!("dns query timed out after {}ms", monitor.timeout_ms))
                    .with_latency(elapsed_ms(start))
            }
        };
        let latency = elapsed_ms(start);

        let answers: Vec<String> = lookup.iter().map(rdata_text).collect();

        let mut outcome = CheckOutcome::up(latency).with_details(json!({
            "answers": answers,
            "answer_count": answers.len(),
        }));

        if let Some(expected) = monitor.dns_expected.as_deref() {
            if !answers.iter().any(|a| a == expected) {
                outcome.status = CheckStatus::Down;
                outcome.error = Some(format!(
                    "expected answer {expected:?} not found in {answers:?}"
                ));
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::rdata;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    #[test]
    fn record_types_parse_case_insensitively() {
        assert_eq!(record_type_from(Some("aaaa")), Some(RecordType::AAAA));
        assert_eq!(record_type_from(Some("MX")), Some(RecordType::MX));
        assert_eq!(record_type_from(None), Some(RecordType::A));
        assert_eq!(record_type_from(Some("SRV")), None);
    }

    #[test]
    fn query_names_are_fully_qualified() {
        assert_eq!(fqdn("example.com"), "example.com.");
        assert_eq!(fqdn("example.com."), "example.com.");
    }

    #[test]
    fn rdata_textual_forms_match_expectations() {
        let a = RData::A(rdata::A(Ipv4Addr::new(93, 184, 216, 34)));
        assert_eq!(rdata_text(&a), "93.184.216.34");

        let cname = RData::CNAME(rdata::CNAME(
            hickory_proto::rr::Name::from_str("edge.example.com.").unwrap(),
        ));
        assert_eq!(rdata_text(&cname), "edge.example.com.");

        let mx = RData::MX(rdata::MX::new(
            10,
            hickory_proto::rr::Name::from_str("mail.example.com.").unwrap(),
        ));
        assert_eq!(rdata_text(&mx), "10 mail.example.com.");

        let txt = RData::TXT(rdata::TXT::new(vec![
            "v=spf1".to_string(),
            "-all".to_string(),
        ]));
        assert_eq!(rdata_text(&txt), "v=spf1 -all");
    }
}
