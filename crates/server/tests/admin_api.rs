//! Admin API contract tests over a loopback listener.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use pingmesh_logbuf::LogBuffer;
use pingmesh_model::{
    now_ms, Config, Incident, IncidentStatus, Node, NodeRole, NodeStatus, TlsPaths,
    DEFAULT_ADMIN_ADDR,
};
use pingmesh_server::{admin_router, serve_admin, AdminContext, AlertTester};
use pingmesh_store::{SqliteStore, Store};

struct TestAdmin {
    base: String,
    store: Arc<SqliteStore>,
    shutdown: CancellationToken,
    client: reqwest::Client,
}

impl Drop for TestAdmin {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct RecordingTester;

#[async_trait]
impl AlertTester for RecordingTester {
    async fn send_test(&self, channel_id: &str) -> Result<(), String> {
        if channel_id == "bad" {
            Err("delivery exploded".into())
        } else {
            Ok(())
        }
    }
}

async fn start_admin(customize: impl FnOnce(AdminContext) -> AdminContext) -> TestAdmin {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let config = Arc::new(Config {
        node_id: "self".into(),
        node_name: "self".into(),
        role: NodeRole::Coordinator,
        data_dir: std::env::temp_dir(),
        listen_addr: "0.0.0.0:7433".into(),
        cli_addr: DEFAULT_ADMIN_ADDR.into(),
        coordinator: None,
        tls: Some(TlsPaths::default()),
    });

    let ctx = customize(AdminContext::new(config, store.clone()));
    let router = admin_router(ctx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(serve_admin(listener, router, shutdown.clone()));

    TestAdmin {
        base: format!("http://{addr}"),
        store,
        shutdown,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn monitor_create_applies_defaults_and_returns_201() {
    let admin = start_admin(|ctx| ctx).await;

    let response = admin
        .client
        .post(format!("{}/api/v1/monitors", admin.base))
        .json(&serde_json::json!({
            "name": "My Site",
            "check_type": "http",
            "target": "example.com",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let monitor: serde_json::Value = response.json().await.unwrap();
    assert_eq!(monitor["interval_ms"], 60_000);
    assert_eq!(monitor["timeout_ms"], 5_000);
    assert_eq!(monitor["retries"], 1);
    assert_eq!(monitor["failure_threshold"], 3);
    assert_eq!(monitor["recovery_threshold"], 2);
    assert_eq!(monitor["quorum_type"], "majority");
    assert_eq!(monitor["cooldown_ms"], 300_000);
    assert_eq!(monitor["enabled"], true);

    let id = monitor["id"].as_str().unwrap();
    assert!(admin.store.get_monitor(id).unwrap().is_some());
}

#[tokio::test]
async fn monitor_validation_errors_are_400() {
    let admin = start_admin(|ctx| ctx).await;

    // tcp without a port
    let response = admin
        .client
        .post(format!("{}/api/v1/monitors", admin.base))
        .json(&serde_json::json!({
            "name": "db",
            "check_type": "tcp",
            "target": "db.internal",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // malformed json
    let response = admin
        .client
        .post(format!("{}/api/v1/monitors", admin.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn monitor_patch_merges_fields() {
    let admin = start_admin(|ctx| ctx).await;

    let created: serde_json::Value = admin
        .client
        .post(format!("{}/api/v1/monitors", admin.base))
        .json(&serde_json::json!({
            "name": "site",
            "check_type": "http",
            "target": "example.com",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let updated: serde_json::Value = admin
        .client
        .put(format!("{}/api/v1/monitors/{id}", admin.base))
        .json(&serde_json::json!({
            "name": "site-renamed",
            "interval_ms": 500,
            "expected_status": 204,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(updated["name"], "site-renamed");
    assert_eq!(updated["interval_ms"], 1000); // clamped
    assert_eq!(updated["expected_status"], 204);
    assert_eq!(updated["target"], "example.com"); // untouched
}

#[tokio::test]
async fn missing_entities_are_404() {
    let admin = start_admin(|ctx| ctx).await;

    for path in [
        "/api/v1/monitors/ghost",
        "/api/v1/nodes/ghost",
        "/api/v1/alerts/channels/ghost",
    ] {
        let response = admin
            .client
            .get(format!("{}{path}", admin.base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404, "{path}");
    }
}

#[tokio::test]
async fn status_reports_cluster_overview() {
    let admin = start_admin(|ctx| ctx).await;
    admin
        .store
        .create_node(&Node {
            id: "self".into(),
            name: "self".into(),
            address: "127.0.0.1:7433".into(),
            role: NodeRole::Coordinator,
            status: NodeStatus::Online,
            last_seen: now_ms(),
            created_at: now_ms(),
        })
        .unwrap();
    admin
        .store
        .create_incident(&Incident {
            id: "i1".into(),
            monitor_id: "m1".into(),
            status: IncidentStatus::Suspect,
            started_at: now_ms(),
            confirmed_at: None,
            resolved_at: None,
            confirming_nodes: vec![],
            created_at: now_ms(),
            updated_at: now_ms(),
        })
        .unwrap();

    let status: serde_json::Value = admin
        .client
        .get(format!("{}/api/v1/status", admin.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(status["node_id"], "self");
    assert_eq!(status["role"], "coordinator");
    assert_eq!(status["nodes"].as_array().unwrap().len(), 1);
    assert_eq!(status["active_incidents"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn incident_listing_honours_active_filter() {
    let admin = start_admin(|ctx| ctx).await;
    let mk = |id: &str, status: IncidentStatus| Incident {
        id: id.into(),
        monitor_id: "m".into(),
        status,
        started_at: 1,
        confirmed_at: None,
        resolved_at: None,
        confirming_nodes: vec![],
        created_at: 1,
        updated_at: 1,
    };
    admin.store.create_incident(&mk("a", IncidentStatus::Resolved)).unwrap();
    admin.store.create_incident(&mk("b", IncidentStatus::Confirmed)).unwrap();

    let all: Vec<serde_json::Value> = admin
        .client
        .get(format!("{}/api/v1/incidents", admin.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let active: Vec<serde_json::Value> = admin
        .client
        .get(format!("{}/api/v1/incidents?active=true", admin.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], "b");
}

#[tokio::test]
async fn logs_unavailable_without_buffer() {
    let admin = start_admin(|ctx| ctx).await;
    let response = admin
        .client
        .get(format!("{}/api/v1/logs", admin.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn logs_served_from_buffer() {
    let logbuf = LogBuffer::new(16);
    let admin = start_admin(|ctx| ctx.with_logbuf(logbuf.clone())).await;

    // Feed the ring through a scoped subscriber.
    let subscriber = {
        use tracing_subscriber::layer::SubscriberExt;
        tracing_subscriber::registry().with(logbuf.layer())
    };
    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("scheduler started");
    });

    let entries: Vec<serde_json::Value> = admin
        .client
        .get(format!("{}/api/v1/logs?lines=5", admin.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0]["message"]
        .as_str()
        .unwrap()
        .contains("scheduler started"));
}

#[tokio::test]
async fn alert_channel_crud_and_test() {
    let admin = start_admin(|ctx| ctx.with_alert_tester(Arc::new(RecordingTester))).await;

    let created: serde_json::Value = admin
        .client
        .post(format!("{}/api/v1/alerts/channels", admin.base))
        .json(&serde_json::json!({
            "name": "ops-hook",
            "type": "webhook",
            "config": "{\"url\":\"https://example.com/hook\"}",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();
    assert_eq!(created["enabled"], true);

    let response = admin
        .client
        .post(format!("{}/api/v1/alerts/channels/{id}/test", admin.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let patched: serde_json::Value = admin
        .client
        .put(format!("{}/api/v1/alerts/channels/{id}", admin.base))
        .json(&serde_json::json!({ "enabled": false }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(patched["enabled"], false);

    let response = admin
        .client
        .delete(format!("{}/api/v1/alerts/channels/{id}", admin.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(admin.store.get_alert_channel(id).unwrap().is_none());
}

#[tokio::test]
async fn invalid_channel_config_rejected() {
    let admin = start_admin(|ctx| ctx).await;
    let response = admin
        .client
        .post(format!("{}/api/v1/alerts/channels", admin.base))
        .json(&serde_json::json!({
            "name": "broken",
            "type": "webhook",
            "config": "{oops",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_peer_probes_unreachable_node() {
    let admin = start_admin(|ctx| ctx).await;
    admin
        .store
        .create_node(&Node {
            id: "w1".into(),
            name: "w1".into(),
            address: "127.0.0.1:1".into(), // nothing listens here
            role: NodeRole::Worker,
            status: NodeStatus::Online,
            last_seen: now_ms(),
            created_at: now_ms(),
        })
        .unwrap();

    let peers: Vec<serde_json::Value> = admin
        .client
        .get(format!("{}/api/v1/test-peer", admin.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0]["node_id"], "w1");
    assert_eq!(peers[0]["reachable"], false);
    assert!(peers[0]["error"].as_str().unwrap().contains("dial"));
}

#[tokio::test]
async fn history_respects_filters_and_limit() {
    let admin = start_admin(|ctx| ctx).await;
    for (monitor, ts) in [("m1", 10), ("m1", 20), ("m2", 30)] {
        admin
            .store
            .insert_check_result(&pingmesh_model::CheckResult {
                id: 0,
                monitor_id: monitor.into(),
                node_id: "n".into(),
                status: pingmesh_model::CheckStatus::Up,
                latency_ms: 1.0,
                status_code: None,
                error: None,
                details: None,
                timestamp: ts,
            })
            .unwrap();
    }

    let rows: Vec<serde_json::Value> = admin
        .client
        .get(format!("{}/api/v1/history?monitor=m1&limit=1", admin.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["timestamp"], 20); // newest first
}
