//! End-to-end peer API tests over real mutual TLS.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pingmesh_ca::{client_identity_pem, server_tls_config, TlsMaterial};
use pingmesh_cluster::{decode_token, mint_join_token, Error as ClusterError, PeerClient};
use pingmesh_model::{
    now_ms, CheckResult, CheckStatus, Config, ConfigSync, Heartbeat, JoinRequest, Monitor, Node,
    NodeRole, NodeStatus, TlsPaths, DEFAULT_ADMIN_ADDR,
};
use pingmesh_server::{peer_router, serve_peer, PeerContext};
use pingmesh_store::{SqliteStore, Store};

struct TestNode {
    addr: SocketAddr,
    store: Arc<SqliteStore>,
    dir: tempfile::TempDir,
    shutdown: CancellationToken,
    ca_pem: String,
}

impl TestNode {
    fn peer_addr(&self) -> String {
        format!("127.0.0.1:{}", self.addr.port())
    }

    fn certs_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("certs")
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start_node(role: NodeRole) -> TestNode {
    let dir = tempfile::tempdir().unwrap();
    let certs = dir.path().join("certs");
    pingmesh_ca::init_ca(&certs).unwrap();
    let (cert, key) = pingmesh_ca::issue_node_cert(&certs, "self", &["127.0.0.1".into()]).unwrap();
    pingmesh_ca::write_node_cert(&certs, &cert, &key).unwrap();

    let material = TlsMaterial::load(&certs).unwrap();
    let tls = Arc::new(server_tls_config(&material).unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
        .create_node(&Node {
            id: "self".into(),
            name: "self".into(),
            address: addr.to_string(),
            role,
            status: NodeStatus::Online,
            last_seen: now_ms(),
            created_at: now_ms(),
        })
        .unwrap();

    let config = Arc::new(Config {
        node_id: "self".into(),
        node_name: "self".into(),
        role,
        data_dir: dir.path().to_path_buf(),
        listen_addr: addr.to_string(),
        cli_addr: DEFAULT_ADMIN_ADDR.into(),
        coordinator: None,
        tls: Some(TlsPaths::default()),
    });

    let shutdown = CancellationToken::new();
    let router = peer_router(PeerContext::new(config, store.clone()));
    tokio::spawn(serve_peer(listener, tls, router, shutdown.clone()));

    TestNode {
        addr,
        store,
        dir,
        shutdown,
        ca_pem: material.ca_pem,
    }
}

/// Issue a certificate for a fictional enrolled worker and build its client.
fn enrolled_client(certs_dir: &Path, ca_pem: &str, node_id: &str) -> PeerClient {
    let (cert, key) =
        pingmesh_ca::issue_node_cert(certs_dir, node_id, &["127.0.0.1".into()]).unwrap();
    let material = TlsMaterial {
        ca_pem: ca_pem.to_string(),
        cert_pem: cert,
        key_pem: key,
    };
    PeerClient::new_mtls(ca_pem, &client_identity_pem(&material)).unwrap()
}

fn sample_monitor(id: &str) -> Monitor {
    let mut monitor: Monitor = serde_json::from_value(serde_json::json!({
        "id": id,
        "name": format!("monitor-{id}"),
        "check_type": "http",
        "target": "example.com",
        "enabled": true,
    }))
    .unwrap();
    monitor.apply_defaults();
    monitor
}

#[tokio::test]
async fn heartbeat_updates_liveness() {
    let node = start_node(NodeRole::Coordinator).await;
    node.store
        .create_node(&Node {
            id: "w1".into(),
            name: "w1".into(),
            address: "127.0.0.1:1".into(),
            role: NodeRole::Worker,
            status: NodeStatus::Offline,
            last_seen: 0,
            created_at: 0,
        })
        .unwrap();

    let client = enrolled_client(&node.certs_dir(), &node.ca_pem, "w1");
    client
        .send_heartbeat(
            &node.peer_addr(),
            &Heartbeat {
                node_id: "w1".into(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                active_monitors: 3,
                checks_per_minute: 12,
            },
        )
        .await
        .unwrap();

    let updated = node.store.get_node("w1").unwrap().unwrap();
    assert_eq!(updated.status, NodeStatus::Online);
    assert!(updated.last_seen > 0);
}

#[tokio::test]
async fn unauthenticated_peer_is_rejected() {
    let node = start_node(NodeRole::Coordinator).await;

    // The join-style client presents no certificate.
    let anonymous = PeerClient::new_join().unwrap();
    let err = anonymous
        .send_heartbeat(
            &node.peer_addr(),
            &Heartbeat {
                node_id: "self".into(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                active_monitors: 0,
                checks_per_minute: 0,
            },
        )
        .await
        .unwrap_err();

    match err {
        ClusterError::PeerStatus { status, .. } => assert_eq!(status, 403),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn join_issues_certificate_and_consumes_token() {
    let node = start_node(NodeRole::Coordinator).await;
    let envelope =
        mint_join_token(node.store.as_ref(), &node.peer_addr(), chrono::Duration::hours(1))
            .unwrap();
    let token = decode_token(&envelope).unwrap();

    let client = PeerClient::new_join().unwrap();
    let request = JoinRequest {
        secret: token.secret.clone(),
        name: "probe-eu".into(),
        listen_addr: "0.0.0.0:7433".into(),
        cli_addr: DEFAULT_ADMIN_ADDR.into(),
    };

    let response = client.join(&node.peer_addr(), &request).await.unwrap();
    assert!(!response.node_id.is_empty());
    assert_eq!(response.coordinator_id, "self");
    assert!(response.ca_cert.contains("BEGIN CERTIFICATE"));
    assert!(response.node_cert.contains("BEGIN CERTIFICATE"));
    assert!(response.node_key.contains("BEGIN PRIVATE KEY"));

    // Wildcard advertised address replaced with the observed remote IP.
    let joined = node.store.get_node(&response.node_id).unwrap().unwrap();
    assert_eq!(joined.address, "127.0.0.1:7433");
    assert_eq!(joined.role, NodeRole::Worker);
    assert_eq!(joined.status, NodeStatus::Online);

    // Same token again: rejected, nothing new created.
    let err = client.join(&node.peer_addr(), &request).await.unwrap_err();
    match err {
        ClusterError::PeerStatus { status, .. } => assert_eq!(status, 401),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(node.store.list_nodes().unwrap().len(), 2);
}

#[tokio::test]
async fn join_response_never_contains_ca_key() {
    let node = start_node(NodeRole::Coordinator).await;
    let envelope =
        mint_join_token(node.store.as_ref(), &node.peer_addr(), chrono::Duration::hours(1))
            .unwrap();
    let token = decode_token(&envelope).unwrap();

    let response = PeerClient::new_join()
        .unwrap()
        .join(
            &node.peer_addr(),
            &JoinRequest {
                secret: token.secret,
                name: "probe".into(),
                listen_addr: "0.0.0.0:7433".into(),
                cli_addr: DEFAULT_ADMIN_ADDR.into(),
            },
        )
        .await
        .unwrap();

    let ca_key = std::fs::read_to_string(node.certs_dir().join("ca.key")).unwrap();
    let ca_key_body = ca_key
        .lines()
        .find(|line| !line.starts_with("-----") && !line.is_empty())
        .unwrap();

    for field in [&response.ca_cert, &response.node_cert, &response.node_key] {
        assert!(!field.contains(ca_key_body));
    }
    assert!(!response.ca_cert.contains("PRIVATE KEY"));
}

#[tokio::test]
async fn join_refused_by_non_coordinator() {
    let node = start_node(NodeRole::Worker).await;

    let err = PeerClient::new_join()
        .unwrap()
        .join(
            &node.peer_addr(),
            &JoinRequest {
                secret: vec![0; 32],
                name: "probe".into(),
                listen_addr: "0.0.0.0:7433".into(),
                cli_addr: DEFAULT_ADMIN_ADDR.into(),
            },
        )
        .await
        .unwrap_err();

    match err {
        ClusterError::PeerStatus { status, .. } => assert_eq!(status, 403),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn pushed_result_preserves_reporting_timestamp() {
    let node = start_node(NodeRole::Coordinator).await;
    let client = enrolled_client(&node.certs_dir(), &node.ca_pem, "w1");

    client
        .push_result(
            &node.peer_addr(),
            &CheckResult {
                id: 999, // ignored: ids are server-assigned
                monitor_id: "m1".into(),
                node_id: "w1".into(),
                status: CheckStatus::Down,
                latency_ms: 31.5,
                status_code: Some(503),
                error: Some("HTTP 503".into()),
                details: Some(serde_json::json!({"status_code": 503})),
                timestamp: 12_345,
            },
        )
        .await
        .unwrap();

    let stored = node.store.get_latest_result("m1", "w1").unwrap().unwrap();
    assert_eq!(stored.timestamp, 12_345);
    assert_eq!(stored.status, CheckStatus::Down);
    assert_eq!(stored.status_code, Some(503));
    assert!(stored.id > 0);
}

#[tokio::test]
async fn config_sync_pull_and_push() {
    let node = start_node(NodeRole::Coordinator).await;
    node.store.create_monitor(&sample_monitor("m1")).unwrap();

    let client = enrolled_client(&node.certs_dir(), &node.ca_pem, "w1");

    let pulled = client.pull_config_sync(&node.peer_addr()).await.unwrap();
    assert_eq!(pulled.monitors.len(), 1);
    assert_eq!(pulled.monitors[0].id, "m1");
    assert_eq!(pulled.nodes.len(), 1);

    // Push an extended snapshot back; the handler upserts it.
    let mut sync = ConfigSync {
        version: now_ms(),
        monitors: pulled.monitors.clone(),
        nodes: pulled.nodes.clone(),
    };
    sync.monitors.push(sample_monitor("m2"));
    client
        .push_config_sync(&node.peer_addr(), &sync)
        .await
        .unwrap();

    assert_eq!(node.store.list_monitors(None).unwrap().len(), 2);
}

#[tokio::test]
async fn result_push_refused_by_non_coordinator() {
    let node = start_node(NodeRole::Worker).await;
    let client = enrolled_client(&node.certs_dir(), &node.ca_pem, "w1");

    let err = client
        .push_result(
            &node.peer_addr(),
            &CheckResult {
                id: 0,
                monitor_id: "m1".into(),
                node_id: "w1".into(),
                status: CheckStatus::Up,
                latency_ms: 1.0,
                status_code: None,
                error: None,
                details: None,
                timestamp: 1,
            },
        )
        .await
        .unwrap_err();

    match err {
        ClusterError::PeerStatus { status, .. } => assert_eq!(status, 403),
        other => panic!("unexpected: {other:?}"),
    }
}
