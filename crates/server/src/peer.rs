//! Inbound peer RPC handlers.

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use pingmesh_cluster::{apply_config_sync, consume_token, Manager};
use pingmesh_model::{
    now_ms, CheckResult, Config, ConfigSync, Heartbeat, JoinRequest, JoinResponse, Node, NodeRole,
    NodeStatus,
};
use pingmesh_store::Store;

use crate::{ApiError, ApiResult, PeerConn};

/// Shared state of the peer API.
#[derive(Clone)]
pub struct PeerContext {
    /// This node's configuration.
    pub config: Arc<Config>,
    /// The local store.
    pub store: Arc<dyn Store>,
    /// Membership manager.
    pub cluster: Manager,
}

impl PeerContext {
    /// Build the context from its parts.
    pub fn new(config: Arc<Config>, store: Arc<dyn Store>) -> Self {
        Self {
            cluster: Manager::new(store.clone()),
            config,
            store,
        }
    }
}

/// The peer API router.
pub fn peer_router(ctx: PeerContext) -> Router {
    Router::new()
        .route("/api/v1/peer/heartbeat", post(handle_heartbeat))
        .route("/api/v1/peer/result", post(handle_result))
        .route(
            "/api/v1/peer/config-sync",
            post(handle_config_push).get(handle_config_pull),
        )
        .route("/api/v1/peer/join", post(handle_join))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn require_peer(conn: &PeerConn) -> ApiResult<()> {
    if conn.authenticated {
        Ok(())
    } else {
        Err(ApiError::Forbidden("peer certificate required"))
    }
}

fn require_coordinator(ctx: &PeerContext) -> ApiResult<()> {
    if ctx.config.is_coordinator() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "this endpoint is only served by the coordinator",
        ))
    }
}

async fn handle_heartbeat(
    State(ctx): State<PeerContext>,
    Extension(conn): Extension<PeerConn>,
    Json(heartbeat): Json<Heartbeat>,
) -> ApiResult<Json<serde_json::Value>> {
    require_peer(&conn)?;

    ctx.cluster.update_heartbeat(&heartbeat.node_id)?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn handle_result(
    State(ctx): State<PeerContext>,
    Extension(conn): Extension<PeerConn>,
    Json(result): Json<CheckResult>,
) -> ApiResult<Json<serde_json::Value>> {
    require_peer(&conn)?;
    require_coordinator(&ctx)?;

    // Stored as received: the id is reassigned on insert, the reporting
    // node's timestamp is preserved.
    ctx.store.insert_check_result(&result)?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn handle_config_push(
    State(ctx): State<PeerContext>,
    Extension(conn): Extension<PeerConn>,
    Json(sync): Json<ConfigSync>,
) -> ApiResult<Json<serde_json::Value>> {
    require_peer(&conn)?;

    apply_config_sync(ctx.store.as_ref(), &sync)?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn handle_config_pull(
    State(ctx): State<PeerContext>,
    Extension(conn): Extension<PeerConn>,
) -> ApiResult<Json<ConfigSync>> {
    require_peer(&conn)?;
    require_coordinator(&ctx)?;

    Ok(Json(ConfigSync {
        version: now_ms(),
        monitors: ctx.store.list_monitors(None)?,
        nodes: ctx.store.list_nodes()?,
    }))
}

async fn handle_join(
    State(ctx): State<PeerContext>,
    Extension(conn): Extension<PeerConn>,
    Json(request): Json<JoinRequest>,
) -> ApiResult<Json<JoinResponse>> {
    require_coordinator(&ctx)?;

    if !consume_token(ctx.store.as_ref(), &request.secret)? {
        warn!(remote = %conn.remote_addr, "join rejected: invalid token");
        return Err(ApiError::TokenInvalid);
    }

    let node_id = Uuid::new_v4().to_string();
    let listen_addr = resolve_listen_addr(&request.listen_addr, conn.remote_addr.ip());

    // SANs: loopback always, plus the resolved peer-visible host.
    let mut sans = vec!["127.0.0.1".to_string()];
    if let Some(host) = listen_addr.rsplit_once(':').map(|(host, _)| host) {
        match host.parse::<IpAddr>() {
            Ok(ip) if !ip.is_loopback() && !ip.is_unspecified() => sans.push(host.to_string()),
            Ok(_) => {}
            Err(_) if !host.is_empty() => sans.push(host.to_string()),
            Err(_) => {}
        }
    }

    let certs_dir = ctx.config.certs_dir();
    let (node_cert, node_key) = pingmesh_ca::issue_node_cert(&certs_dir, &node_id, &sans)?;
    let ca_cert = std::fs::read_to_string(certs_dir.join(pingmesh_ca::CA_CERT_FILE))
        .map_err(|e| ApiError::Internal(format!("reading ca cert: {e}")))?;

    let now = now_ms();
    ctx.store.create_node(&Node {
        id: node_id.clone(),
        name: request.name.clone(),
        address: listen_addr.clone(),
        role: NodeRole::Worker,
        status: NodeStatus::Online,
        last_seen: now,
        created_at: now,
    })?;

    info!(node_id, name = %request.name, addr = %listen_addr, "node joined the cluster");

    Ok(Json(JoinResponse {
        node_id,
        ca_cert,
        node_cert,
        node_key,
        coordinator_id: ctx.config.node_id.clone(),
    }))
}

/// Replace wildcard or empty advertised hosts with the address the join
/// request actually came from.
fn resolve_listen_addr(advertised: &str, remote_ip: IpAddr) -> String {
    let Some((host, port)) = advertised.rsplit_once(':') else {
        return advertised.to_string();
    };

    let is_wildcard = host.is_empty()
        || host
            .parse::<IpAddr>()
            .map(|ip| ip.is_unspecified())
            .unwrap_or(false);

    if is_wildcard {
        format!("{remote_ip}:{port}")
    } else {
        advertised.to_string()
    }
}
