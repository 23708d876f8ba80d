//! Loopback-only administrative API consumed by the CLI and dashboard.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use pingmesh_logbuf::LogBuffer;
use pingmesh_model::{
    now_ms, AlertChannel, ChannelKind, CheckType, ClusterStatus, Config, HealthInfo, Monitor,
    PeerStatus, QuorumType,
};
use pingmesh_store::{ResultFilter, Store};

use crate::{ApiError, ApiResult};

/// Runtime metrics the agent exposes to the health endpoint.
pub trait AgentInfo: Send + Sync {
    /// Seconds since the agent started.
    fn uptime_secs(&self) -> u64;
    /// Last heartbeat send time, Unix milliseconds.
    fn last_heartbeat(&self) -> Option<i64>;
    /// Last config sync time, Unix milliseconds.
    fn last_config_sync(&self) -> Option<i64>;
    /// Monitors currently scheduled.
    fn active_monitors(&self) -> usize;
}

/// Test-delivery seam for alert channels.
#[async_trait]
pub trait AlertTester: Send + Sync {
    /// Send a synthetic alert through one channel.
    async fn send_test(&self, channel_id: &str) -> Result<(), String>;
}

/// Shared state of the admin API.
#[derive(Clone)]
pub struct AdminContext {
    /// This node's configuration.
    pub config: Arc<Config>,
    /// The local store.
    pub store: Arc<dyn Store>,
    /// Recent-log ring, when attached.
    pub logbuf: Option<LogBuffer>,
    /// Agent runtime metrics, when attached.
    pub agent_info: Option<Arc<dyn AgentInfo>>,
    /// Alert test dispatcher, when attached.
    pub alert_tester: Option<Arc<dyn AlertTester>>,
}

impl AdminContext {
    /// Context with only the mandatory pieces wired.
    pub fn new(config: Arc<Config>, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            store,
            logbuf: None,
            agent_info: None,
            alert_tester: None,
        }
    }

    /// Attach the log ring buffer.
    pub fn with_logbuf(mut self, logbuf: LogBuffer) -> Self {
        self.logbuf = Some(logbuf);
        self
    }

    /// Attach agent runtime metrics.
    pub fn with_agent_info(mut self, info: Arc<dyn AgentInfo>) -> Self {
        self.agent_info = Some(info);
        self
    }

    /// Attach the alert test dispatcher.
    pub fn with_alert_tester(mut self, tester: Arc<dyn AlertTester>) -> Self {
        self.alert_tester = Some(tester);
        self
    }
}

/// The admin API router.
pub fn admin_router(ctx: AdminContext) -> Router {
    Router::new()
        .route("/api/v1/nodes", get(list_nodes))
        .route("/api/v1/nodes/{id}", get(get_node).delete(delete_node))
        .route("/api/v1/monitors", get(list_monitors).post(create_monitor))
        .route(
            "/api/v1/monitors/{id}",
            get(get_monitor).put(update_monitor).delete(delete_monitor),
        )
        .route("/api/v1/status", get(status))
        .route("/api/v1/incidents", get(list_incidents))
        .route("/api/v1/history", get(history))
        .route("/api/v1/health", get(health))
        .route("/api/v1/logs", get(logs))
        .route("/api/v1/test-peer", get(test_peer))
        .route(
            "/api/v1/alerts/channels",
            get(list_channels).post(create_channel),
        )
        .route(
            "/api/v1/alerts/channels/{id}",
            get(get_channel).put(update_channel).delete(delete_channel),
        )
        .route("/api/v1/alerts/channels/{id}/test", post(test_channel))
        .route("/api/v1/alerts/history", get(alert_history))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serve the admin router until `shutdown` fires.
pub async fn serve_admin(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "admin api listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

// --- Nodes ---

async fn list_nodes(State(ctx): State<AdminContext>) -> ApiResult<Json<Vec<pingmesh_model::Node>>> {
    Ok(Json(ctx.store.list_nodes()?))
}

async fn get_node(
    State(ctx): State<AdminContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<pingmesh_model::Node>> {
    let node = ctx.store.get_node(&id)?.ok_or(ApiError::NotFound("node"))?;
    Ok(Json(node))
}

async fn delete_node(
    State(ctx): State<AdminContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    ctx.store.delete_node(&id)?;
    Ok(Json(json!({ "status": "deleted" })))
}

// --- Monitors ---

#[derive(Debug, Deserialize, Default)]
struct MonitorListQuery {
    group: Option<String>,
}

async fn list_monitors(
    State(ctx): State<AdminContext>,
    Query(query): Query<MonitorListQuery>,
) -> ApiResult<Json<Vec<Monitor>>> {
    Ok(Json(ctx.store.list_monitors(query.group.as_deref())?))
}

async fn create_monitor(
    State(ctx): State<AdminContext>,
    Json(mut monitor): Json<Monitor>,
) -> ApiResult<(StatusCode, Json<Monitor>)> {
    monitor.id = Uuid::new_v4().to_string();
    monitor.apply_defaults();
    monitor.enabled = true;
    monitor.validate()?;

    let now = now_ms();
    monitor.created_at = now;
    monitor.updated_at = now;

    ctx.store.create_monitor(&monitor)?;
    Ok((StatusCode::CREATED, Json(monitor)))
}

async fn get_monitor(
    State(ctx): State<AdminContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Monitor>> {
    let monitor = ctx
        .store
        .get_monitor(&id)?
        .ok_or(ApiError::NotFound("monitor"))?;
    Ok(Json(monitor))
}

/// Partial monitor update; absent fields keep their current values.
#[derive(Debug, Deserialize, Default)]
struct MonitorPatch {
    name: Option<String>,
    group: Option<String>,
    check_type: Option<CheckType>,
    target: Option<String>,
    port: Option<u16>,
    interval_ms: Option<u64>,
    timeout_ms: Option<u64>,
    retries: Option<u32>,
    expected_status: Option<u16>,
    expected_keyword: Option<String>,
    dns_record_type: Option<String>,
    dns_expected: Option<String>,
    failure_threshold: Option<u32>,
    recovery_threshold: Option<u32>,
    quorum_type: Option<QuorumType>,
    quorum_n: Option<u32>,
    cooldown_ms: Option<u64>,
    enabled: Option<bool>,
}

impl MonitorPatch {
    fn apply(self, monitor: &mut Monitor) {
        macro_rules! patch {
            ($($field:ident),+) => {
                $(if let Some(value) = self.$field {
                    monitor.$field = value;
                })+
            };
        }
        patch!(
            name,
            check_type,
            target,
            interval_ms,
            timeout_ms,
            retries,
            failure_threshold,
            recovery_threshold,
            quorum_type,
            quorum_n,
            cooldown_ms,
            enabled
        );
        if self.group.is_some() {
            monitor.group = self.group;
        }
        if self.port.is_some() {
            monitor.port = self.port;
        }
        if self.expected_status.is_some() {
            monitor.expected_status = self.expected_status;
        }
        if self.expected_keyword.is_some() {
            monitor.expected_keyword = self.expected_keyword;
        }
        if self.dns_record_type.is_some() {
            monitor.dns_record_type = self.dns_record_type;
        }
        if self.dns_expected.is_some() {
            monitor.dns_expected = self.dns_expected;
        }
    }
}

async fn update_monitor(
    State(ctx): State<AdminContext>,
    Path(id): Path<String>,
    Json(patch): Json<MonitorPatch>,
) -> ApiResult<Json<Monitor>> {
    let mut monitor = ctx
        .store
        .get_monitor(&id)?
        .ok_or(ApiError::NotFound("monitor"))?;

    patch.apply(&mut monitor);
    monitor.apply_defaults();
    monitor.validate()?;
    monitor.updated_at = now_ms();

    ctx.store.update_monitor(&monitor)?;
    Ok(Json(monitor))
}

async fn delete_monitor(
    State(ctx): State<AdminContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    ctx.store.delete_monitor(&id)?;
    Ok(Json(json!({ "status": "deleted" })))
}

// --- Status, incidents, history ---

async fn status(State(ctx): State<AdminContext>) -> ApiResult<Json<ClusterStatus>> {
    Ok(Json(ClusterStatus {
        node_id: ctx.config.node_id.clone(),
        role: ctx.config.role,
        nodes: ctx.store.list_nodes()?,
        monitor_count: ctx.store.list_monitors(None)?.len(),
        active_incidents: ctx.store.list_incidents(true)?,
    }))
}

#[derive(Debug, Deserialize, Default)]
struct IncidentQuery {
    active: Option<bool>,
}

async fn list_incidents(
    State(ctx): State<AdminContext>,
    Query(query): Query<IncidentQuery>,
) -> ApiResult<Json<Vec<pingmesh_model::Incident>>> {
    Ok(Json(ctx.store.list_incidents(query.active.unwrap_or(false))?))
}

#[derive(Debug, Deserialize, Default)]
struct HistoryQuery {
    monitor: Option<String>,
    node: Option<String>,
    since: Option<i64>,
    limit: Option<u32>,
}

async fn history(
    State(ctx): State<AdminContext>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<pingmesh_model::CheckResult>>> {
    let filter = ResultFilter {
        monitor_id: query.monitor,
        node_id: query.node,
        since: query.since,
        limit: Some(query.limit.unwrap_or(50)),
    };
    Ok(Json(ctx.store.list_check_results(&filter)?))
}

// --- Health, logs, peer probes ---

async fn health(State(ctx): State<AdminContext>) -> ApiResult<Json<HealthInfo>> {
    let db_size_mb = std::fs::metadata(ctx.config.db_path())
        .map(|meta| meta.len() as f64 / 1024.0 / 1024.0)
        .unwrap_or(0.0);

    let info = ctx.agent_info.as_ref();
    let rfc3339 = |ms: i64| {
        chrono::DateTime::from_timestamp_millis(ms).map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    };

    Ok(Json(HealthInfo {
        node_id: ctx.config.node_id.clone(),
        name: ctx.config.node_name.clone(),
        role: ctx.config.role,
        uptime_secs: info.map(|i| i.uptime_secs()).unwrap_or(0),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_monitors: info.map(|i| i.active_monitors()).unwrap_or(0),
        db_size_mb,
        last_heartbeat: info.and_then(|i| i.last_heartbeat()).and_then(rfc3339),
        last_config_sync: info.and_then(|i| i.last_config_sync()).and_then(rfc3339),
        coordinator: ctx.config.coordinator.as_ref().map(|c| c.address.clone()),
        peers: probe_peers(&ctx, None).await?,
    }))
}

#[derive(Debug, Deserialize, Default)]
struct LogsQuery {
    lines: Option<usize>,
}

async fn logs(
    State(ctx): State<AdminContext>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<Vec<pingmesh_logbuf::LogEntry>>> {
    let logbuf = ctx.logbuf.as_ref().ok_or(ApiError::Unavailable("log buffer"))?;
    Ok(Json(logbuf.last(query.lines.unwrap_or(100))))
}

#[derive(Debug, Deserialize, Default)]
struct TestPeerQuery {
    node: Option<String>,
}

async fn test_peer(
    State(ctx): State<AdminContext>,
    Query(query): Query<TestPeerQuery>,
) -> ApiResult<Json<Vec<PeerStatus>>> {
    Ok(Json(probe_peers(&ctx, query.node.as_deref()).await?))
}

/// TCP-dial every peer (optionally one) and report reachability.
async fn probe_peers(ctx: &AdminContext, only_node: Option<&str>) -> ApiResult<Vec<PeerStatus>> {
    let mut peers = Vec::new();
    for node in ctx.store.list_nodes()? {
        if node.id == ctx.config.node_id {
            continue;
        }
        if let Some(only) = only_node {
            if node.id != only {
                continue;
            }
        }

        let start = std::time::Instant::now();
        let dial = tokio::time::timeout(
            Duration::from_secs(3),
            tokio::net::TcpStream::connect(&node.address),
        )
        .await;

        let mut status = PeerStatus {
            node_id: node.id,
            name: node.name,
            address: node.address,
            status: node.status,
            reachable: false,
            latency_ms: None,
            error: None,
        };
        match dial {
            Ok(Ok(_stream)) => {
                status.reachable = true;
                status.latency_ms = Some(start.elapsed().as_secs_f64() * 1000.0);
            }
            Ok(Err(e)) => status.error = Some(format!("dial: {e}")),
            Err(_) => status.error = Some("dial: timed out".to_string()),
        }
        peers.push(status);
    }
    Ok(peers)
}

// --- Alert channels ---

async fn list_channels(State(ctx): State<AdminContext>) -> ApiResult<Json<Vec<AlertChannel>>> {
    Ok(Json(ctx.store.list_alert_channels()?))
}

async fn create_channel(
    State(ctx): State<AdminContext>,
    Json(mut channel): Json<AlertChannel>,
) -> ApiResult<(StatusCode, Json<AlertChannel>)> {
    if channel.name.trim().is_empty() {
        return Err(ApiError::Validation("channel name is required".into()));
    }
    if channel.config.is_empty() {
        channel.config = "{}".into();
    }
    if serde_json::from_str::<serde_json::Value>(&channel.config).is_err() {
        return Err(ApiError::Validation("config must be valid JSON".into()));
    }

    let now = now_ms();
    channel.id = Uuid::new_v4().to_string();
    channel.enabled = true;
    channel.created_at = now;
    channel.updated_at = now;

    ctx.store.create_alert_channel(&channel)?;
    Ok((StatusCode::CREATED, Json(channel)))
}

async fn get_channel(
    State(ctx): State<AdminContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<AlertChannel>> {
    let channel = ctx
        .store
        .get_alert_channel(&id)?
        .ok_or(ApiError::NotFound("alert channel"))?;
    Ok(Json(channel))
}

#[derive(Debug, Deserialize, Default)]
struct ChannelPatch {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<ChannelKind>,
    enabled: Option<bool>,
    config: Option<String>,
}

async fn update_channel(
    State(ctx): State<AdminContext>,
    Path(id): Path<String>,
    Json(patch): Json<ChannelPatch>,
) -> ApiResult<Json<AlertChannel>> {
    let mut channel = ctx
        .store
        .get_alert_channel(&id)?
        .ok_or(ApiError::NotFound("alert channel"))?;

    if let Some(name) = patch.name {
        channel.name = name;
    }
    if let Some(kind) = patch.kind {
        channel.kind = kind;
    }
    if let Some(enabled) = patch.enabled {
        channel.enabled = enabled;
    }
    if let Some(config) = patch.config {
        if serde_json::from_str::<serde_json::Value>(&config).is_err() {
            return Err(ApiError::Validation("config must be valid JSON".into()));
        }
        channel.config = config;
    }
    channel.updated_at = now_ms();

    ctx.store.update_alert_channel(&channel)?;
    Ok(Json(channel))
}

async fn delete_channel(
    State(ctx): State<AdminContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    ctx.store.delete_alert_channel(&id)?;
    Ok(Json(json!({ "status": "deleted" })))
}

async fn test_channel(
    State(ctx): State<AdminContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let tester = ctx
        .alert_tester
        .as_ref()
        .ok_or(ApiError::Unavailable("alert dispatcher"))?;

    tester
        .send_test(&id)
        .await
        .map_err(|e| ApiError::Internal(format!("test failed: {e}")))?;
    Ok(Json(json!({ "status": "sent" })))
}

#[derive(Debug, Deserialize, Default)]
struct AlertHistoryQuery {
    channel: Option<String>,
    limit: Option<u32>,
}

async fn alert_history(
    State(ctx): State<AdminContext>,
    Query(query): Query<AlertHistoryQuery>,
) -> ApiResult<Json<Vec<pingmesh_model::AlertRecord>>> {
    Ok(Json(ctx.store.list_alert_history(
        query.channel.as_deref(),
        query.limit.unwrap_or(50),
    )?))
}
