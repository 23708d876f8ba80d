//! The PingMesh agent: owns the checker registry and scheduler, runs the
//! periodic cluster loops, and routes results.
//!
//! Loop schedule (roles in parentheses):
//!
//! | loop            | period | role        |
//! |-----------------|--------|-------------|
//! | heartbeat       | 30 s   | all         |
//! | monitor-sync    | 15 s   | all         |
//! | offline-detect  | 30 s   | coordinator |
//! | config-push     | 30 s   | coordinator |
//! | config-pull     | 30 s   | worker      |
//! | consensus       | 15 s   | coordinator |
//!
//! Workers wire the scheduler's result sink to the coordinator push; the
//! coordinator's results reach the store directly.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use pingmesh_checker::Registry;
use pingmesh_cluster::{apply_config_sync, Manager, PeerClient};
use pingmesh_consensus::{Alerter, Engine};
use pingmesh_model::{now_ms, Config, ConfigSync, Heartbeat};
use pingmesh_scheduler::Scheduler;
use pingmesh_store::Store;

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);
const MONITOR_SYNC_PERIOD: Duration = Duration::from_secs(15);
const OFFLINE_DETECT_PERIOD: Duration = Duration::from_secs(30);
const CONFIG_SYNC_PERIOD: Duration = Duration::from_secs(30);
const CONSENSUS_PERIOD: Duration = Duration::from_secs(15);

/// Grace window before an unheard-from node is marked offline.
const OFFLINE_GRACE_MS: i64 = 90_000;

/// Capacity of the worker result-forwarding channel.
const RESULT_SINK_CAPACITY: usize = 256;

/// The agent runtime.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    scheduler: Scheduler,
    cluster: Manager,
    engine: Option<Engine>,
    peer_client: Option<PeerClient>,
    start_time: Instant,
    last_heartbeat: Mutex<Option<i64>>,
    last_config_sync: Mutex<Option<i64>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Agent {
    /// Assemble an agent.
    ///
    /// `peer_client` is the mTLS client used for heartbeats, result pushes,
    /// and config fan-out; a node without TLS material (fresh bootstrap)
    /// runs local-only. The consensus engine is built on coordinators only.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        registry: Registry,
        alerter: Arc<dyn Alerter>,
        peer_client: Option<PeerClient>,
    ) -> Self {
        let scheduler = Scheduler::new(store.clone(), registry, config.node_id.clone());
        let engine = config
            .is_coordinator()
            .then(|| Engine::new(store.clone(), alerter));

        Self {
            inner: Arc::new(Inner {
                cluster: Manager::new(store.clone()),
                scheduler,
                engine,
                peer_client,
                start_time: Instant::now(),
                last_heartbeat: Mutex::new(None),
                last_config_sync: Mutex::new(None),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
                config,
                store,
            }),
        }
    }

    /// Start all periodic loops. Returns immediately; the loops run until
    /// [`Agent::stop`].
    pub fn start(&self) {
        let inner = &self.inner;
        info!(
            node_id = %inner.config.node_id,
            name = %inner.config.node_name,
            role = %inner.config.role,
            "agent starting"
        );

        if !inner.config.is_coordinator() {
            self.wire_result_forwarding();
        }

        self.spawn_periodic("heartbeat", HEARTBEAT_PERIOD, true, {
            let agent = self.clone();
            move || {
                let agent = agent.clone();
                async move { agent.heartbeat().await }
            }
        });

        self.spawn_periodic("monitor-sync", MONITOR_SYNC_PERIOD, true, {
            let agent = self.clone();
            move || {
                let agent = agent.clone();
                async move { agent.sync_monitors() }
            }
        });

        if inner.config.is_coordinator() {
            self.spawn_periodic("offline-detect", OFFLINE_DETECT_PERIOD, false, {
                let agent = self.clone();
                move || {
                    let agent = agent.clone();
                    async move { agent.detect_offline() }
                }
            });

            self.spawn_periodic("config-push", CONFIG_SYNC_PERIOD, false, {
                let agent = self.clone();
                move || {
                    let agent = agent.clone();
                    async move { agent.push_config().await }
                }
            });

            self.spawn_periodic("consensus", CONSENSUS_PERIOD, false, {
                let agent = self.clone();
                move || {
                    let agent = agent.clone();
                    async move { agent.consensus_tick() }
                }
            });
        } else {
            self.spawn_periodic("config-pull", CONFIG_SYNC_PERIOD, true, {
                let agent = self.clone();
                move || {
                    let agent = agent.clone();
                    async move { agent.pull_config().await }
                }
            });
        }
    }

    /// Stop all loops, cancel in-flight checks, and wait for tasks to
    /// drain. The store is left open for the caller to close last.
    pub async fn stop(&self) {
        info!("agent shutting down");
        self.inner.shutdown.cancel();
        self.inner.scheduler.stop();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!("agent stopped");
    }

    /// Seconds since the agent was constructed.
    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    /// Last heartbeat send time, Unix milliseconds.
    pub fn last_heartbeat(&self) -> Option<i64> {
        *self.inner.last_heartbeat.lock()
    }

    /// Last config sync (push or pull) time, Unix milliseconds.
    pub fn last_config_sync(&self) -> Option<i64> {
        *self.inner.last_config_sync.lock()
    }

    /// Monitors currently scheduled on this node.
    pub fn active_monitors(&self) -> usize {
        self.inner.scheduler.active_count()
    }

    fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, immediate: bool, task: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let cancel = self.inner.shutdown.clone();
        self.inner.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            if !immediate {
                // Swallow the interval's instant first tick.
                ticker.tick().await;
            }
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => task().await,
                }
            }
            debug!(task = name, "loop stopped");
        });
    }

    /// Forward scheduler results to the coordinator (workers only).
    fn wire_result_forwarding(&self) {
        let Some(coordinator) = self.inner.config.coordinator.clone() else {
            warn!("worker has no coordinator configured, results stay local");
            return;
        };
        let Some(client) = self.inner.peer_client.clone() else {
            warn!("no peer client available, results stay local");
            return;
        };

        let (tx, mut rx) = mpsc::channel(RESULT_SINK_CAPACITY);
        self.inner.scheduler.set_result_sink(tx);

        let cancel = self.inner.shutdown.clone();
        self.inner.tracker.spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    received = rx.recv() => {
                        let Some(result) = received else { break };
                        if let Err(e) = client.push_result(&coordinator.address, &result).await {
                            // The local copy already exists; the coordinator
                            // will catch up from later pushes.
                            warn!(error = %e, "pushing result to coordinator failed");
                        }
                    }
                }
            }
        });
    }

    async fn heartbeat(&self) {
        let inner = &self.inner;
        if let Err(e) = inner.cluster.update_heartbeat(&inner.config.node_id) {
            error!(error = %e, "heartbeat self-update failed");
        }

        if !inner.config.is_coordinator() {
            if let (Some(coordinator), Some(client)) =
                (&inner.config.coordinator, &inner.peer_client)
            {
                let heartbeat = Heartbeat {
                    node_id: inner.config.node_id.clone(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    active_monitors: inner.scheduler.active_count(),
                    checks_per_minute: inner.scheduler.checks_per_minute(),
                };
                if let Err(e) = client.send_heartbeat(&coordinator.address, &heartbeat).await {
                    warn!(error = %e, "heartbeat to coordinator failed");
                }
            }
        }

        *inner.last_heartbeat.lock() = Some(now_ms());
    }

    fn sync_monitors(&self) {
        match self.inner.store.list_enabled_monitors() {
            Ok(monitors) => self.inner.scheduler.sync_monitors(&monitors),
            Err(e) => error!(error = %e, "loading monitors for sync failed"),
        }
    }

    fn detect_offline(&self) {
        if let Err(e) = self.inner.cluster.detect_offline(OFFLINE_GRACE_MS) {
            error!(error = %e, "offline detection failed");
        }
    }

    fn consensus_tick(&self) {
        if let Some(engine) = &self.inner.engine {
            if let Err(e) = engine.tick() {
                error!(error = %e, "consensus tick failed");
            }
        }
    }

    async fn push_config(&self) {
        let inner = &self.inner;
        let Some(client) = &inner.peer_client else {
            return;
        };

        let sync = match (inner.store.list_monitors(None), inner.store.list_nodes()) {
            (Ok(monitors), Ok(nodes)) => ConfigSync {
                version: now_ms(),
                monitors,
                nodes,
            },
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "loading config snapshot failed");
                return;
            }
        };

        for node in &sync.nodes {
            if node.id == inner.config.node_id || !node.is_online() {
                continue;
            }
            if let Err(e) = client.push_config_sync(&node.address, &sync).await {
                warn!(node = %node.name, addr = %node.address, error = %e, "config push failed");
            }
        }

        *inner.last_config_sync.lock() = Some(now_ms());
    }

    async fn pull_config(&self) {
        let inner = &self.inner;
        let (Some(coordinator), Some(client)) = (&inner.config.coordinator, &inner.peer_client)
        else {
            return;
        };

        let sync = match client.pull_config_sync(&coordinator.address).await {
            Ok(sync) => sync,
            Err(e) => {
                // Checks keep running from the local snapshot; the next pull
                // reconciles when connectivity returns.
                warn!(error = %e, "config pull from coordinator failed");
                return;
            }
        };

        if let Err(e) = apply_config_sync(inner.store.as_ref(), &sync) {
            error!(error = %e, "applying pulled config failed");
            return;
        }
        *inner.last_config_sync.lock() = Some(now_ms());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingmesh_consensus::NoopAlerter;
    use pingmesh_model::{
        CheckResult, CheckStatus, IncidentStatus, Monitor, Node, NodeRole, NodeStatus, TlsPaths,
        DEFAULT_ADMIN_ADDR,
    };
    use pingmesh_store::SqliteStore;

    fn config(role: NodeRole) -> Arc<Config> {
        Arc::new(Config {
            node_id: "self".into(),
            node_name: "self".into(),
            role,
            data_dir: std::env::temp_dir(),
            listen_addr: "0.0.0.0:7433".into(),
            cli_addr: DEFAULT_ADMIN_ADDR.into(),
            coordinator: None,
            tls: Some(TlsPaths::default()),
        })
    }

    fn self_node(status: NodeStatus, last_seen: i64) -> Node {
        Node {
            id: "self".into(),
            name: "self".into(),
            address: "127.0.0.1:7433".into(),
            role: NodeRole::Coordinator,
            status,
            last_seen,
            created_at: 0,
        }
    }

    fn enabled_monitor(id: &str) -> Monitor {
        let mut monitor: Monitor = serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("m-{id}"),
            "check_type": "http",
            "target": "example.com",
            "enabled": true,
        }))
        .unwrap();
        monitor.apply_defaults();
        monitor
    }

    fn coordinator_agent(store: Arc<SqliteStore>) -> Agent {
        Agent::new(
            config(NodeRole::Coordinator),
            store,
            Registry::new(),
            Arc::new(NoopAlerter),
            None,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_marks_self_online() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.create_node(&self_node(NodeStatus::Offline, 0)).unwrap();

        let agent = coordinator_agent(store.clone());
        agent.start();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let node = store.get_node("self").unwrap().unwrap();
        assert_eq!(node.status, NodeStatus::Online);
        assert!(agent.last_heartbeat().is_some());

        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_sync_populates_scheduler() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.create_node(&self_node(NodeStatus::Online, now_ms())).unwrap();
        store.create_monitor(&enabled_monitor("m1")).unwrap();

        let agent = coordinator_agent(store.clone());
        agent.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(agent.active_monitors(), 1);

        // Removing the monitor drains the scheduler on the next sync.
        store.delete_monitor("m1").unwrap();
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(agent.active_monitors(), 0);

        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn offline_sweep_runs_on_coordinator() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.create_node(&self_node(NodeStatus::Online, now_ms())).unwrap();
        store
            .create_node(&Node {
                id: "stale".into(),
                name: "stale".into(),
                address: "127.0.0.1:1".into(),
                role: NodeRole::Worker,
                status: NodeStatus::Online,
                last_seen: now_ms() - 100_000,
                created_at: 0,
            })
            .unwrap();

        let agent = coordinator_agent(store.clone());
        agent.start();
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(
            store.get_node("stale").unwrap().unwrap().status,
            NodeStatus::Offline
        );
        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn consensus_loop_drives_incidents() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.create_node(&self_node(NodeStatus::Online, now_ms())).unwrap();
        store.create_monitor(&enabled_monitor("m1")).unwrap();
        for ts in 1..=3 {
            store
                .insert_check_result(&CheckResult {
                    id: 0,
                    monitor_id: "m1".into(),
                    node_id: "self".into(),
                    status: CheckStatus::Down,
                    latency_ms: 1.0,
                    status_code: None,
                    error: None,
                    details: None,
                    timestamp: ts,
                })
                .unwrap();
        }

        let agent = coordinator_agent(store.clone());
        agent.start();

        // First consensus tick opens a suspect incident, the second confirms.
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(
            store.get_active_incident("m1").unwrap().unwrap().status,
            IncidentStatus::Suspect
        );
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(
            store.get_active_incident("m1").unwrap().unwrap().status,
            IncidentStatus::Confirmed
        );

        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn worker_without_coordinator_stays_local() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.create_node(&self_node(NodeStatus::Online, now_ms())).unwrap();

        let agent = Agent::new(
            config(NodeRole::Worker),
            store,
            Registry::new(),
            Arc::new(NoopAlerter),
            None,
        );
        agent.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        agent.stop().await;
    }
}
