//! SQLite-backed [`Store`] implementation.
//!
//! One connection in WAL mode guarded by a mutex; SQLite's writer lock plus
//! the conditional UPDATE in token consumption give the atomicity the
//! contract requires.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension, Row};

use pingmesh_model::{
    now_ms, AlertChannel, AlertRecord, ChannelKind, CheckResult, CheckStatus, CheckType, Incident,
    IncidentStatus, Monitor, Node, NodeRole, NodeStatus, QuorumType,
};

use crate::migrations::{MIGRATION_SQL, SCHEMA_VERSION};
use crate::{Error, Result, ResultFilter, Store};

/// Upper bound on streak scans; far above any sane threshold.
const STREAK_SCAN_CAP: u32 = 100;

const MONITOR_COLS: &str = "id, name, group_name, check_type, target, port, interval_ms, \
     timeout_ms, retries, expected_status, expected_keyword, dns_record_type, dns_expected, \
     failure_threshold, recovery_threshold, quorum_type, quorum_n, cooldown_ms, enabled, \
     created_at, updated_at";

const RESULT_COLS: &str =
    "id, monitor_id, node_id, status, latency_ms, status_code, error, details, timestamp";

const INCIDENT_COLS: &str = "id, monitor_id, status, started_at, confirmed_at, resolved_at, \
     confirming_nodes, created_at, updated_at";

/// SQLite store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the store at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store. Intended for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.execute_batch(MIGRATION_SQL)?;
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (rowid, version) VALUES (1, ?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn count_streak(&self, monitor_id: &str, node_id: &str, count_up: bool) -> Result<u32> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT status FROM check_results
             WHERE monitor_id = ?1 AND node_id = ?2
             ORDER BY timestamp DESC, id DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![monitor_id, node_id, STREAK_SCAN_CAP], |row| {
            row.get::<_, String>(0)
        })?;

        let mut count = 0;
        for row in rows {
            let status = row?;
            let is_up = status == "up";
            if is_up == count_up {
                count += 1;
            } else {
                break;
            }
        }
        Ok(count)
    }
}

impl Store for SqliteStore {
    fn create_node(&self, node: &Node) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO nodes (id, name, address, role, status, last_seen, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                node.id,
                node.name,
                node.address,
                node.role.to_string(),
                node.status.to_string(),
                node.last_seen,
                node.created_at
            ],
        )?;
        Ok(())
    }

    fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT id, name, address, role, status, last_seen, created_at
                 FROM nodes WHERE id = ?1",
                params![id],
                raw_node,
            )
            .optional()?;
        row.map(RawNode::into_node).transpose()
    }

    fn list_nodes(&self) -> Result<Vec<Node>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, address, role, status, last_seen, created_at
             FROM nodes ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], raw_node)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?.into_node()?);
        }
        Ok(nodes)
    }

    fn update_node(&self, node: &Node) -> Result<()> {
        self.conn.lock().execute(
            "UPDATE nodes SET name = ?1, address = ?2, role = ?3, status = ?4, last_seen = ?5
             WHERE id = ?6",
            params![
                node.name,
                node.address,
                node.role.to_string(),
                node.status.to_string(),
                node.last_seen,
                node.id
            ],
        )?;
        Ok(())
    }

    fn delete_node(&self, id: &str) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn update_node_status(&self, id: &str, status: NodeStatus, last_seen: i64) -> Result<()> {
        self.conn.lock().execute(
            "UPDATE nodes SET status = ?1, last_seen = ?2 WHERE id = ?3",
            params![status.to_string(), last_seen, id],
        )?;
        Ok(())
    }

    fn create_monitor(&self, m: &Monitor) -> Result<()> {
        self.conn.lock().execute(
            &format!(
                "INSERT INTO monitors ({MONITOR_COLS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                 ?17, ?18, ?19, ?20, ?21)"
            ),
            params![
                m.id,
                m.name,
                m.group,
                m.check_type.to_string(),
                m.target,
                m.port,
                m.interval_ms,
                m.timeout_ms,
                m.retries,
                m.expected_status,
                m.expected_keyword,
                m.dns_record_type,
                m.dns_expected,
                m.failure_threshold,
                m.recovery_threshold,
                quorum_to_str(m.quorum_type),
                m.quorum_n,
                m.cooldown_ms,
                m.enabled,
                m.created_at,
                m.updated_at
            ],
        )?;
        Ok(())
    }

    fn get_monitor(&self, id: &str) -> Result<Option<Monitor>> {
        let row = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {MONITOR_COLS} FROM monitors WHERE id = ?1"),
                params![id],
                raw_monitor,
            )
            .optional()?;
        row.map(RawMonitor::into_monitor).transpose()
    }

    fn list_monitors(&self, group: Option<&str>) -> Result<Vec<Monitor>> {
        let conn = self.conn.lock();
        let mut out = Vec::new();
        match group {
            Some(g) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MONITOR_COLS} FROM monitors WHERE group_name = ?1 ORDER BY name"
                ))?;
                let rows = stmt.query_map(params![g], raw_monitor)?;
                for row in rows {
                    out.push(row?.into_monitor()?);
                }
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("SELECT {MONITOR_COLS} FROM monitors ORDER BY name"))?;
                let rows = stmt.query_map([], raw_monitor)?;
                for row in rows {
                    out.push(row?.into_monitor()?);
                }
            }
        }
        Ok(out)
    }

    fn update_monitor(&self, m: &Monitor) -> Result<()> {
        self.conn.lock().execute(
            "UPDATE monitors SET name = ?1, group_name = ?2, check_type = ?3, target = ?4,
             port = ?5, interval_ms = ?6, timeout_ms = ?7, retries = ?8, expected_status = ?9,
             expected_keyword = ?10, dns_record_type = ?11, dns_expected = ?12,
             failure_threshold = ?13, recovery_threshold = ?14, quorum_type = ?15,
             quorum_n = ?16, cooldown_ms = ?17, enabled = ?18, updated_at = ?19
             WHERE id = ?20",
            params![
                m.name,
                m.group,
                m.check_type.to_string(),
                m.target,
                m.port,
                m.interval_ms,
                m.timeout_ms,
                m.retries,
                m.expected_status,
                m.expected_keyword,
                m.dns_record_type,
                m.dns_expected,
                m.failure_threshold,
                m.recovery_threshold,
                quorum_to_str(m.quorum_type),
                m.quorum_n,
                m.cooldown_ms,
                m.enabled,
                m.updated_at,
                m.id
            ],
        )?;
        Ok(())
    }

    fn delete_monitor(&self, id: &str) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM monitors WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn list_enabled_monitors(&self) -> Result<Vec<Monitor>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MONITOR_COLS} FROM monitors WHERE enabled = 1 ORDER BY name"
        ))?;
        let rows = stmt.query_map([], raw_monitor)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_monitor()?);
        }
        Ok(out)
    }

    fn insert_check_result(&self, r: &CheckResult) -> Result<()> {
        let details = r
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.lock().execute(
            "INSERT INTO check_results
             (monitor_id, node_id, status, latency_ms, status_code, error, details, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                r.monitor_id,
                r.node_id,
                r.status.to_string(),
                r.latency_ms,
                r.status_code,
                r.error,
                details,
                r.timestamp
            ],
        )?;
        Ok(())
    }

    fn get_latest_result(&self, monitor_id: &str, node_id: &str) -> Result<Option<CheckResult>> {
        let row = self
            .conn
            .lock()
            .query_row(
                &format!(
                    "SELECT {RESULT_COLS} FROM check_results
                     WHERE monitor_id = ?1 AND node_id = ?2
                     ORDER BY timestamp DESC, id DESC LIMIT 1"
                ),
                params![monitor_id, node_id],
                raw_result,
            )
            .optional()?;
        row.map(RawResult::into_result).transpose()
    }

    fn count_consecutive_failures(&self, monitor_id: &str, node_id: &str) -> Result<u32> {
        self.count_streak(monitor_id, node_id, false)
    }

    fn count_consecutive_successes(&self, monitor_id: &str, node_id: &str) -> Result<u32> {
        self.count_streak(monitor_id, node_id, true)
    }

    fn list_check_results(&self, filter: &ResultFilter) -> Result<Vec<CheckResult>> {
        let mut sql = format!("SELECT {RESULT_COLS} FROM check_results WHERE 1=1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(monitor_id) = &filter.monitor_id {
            sql.push_str(&format!(" AND monitor_id = ?{}", args.len() + 1));
            args.push(Value::Text(monitor_id.clone()));
        }
        if let Some(node_id) = &filter.node_id {
            sql.push_str(&format!(" AND node_id = ?{}", args.len() + 1));
            args.push(Value::Text(node_id.clone()));
        }
        if let Some(since) = filter.since {
            sql.push_str(&format!(" AND timestamp >= ?{}", args.len() + 1));
            args.push(Value::Integer(since));
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), raw_result)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_result()?);
        }
        Ok(out)
    }

    fn create_incident(&self, inc: &Incident) -> Result<()> {
        let nodes = serde_json::to_string(&inc.confirming_nodes)?;
        self.conn.lock().execute(
            &format!(
                "INSERT INTO incidents ({INCIDENT_COLS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                inc.id,
                inc.monitor_id,
                inc.status.to_string(),
                inc.started_at,
                inc.confirmed_at,
                inc.resolved_at,
                nodes,
                inc.created_at,
                inc.updated_at
            ],
        )?;
        Ok(())
    }

    fn get_incident(&self, id: &str) -> Result<Option<Incident>> {
        let row = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {INCIDENT_COLS} FROM incidents WHERE id = ?1"),
                params![id],
                raw_incident,
            )
            .optional()?;
        row.map(RawIncident::into_incident).transpose()
    }

    fn get_active_incident(&self, monitor_id: &str) -> Result<Option<Incident>> {
        let row = self
            .conn
            .lock()
            .query_row(
                &format!(
                    "SELECT {INCIDENT_COLS} FROM incidents
                     WHERE monitor_id = ?1 AND status != 'resolved'
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![monitor_id],
                raw_incident,
            )
            .optional()?;
        row.map(RawIncident::into_incident).transpose()
    }

    fn update_incident(&self, inc: &Incident) -> Result<()> {
        let nodes = serde_json::to_string(&inc.confirming_nodes)?;
        self.conn.lock().execute(
            "UPDATE incidents SET status = ?1, confirmed_at = ?2, resolved_at = ?3,
             confirming_nodes = ?4, updated_at = ?5 WHERE id = ?6",
            params![
                inc.status.to_string(),
                inc.confirmed_at,
                inc.resolved_at,
                nodes,
                inc.updated_at,
                inc.id
            ],
        )?;
        Ok(())
    }

    fn list_incidents(&self, active_only: bool) -> Result<Vec<Incident>> {
        let mut sql = format!("SELECT {INCIDENT_COLS} FROM incidents");
        if active_only {
            sql.push_str(" WHERE status != 'resolved'");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], raw_incident)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_incident()?);
        }
        Ok(out)
    }

    fn store_join_token(&self, token_hash: &str, expires_at: i64) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO join_tokens (token_hash, expires_at, used, created_at)
             VALUES (?1, ?2, 0, ?3)",
            params![token_hash, expires_at, now_ms()],
        )?;
        Ok(())
    }

    fn validate_and_consume_token(&self, token_hash: &str) -> Result<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE join_tokens SET used = 1
             WHERE token_hash = ?1 AND used = 0 AND expires_at > ?2",
            params![token_hash, now_ms()],
        )?;
        Ok(changed > 0)
    }

    fn create_alert_channel(&self, ch: &AlertChannel) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO alert_channels (id, name, type, enabled, config, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ch.id,
                ch.name,
                ch.kind.to_string(),
                ch.enabled,
                ch.config,
                ch.created_at,
                ch.updated_at
            ],
        )?;
        Ok(())
    }

    fn get_alert_channel(&self, id: &str) -> Result<Option<AlertChannel>> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT id, name, type, enabled, config, created_at, updated_at
                 FROM alert_channels WHERE id = ?1",
                params![id],
                raw_channel,
            )
            .optional()?;
        row.map(RawChannel::into_channel).transpose()
    }

    fn list_alert_channels(&self) -> Result<Vec<AlertChannel>> {
        self.list_channels_where("")
    }

    fn list_enabled_alert_channels(&self) -> Result<Vec<AlertChannel>> {
        self.list_channels_where(" WHERE enabled = 1")
    }

    fn update_alert_channel(&self, ch: &AlertChannel) -> Result<()> {
        self.conn.lock().execute(
            "UPDATE alert_channels SET name = ?1, type = ?2, enabled = ?3, config = ?4,
             updated_at = ?5 WHERE id = ?6",
            params![
                ch.name,
                ch.kind.to_string(),
                ch.enabled,
                ch.config,
                ch.updated_at,
                ch.id
            ],
        )?;
        Ok(())
    }

    fn delete_alert_channel(&self, id: &str) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM alert_channels WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn insert_alert_record(&self, rec: &AlertRecord) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO alert_history
             (channel_id, incident_id, monitor_id, event_type, status, error, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                rec.channel_id,
                rec.incident_id,
                rec.monitor_id,
                rec.event_type,
                rec.status,
                rec.error,
                rec.sent_at
            ],
        )?;
        Ok(())
    }

    fn list_alert_history(&self, channel_id: Option<&str>, limit: u32) -> Result<Vec<AlertRecord>> {
        let mut sql = String::from(
            "SELECT id, channel_id, incident_id, monitor_id, event_type, status, error, sent_at
             FROM alert_history",
        );
        let mut args: Vec<Value> = Vec::new();
        if let Some(channel_id) = channel_id {
            sql.push_str(" WHERE channel_id = ?1");
            args.push(Value::Text(channel_id.to_string()));
        }
        sql.push_str(&format!(" ORDER BY sent_at DESC, id DESC LIMIT {limit}"));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok(AlertRecord {
                id: row.get(0)?,
                channel_id: row.get(1)?,
                incident_id: row.get(2)?,
                monitor_id: row.get(3)?,
                event_type: row.get(4)?,
                status: row.get(5)?,
                error: row.get(6)?,
                sent_at: row.get(7)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl SqliteStore {
    fn list_channels_where(&self, clause: &str) -> Result<Vec<AlertChannel>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, name, type, enabled, config, created_at, updated_at
             FROM alert_channels{clause} ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([], raw_channel)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_channel()?);
        }
        Ok(out)
    }
}

// Raw row carriers: read SQLite-native types in the row closure, convert to
// model enums afterwards so parse failures surface as store errors instead of
// rusqlite conversion errors.

struct RawNode {
    id: String,
    name: String,
    address: String,
    role: String,
    status: String,
    last_seen: i64,
    created_at: i64,
}

fn raw_node(row: &Row<'_>) -> rusqlite::Result<RawNode> {
    Ok(RawNode {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        role: row.get(3)?,
        status: row.get(4)?,
        last_seen: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl RawNode {
    fn into_node(self) -> Result<Node> {
        Ok(Node {
            id: self.id,
            name: self.name,
            address: self.address,
            role: parse_role(&self.role)?,
            status: parse_node_status(&self.status)?,
            last_seen: self.last_seen,
            created_at: self.created_at,
        })
    }
}

struct RawMonitor {
    id: String,
    name: String,
    group: Option<String>,
    check_type: String,
    target: String,
    port: Option<u16>,
    interval_ms: u64,
    timeout_ms: u64,
    retries: u32,
    expected_status: Option<u16>,
    expected_keyword: Option<String>,
    dns_record_type: Option<String>,
    dns_expected: Option<String>,
    failure_threshold: u32,
    recovery_threshold: u32,
    quorum_type: String,
    quorum_n: u32,
    cooldown_ms: u64,
    enabled: bool,
    created_at: i64,
    updated_at: i64,
}

fn raw_monitor(row: &Row<'_>) -> rusqlite::Result<RawMonitor> {
    Ok(RawMonitor {
        id: row.get(0)?,
        name: row.get(1)?,
        group: row.get(2)?,
        check_type: row.get(3)?,
        target: row.get(4)?,
        port: row.get(5)?,
        interval_ms: row.get(6)?,
        timeout_ms: row.get(7)?,
        retries: row.get(8)?,
        expected_status: row.get(9)?,
        expected_keyword: row.get(10)?,
        dns_record_type: row.get(11)?,
        dns_expected: row.get(12)?,
        failure_threshold: row.get(13)?,
        recovery_threshold: row.get(14)?,
        quorum_type: row.get(15)?,
        quorum_n: row.get(16)?,
        cooldown_ms: row.get(17)?,
        enabled: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

impl RawMonitor {
    fn into_monitor(self) -> Result<Monitor> {
        Ok(Monitor {
            id: self.id,
            name: self.name,
            group: self.group,
            check_type: parse_check_type(&self.check_type)?,
            target: self.target,
            port: self.port,
            interval_ms: self.interval_ms,
            timeout_ms: self.timeout_ms,
            retries: self.retries,
            expected_status: self.expected_status,
            expected_keyword: self.expected_keyword,
            dns_record_type: self.dns_record_type,
            dns_expected: self.dns_expected,
            failure_threshold: self.failure_threshold,
            recovery_threshold: self.recovery_threshold,
            quorum_type: parse_quorum(&self.quorum_type)?,
            quorum_n: self.quorum_n,
            cooldown_ms: self.cooldown_ms,
            enabled: self.enabled,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct RawResult {
    id: i64,
    monitor_id: String,
    node_id: String,
    status: String,
    latency_ms: f64,
    status_code: Option<u16>,
    error: Option<String>,
    details: Option<String>,
    timestamp: i64,
}

fn raw_result(row: &Row<'_>) -> rusqlite::Result<RawResult> {
    Ok(RawResult {
        id: row.get(0)?,
        monitor_id: row.get(1)?,
        node_id: row.get(2)?,
        status: row.get(3)?,
        latency_ms: row.get(4)?,
        status_code: row.get(5)?,
        error: row.get(6)?,
        details: row.get(7)?,
        timestamp: row.get(8)?,
    })
}

impl RawResult {
    fn into_result(self) -> Result<CheckResult> {
        let details = self
            .details
            .filter(|d| !d.is_empty())
            .map(|d| serde_json::from_str(&d))
            .transpose()?;
        Ok(CheckResult {
            id: self.id,
            monitor_id: self.monitor_id,
            node_id: self.node_id,
            status: parse_check_status(&self.status)?,
            latency_ms: self.latency_ms,
            status_code: self.status_code,
            error: self.error,
            details,
            timestamp: self.timestamp,
        })
    }
}

struct RawIncident {
    id: String,
    monitor_id: String,
    status: String,
    started_at: i64,
    confirmed_at: Option<i64>,
    resolved_at: Option<i64>,
    confirming_nodes: Option<String>,
    created_at: i64,
    updated_at: i64,
}

fn raw_incident(row: &Row<'_>) -> rusqlite::Result<RawIncident> {
    Ok(RawIncident {
        id: row.get(0)?,
        monitor_id: row.get(1)?,
        status: row.get(2)?,
        started_at: row.get(3)?,
        confirmed_at: row.get(4)?,
        resolved_at: row.get(5)?,
        confirming_nodes: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl RawIncident {
    fn into_incident(self) -> Result<Incident> {
        let confirming_nodes = match self.confirming_nodes.filter(|n| !n.is_empty()) {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };
        Ok(Incident {
            id: self.id,
            monitor_id: self.monitor_id,
            status: parse_incident_status(&self.status)?,
            started_at: self.started_at,
            confirmed_at: self.confirmed_at,
            resolved_at: self.resolved_at,
            confirming_nodes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct RawChannel {
    id: String,
    name: String,
    kind: String,
    enabled: bool,
    config: String,
    created_at: i64,
    updated_at: i64,
}

fn raw_channel(row: &Row<'_>) -> rusqlite::Result<RawChannel> {
    Ok(RawChannel {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        enabled: row.get(3)?,
        config: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl RawChannel {
    fn into_channel(self) -> Result<AlertChannel> {
        let kind = match self.kind.as_str() {
            "webhook" => ChannelKind::Webhook,
            "email" => ChannelKind::Email,
            other => return Err(Error::Corrupt(format!("alert channel type: {other}"))),
        };
        Ok(AlertChannel {
            id: self.id,
            name: self.name,
            kind,
            enabled: self.enabled,
            config: self.config,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn quorum_to_str(q: QuorumType) -> &'static str {
    match q {
        QuorumType::Majority => "majority",
        QuorumType::NOfM => "n_of_m",
    }
}

fn parse_quorum(s: &str) -> Result<QuorumType> {
    match s {
        "majority" => Ok(QuorumType::Majority),
        "n_of_m" => Ok(QuorumType::NOfM),
        other => Err(Error::Corrupt(format!("quorum type: {other}"))),
    }
}

fn parse_role(s: &str) -> Result<NodeRole> {
    match s {
        "coordinator" => Ok(NodeRole::Coordinator),
        "worker" => Ok(NodeRole::Worker),
        other => Err(Error::Corrupt(format!("node role: {other}"))),
    }
}

fn parse_node_status(s: &str) -> Result<NodeStatus> {
    match s {
        "online" => Ok(NodeStatus::Online),
        "offline" => Ok(NodeStatus::Offline),
        "suspect" => Ok(NodeStatus::Suspect),
        other => Err(Error::Corrupt(format!("node status: {other}"))),
    }
}

fn parse_check_type(s: &str) -> Result<CheckType> {
    match s {
        "icmp" => Ok(CheckType::Icmp),
        "tcp" => Ok(CheckType::Tcp),
        "http" => Ok(CheckType::Http),
        "https" => Ok(CheckType::Https),
        "dns" => Ok(CheckType::Dns),
        "http_keyword" => Ok(CheckType::HttpKeyword),
        other => Err(Error::Corrupt(format!("check type: {other}"))),
    }
}

fn parse_check_status(s: &str) -> Result<CheckStatus> {
    match s {
        "up" => Ok(CheckStatus::Up),
        "down" => Ok(CheckStatus::Down),
        "degraded" => Ok(CheckStatus::Degraded),
        other => Err(Error::Corrupt(format!("check status: {other}"))),
    }
}

fn parse_incident_status(s: &str) -> Result<IncidentStatus> {
    match s {
        "suspect" => Ok(IncidentStatus::Suspect),
        "confirmed" => Ok(IncidentStatus::Confirmed),
        "resolved" => Ok(IncidentStatus::Resolved),
        other => Err(Error::Corrupt(format!("incident status: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn node(id: &str) -> Node {
        Node {
            id: id.into(),
            name: format!("node-{id}"),
            address: "127.0.0.1:7433".into(),
            role: NodeRole::Worker,
            status: NodeStatus::Online,
            last_seen: now_ms(),
            created_at: now_ms(),
        }
    }

    fn monitor(id: &str) -> Monitor {
        let mut m: Monitor = serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("monitor-{id}"),
            "check_type": "http",
            "target": "example.com",
            "enabled": true,
        }))
        .unwrap();
        m.apply_defaults();
        m.created_at = now_ms();
        m.updated_at = m.created_at;
        m
    }

    fn result(monitor_id: &str, node_id: &str, status: CheckStatus, ts: i64) -> CheckResult {
        CheckResult {
            id: 0,
            monitor_id: monitor_id.into(),
            node_id: node_id.into(),
            status,
            latency_ms: 4.2,
            status_code: None,
            error: None,
            details: None,
            timestamp: ts,
        }
    }

    #[test]
    fn node_crud_roundtrip() {
        let st = store();
        let n = node("a");
        st.create_node(&n).unwrap();
        assert_eq!(st.get_node("a").unwrap().unwrap(), n);

        st.update_node_status("a", NodeStatus::Offline, 42).unwrap();
        let updated = st.get_node("a").unwrap().unwrap();
        assert_eq!(updated.status, NodeStatus::Offline);
        assert_eq!(updated.last_seen, 42);

        st.delete_node("a").unwrap();
        assert!(st.get_node("a").unwrap().is_none());
    }

    #[test]
    fn monitor_roundtrip_preserves_optionals() {
        let st = store();
        let mut m = monitor("m1");
        m.group = Some("edge".into());
        m.port = Some(8443);
        m.expected_status = Some(204);
        m.dns_record_type = Some("MX".into());
        st.create_monitor(&m).unwrap();
        assert_eq!(st.get_monitor("m1").unwrap().unwrap(), m);

        let grouped = st.list_monitors(Some("edge")).unwrap();
        assert_eq!(grouped.len(), 1);
        assert!(st.list_monitors(Some("other")).unwrap().is_empty());
    }

    #[test]
    fn disabled_monitors_excluded_from_enabled_list() {
        let st = store();
        let mut a = monitor("a");
        a.enabled = false;
        st.create_monitor(&a).unwrap();
        st.create_monitor(&monitor("b")).unwrap();

        let enabled = st.list_enabled_monitors().unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, "b");
    }

    #[test]
    fn failure_streak_counts_degraded_and_stops_at_up() {
        let st = store();
        st.insert_check_result(&result("m", "n", CheckStatus::Down, 1))
            .unwrap();
        st.insert_check_result(&result("m", "n", CheckStatus::Up, 2))
            .unwrap();
        st.insert_check_result(&result("m", "n", CheckStatus::Down, 3))
            .unwrap();
        st.insert_check_result(&result("m", "n", CheckStatus::Degraded, 4))
            .unwrap();

        assert_eq!(st.count_consecutive_failures("m", "n").unwrap(), 2);
        assert_eq!(st.count_consecutive_successes("m", "n").unwrap(), 0);
    }

    #[test]
    fn failure_streak_zero_when_latest_up() {
        let st = store();
        st.insert_check_result(&result("m", "n", CheckStatus::Down, 1))
            .unwrap();
        st.insert_check_result(&result("m", "n", CheckStatus::Up, 2))
            .unwrap();

        assert_eq!(st.count_consecutive_failures("m", "n").unwrap(), 0);
        assert_eq!(st.count_consecutive_successes("m", "n").unwrap(), 1);
    }

    #[test]
    fn streaks_empty_history() {
        let st = store();
        assert_eq!(st.count_consecutive_failures("m", "n").unwrap(), 0);
        assert_eq!(st.count_consecutive_successes("m", "n").unwrap(), 0);
    }

    #[test]
    fn latest_result_and_filters() {
        let st = store();
        st.insert_check_result(&result("m1", "n1", CheckStatus::Up, 10))
            .unwrap();
        st.insert_check_result(&result("m1", "n2", CheckStatus::Down, 20))
            .unwrap();
        st.insert_check_result(&result("m2", "n1", CheckStatus::Up, 30))
            .unwrap();

        let latest = st.get_latest_result("m1", "n1").unwrap().unwrap();
        assert_eq!(latest.timestamp, 10);
        assert!(latest.id > 0);

        let filtered = st
            .list_check_results(&ResultFilter {
                monitor_id: Some("m1".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].timestamp, 20); // newest first

        let since = st
            .list_check_results(&ResultFilter {
                since: Some(25),
                limit: Some(10),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].monitor_id, "m2");
    }

    #[test]
    fn details_roundtrip_as_json() {
        let st = store();
        let mut r = result("m", "n", CheckStatus::Up, 1);
        r.details = Some(serde_json::json!({"tls_expiry_days": 3, "answers": ["1.2.3.4"]}));
        st.insert_check_result(&r).unwrap();

        let back = st.get_latest_result("m", "n").unwrap().unwrap();
        assert_eq!(back.details, r.details);
    }

    #[test]
    fn active_incident_is_most_recent_unresolved() {
        let st = store();
        let mk = |id: &str, status: IncidentStatus, created: i64| Incident {
            id: id.into(),
            monitor_id: "m".into(),
            status,
            started_at: created,
            confirmed_at: None,
            resolved_at: None,
            confirming_nodes: vec![],
            created_at: created,
            updated_at: created,
        };
        st.create_incident(&mk("old", IncidentStatus::Resolved, 1))
            .unwrap();
        st.create_incident(&mk("live", IncidentStatus::Suspect, 2))
            .unwrap();

        let active = st.get_active_incident("m").unwrap().unwrap();
        assert_eq!(active.id, "live");

        let mut resolved = active;
        resolved.status = IncidentStatus::Resolved;
        resolved.resolved_at = Some(3);
        st.update_incident(&resolved).unwrap();
        assert!(st.get_active_incident("m").unwrap().is_none());
    }

    #[test]
    fn incident_confirming_nodes_roundtrip() {
        let st = store();
        let inc = Incident {
            id: "i".into(),
            monitor_id: "m".into(),
            status: IncidentStatus::Confirmed,
            started_at: 1,
            confirmed_at: Some(2),
            resolved_at: None,
            confirming_nodes: vec!["a".into(), "b".into(), "c".into()],
            created_at: 1,
            updated_at: 2,
        };
        st.create_incident(&inc).unwrap();
        assert_eq!(st.get_incident("i").unwrap().unwrap(), inc);
    }

    #[test]
    fn token_consumed_exactly_once() {
        let st = store();
        st.store_join_token("hash-1", now_ms() + 60_000).unwrap();

        assert!(st.validate_and_consume_token("hash-1").unwrap());
        assert!(!st.validate_and_consume_token("hash-1").unwrap());
    }

    #[test]
    fn expired_token_rejected_and_not_consumed() {
        let st = store();
        st.store_join_token("hash-2", now_ms() - 1).unwrap();
        assert!(!st.validate_and_consume_token("hash-2").unwrap());
    }

    #[test]
    fn unknown_token_rejected() {
        let st = store();
        assert!(!st.validate_and_consume_token("nope").unwrap());
    }

    #[test]
    fn concurrent_token_consumption_single_winner() {
        let st = std::sync::Arc::new(store());
        st.store_join_token("contested", now_ms() + 60_000).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let st = st.clone();
            handles.push(std::thread::spawn(move || {
                st.validate_and_consume_token("contested").unwrap()
            }));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
    }

    #[test]
    fn alert_channel_and_history_roundtrip() {
        let st = store();
        let ch = AlertChannel {
            id: "c1".into(),
            name: "ops".into(),
            kind: ChannelKind::Webhook,
            enabled: true,
            config: r#"{"url":"https://example.com/hook"}"#.into(),
            created_at: 1,
            updated_at: 1,
        };
        st.create_alert_channel(&ch).unwrap();
        assert_eq!(st.get_alert_channel("c1").unwrap().unwrap(), ch);

        let mut disabled = ch.clone();
        disabled.id = "c2".into();
        disabled.enabled = false;
        st.create_alert_channel(&disabled).unwrap();
        assert_eq!(st.list_alert_channels().unwrap().len(), 2);
        assert_eq!(st.list_enabled_alert_channels().unwrap().len(), 1);

        st.insert_alert_record(&AlertRecord {
            id: 0,
            channel_id: "c1".into(),
            incident_id: "i".into(),
            monitor_id: "m".into(),
            event_type: "alert".into(),
            status: "success".into(),
            error: None,
            sent_at: 5,
        })
        .unwrap();
        let history = st.list_alert_history(Some("c1"), 10).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].id > 0);
        assert!(st.list_alert_history(Some("c2"), 10).unwrap().is_empty());
    }

    #[test]
    fn on_disk_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pingmesh.db");
        {
            let st = SqliteStore::open(&path).unwrap();
            st.create_node(&node("persist")).unwrap();
        }
        let st = SqliteStore::open(&path).unwrap();
        assert!(st.get_node("persist").unwrap().is_some());
    }
}
