//! Embedded schema migrations.

pub(crate) const SCHEMA_VERSION: i64 = 1;

pub(crate) const MIGRATION_SQL: &str = r"
CREATE TABLE IF NOT EXISTS nodes (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    address     TEXT NOT NULL,
    role        TEXT NOT NULL DEFAULT 'worker',
    status      TEXT NOT NULL DEFAULT 'online',
    last_seen   INTEGER NOT NULL,
    created_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS monitors (
    id                  TEXT PRIMARY KEY,
    name                TEXT NOT NULL,
    group_name          TEXT,
    check_type          TEXT NOT NULL,
    target              TEXT NOT NULL,
    port                INTEGER,
    interval_ms         INTEGER NOT NULL DEFAULT 60000,
    timeout_ms          INTEGER NOT NULL DEFAULT 5000,
    retries             INTEGER NOT NULL DEFAULT 1,
    expected_status     INTEGER,
    expected_keyword    TEXT,
    dns_record_type     TEXT,
    dns_expected        TEXT,
    failure_threshold   INTEGER NOT NULL DEFAULT 3,
    recovery_threshold  INTEGER NOT NULL DEFAULT 2,
    quorum_type         TEXT NOT NULL DEFAULT 'majority',
    quorum_n            INTEGER NOT NULL DEFAULT 0,
    cooldown_ms         INTEGER NOT NULL DEFAULT 300000,
    enabled             INTEGER NOT NULL DEFAULT 1,
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS check_results (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    monitor_id  TEXT NOT NULL,
    node_id     TEXT NOT NULL,
    status      TEXT NOT NULL,
    latency_ms  REAL NOT NULL DEFAULT 0,
    status_code INTEGER,
    error       TEXT,
    details     TEXT,
    timestamp   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_monitor_node
    ON check_results(monitor_id, node_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_results_timestamp
    ON check_results(timestamp);

CREATE TABLE IF NOT EXISTS incidents (
    id               TEXT PRIMARY KEY,
    monitor_id       TEXT NOT NULL,
    status           TEXT NOT NULL,
    started_at       INTEGER NOT NULL,
    confirmed_at     INTEGER,
    resolved_at      INTEGER,
    confirming_nodes TEXT,
    created_at       INTEGER NOT NULL,
    updated_at       INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_incidents_monitor
    ON incidents(monitor_id, status);

CREATE TABLE IF NOT EXISTS join_tokens (
    token_hash  TEXT PRIMARY KEY,
    expires_at  INTEGER NOT NULL,
    used        INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS alert_channels (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    type        TEXT NOT NULL,
    enabled     INTEGER NOT NULL DEFAULT 1,
    config      TEXT NOT NULL DEFAULT '{}',
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS alert_history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id  TEXT NOT NULL,
    incident_id TEXT NOT NULL,
    monitor_id  TEXT NOT NULL,
    event_type  TEXT NOT NULL,
    status      TEXT NOT NULL,
    error       TEXT,
    sent_at     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
";
