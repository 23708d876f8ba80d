//! Per-monitor periodic check driver.
//!
//! Each scheduled monitor owns one task ticking at its interval. A tick that
//! arrives while the previous check is still in flight is skipped, never
//! queued, so slow targets cannot pile up executions. Produced results are
//! persisted and optionally forwarded to a result sink (workers wire this to
//! the coordinator push).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pingmesh_checker::{CheckOutcome, Registry};
use pingmesh_model::{now_ms, CheckResult, Monitor};
use pingmesh_store::Store;

/// Drives periodic execution of all enabled monitors on this node.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn Store>,
    registry: Registry,
    node_id: String,
    checks: Mutex<HashMap<String, ScheduledCheck>>,
    sink: Mutex<Option<mpsc::Sender<CheckResult>>>,
}

struct ScheduledCheck {
    cancel: CancellationToken,
    interval_ms: u64,
}

impl Scheduler {
    /// Create a scheduler for this node. The registry is fixed for the
    /// scheduler's lifetime; tests inject fake checkers through it.
    pub fn new(store: Arc<dyn Store>, registry: Registry, node_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                node_id: node_id.into(),
                checks: Mutex::new(HashMap::new()),
                sink: Mutex::new(None),
            }),
        }
    }

    /// Forward every stored result to `sink` as well (best effort).
    pub fn set_result_sink(&self, sink: mpsc::Sender<CheckResult>) {
        *self.inner.sink.lock() = Some(sink);
    }

    /// Reconcile the scheduled set against `monitors`: start tasks for new
    /// monitors, restart ones whose interval changed, stop removed ones.
    pub fn sync_monitors(&self, monitors: &[Monitor]) {
        let mut checks = self.inner.checks.lock();

        let mut seen = HashSet::with_capacity(monitors.len());
        for monitor in monitors {
            seen.insert(monitor.id.clone());
            let interval_ms = monitor.effective_interval_ms();
            let needs_start = match checks.get(&monitor.id) {
                Some(existing) if existing.interval_ms == interval_ms => false,
                Some(existing) => {
                    debug!(monitor_id = %monitor.id, interval_ms, "restarting monitor with new interval");
                    existing.cancel.cancel();
                    true
                }
                None => true,
            };
            if needs_start {
                let entry = self.start_monitor(monitor.id.clone(), interval_ms);
                checks.insert(monitor.id.clone(), entry);
            }
        }

        checks.retain(|id, check| {
            if seen.contains(id) {
                true
            } else {
                debug!(monitor_id = %id, "stopping removed monitor");
                check.cancel.cancel();
                false
            }
        });
    }

    /// Stop all tickers and cancel in-flight checks.
    pub fn stop(&self) {
        let mut checks = self.inner.checks.lock();
        for (_, check) in checks.drain() {
            check.cancel.cancel();
        }
    }

    /// Number of currently scheduled monitors.
    pub fn active_count(&self) -> usize {
        self.inner.checks.lock().len()
    }

    /// Rough scheduled execution rate, used in heartbeats.
    pub fn checks_per_minute(&self) -> u32 {
        self.inner
            .checks
            .lock()
            .values()
            .map(|check| (60_000 / check.interval_ms.max(1)) as u32)
            .sum()
    }

    fn start_monitor(&self, monitor_id: String, interval_ms: u64) -> ScheduledCheck {
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(false));
        let inner = self.inner.clone();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        // Executions run detached so ticks keep being
                        // observed; the running flag turns overlapping ticks
                        // into skips. The child token aborts in-flight I/O
                        // when the monitor is stopped.
                        let inner = inner.clone();
                        let monitor_id = monitor_id.clone();
                        let running = running.clone();
                        let abort = task_cancel.child_token();
                        tokio::spawn(async move {
                            tokio::select! {
                                () = abort.cancelled() => {}
                                () = execute_check(&inner, &monitor_id, &running) => {}
                            }
                        });
                    }
                }
            }
        });

        ScheduledCheck {
            cancel,
            interval_ms,
        }
    }
}

/// Resets the executing flag even if the check future is dropped mid-flight.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn execute_check(inner: &Arc<Inner>, monitor_id: &str, running: &AtomicBool) {
    if running.swap(true, Ordering::SeqCst) {
        warn!(monitor_id, "skipping check: previous execution still running");
        return;
    }
    let _guard = RunningGuard(running);

    // Reload so parameter edits between ticks take effect.
    let monitor = match inner.store.get_monitor(monitor_id) {
        Ok(Some(monitor)) if monitor.enabled => monitor,
        Ok(_) => {
            debug!(monitor_id, "monitor missing or disabled, skipping");
            return;
        }
        Err(e) => {
            error!(monitor_id, error = %e, "loading monitor failed");
            return;
        }
    };

    let Some(checker) = inner.registry.get(monitor.check_type) else {
        error!(monitor_id, check_type = %monitor.check_type, "no checker registered");
        return;
    };

    let timeout = Duration::from_millis(monitor.timeout_ms);
    let attempts = monitor.effective_retries();
    let mut last: Option<CheckOutcome> = None;

    for attempt in 1..=attempts {
        match tokio::time::timeout(timeout, checker.check(&monitor)).await {
            Ok(outcome) => {
                let is_up = outcome.status.is_up();
                last = Some(outcome);
                if is_up {
                    break;
                }
            }
            Err(_) => {
                warn!(monitor_id, attempt, timeout_ms = monitor.timeout_ms, "check attempt timed out");
            }
        }
    }

    let outcome = last.unwrap_or_else(|| {
        CheckOutcome::down(format!(
            "all {attempts} attempts timed out after {}ms",
            monitor.timeout_ms
        ))
    });

    let result = CheckResult {
        id: 0,
        monitor_id: monitor.id.clone(),
        node_id: inner.node_id.clone(),
        status: outcome.status,
        latency_ms: outcome.latency_ms,
        status_code: outcome.status_code,
        error: outcome.error,
        details: outcome.details,
        timestamp: now_ms(),
    };

    if let Err(e) = inner.store.insert_check_result(&result) {
        error!(monitor_id, error = %e, "storing check result failed");
    }

    info!(
        monitor = %monitor.name,
        status = %result.status,
        latency_ms = result.latency_ms,
        "check completed"
    );

    let sink = inner.sink.lock().clone();
    if let Some(sink) = sink {
        if let Err(e) = sink.try_send(result) {
            warn!(monitor_id, error = %e, "result sink full or closed, dropping");
        }
    }
}
