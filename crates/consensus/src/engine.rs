//! The coordinator's consensus tick.

use std::sync::Arc;

use tracing::{debug, error};

use pingmesh_cluster::Manager;
use pingmesh_model::{IncidentStatus, Monitor, Node};
use pingmesh_store::Store;

use crate::{quorum_met, Alerter, IncidentManager, Result};

/// Evaluates quorum for every enabled monitor and drives incident
/// lifecycles. Runs on the coordinator only; holds no state between ticks.
pub struct Engine {
    store: Arc<dyn Store>,
    cluster: Manager,
    incidents: IncidentManager,
    alerter: Arc<dyn Alerter>,
}

impl Engine {
    /// Create an engine over the given store and alert seam.
    pub fn new(store: Arc<dyn Store>, alerter: Arc<dyn Alerter>) -> Self {
        Self {
            cluster: Manager::new(store.clone()),
            incidents: IncidentManager::new(store.clone()),
            store,
            alerter,
        }
    }

    /// One evaluation pass over all enabled monitors.
    ///
    /// Individual monitor failures are logged and skipped so one bad row
    /// cannot starve the rest of the fleet.
    pub fn tick(&self) -> Result<()> {
        let monitors = self.store.list_enabled_monitors()?;
        let online = self.cluster.online_nodes()?;
        if online.is_empty() {
            debug!("no online nodes, skipping consensus tick");
            return Ok(());
        }

        for monitor in &monitors {
            if let Err(e) = self.evaluate_monitor(monitor, &online) {
                error!(monitor_id = %monitor.id, error = %e, "consensus evaluation failed");
            }
        }
        Ok(())
    }

    fn evaluate_monitor(&self, monitor: &Monitor, online: &[Node]) -> Result<()> {
        let mut failing = Vec::new();
        for node in online {
            let failures = self
                .store
                .count_consecutive_failures(&monitor.id, &node.id)?;
            if failures >= monitor.failure_threshold {
                failing.push(node.id.clone());
            }
        }

        let failure_quorum = quorum_met(
            monitor.quorum_type,
            monitor.quorum_n,
            failing.len(),
            online.len(),
        );
        let active = self.store.get_active_incident(&monitor.id)?;

        if failure_quorum {
            match active {
                // Creation tick: confirmation always needs a later tick, so
                // a single-tick spike can never alert.
                None => {
                    self.incidents.get_or_create(&monitor.id)?;
                }
                Some(mut incident) if incident.status == IncidentStatus::Suspect => {
                    self.incidents.confirm(&mut incident, failing)?;
                    self.alerter.on_confirmed(&incident, monitor);
                }
                // Already confirmed: no re-alerting.
                Some(_) => {}
            }
            return Ok(());
        }

        let Some(mut incident) = active else {
            if !failing.is_empty() {
                // A vantage crossed its threshold without quorum: open a
                // suspect incident so the streak is visible to operators.
                self.incidents.get_or_create(&monitor.id)?;
            }
            return Ok(());
        };

        let mut recovered = 0usize;
        for node in online {
            let successes = self
                .store
                .count_consecutive_successes(&monitor.id, &node.id)?;
            if successes >= monitor.recovery_threshold {
                recovered += 1;
            }
        }

        if quorum_met(
            monitor.quorum_type,
            monitor.quorum_n,
            recovered,
            online.len(),
        ) {
            self.incidents.resolve(&mut incident)?;
            self.alerter.on_resolved(&incident, monitor);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pingmesh_model::{
        now_ms, CheckResult, CheckStatus, Incident, NodeRole, NodeStatus, QuorumType,
    };
    use pingmesh_store::SqliteStore;

    #[derive(Default)]
    struct RecordingAlerter {
        confirmed: Mutex<Vec<Incident>>,
        resolved: Mutex<Vec<Incident>>,
    }

    impl Alerter for RecordingAlerter {
        fn on_confirmed(&self, incident: &Incident, _monitor: &Monitor) {
            self.confirmed.lock().push(incident.clone());
        }

        fn on_resolved(&self, incident: &Incident, _monitor: &Monitor) {
            self.resolved.lock().push(incident.clone());
        }
    }

    struct Fixture {
        store: Arc<SqliteStore>,
        engine: Engine,
        alerter: Arc<RecordingAlerter>,
        clock: i64,
    }

    impl Fixture {
        fn new(node_ids: &[&str]) -> Self {
            let store = Arc::new(SqliteStore::open_in_memory().unwrap());
            for id in node_ids {
                store
                    .create_node(&Node {
                        id: (*id).into(),
                        name: (*id).into(),
                        address: "127.0.0.1:7433".into(),
                        role: NodeRole::Worker,
                        status: NodeStatus::Online,
                        last_seen: now_ms(),
                        created_at: now_ms(),
                    })
                    .unwrap();
            }

            let alerter = Arc::new(RecordingAlerter::default());
            let engine = Engine::new(store.clone(), alerter.clone());
            Self {
                store,
                engine,
                alerter,
                clock: 1,
            }
        }

        fn add_monitor(&self, quorum_type: QuorumType, quorum_n: u32) -> Monitor {
            let mut monitor: Monitor = serde_json::from_value(serde_json::json!({
                "id": "m1",
                "name": "site",
                "check_type": "http",
                "target": "example.com",
                "enabled": true,
                "failure_threshold": 3,
                "recovery_threshold": 2,
            }))
            .unwrap();
            monitor.apply_defaults();
            monitor.quorum_type = quorum_type;
            monitor.quorum_n = quorum_n;
            self.store.create_monitor(&monitor).unwrap();
            monitor
        }

        fn record(&mut self, node_id: &str, status: CheckStatus, count: usize) {
            for _ in 0..count {
                self.clock += 1;
                self.store
                    .insert_check_result(&CheckResult {
                        id: 0,
                        monitor_id: "m1".into(),
                        node_id: node_id.into(),
                        status,
                        latency_ms: 1.0,
                        status_code: None,
                        error: None,
                        details: None,
                        timestamp: self.clock,
                    })
                    .unwrap();
            }
        }

        fn active(&self) -> Option<Incident> {
            self.store.get_active_incident("m1").unwrap()
        }

        fn confirmed_count(&self) -> usize {
            self.alerter.confirmed.lock().len()
        }

        fn resolved_count(&self) -> usize {
            self.alerter.resolved.lock().len()
        }
    }

    #[test]
    fn single_vantage_blip_never_confirms() {
        let mut fx = Fixture::new(&["a", "b", "c"]);
        fx.add_monitor(QuorumType::Majority, 0);
        fx.record("a", CheckStatus::Down, 4);
        fx.record("b", CheckStatus::Up, 4);
        fx.record("c", CheckStatus::Up, 4);

        fx.engine.tick().unwrap();
        let incident = fx.active().expect("suspect incident opened");
        assert_eq!(incident.status, IncidentStatus::Suspect);

        for _ in 0..6 {
            fx.engine.tick().unwrap();
        }
        assert_eq!(fx.confirmed_count(), 0);
        let all = fx.store.list_incidents(false).unwrap();
        assert!(all
            .iter()
            .all(|incident| incident.status != IncidentStatus::Confirmed));
    }

    #[test]
    fn quorum_confirms_on_second_tick() {
        let mut fx = Fixture::new(&["a", "b", "c"]);
        fx.add_monitor(QuorumType::Majority, 0);
        for node in ["a", "b", "c"] {
            fx.record(node, CheckStatus::Down, 3);
        }

        fx.engine.tick().unwrap();
        assert_eq!(fx.active().unwrap().status, IncidentStatus::Suspect);
        assert_eq!(fx.confirmed_count(), 0);

        fx.engine.tick().unwrap();
        let incident = fx.active().unwrap();
        assert_eq!(incident.status, IncidentStatus::Confirmed);
        assert!(incident.confirmed_at.is_some());
        let mut confirming = incident.confirming_nodes.clone();
        confirming.sort();
        assert_eq!(confirming, vec!["a", "b", "c"]);
        assert_eq!(fx.confirmed_count(), 1);

        // Further ticks never re-alert a confirmed incident.
        fx.engine.tick().unwrap();
        fx.engine.tick().unwrap();
        assert_eq!(fx.confirmed_count(), 1);
    }

    #[test]
    fn recovery_resolves_confirmed_incident() {
        let mut fx = Fixture::new(&["a", "b", "c"]);
        fx.add_monitor(QuorumType::Majority, 0);
        for node in ["a", "b", "c"] {
            fx.record(node, CheckStatus::Down, 3);
        }
        fx.engine.tick().unwrap();
        fx.engine.tick().unwrap();
        assert_eq!(fx.confirmed_count(), 1);

        for node in ["a", "b", "c"] {
            fx.record(node, CheckStatus::Up, 2);
        }
        fx.engine.tick().unwrap();

        assert!(fx.active().is_none());
        assert_eq!(fx.resolved_count(), 1);
        let resolved = fx.store.get_incident(&fx.alerter.resolved.lock()[0].id).unwrap().unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        // Nothing left to resolve on later ticks.
        fx.engine.tick().unwrap();
        assert_eq!(fx.resolved_count(), 1);
    }

    #[test]
    fn majority_tie_does_not_confirm() {
        let mut fx = Fixture::new(&["a", "b", "c", "d"]);
        fx.add_monitor(QuorumType::Majority, 0);
        fx.record("a", CheckStatus::Down, 3);
        fx.record("b", CheckStatus::Down, 3);
        fx.record("c", CheckStatus::Up, 3);
        fx.record("d", CheckStatus::Up, 3);

        for _ in 0..4 {
            fx.engine.tick().unwrap();
        }
        assert_eq!(fx.confirmed_count(), 0);
    }

    #[test]
    fn n_of_m_confirms_with_single_vantage() {
        let mut fx = Fixture::new(&["a", "b", "c"]);
        fx.add_monitor(QuorumType::NOfM, 1);
        fx.record("a", CheckStatus::Down, 3);
        fx.record("b", CheckStatus::Up, 3);
        fx.record("c", CheckStatus::Up, 3);

        fx.engine.tick().unwrap();
        fx.engine.tick().unwrap();

        let incident = fx.active().unwrap();
        assert_eq!(incident.status, IncidentStatus::Confirmed);
        assert_eq!(incident.confirming_nodes, vec!["a"]);
    }

    #[test]
    fn degraded_results_count_toward_failure_quorum() {
        let mut fx = Fixture::new(&["a"]);
        fx.add_monitor(QuorumType::Majority, 0);
        fx.record("a", CheckStatus::Degraded, 3);

        fx.engine.tick().unwrap();
        fx.engine.tick().unwrap();
        assert_eq!(fx.active().unwrap().status, IncidentStatus::Confirmed);
    }

    #[test]
    fn offline_nodes_shrink_the_divisor() {
        let mut fx = Fixture::new(&["a", "b", "c"]);
        fx.add_monitor(QuorumType::Majority, 0);
        fx.store
            .update_node_status("c", NodeStatus::Offline, 0)
            .unwrap();

        // 2 failing of 2 online is a majority; the offline node is neither
        // counted nor consulted.
        fx.record("a", CheckStatus::Down, 3);
        fx.record("b", CheckStatus::Down, 3);

        fx.engine.tick().unwrap();
        fx.engine.tick().unwrap();

        let incident = fx.active().unwrap();
        assert_eq!(incident.status, IncidentStatus::Confirmed);
        assert!(!incident.confirming_nodes.contains(&"c".to_string()));
    }

    #[test]
    fn coordinator_alone_is_a_quorum_of_one() {
        let mut fx = Fixture::new(&["coord"]);
        fx.add_monitor(QuorumType::Majority, 0);
        fx.record("coord", CheckStatus::Down, 3);

        fx.engine.tick().unwrap();
        fx.engine.tick().unwrap();
        assert_eq!(fx.active().unwrap().status, IncidentStatus::Confirmed);
    }

    #[test]
    fn ticks_are_idempotent_on_unchanged_store() {
        let mut fx = Fixture::new(&["a", "b", "c"]);
        fx.add_monitor(QuorumType::Majority, 0);
        for node in ["a", "b", "c"] {
            fx.record(node, CheckStatus::Down, 3);
        }
        fx.engine.tick().unwrap();
        fx.engine.tick().unwrap();

        let snapshot = fx.store.list_incidents(false).unwrap();
        let confirmed = fx.confirmed_count();
        for _ in 0..5 {
            fx.engine.tick().unwrap();
        }
        let after: Vec<_> = fx
            .store
            .list_incidents(false)
            .unwrap()
            .into_iter()
            .map(|incident| (incident.id, incident.status))
            .collect();
        let expected: Vec<_> = snapshot
            .into_iter()
            .map(|incident| (incident.id, incident.status))
            .collect();
        assert_eq!(after, expected);
        assert_eq!(fx.confirmed_count(), confirmed);
    }

    #[test]
    fn no_online_nodes_is_a_noop() {
        let mut fx = Fixture::new(&["a"]);
        fx.add_monitor(QuorumType::Majority, 0);
        fx.record("a", CheckStatus::Down, 3);
        fx.store
            .update_node_status("a", NodeStatus::Offline, 0)
            .unwrap();

        fx.engine.tick().unwrap();
        assert!(fx.active().is_none());
    }

    #[test]
    fn at_most_one_active_incident_per_monitor() {
        let mut fx = Fixture::new(&["a", "b", "c"]);
        fx.add_monitor(QuorumType::Majority, 0);
        fx.record("a", CheckStatus::Down, 4);
        fx.record("b", CheckStatus::Up, 4);
        fx.record("c", CheckStatus::Up, 4);

        for _ in 0..5 {
            fx.engine.tick().unwrap();
            let open: Vec<_> = fx
                .store
                .list_incidents(true)
                .unwrap();
            assert!(open.len() <= 1, "multiple active incidents: {open:?}");
        }
    }
}
