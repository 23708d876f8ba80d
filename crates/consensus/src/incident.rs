//! Incident lifecycle transitions.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use pingmesh_model::{now_ms, Incident, IncidentStatus};
use pingmesh_store::Store;

use crate::Result;

/// Creates and transitions incidents while preserving the lifecycle
/// invariants: at most one non-resolved incident per monitor, transitions
/// only along `suspect -> confirmed -> resolved`.
#[derive(Clone)]
pub struct IncidentManager {
    store: Arc<dyn Store>,
}

impl IncidentManager {
    /// Create a manager over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The active incident for a monitor, creating a fresh `suspect` one if
    /// none exists.
    pub fn get_or_create(&self, monitor_id: &str) -> Result<Incident> {
        if let Some(incident) = self.store.get_active_incident(monitor_id)? {
            return Ok(incident);
        }

        let now = now_ms();
        let incident = Incident {
            id: Uuid::new_v4().to_string(),
            monitor_id: monitor_id.to_string(),
            status: IncidentStatus::Suspect,
            started_at: now,
            confirmed_at: None,
            resolved_at: None,
            confirming_nodes: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.create_incident(&incident)?;

        info!(incident_id = %incident.id, monitor_id, "created suspect incident");
        Ok(incident)
    }

    /// Transition a suspect incident to `confirmed`.
    pub fn confirm(&self, incident: &mut Incident, confirming_nodes: Vec<String>) -> Result<()> {
        let now = now_ms();
        incident.status = IncidentStatus::Confirmed;
        incident.confirmed_at = Some(now);
        incident.confirming_nodes = confirming_nodes;
        incident.updated_at = now;

        info!(
            incident_id = %incident.id,
            monitor_id = %incident.monitor_id,
            confirming = ?incident.confirming_nodes,
            "incident confirmed"
        );
        self.store.update_incident(incident)?;
        Ok(())
    }

    /// Transition an active incident to `resolved`.
    pub fn resolve(&self, incident: &mut Incident) -> Result<()> {
        let now = now_ms();
        incident.status = IncidentStatus::Resolved;
        incident.resolved_at = Some(now);
        incident.updated_at = now;

        info!(
            incident_id = %incident.id,
            monitor_id = %incident.monitor_id,
            "incident resolved"
        );
        self.store.update_incident(incident)?;
        Ok(())
    }
}
