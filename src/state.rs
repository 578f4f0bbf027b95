use dashmap::DashMap;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::config::{Config, SimulationConfig};
use crate::models::load::Load;
use crate::observability::metrics::Metrics;
use crate::realtime::Hub;

pub struct AppState {
    pub loads: DashMap<Uuid, Load>,
    pub simulations: DashMap<Uuid, AbortHandle>,
    pub hub: Hub,
    pub metrics: Metrics,
    pub public_base_url: String,
    pub simulation: SimulationConfig,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            loads: DashMap::new(),
            simulations: DashMap::new(),
            hub: Hub::new(config.event_buffer_size),
            metrics: Metrics::new(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            simulation: config.simulation.clone(),
        }
    }

    pub fn tracking_url(&self, id: Uuid) -> String {
        format!("{}/track/{}", self.public_base_url, id)
    }

    /// All loads, oldest first. Must not be called while holding a
    /// `loads` entry guard.
    pub fn snapshot(&self) -> Vec<Load> {
        let mut loads: Vec<Load> = self
            .loads
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        loads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        loads
    }

    /// Pushes the new state of a load to its room and the dashboard.
    pub fn announce(&self, load: &Load) {
        if !self.hub.has_subscribers() {
            return;
        }
        self.hub.load_changed(load, self.snapshot());
    }
}
