use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::engine::ingest::{ingest, Source};
use crate::engine::lifecycle;
use crate::models::location::LocationInput;
use crate::realtime::{Envelope, ServerEvent, Subscriptions};
use crate::state::AppState;

/// Frames received from clients, `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join_load")]
    JoinLoad(Uuid),
    #[serde(rename = "leave_load")]
    LeaveLoad(Uuid),
    #[serde(rename = "joinDashboard")]
    JoinDashboard,
    #[serde(rename = "driver_location_update")]
    DriverLocationUpdate {
        #[serde(rename = "loadId")]
        load_id: Uuid,
        location: LocationInput,
    },
    #[serde(rename = "driver_location")]
    DriverLocation {
        #[serde(rename = "loadId")]
        load_id: Uuid,
        loc: LocationInput,
    },
}

/// Per-connection protocol state.
#[derive(Debug, Default)]
pub struct Session {
    subscriptions: Subscriptions,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wants(&self, envelope: &Envelope) -> bool {
        self.subscriptions.wants(&envelope.topic)
    }

    /// Handles one text frame and returns the replies for this client only.
    /// Everything other clients should see goes through the hub.
    pub fn handle_frame(&mut self, state: &AppState, text: &str) -> Vec<ServerEvent> {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(state, event),
            Err(err) => {
                debug!(error = %err, "malformed websocket frame");
                vec![ServerEvent::error(format!("malformed frame: {err}"))]
            }
        }
    }

    pub fn handle_event(&mut self, state: &AppState, event: ClientEvent) -> Vec<ServerEvent> {
        match event {
            ClientEvent::JoinLoad(id) => match lifecycle::get(state, id) {
                Ok(load) => {
                    self.subscriptions.loads.insert(id);
                    debug!(load_id = %id, "client joined load room");
                    vec![ServerEvent::LoadDetails(load)]
                }
                Err(err) => vec![ServerEvent::error(err.message())],
            },
            ClientEvent::LeaveLoad(id) => {
                self.subscriptions.loads.remove(&id);
                Vec::new()
            }
            ClientEvent::JoinDashboard => {
                self.subscriptions.dashboard = true;
                debug!("client joined dashboard");
                vec![ServerEvent::LoadsUpdated(lifecycle::list(state))]
            }
            ClientEvent::DriverLocationUpdate {
                load_id,
                location: sample,
            }
            | ClientEvent::DriverLocation {
                load_id,
                loc: sample,
            } => match ingest(state, load_id, sample, Source::Ws) {
                Ok(_) => Vec::new(),
                Err(err) => vec![ServerEvent::error(err.message())],
            },
        }
    }
}
