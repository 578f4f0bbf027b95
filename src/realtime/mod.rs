//! Push channel: one broadcast stream of topic-addressed events that each
//! websocket session filters against its own room memberships.

pub mod session;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::load::Load;
use crate::models::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Dashboard,
    Load(Uuid),
    /// Dashboard members and members of the load's room, delivered once.
    DashboardAndLoad(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationBroadcast {
    pub load_id: Uuid,
    pub loc: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
}

/// Frames sent to clients, encoded as `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "loadsUpdated")]
    LoadsUpdated(Vec<Load>),
    #[serde(rename = "load_details")]
    LoadDetails(Load),
    #[serde(rename = "location_update")]
    LocationUpdate(Location),
    #[serde(rename = "locationBroadcast")]
    LocationBroadcast(LocationBroadcast),
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::LoadsUpdated(_) => "loadsUpdated",
            ServerEvent::LoadDetails(_) => "load_details",
            ServerEvent::LocationUpdate(_) => "location_update",
            ServerEvent::LocationBroadcast(_) => "locationBroadcast",
            ServerEvent::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub topic: Topic,
    pub event: ServerEvent,
}

/// Room memberships of one connected client.
#[derive(Debug, Default)]
pub struct Subscriptions {
    pub dashboard: bool,
    pub loads: HashSet<Uuid>,
}

impl Subscriptions {
    pub fn wants(&self, topic: &Topic) -> bool {
        match topic {
            Topic::Dashboard => self.dashboard,
            Topic::Load(id) => self.loads.contains(id),
            Topic::DashboardAndLoad(id) => self.dashboard || self.loads.contains(id),
        }
    }
}

pub struct Hub {
    tx: broadcast::Sender<Envelope>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn has_subscribers(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    /// Best-effort: with no subscribers the event is dropped.
    pub fn publish(&self, topic: Topic, event: ServerEvent) {
        let _ = self.tx.send(Envelope { topic, event });
    }

    /// Announces a changed load: its detail to the load room and the full
    /// list to the dashboard and the load room.
    pub fn load_changed(&self, load: &Load, snapshot: Vec<Load>) {
        self.publish(Topic::Load(load.id), ServerEvent::LoadDetails(load.clone()));
        self.publish(
            Topic::DashboardAndLoad(load.id),
            ServerEvent::LoadsUpdated(snapshot),
        );
    }

    pub fn location_reported(&self, load_id: Uuid, location: &Location) {
        self.publish(
            Topic::Load(load_id),
            ServerEvent::LocationUpdate(location.clone()),
        );
        self.publish(
            Topic::Dashboard,
            ServerEvent::LocationBroadcast(LocationBroadcast {
                load_id,
                loc: location.clone(),
            }),
        );
    }
}
