use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PENDING: &str = "Pending";
pub const CONFIRMED: &str = "Confirmed";
pub const CANCELED: &str = "Canceled";
pub const DELIVERED: &str = "Delivered";
pub const LOCATION_UPDATE: &str = "LocationUpdate";
pub const PICKUP_ADDED: &str = "PickupAdded";
pub const ARRIVED: &str = "Arrived";
pub const DEPARTED: &str = "Departed";

/// Timeline entry. `meta` is display data; clients render `meta.city`,
/// falling back to `meta.address` and then to `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl LoadEvent {
    pub fn new(event_type: impl Into<String>, ts: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.into(),
            ts,
            meta: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    pub fn display_label(&self) -> &str {
        ["city", "address"]
            .iter()
            .find_map(|key| self.meta.get(*key).and_then(Value::as_str))
            .unwrap_or(self.event_type.as_str())
    }
}
