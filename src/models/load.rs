use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::event::LoadEvent;
use crate::models::location::Location;
use crate::models::stop::{Stop, StopType};

pub const DEFAULT_GEOFENCE_MILES: f64 = 0.25;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LoadStatus {
    Created,
    Confirmed,
    Canceled,
    Delivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    Apply,
    AlreadyThere,
    Rejected,
}

impl LoadStatus {
    pub fn check_transition(self, next: LoadStatus) -> TransitionCheck {
        use LoadStatus::*;

        if self == next {
            return TransitionCheck::AlreadyThere;
        }

        match (self, next) {
            (Created, Confirmed) | (Created, Canceled) => TransitionCheck::Apply,
            (Confirmed, Canceled) | (Confirmed, Delivered) => TransitionCheck::Apply,
            _ => TransitionCheck::Rejected,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoadStatus::Canceled | LoadStatus::Delivered)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoadStatus::Created => "Created",
            LoadStatus::Confirmed => "Confirmed",
            LoadStatus::Canceled => "Canceled",
            LoadStatus::Delivered => "Delivered",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationInsert {
    Duplicate,
    Stored { newest: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Load {
    pub id: Uuid,
    pub stops: Vec<Stop>,
    pub driver_phone: String,
    pub geofence: f64,
    pub status: LoadStatus,
    pub tracking_url: String,
    pub driver_location: Option<Location>,
    pub locations: Vec<Location>,
    pub events: Vec<LoadEvent>,
    pub current_stop: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Load {
    /// Inserts a sample keeping `locations` ordered by timestamp. Samples
    /// with equal timestamps keep arrival order.
    pub fn insert_location(&mut self, location: Location) -> LocationInsert {
        let index = self
            .locations
            .partition_point(|existing| existing.timestamp <= location.timestamp);

        let duplicate = self.locations[..index]
            .iter()
            .rev()
            .take_while(|existing| existing.timestamp == location.timestamp)
            .any(|existing| existing.same_report(&location));
        if duplicate {
            return LocationInsert::Duplicate;
        }

        let newest = index == self.locations.len();
        self.locations.insert(index, location.clone());
        if newest {
            self.driver_location = Some(location);
        }

        LocationInsert::Stored { newest }
    }

    /// Adds a pickup ahead of the first dropoff so pickups stay in front.
    pub fn insert_pickup(&mut self, stop: Stop) -> usize {
        let index = self
            .stops
            .iter()
            .position(|existing| existing.stop_type == StopType::Dropoff)
            .unwrap_or(self.stops.len());

        self.stops.insert(index, stop);
        index
    }

    pub fn push_event(&mut self, event: LoadEvent) {
        self.updated_at = event.ts.max(self.updated_at);
        self.events.push(event);
    }
}
