use chrono::{DateTime, Utc};
use serde_json::json;

use crate::geo::haversine_miles;
use crate::models::event::{self, LoadEvent};
use crate::models::load::{Load, LoadStatus};
use crate::models::location::GeoPoint;
use crate::models::stop::{Stop, StopType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeofenceOutcome {
    pub arrived: Option<usize>,
    pub departed: Option<usize>,
    pub delivered: bool,
}

/// Index of the nearest geocoded stop whose geofence contains `point`.
pub fn stop_containing(stops: &[Stop], radius_miles: f64, point: &GeoPoint) -> Option<usize> {
    stops
        .iter()
        .enumerate()
        .filter_map(|(index, stop)| {
            let distance = haversine_miles(&stop.point()?, point);
            (distance <= radius_miles).then_some((index, distance))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(index, _)| index)
}

/// Compares the driver's newest position against the stop geofences and
/// records arrival, departure and delivery on the load.
pub fn evaluate(load: &mut Load, point: &GeoPoint, at: DateTime<Utc>) -> GeofenceOutcome {
    let inside = stop_containing(&load.stops, load.geofence, point);
    let mut outcome = GeofenceOutcome::default();

    if inside == load.current_stop {
        return outcome;
    }

    if let Some(previous) = load.current_stop {
        if let Some(stop) = load.stops.get(previous) {
            let departed = stop_event(event::DEPARTED, at, previous, stop);
            load.push_event(departed);
            outcome.departed = Some(previous);
        }
    }

    load.current_stop = inside;

    if let Some(index) = inside {
        let stop = load.stops[index].clone();
        load.push_event(stop_event(event::ARRIVED, at, index, &stop));
        outcome.arrived = Some(index);

        let is_final_dropoff =
            index + 1 == load.stops.len() && stop.stop_type == StopType::Dropoff;
        if is_final_dropoff && load.status == LoadStatus::Confirmed {
            load.status = LoadStatus::Delivered;
            load.push_event(stop_event(event::DELIVERED, at, index, &stop));
            outcome.delivered = true;
        }
    }

    outcome
}

fn stop_event(kind: &str, at: DateTime<Utc>, index: usize, stop: &Stop) -> LoadEvent {
    LoadEvent::new(kind, at)
        .with_meta("address", stop.address.clone())
        .with_meta("stopIndex", index)
        .with_meta("stopType", json!(stop.label()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{evaluate, stop_containing};
    use crate::models::load::{Load, LoadStatus};
    use crate::models::location::GeoPoint;
    use crate::models::stop::{Stop, StopType};

    fn stop(stop_type: StopType, lat: f64, lng: f64) -> Stop {
        Stop {
            stop_type,
            address: format!("{lat},{lng}"),
            lat: Some(lat),
            lng: Some(lng),
        }
    }

    fn confirmed_load() -> Load {
        let now = Utc::now();
        Load {
            id: Uuid::new_v4(),
            stops: vec![
                stop(StopType::Pickup, 39.7392, -104.9903),
                stop(StopType::Dropoff, 39.7555, -105.2211),
            ],
            driver_phone: "5550100".to_string(),
            geofence: 0.5,
            status: LoadStatus::Confirmed,
            tracking_url: String::new(),
            driver_location: None,
            locations: Vec::new(),
            events: Vec::new(),
            current_stop: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn event_types(load: &Load) -> Vec<&str> {
        load.events.iter().map(|e| e.event_type.as_str()).collect()
    }

    #[test]
    fn stops_without_coordinates_are_ignored() {
        let stops = vec![Stop {
            stop_type: StopType::Pickup,
            address: "somewhere".to_string(),
            lat: None,
            lng: None,
        }];
        let point = GeoPoint { lat: 0.0, lng: 0.0 };
        assert_eq!(stop_containing(&stops, 100.0, &point), None);
    }

    #[test]
    fn nearest_stop_wins_when_geofences_overlap() {
        let stops = vec![
            stop(StopType::Pickup, 40.0, -100.0),
            stop(StopType::Pickup, 40.001, -100.0),
        ];
        let point = GeoPoint { lat: 40.0009, lng: -100.0 };
        assert_eq!(stop_containing(&stops, 1.0, &point), Some(1));
    }

    #[test]
    fn driver_arrives_departs_and_delivers() {
        let mut load = confirmed_load();

        let at_pickup = GeoPoint { lat: 39.7393, lng: -104.9904 };
        let outcome = evaluate(&mut load, &at_pickup, Utc::now());
        assert_eq!(outcome.arrived, Some(0));
        assert_eq!(load.current_stop, Some(0));

        // Still inside: nothing new.
        let outcome = evaluate(&mut load, &at_pickup, Utc::now());
        assert_eq!(outcome, Default::default());

        let on_the_road = GeoPoint { lat: 39.75, lng: -105.1 };
        let outcome = evaluate(&mut load, &on_the_road, Utc::now());
        assert_eq!(outcome.departed, Some(0));
        assert_eq!(load.current_stop, None);
        assert_eq!(load.status, LoadStatus::Confirmed);

        let at_dropoff = GeoPoint { lat: 39.7556, lng: -105.2210 };
        let outcome = evaluate(&mut load, &at_dropoff, Utc::now());
        assert!(outcome.delivered);
        assert_eq!(load.status, LoadStatus::Delivered);
        assert_eq!(
            event_types(&load),
            vec!["Arrived", "Departed", "Arrived", "Delivered"]
        );
        assert_eq!(load.events[3].meta["stopIndex"], 1);
    }

    #[test]
    fn arrival_before_confirmation_does_not_deliver() {
        let mut load = confirmed_load();
        load.status = LoadStatus::Created;

        let at_dropoff = GeoPoint { lat: 39.7555, lng: -105.2211 };
        let outcome = evaluate(&mut load, &at_dropoff, Utc::now());
        assert_eq!(outcome.arrived, Some(1));
        assert!(!outcome.delivered);
        assert_eq!(load.status, LoadStatus::Created);
    }
}
