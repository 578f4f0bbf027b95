use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::engine::simulation;
use crate::error::AppError;
use crate::models::event::{self, LoadEvent};
use crate::models::load::{Load, LoadStatus, TransitionCheck, DEFAULT_GEOFENCE_MILES};
use crate::models::location::{GeoPoint, Location};
use crate::models::stop::{Stop, StopType};
use crate::state::AppState;

pub fn create(
    state: &AppState,
    driver_phone: String,
    geofence: Option<f64>,
    stops: Vec<Stop>,
) -> Result<Load, AppError> {
    let driver_phone = driver_phone.trim().to_string();
    if driver_phone.is_empty() {
        return Err(AppError::BadRequest("driverPhone cannot be empty".to_string()));
    }

    let geofence = geofence.unwrap_or(DEFAULT_GEOFENCE_MILES);
    if !geofence.is_finite() || geofence <= 0.0 {
        return Err(AppError::BadRequest(
            "geofence must be a positive number of miles".to_string(),
        ));
    }

    let stops = validate_stops(stops)?;

    let now = Utc::now();
    let id = Uuid::new_v4();
    let events = stops
        .iter()
        .enumerate()
        .map(|(index, stop)| {
            LoadEvent::new(event::PENDING, now)
                .with_meta("address", stop.address.clone())
                .with_meta("stopIndex", index)
                .with_meta("stopType", stop.label())
        })
        .collect();

    let load = Load {
        id,
        stops,
        driver_phone,
        geofence,
        status: LoadStatus::Created,
        tracking_url: state.tracking_url(id),
        driver_location: None,
        locations: Vec::new(),
        events,
        current_stop: None,
        created_at: now,
        updated_at: now,
    };

    state.loads.insert(load.id, load.clone());
    state.metrics.loads_created_total.inc();
    info!(load_id = %load.id, stops = load.stops.len(), "load created");

    state.announce(&load);
    Ok(load)
}

fn validate_stops(stops: Vec<Stop>) -> Result<Vec<Stop>, AppError> {
    if stops.is_empty() {
        return Err(AppError::BadRequest("at least one stop is required".to_string()));
    }

    let stops = stops
        .into_iter()
        .enumerate()
        .map(|(index, stop)| validate_stop(stop).map_err(|msg| {
            AppError::BadRequest(format!("stop {}: {msg}", index + 1))
        }))
        .collect::<Result<Vec<_>, _>>()?;

    let has = |kind: StopType| stops.iter().any(|stop| stop.stop_type == kind);
    if !has(StopType::Pickup) || !has(StopType::Dropoff) {
        return Err(AppError::BadRequest(
            "a load needs at least one pickup and one dropoff".to_string(),
        ));
    }

    Ok(stops)
}

/// Normalizes a stop and checks that it can be located.
pub fn validate_stop(mut stop: Stop) -> Result<Stop, String> {
    stop.address = stop.address.trim().to_string();

    match (stop.lat, stop.lng) {
        (Some(lat), Some(lng)) => {
            if !(GeoPoint { lat, lng }).is_valid() {
                return Err(format!("coordinates {lat},{lng} are out of range"));
            }
        }
        (None, None) => {
            if stop.address.is_empty() {
                return Err("an address or coordinates are required".to_string());
            }
        }
        _ => return Err("lat and lng must be given together".to_string()),
    }

    Ok(stop)
}

pub fn get(state: &AppState, id: Uuid) -> Result<Load, AppError> {
    state
        .loads
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::load_not_found(id))
}

pub fn list(state: &AppState) -> Vec<Load> {
    state.snapshot()
}

pub fn driver_location(state: &AppState, id: Uuid) -> Result<Location, AppError> {
    let latest = state
        .loads
        .get(&id)
        .map(|entry| entry.driver_location.clone())
        .ok_or_else(|| AppError::load_not_found(id))?;

    latest.ok_or_else(|| AppError::NotFound(format!("no driver location reported for load {id}")))
}

pub fn confirm(state: &Arc<AppState>, id: Uuid) -> Result<Load, AppError> {
    let (load, changed) = apply_status(state, id, LoadStatus::Confirmed)?;

    if changed {
        info!(load_id = %id, tracking_url = %load.tracking_url, "load confirmed");
        state.announce(&load);
        simulation::start(state.clone(), &load);
    }

    Ok(load)
}

pub fn cancel(state: &AppState, id: Uuid) -> Result<Load, AppError> {
    let (load, changed) = apply_status(state, id, LoadStatus::Canceled)?;

    if changed {
        let halted = simulation::stop(state, id);
        info!(load_id = %id, simulation_halted = halted, "load canceled");
        state.announce(&load);
    }

    Ok(load)
}

/// Moves a load to `next`. Returns the load and whether anything changed;
/// repeating the current status is a no-op.
fn apply_status(state: &AppState, id: Uuid, next: LoadStatus) -> Result<(Load, bool), AppError> {
    let mut load = state
        .loads
        .get_mut(&id)
        .ok_or_else(|| AppError::load_not_found(id))?;

    match load.status.check_transition(next) {
        TransitionCheck::Apply => {
            load.status = next;
            load.push_event(LoadEvent::new(next.as_str(), Utc::now()));
            state
                .metrics
                .status_transitions_total
                .with_label_values(&[next.as_str()])
                .inc();
            Ok((load.clone(), true))
        }
        TransitionCheck::AlreadyThere => Ok((load.clone(), false)),
        TransitionCheck::Rejected => Err(AppError::Conflict(format!(
            "load {id} is {} and cannot become {}",
            load.status.as_str(),
            next.as_str()
        ))),
    }
}

/// Appends a timeline event. `PickupAdded` with an address also adds a
/// pickup stop, which is only possible before the load is confirmed.
pub fn add_event(
    state: &AppState,
    id: Uuid,
    event_type: &str,
    meta: Map<String, Value>,
) -> Result<Load, AppError> {
    let event_type = event_type.trim();
    if event_type.is_empty() {
        return Err(AppError::BadRequest("event type cannot be empty".to_string()));
    }

    let pickup = if event_type == event::PICKUP_ADDED {
        Some(pickup_from_meta(&meta)?)
    } else {
        None
    };

    let load = {
        let mut load = state
            .loads
            .get_mut(&id)
            .ok_or_else(|| AppError::load_not_found(id))?;

        let mut event = LoadEvent::new(event_type, Utc::now());
        event.meta = meta;

        if let Some(stop) = pickup {
            if load.status != LoadStatus::Created {
                return Err(AppError::Conflict(format!(
                    "stops of load {id} are fixed once it is {}",
                    load.status.as_str()
                )));
            }
            let index = load.insert_pickup(stop.clone());
            event = event
                .with_meta("address", stop.address)
                .with_meta("stopIndex", index);
        }

        load.push_event(event);
        load.clone()
    };

    info!(load_id = %id, event_type, "load event added");
    state.announce(&load);
    Ok(load)
}

/// Reads the pickup from `meta.pickup` (dashboard shape) or from `meta`
/// itself.
fn pickup_from_meta(meta: &Map<String, Value>) -> Result<Stop, AppError> {
    let source = match meta.get("pickup") {
        Some(Value::Object(pickup)) => pickup,
        _ => meta,
    };

    let text = |key: &str| source.get(key).and_then(Value::as_str).unwrap_or_default();
    let number = |key: &str| source.get(key).and_then(Value::as_f64);

    let stop = Stop {
        stop_type: StopType::Pickup,
        address: text("address").to_string(),
        lat: number("lat"),
        lng: number("lng"),
    };

    validate_stop(stop).map_err(|msg| AppError::BadRequest(format!("added pickup: {msg}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map, Value};
    use uuid::Uuid;

    use super::{add_event, cancel, confirm, create, validate_stop};
    use crate::config::Config;
    use crate::error::AppError;
    use crate::models::load::LoadStatus;
    use crate::models::stop::{Stop, StopType};
    use crate::state::AppState;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(&Config::default()))
    }

    fn stop(stop_type: StopType, address: &str) -> Stop {
        Stop {
            stop_type,
            address: address.to_string(),
            lat: None,
            lng: None,
        }
    }

    fn route() -> Vec<Stop> {
        vec![
            stop(StopType::Pickup, "Omaha, NE"),
            stop(StopType::Dropoff, "Des Moines, IA"),
        ]
    }

    fn meta(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn create_assigns_id_tracking_url_and_pending_events() {
        let state = state();
        let load = create(&state, " 5550100 ".to_string(), None, route()).unwrap();

        assert_eq!(load.driver_phone, "5550100");
        assert_eq!(load.geofence, 0.25);
        assert_eq!(load.status, LoadStatus::Created);
        assert_eq!(
            load.tracking_url,
            format!("http://localhost:3000/track/{}", load.id)
        );
        assert_eq!(load.events.len(), 2);
        assert!(load.events.iter().all(|e| e.event_type == "Pending"));
        assert_eq!(state.loads.len(), 1);
    }

    #[test]
    fn create_rejects_bad_input() {
        let state = state();

        let blank_phone = create(&state, "   ".to_string(), None, route());
        assert!(matches!(blank_phone, Err(AppError::BadRequest(_))));

        let zero_fence = create(&state, "5550100".to_string(), Some(0.0), route());
        assert!(matches!(zero_fence, Err(AppError::BadRequest(_))));

        let no_dropoff = create(
            &state,
            "5550100".to_string(),
            None,
            vec![stop(StopType::Pickup, "Omaha, NE")],
        );
        assert!(matches!(no_dropoff, Err(AppError::BadRequest(_))));

        let blank_stop = create(
            &state,
            "5550100".to_string(),
            None,
            vec![stop(StopType::Pickup, "Omaha, NE"), stop(StopType::Dropoff, " ")],
        );
        assert!(matches!(blank_stop, Err(AppError::BadRequest(_))));

        assert!(state.loads.is_empty());
    }

    #[test]
    fn coordinates_alone_locate_a_stop() {
        let located = Stop {
            stop_type: StopType::Dropoff,
            address: String::new(),
            lat: Some(41.59),
            lng: Some(-93.62),
        };
        assert!(validate_stop(located.clone()).is_ok());

        let half = Stop {
            lng: None,
            ..located.clone()
        };
        assert!(validate_stop(half).is_err());

        let out_of_range = Stop {
            lat: Some(123.0),
            ..located
        };
        assert!(validate_stop(out_of_range).is_err());
    }

    #[tokio::test]
    async fn confirm_is_idempotent_and_cancel_is_terminal() {
        let state = state();
        let load = create(&state, "5550100".to_string(), None, route()).unwrap();

        let confirmed = confirm(&state, load.id).unwrap();
        assert_eq!(confirmed.status, LoadStatus::Confirmed);
        let again = confirm(&state, load.id).unwrap();
        assert_eq!(again.events.len(), confirmed.events.len());

        let canceled = cancel(&state, load.id).unwrap();
        assert_eq!(canceled.status, LoadStatus::Canceled);

        let reconfirm = confirm(&state, load.id);
        assert!(matches!(reconfirm, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn unknown_load_is_not_found() {
        let state = state();
        let result = confirm(&state, Uuid::new_v4());
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn pickup_can_only_be_added_before_confirmation() {
        let state = state();
        let load = create(&state, "5550100".to_string(), None, route()).unwrap();

        let updated = add_event(
            &state,
            load.id,
            "PickupAdded",
            meta(json!({ "pickup": { "address": "Lincoln, NE" } })),
        )
        .unwrap();
        let addresses: Vec<&str> = updated.stops.iter().map(|s| s.address.as_str()).collect();
        assert_eq!(addresses, vec!["Omaha, NE", "Lincoln, NE", "Des Moines, IA"]);
        assert_eq!(updated.events.last().unwrap().display_label(), "Lincoln, NE");

        confirm(&state, load.id).unwrap();
        let late = add_event(
            &state,
            load.id,
            "PickupAdded",
            meta(json!({ "pickup": { "address": "Ames, IA" } })),
        );
        assert!(matches!(late, Err(AppError::Conflict(_))));

        // Plain timeline notes are still accepted.
        let noted = add_event(&state, load.id, "Note", meta(json!({ "city": "Omaha" }))).unwrap();
        assert_eq!(noted.stops.len(), 3);
        assert_eq!(noted.events.last().unwrap().event_type, "Note");
    }
}
