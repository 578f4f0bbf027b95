use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{geofence, simulation};
use crate::error::AppError;
use crate::models::event::{self, LoadEvent};
use crate::models::load::{Load, LoadStatus, LocationInsert};
use crate::models::location::{GeoPoint, Location, LocationInput};
use crate::state::AppState;

/// Path a location sample arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Rest,
    Ws,
    Simulation,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Rest => "rest",
            Source::Ws => "ws",
            Source::Simulation => "simulation",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Ingested {
    Accepted(Load),
    /// Same report already stored; nothing was changed or pushed.
    Duplicate(Load),
}

impl Ingested {
    pub fn load(&self) -> &Load {
        match self {
            Ingested::Accepted(load) | Ingested::Duplicate(load) => load,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Ingested::Duplicate(_))
    }
}

/// Stores a driver location sample. REST posts, websocket emits and the
/// simulator all come through here, so a report delivered over several
/// paths is kept once.
pub fn ingest(
    state: &AppState,
    id: Uuid,
    input: LocationInput,
    source: Source,
) -> Result<Ingested, AppError> {
    let start = Instant::now();
    let result = store_sample(state, id, input);

    let outcome = match &result {
        Ok(Ingested::Accepted(_)) => "accepted",
        Ok(Ingested::Duplicate(_)) => "duplicate",
        Err(_) => "rejected",
    };
    state
        .metrics
        .location_ingest_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .location_samples_total
        .with_label_values(&[source.as_str(), outcome])
        .inc();

    match &result {
        Ok(Ingested::Accepted(_)) => debug!(load_id = %id, source = source.as_str(), "location accepted"),
        Ok(Ingested::Duplicate(_)) => debug!(load_id = %id, source = source.as_str(), "duplicate location ignored"),
        Err(err) => warn!(load_id = %id, source = source.as_str(), error = %err, "location rejected"),
    }

    result
}

fn store_sample(state: &AppState, id: Uuid, input: LocationInput) -> Result<Ingested, AppError> {
    validate(&input)?;
    let location = input.into_location(Utc::now());

    let (load, delivered) = {
        let mut load = state
            .loads
            .get_mut(&id)
            .ok_or_else(|| AppError::load_not_found(id))?;

        if load.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "load {id} is {}; location updates are no longer accepted",
                load.status.as_str()
            )));
        }

        let newest = match load.insert_location(location.clone()) {
            LocationInsert::Duplicate => return Ok(Ingested::Duplicate(load.clone())),
            LocationInsert::Stored { newest } => newest,
        };

        load.push_event(LoadEvent {
            event_type: event::LOCATION_UPDATE.to_string(),
            ts: location.timestamp,
            meta: location_meta(&location),
        });

        let mut delivered = false;
        if newest && load.status == LoadStatus::Confirmed {
            let outcome = geofence::evaluate(&mut load, &location.point(), location.timestamp);
            delivered = outcome.delivered;
        }

        (load.clone(), delivered)
    };

    if delivered {
        state
            .metrics
            .status_transitions_total
            .with_label_values(&[LoadStatus::Delivered.as_str()])
            .inc();
        info!(load_id = %id, "load delivered");
        simulation::stop(state, id);
    }

    state.hub.location_reported(id, &location);
    state.announce(&load);

    Ok(Ingested::Accepted(load))
}

fn validate(input: &LocationInput) -> Result<(), AppError> {
    let point = GeoPoint {
        lat: input.lat,
        lng: input.lng,
    };
    if !point.is_valid() {
        return Err(AppError::BadRequest(format!(
            "coordinates {},{} are out of range",
            input.lat, input.lng
        )));
    }

    if let Some(accuracy) = input.accuracy {
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(AppError::BadRequest(
                "accuracy must be a non-negative number".to_string(),
            ));
        }
    }

    Ok(())
}

fn location_meta(location: &Location) -> Map<String, Value> {
    match serde_json::to_value(location) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}
