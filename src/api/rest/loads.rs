use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::engine::ingest::{ingest, Source};
use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::load::Load;
use crate::models::location::{Location, LocationInput};
use crate::models::stop::{Stop, StopType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/loads", post(create_load).get(list_loads))
        .route("/api/loads/:id", get(get_load))
        .route("/api/loads/:id/confirm", post(confirm_load))
        .route("/api/loads/:id/cancel", post(cancel_load))
        .route("/api/loads/:id/event", post(add_event))
        .route("/api/loads/:id/location", post(post_location))
        .route("/api/loads/:id/driver-location", get(driver_location))
}

/// Stop as typed by the dashboard: an address and optional coordinates.
#[derive(Debug, Deserialize)]
pub struct StopInput {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl StopInput {
    fn into_stop(self, stop_type: StopType) -> Stop {
        Stop {
            stop_type,
            address: self.address,
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// Accepts `stops` or the older `pickup` list plus `dropoff` shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoadRequest {
    #[serde(default)]
    pub driver_phone: String,
    #[serde(default, deserialize_with = "number_or_numeric_string")]
    pub geofence: Option<f64>,
    #[serde(default)]
    pub stops: Vec<Stop>,
    #[serde(default)]
    pub pickup: Vec<StopInput>,
    #[serde(default)]
    pub dropoff: Option<StopInput>,
}

impl CreateLoadRequest {
    fn into_stops(self) -> Vec<Stop> {
        if !self.stops.is_empty() {
            return self.stops;
        }

        self.pickup
            .into_iter()
            .map(|pickup| pickup.into_stop(StopType::Pickup))
            .chain(self.dropoff.map(|dropoff| dropoff.into_stop(StopType::Dropoff)))
            .collect()
    }
}

/// Range inputs post their value as text (`"0.5"`), so both JSON numbers
/// and numeric strings are accepted. A blank string counts as absent.
fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(value)) => Ok(Some(value)),
        Some(NumberOrString::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<f64>()
                .map(Some)
                .map_err(|err| D::Error::custom(format!("{text:?} is not a number: {err}")))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct PostLocationResponse {
    pub duplicate: bool,
    pub load: Load,
}

async fn create_load(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateLoadRequest>,
) -> Result<Json<Load>, AppError> {
    let driver_phone = payload.driver_phone.clone();
    let geofence = payload.geofence;
    let load = lifecycle::create(&state, driver_phone, geofence, payload.into_stops())?;
    Ok(Json(load))
}

async fn list_loads(State(state): State<Arc<AppState>>) -> Json<Vec<Load>> {
    Json(lifecycle::list(&state))
}

async fn get_load(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Load>, AppError> {
    Ok(Json(lifecycle::get(&state, id)?))
}

async fn confirm_load(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Load>, AppError> {
    Ok(Json(lifecycle::confirm(&state, id)?))
}

async fn cancel_load(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Load>, AppError> {
    Ok(Json(lifecycle::cancel(&state, id)?))
}

async fn add_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddEventRequest>,
) -> Result<Json<Load>, AppError> {
    let load = lifecycle::add_event(&state, id, &payload.event_type, payload.meta)?;
    Ok(Json(load))
}

async fn post_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationInput>,
) -> Result<Json<PostLocationResponse>, AppError> {
    let ingested = ingest(&state, id, payload, Source::Rest)?;

    Ok(Json(PostLocationResponse {
        duplicate: ingested.is_duplicate(),
        load: ingested.load().clone(),
    }))
}

async fn driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Location>, AppError> {
    Ok(Json(lifecycle::driver_location(&state, id)?))
}
