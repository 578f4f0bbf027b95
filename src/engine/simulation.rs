use std::sync::Arc;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::time::{interval, Duration};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::ingest::{ingest, Source};
use crate::geo::{interpolate, MovementGate};
use crate::models::load::Load;
use crate::models::location::{GeoPoint, LocationInput};
use crate::models::stop::Stop;
use crate::state::AppState;

/// Starts driving a simulated truck from the first to the last stop, if
/// simulation is enabled and both ends are geocoded.
pub fn start(state: Arc<AppState>, load: &Load) {
    if !state.simulation.enabled {
        return;
    }

    let from = load.stops.first().and_then(Stop::point);
    let to = load.stops.last().and_then(Stop::point);
    let (Some(from), Some(to)) = (from, to) else {
        debug!(load_id = %load.id, "stops not geocoded; skipping driver simulation");
        return;
    };

    let id = load.id;
    let task_state = state.clone();
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        // Must not touch state before the handle is registered.
        if go_rx.await.is_err() {
            return;
        }
        drive(task_state, id, from, to).await;
    });

    if let Some(previous) = state.simulations.insert(id, handle.abort_handle()) {
        previous.abort();
    }
    let _ = go_tx.send(());
}

/// Aborts the simulation for a load. Returns whether one was running.
pub fn stop(state: &AppState, id: Uuid) -> bool {
    match state.simulations.remove(&id) {
        Some((_, handle)) => {
            handle.abort();
            true
        }
        None => false,
    }
}

async fn drive(state: Arc<AppState>, id: Uuid, from: GeoPoint, to: GeoPoint) {
    let steps = state.simulation.steps.max(1);
    let mut ticker = interval(Duration::from_millis(state.simulation.tick_ms.max(1)));
    let mut gate = MovementGate::default();

    info!(load_id = %id, steps, "driver simulation started");

    for step in 0..=steps {
        ticker.tick().await;

        let point = interpolate(&from, &to, f64::from(step) / f64::from(steps));
        let now = Utc::now();
        if step != steps && !gate.should_send(&point, now) {
            continue;
        }
        gate.record(point, now);

        let sample = LocationInput {
            lat: point.lat,
            lng: point.lng,
            timestamp: Some(now),
            accuracy: None,
            city: None,
            address: None,
        };

        if let Err(err) = ingest(&state, id, sample, Source::Simulation) {
            info!(load_id = %id, error = %err, "driver simulation halted");
            break;
        }
    }

    state.simulations.remove(&id);
    info!(load_id = %id, "driver simulation finished");
}
