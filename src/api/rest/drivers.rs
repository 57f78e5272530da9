use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::{get, put};
use serde::Deserialize;
use serde_json::json;

use crate::api::rest::validate::check_point;
use crate::error::{AppError, FieldError};
use crate::models::actor::{Actor, Role};
use crate::models::driver::{DriverLocation, GeoPoint, VehicleClass};
use crate::models::event::Topic;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/location", put(update_location))
        .route("/drivers", get(list_drivers))
}

#[derive(Deserialize)]
pub struct UpdateLocationBody {
    pub position: GeoPoint,
    pub available: Option<bool>,
    pub vehicle_class: Option<VehicleClass>,
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<UpdateLocationBody>,
) -> Result<Json<DriverLocation>, AppError> {
    actor.require(Role::Driver)?;

    let mut errors: Vec<FieldError> = Vec::new();
    check_point(&mut errors, "position", &payload.position);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let entry = state.registry.upsert(
        actor.id,
        payload.position,
        payload.available,
        payload.vehicle_class,
    );
    state
        .metrics
        .available_drivers
        .set(state.registry.available_count() as i64);

    state.notifier.publish(
        Topic::DriverLocationUpdated,
        actor.id.to_string(),
        json!({
            "driver_id": entry.driver_id,
            "position": entry.position,
            "available": entry.available,
            "vehicle_class": entry.vehicle_class,
        }),
    );

    Ok(Json(entry))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<DriverLocation>>, AppError> {
    actor.require(Role::Admin)?;
    Ok(Json(state.registry.all()))
}
