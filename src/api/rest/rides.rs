use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::validate::{check_address, check_point};
use crate::engine::dispatch;
use crate::error::{AppError, FieldError};
use crate::models::actor::{Actor, Role};
use crate::models::driver::{GeoPoint, VehicleClass};
use crate::models::ride::{Location, Ride};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides/request", post(request_ride))
        .route("/rides/active", get(active_ride))
        .route("/rides/history", get(ride_history))
        .route("/rides/:id", get(get_ride))
        .route("/rides/:id/accept", post(accept_ride))
        .route("/rides/:id/reject", post(reject_ride))
        .route("/rides/:id/arrived", post(mark_arrived))
        .route("/rides/:id/start", post(start_ride))
        .route("/rides/:id/end", post(end_ride))
        .route("/rides/:id/cancel", post(cancel_ride))
}

#[derive(Deserialize)]
pub struct RequestRideBody {
    pub pickup: Location,
    pub dropoff: Location,
    pub vehicle_class: VehicleClass,
}

#[derive(Deserialize)]
pub struct EndRideBody {
    pub dropoff_point: Option<GeoPoint>,
    pub dropoff_address: Option<String>,
}

#[derive(Deserialize)]
pub struct CancelRideBody {
    pub reason: String,
}

async fn request_ride(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<RequestRideBody>,
) -> Result<(StatusCode, Json<Ride>), AppError> {
    actor.require(Role::Customer)?;

    let mut errors: Vec<FieldError> = Vec::new();
    check_point(&mut errors, "pickup.point", &payload.pickup.point);
    check_address(&mut errors, "pickup.address", &payload.pickup.address);
    check_point(&mut errors, "dropoff.point", &payload.dropoff.point);
    check_address(&mut errors, "dropoff.address", &payload.dropoff.address);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let ride = dispatch::request_ride(
        state,
        actor.id,
        payload.pickup,
        payload.dropoff,
        payload.vehicle_class,
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(ride)))
}

async fn accept_ride(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    actor.require(Role::Driver)?;
    let ride = dispatch::accept_ride(state, id, actor.id).await?;
    Ok(Json(ride))
}

async fn reject_ride(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    actor.require(Role::Driver)?;
    let ride = dispatch::reject_ride(state, id, actor.id).await?;
    Ok(Json(ride))
}

async fn mark_arrived(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    actor.require(Role::Driver)?;
    let ride = dispatch::mark_arrived(state, id, actor).await?;
    Ok(Json(ride))
}

async fn start_ride(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    actor.require(Role::Driver)?;
    let ride = dispatch::start_ride(state, id, actor).await?;
    Ok(Json(ride))
}

async fn end_ride(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<EndRideBody>,
) -> Result<Json<Ride>, AppError> {
    actor.require(Role::Driver)?;

    if let Some(point) = &payload.dropoff_point {
        let mut errors: Vec<FieldError> = Vec::new();
        check_point(&mut errors, "dropoff_point", point);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }
    }

    let ride = dispatch::end_ride(
        state,
        id,
        actor,
        payload.dropoff_point,
        payload.dropoff_address,
    )
    .await?;
    Ok(Json(ride))
}

async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRideBody>,
) -> Result<Json<Ride>, AppError> {
    if payload.reason.trim().is_empty() {
        return Err(AppError::validation("reason", "cancellation reason is required"));
    }

    let ride = dispatch::cancel_ride(state, id, actor, payload.reason).await?;
    Ok(Json(ride))
}

async fn get_ride(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = dispatch::get_ride(&state, id, actor)?;
    Ok(Json(ride))
}

async fn active_ride(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Ride>, AppError> {
    let ride = dispatch::active_ride(&state, actor)?;
    Ok(Json(ride))
}

async fn ride_history(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Ride>>, AppError> {
    let rides = dispatch::ride_history(&state, actor)?;
    Ok(Json(rides))
}
