use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::{self, RideAction};
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::driver::{GeoPoint, VehicleClass};
use crate::models::event::Topic;
use crate::models::ride::{Location, Ride, RideStatus};
use crate::state::AppState;

// Outstanding offers for one searching ride. In-memory only: a restart
// loses these, and the sweeper resolves the orphaned rides afterwards.
pub struct PendingMatch {
    pub candidates: Vec<Uuid>,
    pub deadline: DateTime<Utc>,
    pub timer: JoinHandle<()>,
}

pub async fn request_ride(
    state: Arc<AppState>,
    customer_id: Uuid,
    pickup: Location,
    dropoff: Location,
    vehicle_class: VehicleClass,
) -> Result<Ride, AppError> {
    let active = state
        .rides
        .iter()
        .find(|entry| entry.customer_id == customer_id && entry.status.is_active())
        .map(|entry| entry.id);
    if let Some(ride_id) = active {
        return Err(AppError::Conflict(format!(
            "you already have an active or pending ride: {ride_id}"
        )));
    }

    state.config.fares.schedule_for(vehicle_class)?;

    // Oracle and fare first: an upstream failure must not leave a partial ride.
    let route = state
        .oracle
        .estimate(&pickup.point, &dropoff.point)
        .await?;
    let estimated_fare = state
        .config
        .fares
        .quote(route.distance_km, vehicle_class)?;

    let ride = Ride {
        id: Uuid::new_v4(),
        customer_id,
        driver_id: None,
        pickup,
        dropoff,
        vehicle_class,
        status: RideStatus::Searching,
        estimated_fare,
        estimated_duration_minutes: route.duration_minutes,
        estimated_distance_km: route.distance_km,
        final_fare: None,
        final_distance_km: None,
        created_at: Utc::now(),
        driver_arrived_at: None,
        started_at: None,
        ended_at: None,
        cancellation_reason: None,
    };
    state.rides.insert(ride.id, ride.clone());
    state.metrics.rides_total.with_label_values(&["requested"]).inc();

    let candidates = state.registry.find_nearby(
        &ride.pickup.point,
        vehicle_class,
        state.config.search_radius_km,
    );

    if candidates.is_empty() {
        let lock = state.ride_lock(ride.id);
        let _guard = lock.lock().await;
        resolve_no_drivers_locked(&state, ride.id, true);
        return Ok(state
            .rides
            .get(&ride.id)
            .map(|entry| entry.value().clone())
            .unwrap_or(ride));
    }

    let deadline = Utc::now()
        + chrono::Duration::from_std(state.config.offer_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
    let timer = tokio::spawn(offer_timer(state.clone(), ride.id));

    state.matches.insert(
        ride.id,
        PendingMatch {
            candidates: candidates.iter().map(|c| c.driver_id).collect(),
            deadline,
            timer,
        },
    );
    state.metrics.active_searches.inc();

    for candidate in candidates.iter().take(state.config.max_notified_drivers) {
        state.notifier.publish(
            Topic::RideRequestNew,
            candidate.driver_id.to_string(),
            json!({
                "ride_id": ride.id,
                "customer_id": ride.customer_id,
                "pickup": ride.pickup,
                "dropoff": ride.dropoff,
                "estimated_fare": ride.estimated_fare,
                "estimated_duration_minutes": ride.estimated_duration_minutes,
                "vehicle_class": ride.vehicle_class,
            }),
        );
    }

    info!(
        ride_id = %ride.id,
        customer_id = %customer_id,
        candidates = candidates.len(),
        "ride searching for drivers"
    );

    Ok(ride)
}

async fn offer_timer(state: Arc<AppState>, ride_id: Uuid) {
    sleep(state.config.offer_window).await;

    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;

    let still_searching = state
        .rides
        .get(&ride_id)
        .map(|ride| ride.status == RideStatus::Searching)
        .unwrap_or(false);
    if !still_searching {
        return;
    }

    warn!(ride_id = %ride_id, "offer window elapsed with no acceptance");
    resolve_no_drivers_locked(&state, ride_id, false);
}

// Shared terminal path for timeout, candidate exhaustion and the sweeper.
// Caller must hold the ride lock.
fn resolve_no_drivers_locked(state: &AppState, ride_id: Uuid, abort_timer: bool) {
    let snapshot = {
        let Some(mut ride) = state.rides.get_mut(&ride_id) else {
            return;
        };
        if lifecycle::apply(&mut ride, RideAction::SearchExhausted).is_err() {
            return;
        }
        ride.clone()
    };

    state.clear_pending(ride_id, abort_timer);
    record_resolution(state, &snapshot);

    state.notifier.publish(
        Topic::RideStatusUpdate,
        snapshot.customer_id.to_string(),
        json!({
            "ride_id": snapshot.id,
            "customer_id": snapshot.customer_id,
            "status": snapshot.status,
            "message": "No drivers found nearby for your request.",
        }),
    );

    info!(ride_id = %ride_id, "no drivers found");
}

pub async fn expire_abandoned_search(state: Arc<AppState>, ride_id: Uuid) {
    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;
    resolve_no_drivers_locked(&state, ride_id, true);
}

pub async fn accept_ride(
    state: Arc<AppState>,
    ride_id: Uuid,
    driver_id: Uuid,
) -> Result<Ride, AppError> {
    if !state.registry.is_available(driver_id) {
        return Err(AppError::Conflict(
            "you are not available to accept rides".to_string(),
        ));
    }

    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;

    let snapshot = {
        let mut ride = state
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;
        lifecycle::apply(&mut ride, RideAction::DriverAccepted)?;
        ride.driver_id = Some(driver_id);
        ride.clone()
    };

    state.registry.mark_availability(driver_id, false);
    state.clear_pending(ride_id, true);
    record_resolution(&state, &snapshot);

    let driver_position = state.registry.get(driver_id).map(|entry| entry.position);
    state.notifier.publish(
        Topic::RideStatusUpdate,
        snapshot.customer_id.to_string(),
        json!({
            "ride_id": snapshot.id,
            "customer_id": snapshot.customer_id,
            "driver_id": driver_id,
            "status": snapshot.status,
            "message": "Your ride has been accepted by a driver!",
            "driver_position": driver_position,
        }),
    );

    info!(ride_id = %ride_id, driver_id = %driver_id, "ride accepted");
    Ok(snapshot)
}

pub async fn reject_ride(
    state: Arc<AppState>,
    ride_id: Uuid,
    driver_id: Uuid,
) -> Result<Ride, AppError> {
    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;

    if !state.rides.contains_key(&ride_id) {
        return Err(AppError::NotFound(format!("ride {ride_id} not found")));
    }

    let (remaining, deadline) = {
        let Some(mut pending) = state.matches.get_mut(&ride_id) else {
            return Err(AppError::Conflict(
                "ride is not awaiting driver responses".to_string(),
            ));
        };
        pending.candidates.retain(|id| *id != driver_id);
        (pending.candidates.len(), pending.deadline)
    };

    info!(
        ride_id = %ride_id,
        driver_id = %driver_id,
        remaining,
        deadline = %deadline,
        "driver rejected ride"
    );

    if remaining == 0 {
        // Pool exhausted: do not wait out the rest of the offer window.
        resolve_no_drivers_locked(&state, ride_id, true);
    }

    state
        .rides
        .get(&ride_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))
}

pub async fn mark_arrived(
    state: Arc<AppState>,
    ride_id: Uuid,
    actor: Actor,
) -> Result<Ride, AppError> {
    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;

    let snapshot = {
        let mut ride = state
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;
        lifecycle::require_bound_driver(&ride, actor)?;
        lifecycle::apply(&mut ride, RideAction::DriverArrived)?;
        ride.clone()
    };

    state.metrics.rides_total.with_label_values(&["driver_arrived"]).inc();
    state.notifier.publish(
        Topic::RideStatusUpdate,
        snapshot.customer_id.to_string(),
        json!({
            "ride_id": snapshot.id,
            "customer_id": snapshot.customer_id,
            "driver_id": snapshot.driver_id,
            "status": snapshot.status,
            "message": "Your driver has arrived at the pickup location!",
        }),
    );

    info!(ride_id = %ride_id, "driver arrived at pickup");
    Ok(snapshot)
}

pub async fn start_ride(
    state: Arc<AppState>,
    ride_id: Uuid,
    actor: Actor,
) -> Result<Ride, AppError> {
    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;

    let snapshot = {
        let mut ride = state
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;
        lifecycle::require_bound_driver(&ride, actor)?;
        lifecycle::apply(&mut ride, RideAction::TripStarted)?;
        ride.clone()
    };

    state.metrics.rides_total.with_label_values(&["started"]).inc();
    state.notifier.publish(
        Topic::RideStatusUpdate,
        snapshot.customer_id.to_string(),
        json!({
            "ride_id": snapshot.id,
            "customer_id": snapshot.customer_id,
            "driver_id": snapshot.driver_id,
            "status": snapshot.status,
            "message": "Your ride has started!",
        }),
    );

    info!(ride_id = %ride_id, "ride started");
    Ok(snapshot)
}

pub async fn end_ride(
    state: Arc<AppState>,
    ride_id: Uuid,
    actor: Actor,
    actual_dropoff_point: Option<GeoPoint>,
    actual_dropoff_address: Option<String>,
) -> Result<Ride, AppError> {
    // Pre-flight checks plus the oracle call happen before taking the ride
    // lock; the lock is never held across the routing request.
    let (pickup_point, dropoff_point) = {
        let ride = state
            .rides
            .get(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;
        lifecycle::require_bound_driver(&ride, actor)?;
        if ride.status != RideStatus::Started {
            return Err(AppError::Conflict(format!(
                "cannot end ride {} in status {}",
                ride_id,
                ride.status.as_str()
            )));
        }
        (
            ride.pickup.point,
            actual_dropoff_point.unwrap_or(ride.dropoff.point),
        )
    };

    let route = state.oracle.estimate(&pickup_point, &dropoff_point).await?;

    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;

    let snapshot = {
        let mut ride = state
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;
        lifecycle::require_bound_driver(&ride, actor)?;
        lifecycle::apply(&mut ride, RideAction::TripEnded)?;

        // Final fare supersedes the estimate, computed from the class fixed
        // at creation, after the end timestamp is in place.
        let final_fare = state.config.fares.quote(route.distance_km, ride.vehicle_class)?;
        ride.final_fare = Some(final_fare);
        ride.final_distance_km = Some(route.distance_km);
        if let Some(point) = actual_dropoff_point {
            ride.dropoff.point = point;
        }
        if let Some(address) = actual_dropoff_address {
            ride.dropoff.address = address;
        }
        ride.clone()
    };

    state.registry.mark_availability(actor.id, true);
    state.metrics.rides_total.with_label_values(&["completed"]).inc();

    let final_fare = snapshot.final_fare.unwrap_or(0.0);
    state.notifier.publish(
        Topic::RideCompletedForPayment,
        snapshot.id.to_string(),
        json!({
            "ride_id": snapshot.id,
            "customer_id": snapshot.customer_id,
            "driver_id": snapshot.driver_id,
            "amount": final_fare,
            "currency": state.config.currency,
            "payment_method": "app_wallet",
        }),
    );
    state.notifier.publish(
        Topic::RideStatusUpdate,
        snapshot.customer_id.to_string(),
        json!({
            "ride_id": snapshot.id,
            "customer_id": snapshot.customer_id,
            "driver_id": snapshot.driver_id,
            "status": snapshot.status,
            "fare": final_fare,
            "distance_km": snapshot.final_distance_km,
            "message": "Your ride has ended. Fare collected.",
        }),
    );

    info!(
        ride_id = %ride_id,
        fare = final_fare,
        distance_km = route.distance_km,
        "ride completed"
    );
    Ok(snapshot)
}

pub async fn cancel_ride(
    state: Arc<AppState>,
    ride_id: Uuid,
    actor: Actor,
    reason: String,
) -> Result<Ride, AppError> {
    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;

    let (snapshot, was_searching) = {
        let mut ride = state
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;
        let action = lifecycle::cancellation_action(&ride, actor)?;
        let was_searching = ride.status == RideStatus::Searching;
        lifecycle::apply(&mut ride, action)?;
        ride.cancellation_reason = Some(reason.clone());
        (ride.clone(), was_searching)
    };

    if was_searching {
        state.clear_pending(ride_id, true);
    }

    // A customer cancellation frees the bound driver; a driver cancellation
    // leaves availability to the driver's own next report.
    if snapshot.status == RideStatus::CancelledByCustomer {
        if let Some(driver_id) = snapshot.driver_id {
            state.registry.mark_availability(driver_id, true);
        }
    }

    state
        .metrics
        .rides_total
        .with_label_values(&[snapshot.status.as_str()])
        .inc();

    let payload = json!({
        "ride_id": snapshot.id,
        "customer_id": snapshot.customer_id,
        "driver_id": snapshot.driver_id,
        "status": snapshot.status,
        "cancellation_reason": reason,
        "cancelled_by": actor.role,
        "message": format!("Ride {} was cancelled by {}.", snapshot.id, actor.role.as_str()),
    });
    state.notifier.publish(
        Topic::RideStatusUpdate,
        snapshot.customer_id.to_string(),
        payload.clone(),
    );
    if let Some(driver_id) = snapshot.driver_id {
        state
            .notifier
            .publish(Topic::RideStatusUpdate, driver_id.to_string(), payload);
    }

    info!(ride_id = %ride_id, cancelled_by = actor.role.as_str(), "ride cancelled");
    Ok(snapshot)
}

pub fn get_ride(state: &AppState, ride_id: Uuid, actor: Actor) -> Result<Ride, AppError> {
    let ride = state
        .rides
        .get(&ride_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

    if !lifecycle::can_view(&ride, actor) {
        return Err(AppError::Forbidden(
            "you are not authorized to view this ride".to_string(),
        ));
    }

    Ok(ride)
}

pub fn active_ride(state: &AppState, actor: Actor) -> Result<Ride, AppError> {
    find_for_actor(state, actor, |status| status.is_active())?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound("no active ride found".to_string()))
}

pub fn ride_history(state: &AppState, actor: Actor) -> Result<Vec<Ride>, AppError> {
    let mut rides = find_for_actor(state, actor, |status| status.is_terminal())?;
    rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(rides)
}

fn find_for_actor(
    state: &AppState,
    actor: Actor,
    predicate: fn(RideStatus) -> bool,
) -> Result<Vec<Ride>, AppError> {
    use crate::models::actor::Role;

    let matches_actor: Box<dyn Fn(&Ride) -> bool> = match actor.role {
        Role::Customer => Box::new(move |ride: &Ride| ride.customer_id == actor.id),
        Role::Driver => Box::new(move |ride: &Ride| ride.driver_id == Some(actor.id)),
        Role::Admin => {
            return Err(AppError::Forbidden(
                "only customers and drivers have rides".to_string(),
            ));
        }
    };

    Ok(state
        .rides
        .iter()
        .filter(|entry| matches_actor(entry.value()) && predicate(entry.status))
        .map(|entry| entry.value().clone())
        .collect())
}

fn record_resolution(state: &AppState, ride: &Ride) {
    let outcome = ride.status.as_str();
    state.metrics.rides_total.with_label_values(&[outcome]).inc();
    let elapsed = (Utc::now() - ride.created_at)
        .to_std()
        .unwrap_or_default()
        .as_secs_f64();
    state
        .metrics
        .match_latency_seconds
        .with_label_values(&[outcome])
        .observe(elapsed);
}
