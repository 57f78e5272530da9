use chrono::Utc;

use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::ride::{Ride, RideStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RideAction {
    DriverAccepted,
    SearchExhausted,
    DriverArrived,
    TripStarted,
    TripEnded,
    CustomerCancelled,
    DriverCancelled,
}

impl RideAction {
    pub fn allowed_from(&self) -> &'static [RideStatus] {
        match self {
            RideAction::DriverAccepted => &[RideStatus::Searching],
            RideAction::SearchExhausted => &[RideStatus::Searching],
            RideAction::DriverArrived => &[RideStatus::Accepted],
            RideAction::TripStarted => &[RideStatus::Accepted, RideStatus::DriverArrived],
            RideAction::TripEnded => &[RideStatus::Started],
            RideAction::CustomerCancelled => &[
                RideStatus::Pending,
                RideStatus::Searching,
                RideStatus::Accepted,
                RideStatus::DriverArrived,
            ],
            RideAction::DriverCancelled => &[RideStatus::Accepted, RideStatus::DriverArrived],
        }
    }

    pub fn target(&self) -> RideStatus {
        match self {
            RideAction::DriverAccepted => RideStatus::Accepted,
            RideAction::SearchExhausted => RideStatus::NoDriversFound,
            RideAction::DriverArrived => RideStatus::DriverArrived,
            RideAction::TripStarted => RideStatus::Started,
            RideAction::TripEnded => RideStatus::Completed,
            RideAction::CustomerCancelled => RideStatus::CancelledByCustomer,
            RideAction::DriverCancelled => RideStatus::CancelledByDriver,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            RideAction::DriverAccepted => "accept",
            RideAction::SearchExhausted => "abandon search for",
            RideAction::DriverArrived => "mark arrival for",
            RideAction::TripStarted => "start",
            RideAction::TripEnded => "end",
            RideAction::CustomerCancelled | RideAction::DriverCancelled => "cancel",
        }
    }
}

// The only place a ride's status is allowed to change. Rejected transitions
// leave the ride untouched so a losing racer observes a clean conflict.
pub fn apply(ride: &mut Ride, action: RideAction) -> Result<(), AppError> {
    if !action.allowed_from().contains(&ride.status) {
        return Err(AppError::Conflict(format!(
            "cannot {} ride {} in status {}",
            action.describe(),
            ride.id,
            ride.status.as_str()
        )));
    }

    ride.status = action.target();

    let now = Utc::now();
    match action {
        RideAction::DriverArrived => ride.driver_arrived_at = Some(now),
        RideAction::TripStarted => ride.started_at = Some(now),
        RideAction::TripEnded => ride.ended_at = Some(now),
        _ => {}
    }

    Ok(())
}

// Driver-side transitions are only valid for the bound driver; a stranger's
// attempt surfaces as not-found rather than forbidden.
pub fn require_bound_driver(ride: &Ride, actor: Actor) -> Result<(), AppError> {
    if actor.role == Role::Driver && ride.driver_id == Some(actor.id) {
        return Ok(());
    }
    Err(AppError::NotFound(format!(
        "ride {} not found or not assigned to you",
        ride.id
    )))
}

pub fn cancellation_action(ride: &Ride, actor: Actor) -> Result<RideAction, AppError> {
    match actor.role {
        Role::Customer if ride.customer_id == actor.id => Ok(RideAction::CustomerCancelled),
        Role::Driver if ride.driver_id == Some(actor.id) => Ok(RideAction::DriverCancelled),
        _ => Err(AppError::Forbidden(
            "you are not authorized to cancel this ride".to_string(),
        )),
    }
}

pub fn can_view(ride: &Ride, actor: Actor) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Customer => ride.customer_id == actor.id,
        Role::Driver => ride.driver_id == Some(actor.id),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{RideAction, apply, cancellation_action, require_bound_driver};
    use crate::error::AppError;
    use crate::models::actor::{Actor, Role};
    use crate::models::driver::{GeoPoint, VehicleClass};
    use crate::models::ride::{Location, Ride, RideStatus};

    fn ride(status: RideStatus) -> Ride {
        let location = Location {
            point: GeoPoint {
                lat: 12.97,
                lng: 77.59,
            },
            address: "MG Road".to_string(),
        };
        Ride {
            id: Uuid::from_u128(1),
            customer_id: Uuid::from_u128(2),
            driver_id: None,
            pickup: location.clone(),
            dropoff: location,
            vehicle_class: VehicleClass::Car,
            status,
            estimated_fare: 120.0,
            estimated_duration_minutes: 15.0,
            estimated_distance_km: 10.0,
            final_fare: None,
            final_distance_km: None,
            created_at: Utc::now(),
            driver_arrived_at: None,
            started_at: None,
            ended_at: None,
            cancellation_reason: None,
        }
    }

    #[test]
    fn accept_only_from_searching() {
        let mut searching = ride(RideStatus::Searching);
        apply(&mut searching, RideAction::DriverAccepted).unwrap();
        assert_eq!(searching.status, RideStatus::Accepted);

        let mut accepted = ride(RideStatus::Accepted);
        let err = apply(&mut accepted, RideAction::DriverAccepted).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(accepted.status, RideStatus::Accepted);
    }

    #[test]
    fn trip_can_start_from_accepted_or_arrived() {
        let mut accepted = ride(RideStatus::Accepted);
        apply(&mut accepted, RideAction::TripStarted).unwrap();
        assert_eq!(accepted.status, RideStatus::Started);
        assert!(accepted.started_at.is_some());

        let mut arrived = ride(RideStatus::DriverArrived);
        apply(&mut arrived, RideAction::TripStarted).unwrap();
        assert_eq!(arrived.status, RideStatus::Started);
    }

    #[test]
    fn completed_ride_rejects_every_action() {
        for action in [
            RideAction::DriverAccepted,
            RideAction::SearchExhausted,
            RideAction::DriverArrived,
            RideAction::TripStarted,
            RideAction::TripEnded,
            RideAction::CustomerCancelled,
            RideAction::DriverCancelled,
        ] {
            let mut completed = ride(RideStatus::Completed);
            assert!(apply(&mut completed, action).is_err());
            assert_eq!(completed.status, RideStatus::Completed);
        }
    }

    #[test]
    fn end_sets_the_end_timestamp() {
        let mut started = ride(RideStatus::Started);
        apply(&mut started, RideAction::TripEnded).unwrap();
        assert_eq!(started.status, RideStatus::Completed);
        assert!(started.ended_at.is_some());
    }

    #[test]
    fn customer_cannot_cancel_a_started_ride() {
        let mut started = ride(RideStatus::Started);
        let err = apply(&mut started, RideAction::CustomerCancelled).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn only_the_bound_driver_passes_the_binding_check() {
        let mut bound = ride(RideStatus::Accepted);
        bound.driver_id = Some(Uuid::from_u128(9));

        let driver = Actor {
            id: Uuid::from_u128(9),
            role: Role::Driver,
        };
        assert!(require_bound_driver(&bound, driver).is_ok());

        let stranger = Actor {
            id: Uuid::from_u128(10),
            role: Role::Driver,
        };
        let err = require_bound_driver(&bound, stranger).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn cancellation_dispatches_on_role_and_binding() {
        let mut r = ride(RideStatus::Accepted);
        r.driver_id = Some(Uuid::from_u128(9));

        let customer = Actor {
            id: r.customer_id,
            role: Role::Customer,
        };
        assert_eq!(
            cancellation_action(&r, customer).unwrap(),
            RideAction::CustomerCancelled
        );

        let driver = Actor {
            id: Uuid::from_u128(9),
            role: Role::Driver,
        };
        assert_eq!(
            cancellation_action(&r, driver).unwrap(),
            RideAction::DriverCancelled
        );

        let stranger = Actor {
            id: Uuid::from_u128(42),
            role: Role::Customer,
        };
        assert!(matches!(
            cancellation_action(&r, stranger).unwrap_err(),
            AppError::Forbidden(_)
        ));
    }
}
