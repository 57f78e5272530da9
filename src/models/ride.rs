use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::{GeoPoint, VehicleClass};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub point: GeoPoint,
    pub address: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Searching,
    Accepted,
    DriverArrived,
    Started,
    Completed,
    CancelledByCustomer,
    CancelledByDriver,
    NoDriversFound,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Searching => "searching",
            RideStatus::Accepted => "accepted",
            RideStatus::DriverArrived => "driver_arrived",
            RideStatus::Started => "started",
            RideStatus::Completed => "completed",
            RideStatus::CancelledByCustomer => "cancelled_by_customer",
            RideStatus::CancelledByDriver => "cancelled_by_driver",
            RideStatus::NoDriversFound => "no_drivers_found",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RideStatus::Pending
                | RideStatus::Searching
                | RideStatus::Accepted
                | RideStatus::DriverArrived
                | RideStatus::Started
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: Location,
    pub dropoff: Location,
    pub vehicle_class: VehicleClass,
    pub status: RideStatus,
    pub estimated_fare: f64,
    pub estimated_duration_minutes: f64,
    pub estimated_distance_km: f64,
    pub final_fare: Option<f64>,
    pub final_distance_km: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub driver_arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}
