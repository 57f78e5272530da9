use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    RideRequestNew,
    RideStatusUpdate,
    RideCompletedForPayment,
    DriverLocationUpdated,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::RideRequestNew => "ride_request_new",
            Topic::RideStatusUpdate => "ride_status_update",
            Topic::RideCompletedForPayment => "ride_completed_for_payment",
            Topic::DriverLocationUpdated => "driver_location_updated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub topic: Topic,
    pub key: String,
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}
