use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::engine::fare::{FareSchedule, FareTable, UnknownClassPolicy};
use crate::error::AppError;
use crate::models::driver::VehicleClass;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub search_radius_km: f64,
    pub max_notified_drivers: usize,
    pub offer_window: Duration,
    pub sweep_interval: Duration,
    pub routing_url: Option<String>,
    pub average_speed_kmh: f64,
    pub currency: String,
    pub fares: FareTable,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3002)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            search_radius_km: parse_or_default("SEARCH_RADIUS_KM", 50.0)?,
            max_notified_drivers: parse_or_default("MAX_NOTIFIED_DRIVERS", 3)?,
            offer_window: Duration::from_secs(parse_or_default("OFFER_WINDOW_SECS", 60)?),
            sweep_interval: Duration::from_secs(parse_or_default("SWEEP_INTERVAL_SECS", 30)?),
            routing_url: env::var("ROUTING_URL").ok(),
            average_speed_kmh: parse_or_default("AVERAGE_SPEED_KMH", 40.0)?,
            currency: env::var("CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            fares: fare_table_from_env()?,
        })
    }
}

fn fare_table_from_env() -> Result<FareTable, AppError> {
    let mut schedules = HashMap::new();
    schedules.insert(
        VehicleClass::Car,
        FareSchedule {
            per_km: parse_or_default("CAR_FARE_PER_KM", 12.0)?,
            minimum: parse_or_default("CAR_MINIMUM_FARE", 60.0)?,
        },
    );
    schedules.insert(
        VehicleClass::Moto,
        FareSchedule {
            per_km: parse_or_default("MOTO_FARE_PER_KM", 8.0)?,
            minimum: parse_or_default("MOTO_MINIMUM_FARE", 40.0)?,
        },
    );
    schedules.insert(
        VehicleClass::Auto,
        FareSchedule {
            per_km: parse_or_default("AUTO_FARE_PER_KM", 10.0)?,
            minimum: parse_or_default("AUTO_MINIMUM_FARE", 50.0)?,
        },
    );

    let unknown_class = match env::var("UNKNOWN_CLASS_POLICY").as_deref() {
        Ok("fallback") => UnknownClassPolicy::Fallback(FareSchedule {
            per_km: parse_or_default("DEFAULT_FARE_PER_KM", 10.0)?,
            minimum: parse_or_default("DEFAULT_MINIMUM_FARE", 50.0)?,
        }),
        _ => UnknownClassPolicy::Reject,
    };

    Ok(FareTable::new(schedules, unknown_class))
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
