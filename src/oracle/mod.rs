use std::time::Duration;

use serde::Deserialize;

use crate::config::Config;
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::driver::GeoPoint;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_minutes: f64,
}

#[derive(Clone)]
pub enum DistanceOracle {
    Http(HttpOracle),
    Geodesic(GeodesicOracle),
}

impl DistanceOracle {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        match &config.routing_url {
            Some(url) => Ok(DistanceOracle::Http(HttpOracle::new(url)?)),
            None => Ok(DistanceOracle::Geodesic(GeodesicOracle {
                average_speed_kmh: config.average_speed_kmh,
            })),
        }
    }

    pub async fn estimate(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<RouteEstimate, AppError> {
        match self {
            DistanceOracle::Http(oracle) => oracle.estimate(origin, destination).await,
            DistanceOracle::Geodesic(oracle) => Ok(oracle.estimate(origin, destination)),
        }
    }
}

#[derive(Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct RouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<RouteLeg>,
}

#[derive(Deserialize)]
struct RouteLeg {
    distance: f64,
    duration: f64,
}

impl HttpOracle {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build routing client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn estimate(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<RouteEstimate, AppError> {
        let url = format!(
            "{}/route/v1/driving/{:.6},{:.6};{:.6},{:.6}?overview=false",
            self.base_url, origin.lng, origin.lat, destination.lng, destination.lat
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| AppError::Upstream(format!("routing request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "routing service returned {}",
                response.status()
            )));
        }

        let parsed: RouteResponse = response
            .json()
            .await
            .map_err(|err| AppError::Upstream(format!("invalid routing response: {err}")))?;

        if parsed.code != "Ok" {
            return Err(AppError::Upstream(format!(
                "routing service error: {}",
                parsed.code
            )));
        }

        let leg = parsed
            .routes
            .first()
            .ok_or_else(|| AppError::Upstream("routing service returned no routes".to_string()))?;

        Ok(RouteEstimate {
            distance_km: leg.distance / 1000.0,
            duration_minutes: leg.duration / 60.0,
        })
    }
}

#[derive(Clone, Copy)]
pub struct GeodesicOracle {
    pub average_speed_kmh: f64,
}

impl GeodesicOracle {
    pub fn estimate(&self, origin: &GeoPoint, destination: &GeoPoint) -> RouteEstimate {
        let distance_km = haversine_km(origin, destination);
        RouteEstimate {
            distance_km,
            duration_minutes: distance_km / self.average_speed_kmh * 60.0,
        }
    }
}
