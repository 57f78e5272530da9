use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::driver::{DriverLocation, GeoPoint, VehicleClass};

#[derive(Debug, Clone)]
pub struct CandidateDriver {
    pub driver_id: Uuid,
    pub position: GeoPoint,
    pub distance_km: f64,
}

// One entry per driver, last-write-wins. Going offline flips the
// availability flag, it never removes the record.
#[derive(Default)]
pub struct DriverRegistry {
    entries: DashMap<Uuid, DriverLocation>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn upsert(
        &self,
        driver_id: Uuid,
        position: GeoPoint,
        available: Option<bool>,
        vehicle_class: Option<VehicleClass>,
    ) -> DriverLocation {
        let mut entry = self.entries.entry(driver_id).or_insert_with(|| DriverLocation {
            driver_id,
            position,
            available: true,
            vehicle_class: VehicleClass::Car,
            updated_at: Utc::now(),
        });

        entry.position = position;
        entry.available = available.unwrap_or(true);
        if let Some(class) = vehicle_class {
            entry.vehicle_class = class;
        }
        entry.updated_at = Utc::now();

        entry.value().clone()
    }

    pub fn find_nearby(
        &self,
        origin: &GeoPoint,
        vehicle_class: VehicleClass,
        radius_km: f64,
    ) -> Vec<CandidateDriver> {
        let mut candidates: Vec<CandidateDriver> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                if !driver.available || driver.vehicle_class != vehicle_class {
                    return None;
                }

                let distance_km = haversine_km(origin, &driver.position);
                if distance_km > radius_km {
                    return None;
                }

                Some(CandidateDriver {
                    driver_id: driver.driver_id,
                    position: driver.position,
                    distance_km,
                })
            })
            .collect();

        candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        candidates
    }

    pub fn mark_availability(&self, driver_id: Uuid, available: bool) -> bool {
        match self.entries.get_mut(&driver_id) {
            Some(mut entry) => {
                entry.available = available;
                entry.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, driver_id: Uuid) -> Option<DriverLocation> {
        self.entries.get(&driver_id).map(|entry| entry.value().clone())
    }

    pub fn is_available(&self, driver_id: Uuid) -> bool {
        self.entries
            .get(&driver_id)
            .map(|entry| entry.available)
            .unwrap_or(false)
    }

    pub fn all(&self) -> Vec<DriverLocation> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn available_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.available).count()
    }
}
