use std::collections::HashMap;

use crate::error::AppError;
use crate::models::driver::VehicleClass;

#[derive(Debug, Clone, Copy)]
pub struct FareSchedule {
    pub per_km: f64,
    pub minimum: f64,
}

impl FareSchedule {
    pub fn apply(&self, distance_km: f64) -> f64 {
        (distance_km * self.per_km).max(self.minimum)
    }
}

#[derive(Debug, Clone)]
pub enum UnknownClassPolicy {
    Reject,
    Fallback(FareSchedule),
}

#[derive(Debug, Clone)]
pub struct FareTable {
    schedules: HashMap<VehicleClass, FareSchedule>,
    unknown_class: UnknownClassPolicy,
}

impl FareTable {
    pub fn new(
        schedules: HashMap<VehicleClass, FareSchedule>,
        unknown_class: UnknownClassPolicy,
    ) -> Self {
        Self {
            schedules,
            unknown_class,
        }
    }

    pub fn schedule_for(&self, class: VehicleClass) -> Result<FareSchedule, AppError> {
        match self.schedules.get(&class) {
            Some(schedule) => Ok(*schedule),
            None => match &self.unknown_class {
                UnknownClassPolicy::Reject => Err(AppError::validation(
                    "vehicle_class",
                    &format!("no fare schedule configured for vehicle class {}", class.as_str()),
                )),
                UnknownClassPolicy::Fallback(schedule) => Ok(*schedule),
            },
        }
    }

    pub fn quote(&self, distance_km: f64, class: VehicleClass) -> Result<f64, AppError> {
        Ok(self.schedule_for(class)?.apply(distance_km))
    }
}

impl Default for FareTable {
    fn default() -> Self {
        let mut schedules = HashMap::new();
        schedules.insert(
            VehicleClass::Car,
            FareSchedule {
                per_km: 12.0,
                minimum: 60.0,
            },
        );
        schedules.insert(
            VehicleClass::Moto,
            FareSchedule {
                per_km: 8.0,
                minimum: 40.0,
            },
        );
        schedules.insert(
            VehicleClass::Auto,
            FareSchedule {
                per_km: 10.0,
                minimum: 50.0,
            },
        );
        Self::new(schedules, UnknownClassPolicy::Reject)
    }
}
