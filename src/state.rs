use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::dispatch::PendingMatch;
use crate::engine::registry::DriverRegistry;
use crate::models::ride::Ride;
use crate::notify::EventNotifier;
use crate::observability::metrics::Metrics;
use crate::oracle::DistanceOracle;

pub struct AppState {
    pub config: Config,
    pub rides: DashMap<Uuid, Ride>,
    pub registry: DriverRegistry,
    pub matches: DashMap<Uuid, PendingMatch>,
    ride_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    pub notifier: EventNotifier,
    pub oracle: DistanceOracle,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config, oracle: DistanceOracle, notifier: EventNotifier) -> Self {
        Self {
            config,
            rides: DashMap::new(),
            registry: DriverRegistry::new(),
            matches: DashMap::new(),
            ride_locks: DashMap::new(),
            notifier,
            oracle,
            metrics: Metrics::new(),
        }
    }

    // Accept, reject, timeout and cancel race on the same ride; everything
    // that mutates a ride takes this lock first.
    pub fn ride_lock(&self, ride_id: Uuid) -> Arc<Mutex<()>> {
        self.ride_locks
            .entry(ride_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // abort_timer must be false when called from the offer timer itself,
    // otherwise the timer task would cancel its own cleanup mid-flight.
    pub fn clear_pending(&self, ride_id: Uuid, abort_timer: bool) -> bool {
        match self.matches.remove(&ride_id) {
            Some((_, pending)) => {
                if abort_timer {
                    pending.timer.abort();
                }
                self.metrics.active_searches.dec();
                true
            }
            None => false,
        }
    }
}
