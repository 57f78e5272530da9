use std::sync::Arc;

use chrono::Utc;
use tokio::time::interval;
use tracing::{info, warn};

use crate::models::ride::RideStatus;
use crate::state::AppState;

// Pending matches live in memory only. After a restart, rides stuck in
// searching past the offer deadline have no timer left; this pass resolves
// them through the same conflict-checked path the timer uses.
pub async fn run_reconciliation(state: Arc<AppState>) {
    info!("reconciliation sweeper started");

    let mut ticker = interval(state.config.sweep_interval);
    loop {
        ticker.tick().await;

        let deadline = chrono::Duration::from_std(state.config.offer_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let now = Utc::now();

        let abandoned: Vec<_> = state
            .rides
            .iter()
            .filter(|entry| {
                entry.status == RideStatus::Searching && now - entry.created_at > deadline
            })
            .map(|entry| entry.id)
            .collect();

        for ride_id in abandoned {
            warn!(ride_id = %ride_id, "sweeping abandoned search");
            super::dispatch::expire_abandoned_search(state.clone(), ride_id).await;
        }
    }
}
