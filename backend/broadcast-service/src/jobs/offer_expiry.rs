//! Periodic offer expiry sweep.
//!
//! Due-ness derives from the durable `expires_at` column, so the sweep
//! survives restarts and any offer already closed by another path is
//! skipped. A missed tick only delays a close by one interval.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::services::OfferService;

pub async fn run_sweeper(offers: Arc<OfferService>, interval: Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "offer expiry sweeper started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match offers.sweep_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(closed) => tracing::info!(closed, "expired offers closed"),
            Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
        }
    }
}
