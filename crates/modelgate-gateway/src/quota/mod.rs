//! Quota layer (token buckets, reservations, periodic replenish).
//!
//! The engine never schedules itself; `spawn_replenisher` is the periodic
//! timer the serving process attaches to it.

pub mod bucket;
pub mod engine;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

pub use bucket::{BucketKey, TokenBucket};
pub use engine::QuotaEngine;

use crate::obs::metrics::GatewayMetrics;

/// Run `replenish` every `period` until the task is aborted.
pub fn spawn_replenisher(
    quota: Arc<QuotaEngine>,
    metrics: Arc<GatewayMetrics>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let reclaimed = quota.replenish();
            if reclaimed > 0 {
                metrics.reservations_reclaimed.add(&[], reclaimed as u64);
            }
        }
    })
}
