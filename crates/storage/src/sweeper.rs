//! Periodic deletion of expired cases

use crate::engine::CaseStorageEngine;
use crate::error::Result;
use chrono::{DateTime, Utc};
use common::CaseId;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: Vec<CaseId>,
    pub failed: Vec<CaseId>,
}

pub struct ExpirationSweeper {
    engine: CaseStorageEngine,
    interval: Duration,
}

impl ExpirationSweeper {
    pub fn new(engine: CaseStorageEngine, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Delete every case expired at `now`. A case that fails to delete is
    /// reported and left for the next sweep.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for case_id in self.engine.expired_cases(now).await? {
            match self.engine.delete(case_id).await {
                Ok(()) => report.deleted.push(case_id),
                Err(e) => {
                    warn!("Failed to delete expired case {}: {}", case_id, e);
                    report.failed.push(case_id);
                }
            }
        }

        if !report.deleted.is_empty() || !report.failed.is_empty() {
            info!(
                "Expiration sweep deleted {} case(s), {} failure(s)",
                report.deleted.len(),
                report.failed.len()
            );
        }
        Ok(report)
    }

    /// Sweep on every tick until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Expiration sweeper started (every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once(Utc::now()).await {
                        error!("Expiration sweep failed: {}", e);
                    }
                }
            }
        }
        info!("Expiration sweeper stopped");
    }
}
