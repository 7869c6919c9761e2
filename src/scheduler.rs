use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use crate::error::AppError;
use crate::recon::BatchCoordinator;

/// Background scheduler: ticks on a fixed interval and hands each
/// tick to the coordinator, which applies the per-configuration
/// schedule gates itself.
pub struct ReconScheduler {
    coordinator: Arc<BatchCoordinator>,
    tick_secs: u64,
    run_budget: u32,
}

impl ReconScheduler {
    pub fn new(coordinator: Arc<BatchCoordinator>, tick_secs: u64, run_budget: u32) -> Self {
        Self {
            coordinator,
            tick_secs,
            run_budget,
        }
    }

    /// Start the scheduler (runs in background).
    pub fn start(&self) -> JoinHandle<()> {
        let coordinator = self.coordinator.clone();
        let tick_secs = self.tick_secs;
        let run_budget = self.run_budget;

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(tick_secs));
            // First tick completes immediately; skip it so startup
            // does not trigger a run.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                info!("🔄 Starting scheduled reconciliation cycle");
                match coordinator.run_scheduled(Utc::now(), run_budget).await {
                    Ok(stats) => {
                        info!(
                            "✓ Reconciliation cycle completed: {} settlements processed, {} matched, {} unmatched",
                            stats.settlements_processed(),
                            stats.total_matched(),
                            stats.total_unmatched()
                        );
                    }
                    // No active configurations is normal on a fresh
                    // instance, not a failure worth alarming on.
                    Err(AppError::Config(reason)) => {
                        info!("Scheduled cycle skipped: {}", reason);
                    }
                    Err(e) => {
                        error!("❌ Scheduled reconciliation cycle failed: {:?}", e);
                    }
                }
            }
        })
    }
}
