//! Autoscale background worker.
//!
//! Periodically walks every machine type in the current configuration
//! snapshot, computes its desired fleet size, and forwards the target to
//! the external machine provider. One pool failing never aborts the pass.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use botfleet_config::{PoolConfig, Registry};

use crate::schedule::compute_target_size;

/// External demand signal per machine type (busy plus pending machines).
#[async_trait]
pub trait UtilizationSource: Send + Sync {
    async fn utilization(&self, machine_type: &str) -> anyhow::Result<u32>;
}

/// External machine-leasing collaborator. This core only computes the
/// target size; acting on it is the provider's job.
#[async_trait]
pub trait MachineProvider: Send + Sync {
    async fn set_target_size(&self, machine_type: &str, size: u32) -> anyhow::Result<()>;
}

/// Counters for a single autoscale pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub pools_evaluated: u32,
    pub targets_forwarded: u32,
    pub pools_failed: u32,
}

/// Worker that drives the autoscale control loop.
pub struct AutoscaleWorker {
    registry: Arc<Registry>,
    utilization: Arc<dyn UtilizationSource>,
    provider: Arc<dyn MachineProvider>,
    interval: Duration,
}

impl AutoscaleWorker {
    pub fn new(
        registry: Arc<Registry>,
        utilization: Arc<dyn UtilizationSource>,
        provider: Arc<dyn MachineProvider>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            utilization,
            provider,
            interval,
        }
    }

    /// Run until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting autoscale worker"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stats = self.run_pass().await;
                    if stats.pools_failed > 0 {
                        error!(
                            pools_failed = stats.pools_failed,
                            "Autoscale pass had failures"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Autoscale worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run a single pass over every machine type in the current snapshot.
    pub async fn run_pass(&self) -> PassStats {
        let snapshot = self.registry.current();
        let now = Utc::now();
        let mut stats = PassStats::default();

        for (pool, _group) in snapshot.machine_types() {
            stats.pools_evaluated += 1;
            match self.apply_pool(pool, now).await {
                Ok(target) => {
                    stats.targets_forwarded += 1;
                    debug!(
                        machine_type = %pool.name,
                        target, "Forwarded target size"
                    );
                }
                Err(e) => {
                    stats.pools_failed += 1;
                    warn!(
                        machine_type = %pool.name,
                        error = %e,
                        "Failed to apply target size"
                    );
                }
            }
        }

        info!(
            snapshot_version = snapshot.version(),
            pools_evaluated = stats.pools_evaluated,
            targets_forwarded = stats.targets_forwarded,
            pools_failed = stats.pools_failed,
            "Autoscale pass complete"
        );

        stats
    }

    async fn apply_pool(&self, pool: &PoolConfig, now: chrono::DateTime<Utc>) -> anyhow::Result<u32> {
        // The demand signal only matters under load-based rules; skip the
        // lookup for purely schedule-driven pools.
        let utilization = if pool.load_based.is_empty() {
            0
        } else {
            self.utilization.utilization(&pool.name).await?
        };
        let target = compute_target_size(pool, now, utilization);
        self.provider.set_target_size(&pool.name, target).await?;
        Ok(target)
    }
}
