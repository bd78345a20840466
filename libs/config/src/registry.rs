//! Active-snapshot registry and periodic reload.
//!
//! The registry owns the atomically swappable pointer to the current
//! validated snapshot. Readers (`current`) never block and always see a
//! fully built snapshot; a reader that started with snapshot N keeps N
//! alive until it drops the `Arc`, even if N+1 is installed mid-resolution.
//!
//! Reload is single-writer: one load-validate-install cycle at a time. A
//! fetch or validation failure leaves the previous snapshot authoritative -
//! an invalid configuration must never cause bots to be accepted under no
//! policy, and must never cause the last good policy to be dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::error::ValidationReport;
use crate::model::FleetConfig;
use crate::snapshot::Snapshot;
use crate::validate::validate;

/// External collaborator that produces the raw, not-yet-validated
/// configuration document (from a config service, a file, a datastore).
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<FleetConfig>;
}

/// Why a reload cycle did not install a new snapshot.
#[derive(Debug, Error)]
pub enum ReloadError {
    /// The source could not produce a document.
    #[error("config fetch failed: {0}")]
    Fetch(anyhow::Error),

    /// The document failed validation; the report lists every violation.
    #[error(transparent)]
    Invalid(#[from] ValidationReport),
}

/// Holder of the active configuration snapshot.
///
/// Starts from `Snapshot::empty()`, so before the first successful load
/// every bot resolves to nothing and is refused.
pub struct Registry {
    active: ArcSwap<Snapshot>,
    installs: AtomicU64,

    /// Serializes reload cycles; readers never touch this.
    reload_gate: tokio::sync::Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            active: ArcSwap::from_pointee(Snapshot::empty()),
            installs: AtomicU64::new(0),
            reload_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// The current snapshot. The returned `Arc` stays valid for as long as
    /// the caller holds it, across any number of installs.
    pub fn current(&self) -> Arc<Snapshot> {
        self.active.load_full()
    }

    /// Install a validated snapshot as the active one.
    ///
    /// Single atomic pointer swap; returns the monotonic install version.
    pub fn install(&self, mut snapshot: Snapshot) -> u64 {
        let version = self.installs.fetch_add(1, Ordering::Relaxed) + 1;
        snapshot.version = version;

        let group_count = snapshot.groups().len();
        let bot_count = snapshot.known_bot_count();
        self.active.store(Arc::new(snapshot));

        info!(
            version,
            group_count, bot_count, "Installed configuration snapshot"
        );
        version
    }

    /// Run one load -> validate -> install cycle.
    ///
    /// Cycles are serialized; concurrent callers queue. On failure the
    /// previous snapshot remains active and every violation is logged.
    pub async fn refresh(&self, source: &dyn ConfigSource) -> Result<u64, ReloadError> {
        let _gate = self.reload_gate.lock().await;

        let raw = source.fetch().await.map_err(ReloadError::Fetch)?;

        match validate(&raw) {
            Ok(snapshot) => Ok(self.install(snapshot)),
            Err(report) => {
                for violation in report.errors() {
                    warn!(%violation, "Configuration violation");
                }
                warn!(
                    violation_count = report.len(),
                    active_version = self.current().version(),
                    "Rejected configuration; previous snapshot stays active"
                );
                Err(ReloadError::Invalid(report))
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Background worker that refreshes the registry on a fixed interval.
pub struct ReloadWorker {
    registry: Arc<Registry>,
    source: Arc<dyn ConfigSource>,
    interval: Duration,
}

impl ReloadWorker {
    pub fn new(registry: Arc<Registry>, source: Arc<dyn ConfigSource>, interval: Duration) -> Self {
        Self {
            registry,
            source,
            interval,
        }
    }

    /// Run until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting config reload worker"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.registry.refresh(self.source.as_ref()).await {
                        error!(error = %e, "Config reload failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Config reload worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BotAuth, BotGroup};

    struct StaticSource(FleetConfig);

    #[async_trait]
    impl ConfigSource for StaticSource {
        async fn fetch(&self) -> anyhow::Result<FleetConfig> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ConfigSource for FailingSource {
        async fn fetch(&self) -> anyhow::Result<FleetConfig> {
            anyhow::bail!("config backend unavailable")
        }
    }

    fn config_with_bot(bot_id: &str) -> FleetConfig {
        FleetConfig {
            trusted_dimensions: Vec::new(),
            bot_group: vec![BotGroup {
                bot_id: vec![bot_id.to_string()],
                auth: Some(BotAuth {
                    require_luci_machine_token: true,
                    ..BotAuth::default()
                }),
                ..BotGroup::default()
            }],
        }
    }

    fn invalid_config() -> FleetConfig {
        FleetConfig {
            trusted_dimensions: Vec::new(),
            bot_group: vec![BotGroup {
                bot_id: vec!["bot1".to_string()],
                auth: None,
                ..BotGroup::default()
            }],
        }
    }

    #[tokio::test]
    async fn test_starts_empty_and_refuses() {
        let registry = Registry::new();
        assert_eq!(registry.current().version(), 0);
        assert!(registry.current().resolve_bot_group("bot1").is_none());
    }

    #[tokio::test]
    async fn test_refresh_installs_snapshot() {
        let registry = Registry::new();
        let source = StaticSource(config_with_bot("bot1"));

        let version = registry.refresh(&source).await.unwrap();
        assert_eq!(version, 1);

        let snapshot = registry.current();
        assert_eq!(snapshot.version(), 1);
        assert!(snapshot.resolve_bot_group("bot1").is_some());
    }

    #[tokio::test]
    async fn test_failed_validation_keeps_previous_snapshot() {
        let registry = Registry::new();
        registry
            .refresh(&StaticSource(config_with_bot("bot1")))
            .await
            .unwrap();

        let err = registry.refresh(&StaticSource(invalid_config())).await;
        assert!(matches!(err, Err(ReloadError::Invalid(_))));

        // Last good snapshot stays authoritative.
        let snapshot = registry.current();
        assert_eq!(snapshot.version(), 1);
        assert!(snapshot.resolve_bot_group("bot1").is_some());
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_snapshot() {
        let registry = Registry::new();
        registry
            .refresh(&StaticSource(config_with_bot("bot1")))
            .await
            .unwrap();

        let err = registry.refresh(&FailingSource).await;
        assert!(matches!(err, Err(ReloadError::Fetch(_))));
        assert_eq!(registry.current().version(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_reader_keeps_its_snapshot() {
        let registry = Registry::new();
        registry
            .refresh(&StaticSource(config_with_bot("bot1")))
            .await
            .unwrap();

        // A resolution in flight holds snapshot v1...
        let in_flight = registry.current();

        // ...while v2 replaces bot1 with bot2.
        registry
            .refresh(&StaticSource(config_with_bot("bot2")))
            .await
            .unwrap();

        assert!(in_flight.resolve_bot_group("bot1").is_some());
        assert!(in_flight.resolve_bot_group("bot2").is_none());

        let fresh = registry.current();
        assert_eq!(fresh.version(), 2);
        assert!(fresh.resolve_bot_group("bot1").is_none());
        assert!(fresh.resolve_bot_group("bot2").is_some());
    }

    #[tokio::test]
    async fn test_reload_worker_runs_until_shutdown() {
        let registry = Arc::new(Registry::new());
        let source: Arc<dyn ConfigSource> = Arc::new(StaticSource(config_with_bot("bot1")));
        let worker = ReloadWorker::new(registry.clone(), source, Duration::from_millis(10));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(registry.current().version() >= 1);
        assert!(registry.current().resolve_bot_group("bot1").is_some());
    }
}
