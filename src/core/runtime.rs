//! Main runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: store → seed → watch subscription → heap load → watcher
//! - Shutdown order: watcher → store flush
//!
//! The watch subscription is opened before the heap is loaded. A Put or
//! Delete committed between the two is then seen by both, and the heap
//! operations are idempotent, so nothing committed during startup is missed.

use crate::core::config::Config;
use crate::ops::observability::{HealthProbe, PoolMetrics, ReadinessProbe};
use crate::pool::{
    load_available, seed_pool, AllocationCoordinator, AvailabilityHeap, OpContext, PoolWatcher,
    SeedReport, WatcherHandle,
};
use crate::store::journal::JournalOptions;
use crate::store::{MemoryPoolStore, PoolStore};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Open the store selected by `store.mode`.
pub async fn open_store(config: &Config) -> Result<Arc<dyn PoolStore>> {
    match config.store.mode.as_str() {
        "embedded" => {
            std::fs::create_dir_all(&config.paths.storage_dir).with_context(|| {
                format!(
                    "failed to create storage directory: {}",
                    config.paths.storage_dir
                )
            })?;
            let options = JournalOptions {
                sync: config.store.sync_writes,
                compact_every: config.store.compact_every,
            };
            let store = MemoryPoolStore::open_with_options(
                config.snapshot_path(),
                config.store.watch_buffer,
                options,
            )
            .context("failed to open embedded store")?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "grpc")]
        "etcd" => {
            use crate::store::etcd::{EtcdOptions, EtcdPoolStore};

            let store = EtcdPoolStore::connect(EtcdOptions {
                endpoints: config.store.endpoints.clone(),
                dial_timeout: config.dial_timeout(),
                request_timeout: config.request_timeout(),
                watch_buffer: config.store.watch_buffer,
            })
            .await
            .context("failed to connect to etcd")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "grpc"))]
        "etcd" => anyhow::bail!("etcd store requires the 'grpc' feature"),
        other => anyhow::bail!("unknown store mode: {}", other),
    }
}

/// Wireable runtime holding the pool components.
pub struct PoolRuntime {
    config: Arc<Config>,
    store: Arc<dyn PoolStore>,
    coordinator: Arc<AllocationCoordinator>,
    watcher: Option<WatcherHandle>,
    seed_report: Option<SeedReport>,
    metrics: Arc<PoolMetrics>,
    health: Arc<HealthProbe>,
    readiness: Arc<ReadinessProbe>,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl PoolRuntime {
    /// Open the configured store and start the pool.
    pub async fn start(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let store = open_store(&config).await?;
        Self::start_with_store(config, store).await
    }

    /// Start the pool on an already opened store.
    pub async fn start_with_store(config: Config, store: Arc<dyn PoolStore>) -> Result<Self> {
        let space = config.address_space()?;
        let keys = config.pool_keys();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = OpContext::with_timeout(config.request_timeout()).with_cancel(shutdown_rx.clone());

        let metrics = Arc::new(PoolMetrics::new());
        let health = Arc::new(HealthProbe::new());
        let readiness = Arc::new(ReadinessProbe::new());

        tracing::info!(
            cidr = %space,
            namespace = %config.pool.namespace,
            store = store.name(),
            "starting Wireable runtime"
        );
        readiness.update_component(|c| c.store = true);

        let seed_report = if config.pool.seed_on_start {
            Some(
                seed_pool(
                    store.as_ref(),
                    &space,
                    &keys,
                    config.pool.max_seed_addresses,
                    &ctx,
                )
                .await
                .context("failed to seed address pool")?,
            )
        } else {
            None
        };

        let stream = store
            .watch_prefix(keys.available_prefix())
            .await
            .context("failed to subscribe to availability changes")?;

        let available = load_available(store.as_ref(), &keys, &ctx)
            .await
            .context("failed to load available addresses")?;
        let heap = Arc::new(AvailabilityHeap::from_addresses(available));
        metrics.set_heap_size(heap.len());
        readiness.update_component(|c| c.heap = true);
        tracing::info!(available = heap.len(), "availability heap loaded");

        let watcher = PoolWatcher::new(heap.clone(), keys.clone())
            .with_observability(metrics.clone(), health.clone(), readiness.clone())
            .spawn(stream, shutdown_rx.clone());

        let coordinator = Arc::new(
            AllocationCoordinator::new(store.clone(), heap, keys).with_metrics(metrics.clone()),
        );

        tracing::info!("Wireable runtime started");
        Ok(Self {
            config: Arc::new(config),
            store,
            coordinator,
            watcher: Some(watcher),
            seed_report,
            metrics,
            health,
            readiness,
            running: Arc::new(AtomicBool::new(true)),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PoolStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<AllocationCoordinator> {
        &self.coordinator
    }

    pub fn metrics(&self) -> &Arc<PoolMetrics> {
        &self.metrics
    }

    pub fn health(&self) -> &Arc<HealthProbe> {
        &self.health
    }

    pub fn readiness(&self) -> &Arc<ReadinessProbe> {
        &self.readiness
    }

    /// Report of the startup seeding pass, if one ran.
    pub fn seed_report(&self) -> Option<SeedReport> {
        self.seed_report
    }

    /// Context for pool operations: configured deadline, cancelled on shutdown.
    pub fn op_context(&self) -> OpContext {
        OpContext::with_timeout(self.config.request_timeout()).with_cancel(self.shutdown_rx.clone())
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Ask [`run`](Self::run) to return.
    pub fn request_shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Run until Ctrl-C, a shutdown request, or watcher failure.
    pub async fn run(&mut self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let failure = match self.watcher.as_mut() {
            Some(watcher) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::warn!("shutdown signal received (SIGINT)");
                        None
                    }
                    _ = async {
                        while !*shutdown_rx.borrow() {
                            if shutdown_rx.changed().await.is_err() {
                                break;
                            }
                        }
                    } => {
                        tracing::info!("shutdown requested by component");
                        None
                    }
                    result = watcher.join() => result.err(),
                }
            }
            None => None,
        };

        self.shutdown().await?;
        match failure {
            Some(err) => {
                tracing::error!(error = %err, "availability watcher failed");
                Err(anyhow::Error::new(err).context("runtime stopped after watcher failure"))
            }
            None => Ok(()),
        }
    }

    /// Stop the watcher and flush the store.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!("stopping Wireable runtime");
        let _ = self.shutdown_tx.send(true);

        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.join().await {
                tracing::warn!(error = %e, "watcher stopped with error");
            }
        }
        self.readiness.set_ready(false);

        self.store
            .flush()
            .await
            .context("failed to flush store")?;

        tracing::info!("Wireable runtime stopped");
        Ok(())
    }
}

impl std::fmt::Debug for PoolRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRuntime")
            .field("store", &self.store.name())
            .field("running", &self.is_running())
            .field("heap_size", &self.coordinator.heap().len())
            .finish()
    }
}
