//! Metrics and health checks.
//!
//! Metric namespace: `wireable.pool.*`.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Readiness status reported by `status` and the runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadinessStatus {
    /// Overall ready state.
    pub ready: bool,
    /// Individual component status.
    pub components: ComponentStatus,
}

/// Component readiness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// Store reachable and opened.
    pub store: bool,
    /// Availability heap built from the store.
    pub heap: bool,
    /// Watch loop running.
    pub watcher: bool,
}

impl ComponentStatus {
    pub fn all_ready(&self) -> bool {
        self.store && self.heap && self.watcher
    }
}

/// Health check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall healthy state.
    pub healthy: bool,
    /// Status message.
    pub message: String,
}

impl HealthStatus {
    /// Create a healthy status.
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            message: "OK".to_string(),
        }
    }

    /// Create an unhealthy status.
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: message.into(),
        }
    }
}

/// Metric names.
pub mod metrics {
    /// Successful allocations.
    pub const ALLOCATIONS_TOTAL: &str = "wireable.pool.allocations_total";
    /// Allocations that lost a race.
    pub const CONFLICTS_TOTAL: &str = "wireable.pool.conflicts_total";
    /// Allocations that found the heap empty.
    pub const EXHAUSTED_TOTAL: &str = "wireable.pool.exhausted_total";
    /// Store failures, deadlines and cancellations seen by the coordinator.
    pub const STORE_ERRORS_TOTAL: &str = "wireable.pool.store_errors_total";
    /// Successful releases.
    pub const RELEASES_TOTAL: &str = "wireable.pool.releases_total";
    /// Watch events applied to the heap.
    pub const WATCH_EVENTS_TOTAL: &str = "wireable.pool.watch_events_total";
    /// Keys in the available namespace that did not decode.
    pub const MALFORMED_KEYS_TOTAL: &str = "wireable.pool.malformed_keys_total";
    /// Addresses currently cached in the heap.
    pub const HEAP_SIZE: &str = "wireable.pool.heap_size";
    /// AvailabilityRecords in the store.
    pub const STORE_AVAILABLE: &str = "wireable.pool.store_available";
    /// TakenRecords in the store.
    pub const STORE_TAKEN: &str = "wireable.pool.store_taken";
    /// Store round-trip latency of allocate, in milliseconds.
    pub const ALLOCATE_LATENCY_MS: &str = "wireable.pool.allocate_latency_ms";
}

/// Metrics registry.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, AtomicU64>>,
    gauges: RwLock<BTreeMap<String, AtomicU64>>,
    /// Histogram observations (count and sum only).
    histograms: RwLock<BTreeMap<String, HistogramData>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter.
    pub fn counter_inc(&self, name: &str) {
        self.counter_add(name, 1);
    }

    /// Add to a counter.
    pub fn counter_add(&self, name: &str, value: u64) {
        if let Some(counter) = self.counters.read().get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Get counter value.
    pub fn counter_get(&self, name: &str) -> u64 {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Set a gauge value.
    pub fn gauge_set(&self, name: &str, value: u64) {
        if let Some(gauge) = self.gauges.read().get(name) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }
        self.gauges
            .write()
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .store(value, Ordering::Relaxed);
    }

    /// Get gauge value.
    pub fn gauge_get(&self, name: &str) -> u64 {
        self.gauges
            .read()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Record a histogram observation.
    pub fn histogram_observe(&self, name: &str, value: f64) {
        if let Some(data) = self.histograms.read().get(name) {
            data.observe(value);
            return;
        }
        self.histograms
            .write()
            .entry(name.to_string())
            .or_insert_with(HistogramData::default)
            .observe(value);
    }

    /// Get histogram data.
    pub fn histogram_get(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.read().get(name).map(|h| h.snapshot())
    }

    /// Export metrics in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        for (name, value) in self.counters.read().iter() {
            let prometheus_name = name.replace('.', "_");
            output.push_str(&format!(
                "# TYPE {} counter\n{} {}\n",
                prometheus_name,
                prometheus_name,
                value.load(Ordering::Relaxed)
            ));
        }

        for (name, value) in self.gauges.read().iter() {
            let prometheus_name = name.replace('.', "_");
            output.push_str(&format!(
                "# TYPE {} gauge\n{} {}\n",
                prometheus_name,
                prometheus_name,
                value.load(Ordering::Relaxed)
            ));
        }

        for (name, data) in self.histograms.read().iter() {
            let prometheus_name = name.replace('.', "_");
            let snapshot = data.snapshot();
            output.push_str(&format!(
                "# TYPE {} histogram\n{}_count {}\n{}_sum {}\n",
                prometheus_name, prometheus_name, snapshot.count, prometheus_name, snapshot.sum
            ));
        }

        output
    }
}

#[derive(Debug, Default)]
struct HistogramData {
    count: AtomicU64,
    sum: Mutex<f64>,
}

impl HistogramData {
    fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        *self.sum.lock() += value;
    }

    fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum: *self.sum.lock(),
        }
    }
}

/// Histogram snapshot.
#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    /// Number of observations.
    pub count: u64,
    /// Sum of all observations.
    pub sum: f64,
}

impl HistogramSnapshot {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Pool metrics collector.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    registry: MetricsRegistry,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the underlying registry.
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    pub fn record_allocation(&self, latency_ms: f64) {
        self.registry.counter_inc(metrics::ALLOCATIONS_TOTAL);
        self.registry
            .histogram_observe(metrics::ALLOCATE_LATENCY_MS, latency_ms);
    }

    pub fn record_conflict(&self) {
        self.registry.counter_inc(metrics::CONFLICTS_TOTAL);
    }

    pub fn record_exhausted(&self) {
        self.registry.counter_inc(metrics::EXHAUSTED_TOTAL);
    }

    /// Record a store failure, labelled by error kind.
    pub fn record_store_error(&self, kind: &str) {
        self.registry.counter_inc(metrics::STORE_ERRORS_TOTAL);
        self.registry
            .counter_inc(&format!("{}.{}", metrics::STORE_ERRORS_TOTAL, kind));
    }

    pub fn record_release(&self) {
        self.registry.counter_inc(metrics::RELEASES_TOTAL);
    }

    pub fn record_watch_event(&self) {
        self.registry.counter_inc(metrics::WATCH_EVENTS_TOTAL);
    }

    pub fn record_malformed_key(&self) {
        self.registry.counter_inc(metrics::MALFORMED_KEYS_TOTAL);
    }

    pub fn set_heap_size(&self, size: usize) {
        self.registry
            .gauge_set(metrics::HEAP_SIZE, u64::try_from(size).unwrap_or(u64::MAX));
    }

    /// Record counts as read from the store.
    pub fn set_store_usage(&self, available: usize, taken: usize) {
        self.registry
            .gauge_set(metrics::STORE_AVAILABLE, u64::try_from(available).unwrap_or(u64::MAX));
        self.registry
            .gauge_set(metrics::STORE_TAKEN, u64::try_from(taken).unwrap_or(u64::MAX));
    }

    /// Export all metrics.
    pub fn export(&self) -> String {
        self.registry.export_prometheus()
    }
}

/// Readiness probe.
#[derive(Debug, Default)]
pub struct ReadinessProbe {
    status: RwLock<ReadinessStatus>,
}

impl ReadinessProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current readiness status.
    pub fn status(&self) -> ReadinessStatus {
        self.status.read().clone()
    }

    /// Mark as ready.
    pub fn set_ready(&self, ready: bool) {
        self.status.write().ready = ready;
    }

    /// Update component status. Readiness follows the components.
    pub fn set_component_status(&self, components: ComponentStatus) {
        let mut status = self.status.write();
        status.ready = components.all_ready();
        status.components = components;
    }

    /// Flip a single component.
    pub fn update_component(&self, update: impl FnOnce(&mut ComponentStatus)) {
        let mut status = self.status.write();
        update(&mut status.components);
        status.ready = status.components.all_ready();
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.status.read().ready
    }
}

/// Health probe.
#[derive(Debug)]
pub struct HealthProbe {
    status: RwLock<HealthStatus>,
}

impl HealthProbe {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(HealthStatus::healthy()),
        }
    }

    /// Get current health status.
    pub fn status(&self) -> HealthStatus {
        self.status.read().clone()
    }

    /// Mark as healthy.
    pub fn set_healthy(&self) {
        *self.status.write() = HealthStatus::healthy();
    }

    /// Mark as unhealthy.
    pub fn set_unhealthy(&self, message: impl Into<String>) {
        *self.status.write() = HealthStatus::unhealthy(message);
    }

    /// Check if healthy.
    pub fn is_healthy(&self) -> bool {
        self.status.read().healthy
    }
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self::new()
    }
}
