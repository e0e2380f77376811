//! Collaborator interfaces: the metric backend and the scale subresource.
//!
//! The controller calls these outside the engine; the engine itself only
//! consumes the values they return. In-memory implementations back the
//! simulator and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use hpa_core::{AutoscaleError, AutoscaleResult, MetricReading, MetricSpec};

/// Resolves one metric of one autoscaler to a current value and target.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn get_metric(
        &self,
        autoscaler: &str,
        metric: &MetricSpec,
        current_replicas: u32,
    ) -> AutoscaleResult<MetricReading>;
}

/// Reads and writes the replica count of an autoscaler's scale target.
#[async_trait]
pub trait ScaleClient: Send + Sync {
    async fn get_replicas(&self, autoscaler: &str) -> AutoscaleResult<u32>;

    async fn set_replicas(&self, autoscaler: &str, replicas: u32) -> AutoscaleResult<()>;
}

// ── In-memory metrics ──────────────────────────────────────────────

/// Metric values set by hand, keyed by (autoscaler, metric name).
///
/// A metric with no value, or one marked unavailable, fails with
/// `MetricUnavailable`.
#[derive(Default)]
pub struct InMemoryMetrics {
    values: RwLock<HashMap<(String, String), Option<f64>>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, autoscaler: &str, metric: &str, value: f64) {
        self.values
            .write()
            .await
            .insert((autoscaler.to_string(), metric.to_string()), Some(value));
    }

    pub async fn set_unavailable(&self, autoscaler: &str, metric: &str) {
        self.values
            .write()
            .await
            .insert((autoscaler.to_string(), metric.to_string()), None);
    }
}

#[async_trait]
impl MetricSource for InMemoryMetrics {
    async fn get_metric(
        &self,
        autoscaler: &str,
        metric: &MetricSpec,
        _current_replicas: u32,
    ) -> AutoscaleResult<MetricReading> {
        let name = metric.name();
        let values = self.values.read().await;
        match values.get(&(autoscaler.to_string(), name.clone())) {
            Some(Some(value)) => Ok(MetricReading::new(*value, metric.target().value())),
            Some(None) => Err(AutoscaleError::metric_unavailable(name, "marked unavailable")),
            None => Err(AutoscaleError::metric_unavailable(name, "no samples")),
        }
    }
}

// ── In-memory scale targets ────────────────────────────────────────

/// Replica counts held in memory, with injectable write failures.
#[derive(Default)]
pub struct InMemoryScale {
    replicas: RwLock<HashMap<String, u32>>,
    failing_sets: AtomicU32,
    set_calls: AtomicU64,
}

impl InMemoryScale {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, autoscaler: &str, replicas: u32) {
        self.replicas
            .write()
            .await
            .insert(autoscaler.to_string(), replicas);
    }

    pub async fn replicas(&self, autoscaler: &str) -> Option<u32> {
        self.replicas.read().await.get(autoscaler).copied()
    }

    /// Make the next `n` calls to `set_replicas` fail.
    pub fn fail_next_sets(&self, n: u32) {
        self.failing_sets.store(n, Ordering::SeqCst);
    }

    /// Total `set_replicas` calls, failed ones included.
    pub fn set_calls(&self) -> u64 {
        self.set_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScaleClient for InMemoryScale {
    async fn get_replicas(&self, autoscaler: &str) -> AutoscaleResult<u32> {
        self.replicas(autoscaler)
            .await
            .ok_or_else(|| AutoscaleError::ScaleReadFailed {
                target: autoscaler.to_string(),
                reason: "no such scale target".to_string(),
            })
    }

    async fn set_replicas(&self, autoscaler: &str, replicas: u32) -> AutoscaleResult<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failing_sets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AutoscaleError::ApplyFailed {
                target: autoscaler.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let mut all = self.replicas.write().await;
        let Some(current) = all.get_mut(autoscaler) else {
            return Err(AutoscaleError::ApplyFailed {
                target: autoscaler.to_string(),
                reason: "no such scale target".to_string(),
            });
        };
        debug!(%autoscaler, from = *current, to = replicas, "replicas set");
        *current = replicas;
        Ok(())
    }
}
