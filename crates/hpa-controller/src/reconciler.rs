//! Reconciler: one autoscaler, one tick.
//!
//! Fetches replicas and metrics through the collaborators, runs the
//! autoscaler's [`DecisionEngine`], applies a change if there is one, and
//! persists the status surface. Engine state lives here, one entry per
//! autoscaler key; it is created on first reconciliation and dropped when
//! the autoscaler disappears from the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use hpa_core::*;
use hpa_engine::{DecisionEngine, MetricSample};
use hpa_state::{StateError, StateStore};

use crate::clock::Clock;
use crate::source::{MetricSource, ScaleClient};

/// Default timeout for a single call to a collaborator.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// What a successful reconciliation did.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The replica count was changed and recorded.
    Scaled { from: u32, to: u32, decision: Decision },
    /// No change was needed.
    Unchanged(Decision),
    /// The autoscaler no longer exists; its engine state was discarded.
    Deleted,
}

pub struct Reconciler {
    store: StateStore,
    metrics: Arc<dyn MetricSource>,
    scale: Arc<dyn ScaleClient>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
    /// Per-autoscaler engine state: key → engine.
    engines: RwLock<HashMap<AutoscalerKey, Arc<Mutex<DecisionEngine>>>>,
}

impl Reconciler {
    pub fn new(
        store: StateStore,
        metrics: Arc<dyn MetricSource>,
        scale: Arc<dyn ScaleClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            metrics,
            scale,
            clock,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Set the timeout applied to each metric fetch and scale call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Number of autoscalers with live engine state.
    pub async fn tracked(&self) -> usize {
        self.engines.read().await.len()
    }

    /// A copy of one autoscaler's engine state, if it has any.
    pub async fn engine_snapshot(&self, key: &str) -> Option<DecisionEngine> {
        let engine = self.engines.read().await.get(key).cloned()?;
        let snapshot = engine.lock().await.clone();
        Some(snapshot)
    }

    async fn engine(&self, key: &str) -> Arc<Mutex<DecisionEngine>> {
        if let Some(engine) = self.engines.read().await.get(key) {
            return Arc::clone(engine);
        }
        let mut engines = self.engines.write().await;
        Arc::clone(
            engines
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(DecisionEngine::new()))),
        )
    }

    /// Reconcile one autoscaler at the clock's current time.
    ///
    /// Errors are also written to the status conditions before being
    /// returned, so the caller only decides whether to retry.
    pub async fn reconcile(&self, key: &str) -> AutoscaleResult<ReconcileOutcome> {
        let Some(spec) = self.store.get_autoscaler(key)? else {
            if self.engines.write().await.remove(key).is_some() {
                info!(autoscaler = %key, "autoscaler deleted, engine state discarded");
            }
            return Ok(ReconcileOutcome::Deleted);
        };

        let now = self.clock.now();
        let mut status = self.store.get_status(key)?.unwrap_or_default();
        status.observed_generation = spec.generation;

        let result = self.reconcile_spec(&spec, now, &mut status).await;
        if let Err(e) = &result {
            record_error(&mut status, e, now);
        }

        match self.store.put_status(key, &status) {
            Ok(()) => {}
            Err(StateError::NotFound(_)) => {
                debug!(autoscaler = %key, "autoscaler deleted during reconcile");
            }
            Err(e) => return Err(e.into()),
        }
        result
    }

    async fn reconcile_spec(
        &self,
        spec: &AutoscalerSpec,
        now: u64,
        status: &mut AutoscalerStatus,
    ) -> AutoscaleResult<ReconcileOutcome> {
        let key = spec.key();

        let current = self
            .with_timeout(self.scale.get_replicas(&key), |reason| {
                AutoscaleError::ScaleReadFailed {
                    target: key.clone(),
                    reason,
                }
            })
            .await?;
        status.current_replicas = current;
        status.desired_replicas = current;

        let mut samples = Vec::with_capacity(spec.metrics.len());
        for metric in &spec.metrics {
            let name = metric.name();
            let reading = self
                .with_timeout(self.metrics.get_metric(&key, metric, current), |reason| {
                    AutoscaleError::metric_unavailable(&name, reason)
                })
                .await;
            if let Err(e) = &reading {
                warn!(autoscaler = %key, metric = %name, error = %e, "metric fetch failed");
            }
            samples.push(MetricSample { name, reading });
        }

        let engine = self.engine(&key).await;
        let mut engine = engine.lock().await;
        let evaluation = engine.decide(spec, current, &samples, now)?;
        let decision = evaluation.decision;
        status.current_metrics = evaluation.metrics;

        if !decision.is_change() {
            status.desired_replicas = decision.desired_replicas;
            record_decision(status, &decision, false, now);
            return Ok(ReconcileOutcome::Unchanged(decision));
        }

        let target = decision.desired_replicas;
        self.with_timeout(self.scale.set_replicas(&key, target), |reason| {
            AutoscaleError::ApplyFailed {
                target: key.clone(),
                reason,
            }
        })
        .await?;

        engine.confirm(&decision);
        info!(
            autoscaler = %key,
            from = current,
            to = target,
            reason = ?decision.reason,
            "scaled"
        );

        status.current_replicas = target;
        status.desired_replicas = target;
        status.last_scale_time = Some(now);
        record_decision(status, &decision, true, now);

        Ok(ReconcileOutcome::Scaled {
            from: current,
            to: target,
            decision,
        })
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = AutoscaleResult<T>>,
        on_timeout: impl FnOnce(String) -> AutoscaleError,
    ) -> AutoscaleResult<T> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(format!("timed out after {:?}", self.call_timeout))),
        }
    }
}

fn record_decision(status: &mut AutoscalerStatus, decision: &Decision, scaled: bool, now: u64) {
    use ConditionStatus::{False, True};

    if decision.paused {
        status.set_condition(
            ConditionType::ScalingActive,
            False,
            "ScalingDisabled",
            "scale target has zero replicas",
            now,
        );
        return;
    }

    let able_reason = if scaled {
        "SucceededRescale"
    } else {
        match decision.reason {
            DecisionReason::ScaleDownStabilized => "ScaleDownStabilized",
            DecisionReason::ScaleUpStabilized => "ScaleUpStabilized",
            _ => "ReadyForNewScale",
        }
    };
    status.set_condition(
        ConditionType::AbleToScale,
        True,
        able_reason,
        format!(
            "recommended {} replicas",
            decision.stabilized_recommendation.unwrap_or(decision.desired_replicas)
        ),
        now,
    );

    let active_message = if decision.reason == DecisionReason::PartialMetrics {
        "some metrics unavailable; scale-down suppressed"
    } else {
        "computed replicas from metrics"
    };
    status.set_condition(
        ConditionType::ScalingActive,
        True,
        "ValidMetricFound",
        active_message,
        now,
    );

    let limited = match decision.reason {
        DecisionReason::TooFewReplicas => Some("TooFewReplicas"),
        DecisionReason::TooManyReplicas => Some("TooManyReplicas"),
        DecisionReason::ScaleUpLimited => Some("ScaleUpLimit"),
        DecisionReason::ScaleDownLimited => Some("ScaleDownLimit"),
        DecisionReason::ScaleUpDisabled => Some("ScaleUpDisabled"),
        DecisionReason::ScaleDownDisabled => Some("ScaleDownDisabled"),
        _ => None,
    };
    match limited {
        Some(reason) => status.set_condition(
            ConditionType::ScalingLimited,
            True,
            reason,
            format!("desired replicas bounded to {}", decision.desired_replicas),
            now,
        ),
        None => status.set_condition(
            ConditionType::ScalingLimited,
            False,
            "DesiredWithinRange",
            "desired count is within the acceptable range",
            now,
        ),
    }
}

fn record_error(status: &mut AutoscalerStatus, error: &AutoscaleError, now: u64) {
    let (condition, reason) = match error {
        AutoscaleError::MetricUnavailable { .. } => {
            (ConditionType::ScalingActive, "FailedGetMetrics")
        }
        AutoscaleError::InvalidSpec(_) => (ConditionType::ScalingActive, "InvalidSpec"),
        AutoscaleError::ScaleReadFailed { .. } => (ConditionType::AbleToScale, "FailedGetScale"),
        AutoscaleError::ApplyFailed { .. } => (ConditionType::AbleToScale, "FailedUpdateScale"),
        AutoscaleError::StaleTick { .. } | AutoscaleError::State(_) => return,
    };
    status.set_condition(
        condition,
        ConditionStatus::False,
        reason,
        format!("{}: {error}", error.class()),
        now,
    );
}
