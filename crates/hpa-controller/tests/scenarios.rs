//! Multi-tick autoscaling scenarios driven through the reconciler.
//!
//! Each test feeds a fixed total demand; per-pod utilization is the demand
//! spread over the replicas the target currently runs, so scaling moves
//! the observed metric the way a real workload would.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use hpa_controller::{Clock, InMemoryScale, ManualClock, MetricSource, ReconcileOutcome, Reconciler};
use hpa_core::*;
use hpa_state::StateStore;

const KEY: &str = "default/web";
const TICK: u64 = 15;

/// Total demand per metric name; `None` means the backend is down.
#[derive(Default)]
struct Demand {
    totals: RwLock<HashMap<String, Option<f64>>>,
}

impl Demand {
    async fn set(&self, metric: &str, total: f64) {
        self.totals
            .write()
            .await
            .insert(metric.to_string(), Some(total));
    }

    async fn outage(&self, metric: &str) {
        self.totals.write().await.insert(metric.to_string(), None);
    }
}

#[async_trait]
impl MetricSource for Demand {
    async fn get_metric(
        &self,
        _autoscaler: &str,
        metric: &MetricSpec,
        current_replicas: u32,
    ) -> AutoscaleResult<MetricReading> {
        let name = metric.name();
        match self.totals.read().await.get(&name) {
            Some(Some(total)) => Ok(MetricReading::new(
                total / current_replicas.max(1) as f64,
                metric.target().value(),
            )),
            _ => Err(AutoscaleError::metric_unavailable(name, "backend unreachable")),
        }
    }
}

struct Sim {
    reconciler: Reconciler,
    demand: Arc<Demand>,
    scale: Arc<InMemoryScale>,
    clock: ManualClock,
}

impl Sim {
    async fn new(spec: AutoscalerSpec, initial_replicas: u32) -> Self {
        let spec = hpa_core::admission::admit(spec, &FeatureGates::default()).unwrap();
        let store = StateStore::open_in_memory().unwrap();
        store.put_autoscaler(&spec).unwrap();

        let demand = Arc::new(Demand::default());
        let scale = Arc::new(InMemoryScale::new());
        scale.insert(KEY, initial_replicas).await;
        let clock = ManualClock::new(0);
        let reconciler = Reconciler::new(
            store,
            demand.clone(),
            scale.clone(),
            Arc::new(clock.clone()),
        );
        Self {
            reconciler,
            demand,
            scale,
            clock,
        }
    }

    /// Reconcile at the current time, then advance one tick.
    async fn tick(&self) -> AutoscaleResult<ReconcileOutcome> {
        let outcome = self.reconciler.reconcile(KEY).await;
        self.clock.advance(TICK);
        outcome
    }

    /// Tick until `until` (exclusive), returning the replica count after each tick.
    async fn run_until(&self, until: u64) -> Vec<(u64, u32)> {
        let mut trajectory = Vec::new();
        while self.clock.now() < until {
            let at = self.clock.now();
            self.tick().await.unwrap();
            trajectory.push((at, self.replicas().await));
        }
        trajectory
    }

    async fn replicas(&self) -> u32 {
        self.scale.replicas(KEY).await.unwrap()
    }

    fn status(&self) -> AutoscalerStatus {
        self.reconciler.store().get_status(KEY).unwrap().unwrap()
    }
}

fn cpu_spec(target: u32, min: u32, max: u32, behavior: Behavior) -> AutoscalerSpec {
    AutoscalerSpec {
        namespace: "default".to_string(),
        name: "web".to_string(),
        min_replicas: min,
        max_replicas: max,
        tolerance: DEFAULT_TOLERANCE,
        metrics: vec![MetricSpec::Resource {
            name: "cpu".to_string(),
            target: MetricTarget::Utilization {
                average_utilization: target,
            },
        }],
        behavior,
        generation: 0,
    }
}

fn rules(window: u32, select: SelectPolicy, policies: Vec<ScalingPolicy>) -> Option<ScalingRules> {
    Some(ScalingRules {
        stabilization_window_secs: Some(window),
        select_policy: select,
        policies,
    })
}

fn at(trajectory: &[(u64, u32)], t: u64) -> u32 {
    trajectory
        .iter()
        .find(|(at, _)| *at == t)
        .map(|(_, r)| *r)
        .unwrap()
}

#[tokio::test]
async fn scale_up_one_pod_per_ninety_seconds() {
    let behavior = Behavior {
        scale_up: rules(0, SelectPolicy::Max, vec![ScalingPolicy::pods(1, 90)]),
        scale_down: None,
    };
    let sim = Sim::new(cpu_spec(50, 1, 10, behavior), 1).await;
    sim.demand.set("cpu", 150.0).await;

    let trajectory = sim.run_until(120).await;
    assert_eq!(at(&trajectory, 0), 2);
    for t in (15..90).step_by(TICK as usize) {
        assert_eq!(at(&trajectory, t), 2, "limited at t={t}");
    }
    assert_eq!(at(&trajectory, 90), 3);
    assert_eq!(at(&trajectory, 105), 3);

    // The first step aged out of every period and was pruned.
    let engine = sim.reconciler.engine_snapshot(KEY).await.unwrap();
    assert_eq!(engine.ledger().len(), 1);
    assert_eq!(engine.ledger().last().unwrap().timestamp, 90);
}

#[tokio::test]
async fn scale_up_limit_is_reported_in_status() {
    let behavior = Behavior {
        scale_up: rules(0, SelectPolicy::Max, vec![ScalingPolicy::pods(1, 90)]),
        scale_down: None,
    };
    let sim = Sim::new(cpu_spec(50, 1, 10, behavior), 1).await;
    sim.demand.set("cpu", 150.0).await;

    sim.tick().await.unwrap();
    let ReconcileOutcome::Unchanged(decision) = sim.tick().await.unwrap() else {
        panic!("second tick must be held by the rate limit");
    };
    assert_eq!(decision.reason, DecisionReason::ScaleUpLimited);
    assert_eq!(decision.stabilized_recommendation, Some(3));
    assert_eq!(decision.desired_replicas, 2);

    let limited = sim.status();
    let limited = limited.condition(ConditionType::ScalingLimited).unwrap();
    assert_eq!(limited.status, ConditionStatus::True);
    assert_eq!(limited.reason, "ScaleUpLimit");
}

#[tokio::test]
async fn scale_down_one_pod_per_hundred_fifty_seconds() {
    let behavior = Behavior {
        scale_up: None,
        scale_down: rules(0, SelectPolicy::Max, vec![ScalingPolicy::pods(1, 150)]),
    };
    let sim = Sim::new(cpu_spec(50, 1, 10, behavior), 5).await;
    sim.demand.set("cpu", 150.0).await;

    let trajectory = sim.run_until(195).await;
    assert_eq!(at(&trajectory, 0), 4);
    assert_eq!(at(&trajectory, 135), 4);
    assert_eq!(at(&trajectory, 150), 3);
    assert_eq!(at(&trajectory, 180), 3);
}

#[tokio::test]
async fn scale_down_waits_out_the_stabilization_window() {
    // Default scale-down behavior: 300s window.
    let sim = Sim::new(cpu_spec(50, 1, 10, Behavior::default()), 5).await;
    sim.demand.set("cpu", 250.0).await;
    sim.tick().await.unwrap();
    assert_eq!(sim.replicas().await, 5);

    sim.demand.set("cpu", 150.0).await;
    let trajectory = sim.run_until(330).await;
    assert_eq!(at(&trajectory, 15), 5);
    assert_eq!(at(&trajectory, 300), 5);
    assert_eq!(at(&trajectory, 315), 3);

    let able = sim.status();
    let able = able.condition(ConditionType::AbleToScale).unwrap();
    assert_eq!(able.reason, "SucceededRescale");
}

#[tokio::test]
async fn stabilized_scale_down_is_reported() {
    let sim = Sim::new(cpu_spec(50, 1, 10, Behavior::default()), 5).await;
    sim.demand.set("cpu", 250.0).await;
    sim.tick().await.unwrap();

    sim.demand.set("cpu", 150.0).await;
    let ReconcileOutcome::Unchanged(decision) = sim.tick().await.unwrap() else {
        panic!("scale-down must be held");
    };
    assert_eq!(decision.reason, DecisionReason::ScaleDownStabilized);
    assert_eq!(decision.raw_recommendation, Some(3));
    assert_eq!(
        sim.status()
            .condition(ConditionType::AbleToScale)
            .unwrap()
            .reason,
        "ScaleDownStabilized"
    );
}

#[tokio::test]
async fn percent_policy_bounds_each_period() {
    let behavior = Behavior {
        scale_up: rules(0, SelectPolicy::Max, vec![ScalingPolicy::percent(40, 60)]),
        scale_down: None,
    };
    let sim = Sim::new(cpu_spec(15, 1, 10, behavior), 3).await;
    sim.demand.set("cpu", 105.0).await;

    let trajectory = sim.run_until(90).await;
    // ceil(3 * 40%) = 2 pods, taken at once, then held for the period.
    assert_eq!(at(&trajectory, 0), 5);
    assert_eq!(at(&trajectory, 45), 5);
    assert_eq!(at(&trajectory, 60), 7);
    assert_eq!(at(&trajectory, 75), 7);

    let engine = sim.reconciler.engine_snapshot(KEY).await.unwrap();
    let last = engine.ledger().last().unwrap();
    assert_eq!((last.timestamp, last.from_replicas, last.to_replicas), (60, 5, 7));
}

#[tokio::test]
async fn disabled_direction_never_moves() {
    let behavior = Behavior {
        scale_up: None,
        scale_down: rules(0, SelectPolicy::Disabled, vec![ScalingPolicy::pods(1, 15)]),
    };
    let sim = Sim::new(cpu_spec(50, 1, 10, behavior), 4).await;
    sim.demand.set("cpu", 100.0).await;

    for _ in 0..5 {
        let ReconcileOutcome::Unchanged(decision) = sim.tick().await.unwrap() else {
            panic!("scale-down is disabled");
        };
        assert_eq!(decision.reason, DecisionReason::ScaleDownDisabled);
        assert_eq!(decision.stabilized_recommendation, Some(2));
    }
    assert_eq!(sim.replicas().await, 4);

    // The other direction is unaffected.
    sim.demand.set("cpu", 300.0).await;
    let outcome = sim.tick().await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Scaled { from: 4, to: 6, .. }));
}

#[tokio::test]
async fn metric_outage_holds_replicas() {
    let sim = Sim::new(cpu_spec(50, 1, 10, Behavior::default()), 3).await;
    sim.demand.set("cpu", 150.0).await;
    sim.tick().await.unwrap();
    assert_eq!(sim.replicas().await, 3);

    sim.demand.outage("cpu").await;
    for _ in 0..3 {
        let err = sim.tick().await.unwrap_err();
        assert!(matches!(err, AutoscaleError::MetricUnavailable { .. }));
        assert!(err.is_retryable());
    }
    assert_eq!(sim.replicas().await, 3);
    assert_eq!(sim.scale.set_calls(), 0);

    let status = sim.status();
    let active = status.condition(ConditionType::ScalingActive).unwrap();
    assert_eq!(active.status, ConditionStatus::False);
    assert_eq!(active.reason, "FailedGetMetrics");
    assert_eq!(active.last_transition_time, 15);

    // Recovery flips the condition back.
    sim.demand.set("cpu", 150.0).await;
    sim.tick().await.unwrap();
    let status = sim.status();
    let active = status.condition(ConditionType::ScalingActive).unwrap();
    assert_eq!(active.status, ConditionStatus::True);
    assert_eq!(active.last_transition_time, 60);
}

#[tokio::test]
async fn partial_metrics_never_scale_down() {
    let mut spec = cpu_spec(
        50,
        1,
        10,
        Behavior {
            scale_up: None,
            scale_down: rules(0, SelectPolicy::Max, vec![ScalingPolicy::percent(100, 15)]),
        },
    );
    spec.metrics.push(MetricSpec::Pods {
        metric: "requests_per_second".to_string(),
        target: MetricTarget::AverageValue { value: 10.0 },
    });
    let sim = Sim::new(spec, 4).await;
    sim.demand.set("cpu", 50.0).await;
    sim.demand.outage("requests_per_second").await;

    let ReconcileOutcome::Unchanged(decision) = sim.tick().await.unwrap() else {
        panic!("a partial view must not scale down");
    };
    assert_eq!(decision.reason, DecisionReason::PartialMetrics);
    assert_eq!(sim.replicas().await, 4);

    // A partial view may still scale up.
    sim.demand.set("cpu", 400.0).await;
    let outcome = sim.tick().await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Scaled { from: 4, to: 8, .. }));
}

#[tokio::test]
async fn failed_apply_leaves_no_event_and_next_tick_retries() {
    let sim = Sim::new(cpu_spec(50, 1, 10, Behavior::default()), 2).await;
    sim.demand.set("cpu", 200.0).await;
    sim.scale.fail_next_sets(1);

    let err = sim.tick().await.unwrap_err();
    assert!(matches!(err, AutoscaleError::ApplyFailed { .. }));
    let engine = sim.reconciler.engine_snapshot(KEY).await.unwrap();
    assert!(engine.ledger().is_empty());
    assert_eq!(sim.replicas().await, 2);

    let outcome = sim.tick().await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Scaled { from: 2, to: 4, .. }));
    let engine = sim.reconciler.engine_snapshot(KEY).await.unwrap();
    assert_eq!(engine.ledger().len(), 1);
    assert_eq!(engine.ledger().last().unwrap().timestamp, 15);
    assert_eq!(sim.status().last_scale_time, Some(15));
}

#[tokio::test]
async fn replica_bounds_override_recommendations() {
    let sim = Sim::new(cpu_spec(50, 2, 6, Behavior::default()), 3).await;
    sim.demand.set("cpu", 1000.0).await;

    let outcome = sim.tick().await.unwrap();
    let ReconcileOutcome::Scaled { to, decision, .. } = outcome else {
        panic!("expected a scale-up");
    };
    assert_eq!(to, 6);
    assert!(decision.clamped_by_max);
    assert_eq!(decision.reason, DecisionReason::TooManyReplicas);
    let status = sim.status();
    let limited = status.condition(ConditionType::ScalingLimited).unwrap();
    assert_eq!(limited.reason, "TooManyReplicas");

    for _ in 0..4 {
        sim.tick().await.unwrap();
        assert_eq!(sim.replicas().await, 6);
    }
}

#[tokio::test]
async fn min_replicas_floor_holds() {
    let behavior = Behavior {
        scale_up: None,
        scale_down: rules(0, SelectPolicy::Max, vec![ScalingPolicy::percent(100, 15)]),
    };
    let sim = Sim::new(cpu_spec(50, 2, 6, behavior), 3).await;
    sim.demand.set("cpu", 10.0).await;

    let outcome = sim.tick().await.unwrap();
    let ReconcileOutcome::Scaled { to, decision, .. } = outcome else {
        panic!("expected a scale-down");
    };
    assert_eq!(to, 2);
    assert!(decision.clamped_by_min);
    assert_eq!(decision.reason, DecisionReason::TooFewReplicas);

    for _ in 0..3 {
        sim.tick().await.unwrap();
        assert!(sim.replicas().await >= 2);
    }
}

#[tokio::test]
async fn zero_replicas_disables_scaling() {
    let sim = Sim::new(cpu_spec(50, 1, 10, Behavior::default()), 0).await;
    sim.demand.set("cpu", 500.0).await;

    let ReconcileOutcome::Unchanged(decision) = sim.tick().await.unwrap() else {
        panic!("a target at zero is left alone");
    };
    assert_eq!(decision.reason, DecisionReason::ScalingDisabled);
    assert!(decision.paused);
    assert_eq!(decision.desired_replicas, 0);
    assert_eq!(sim.replicas().await, 0);
    let status = sim.status();
    let active = status.condition(ConditionType::ScalingActive).unwrap();
    assert_eq!(active.reason, "ScalingDisabled");
}
