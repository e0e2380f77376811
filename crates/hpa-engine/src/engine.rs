//! Decision engine: one autoscaler's state and its per-tick decision.
//!
//! Each autoscaler owns one `DecisionEngine`. A tick is a function of
//! (spec, current replicas, metric samples, retained history, retained
//! ledger): evaluating the same tick twice yields the same decision and
//! leaves the state as the first evaluation did.

use tracing::debug;

use hpa_core::*;

use crate::evaluator::evaluate;
use crate::history::RecommendationHistory;
use crate::ledger::{ScalingEvent, ScalingLedger};
use crate::limiter::{RateBound, bound};
use crate::stabilizer::stabilize;

/// One metric as fetched by the caller for this tick.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub name: String,
    pub reading: AutoscaleResult<MetricReading>,
}

impl MetricSample {
    pub fn ok(name: impl Into<String>, current_value: f64, target_value: f64) -> Self {
        Self {
            name: name.into(),
            reading: Ok(MetricReading::new(current_value, target_value)),
        }
    }

    pub fn unavailable(name: impl Into<String>, reason: &str) -> Self {
        let name = name.into();
        Self {
            reading: Err(AutoscaleError::metric_unavailable(name.clone(), reason)),
            name,
        }
    }
}

/// A decision plus the per-metric values that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    pub metrics: Vec<MetricStatus>,
}

/// Recommendation history and scaling-event ledger of one autoscaler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionEngine {
    history: RecommendationHistory,
    ledger: ScalingLedger,
}

impl DecisionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &RecommendationHistory {
        &self.history
    }

    pub fn ledger(&self) -> &ScalingLedger {
        &self.ledger
    }

    /// Compute the decision for tick `now`.
    ///
    /// Fails with `MetricUnavailable` when no metric produced a value; the
    /// history is left untouched in that case.
    pub fn decide(
        &mut self,
        spec: &AutoscalerSpec,
        current_replicas: u32,
        samples: &[MetricSample],
        now: u64,
    ) -> AutoscaleResult<Evaluation> {
        if let Some(latest) = self.history.latest_timestamp()
            && latest > now
        {
            return Err(AutoscaleError::StaleTick {
                latest,
                attempted: now,
            });
        }

        if current_replicas == 0 {
            debug!(autoscaler = %spec.key(), "target at zero replicas, scaling disabled");
            return Ok(Evaluation {
                decision: Decision {
                    timestamp: now,
                    current_replicas,
                    desired_replicas: 0,
                    raw_recommendation: None,
                    stabilized_recommendation: None,
                    applied_policy: None,
                    clamped_by_min: false,
                    clamped_by_max: false,
                    paused: true,
                    reason: DecisionReason::ScalingDisabled,
                },
                metrics: Vec::new(),
            });
        }

        if samples.is_empty() {
            return Err(InvalidSpec::single("metrics", "at least one metric is required").into());
        }

        // ── Evaluate each metric ──────────────────────────────────
        let mut metrics = Vec::with_capacity(samples.len());
        let mut first_error = None;
        let mut all_within_tolerance = true;
        for sample in samples {
            let reading = match &sample.reading {
                Ok(r) => r,
                Err(e) => {
                    first_error.get_or_insert_with(|| e.clone());
                    continue;
                }
            };
            let evaluated = match evaluate(&sample.name, reading, current_replicas, spec.tolerance)
            {
                Ok(ev) => ev,
                Err(e @ AutoscaleError::MetricUnavailable { .. }) => {
                    first_error.get_or_insert(e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            all_within_tolerance &= evaluated.within_tolerance;
            metrics.push(MetricStatus {
                name: sample.name.clone(),
                current_value: reading.current_value,
                target_value: reading.target_value,
                recommendation: evaluated.replicas,
            });
        }

        let Some(mut raw) = metrics.iter().map(|m| m.recommendation).max() else {
            return Err(first_error
                .unwrap_or_else(|| AutoscaleError::metric_unavailable("all", "no readings")));
        };
        let partial = first_error.is_some();
        if partial && raw < current_replicas {
            raw = current_replicas;
        }

        // ── Record and stabilize ──────────────────────────────────
        self.history.append(now, raw)?;
        self.history.prune(spec.max_stabilization_window());

        let up_rules = spec.rules(ScaleDirection::Up);
        let down_rules = spec.rules(ScaleDirection::Down);
        let stabilized = stabilize(
            &self.history,
            now,
            raw,
            current_replicas,
            up_rules.stabilization_window(ScaleDirection::Up),
            down_rules.stabilization_window(ScaleDirection::Down),
        );

        // ── Rate limit ────────────────────────────────────────────
        let mut desired = stabilized.replicas;
        let mut applied_policy = None;
        if let Some(direction) = ScaleDirection::between(current_replicas, desired) {
            let rules = match direction {
                ScaleDirection::Up => &up_rules,
                ScaleDirection::Down => &down_rules,
            };
            let limit = bound(rules, direction, current_replicas, &self.ledger, now);
            let (bounded, cut) = limit.apply(direction, current_replicas, desired);
            if cut {
                applied_policy = match limit {
                    RateBound::Disabled => Some(AppliedPolicy::Disabled { direction }),
                    RateBound::Limit { policy, .. } => Some(AppliedPolicy::Policy {
                        direction,
                        select: rules.select_policy,
                        policy,
                    }),
                    RateBound::Unbounded => None,
                };
            }
            desired = bounded;
        }

        // ── Clamp ─────────────────────────────────────────────────
        let clamped_by_min = desired < spec.min_replicas;
        let clamped_by_max = desired > spec.max_replicas;
        desired = desired.clamp(spec.min_replicas, spec.max_replicas.max(spec.min_replicas));

        let reason = if clamped_by_min {
            DecisionReason::TooFewReplicas
        } else if clamped_by_max {
            DecisionReason::TooManyReplicas
        } else if let Some(policy) = applied_policy {
            match policy {
                AppliedPolicy::Disabled {
                    direction: ScaleDirection::Up,
                } => DecisionReason::ScaleUpDisabled,
                AppliedPolicy::Disabled {
                    direction: ScaleDirection::Down,
                } => DecisionReason::ScaleDownDisabled,
                AppliedPolicy::Policy {
                    direction: ScaleDirection::Up,
                    ..
                } => DecisionReason::ScaleUpLimited,
                AppliedPolicy::Policy {
                    direction: ScaleDirection::Down,
                    ..
                } => DecisionReason::ScaleDownLimited,
            }
        } else if stabilized.dampened && raw < current_replicas {
            DecisionReason::ScaleDownStabilized
        } else if stabilized.dampened && raw > current_replicas {
            DecisionReason::ScaleUpStabilized
        } else if partial && desired == current_replicas {
            DecisionReason::PartialMetrics
        } else if all_within_tolerance && desired == current_replicas {
            DecisionReason::WithinTolerance
        } else {
            DecisionReason::DesiredWithinRange
        };

        self.ledger.prune(now, spec.max_policy_period());

        let decision = Decision {
            timestamp: now,
            current_replicas,
            desired_replicas: desired,
            raw_recommendation: Some(raw),
            stabilized_recommendation: Some(stabilized.replicas),
            applied_policy,
            clamped_by_min,
            clamped_by_max,
            paused: false,
            reason,
        };

        debug!(
            autoscaler = %spec.key(),
            current = current_replicas,
            raw,
            stabilized = stabilized.replicas,
            desired,
            reason = ?reason,
            "decision computed"
        );

        Ok(Evaluation { decision, metrics })
    }

    /// Record that the caller applied `decision`. Call only after the scale
    /// target accepted the new count. Returns false for no-op decisions and
    /// for confirmations already recorded.
    pub fn confirm(&mut self, decision: &Decision) -> bool {
        let Some(event) = ScalingEvent::new(
            decision.timestamp,
            decision.current_replicas,
            decision.desired_replicas,
        ) else {
            return false;
        };
        let recorded = self.ledger.record(event);
        if recorded {
            debug!(
                at = decision.timestamp,
                from = event.from_replicas,
                to = event.to_replicas,
                direction = %event.direction,
                "scaling event recorded"
            );
        }
        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(min: u32, max: u32) -> AutoscalerSpec {
        AutoscalerSpec {
            namespace: "default".to_string(),
            name: "web".to_string(),
            min_replicas: min,
            max_replicas: max,
            tolerance: DEFAULT_TOLERANCE,
            metrics: vec![MetricSpec::Resource {
                name: "cpu".to_string(),
                target: MetricTarget::Utilization {
                    average_utilization: 10,
                },
            }],
            behavior: Behavior {
                scale_up: Some(ScalingRules {
                    stabilization_window_secs: Some(0),
                    select_policy: SelectPolicy::Max,
                    policies: vec![ScalingPolicy::pods(100, 15)],
                }),
                scale_down: Some(ScalingRules {
                    stabilization_window_secs: Some(0),
                    select_policy: SelectPolicy::Max,
                    policies: vec![ScalingPolicy::percent(100, 15)],
                }),
            },
            generation: 0,
        }
    }

    fn cpu(value: f64) -> Vec<MetricSample> {
        vec![MetricSample::ok("cpu", value, 10.0)]
    }

    #[test]
    fn within_tolerance_is_noop() {
        let mut engine = DecisionEngine::new();
        let s = spec(1, 10);
        for (i, v) in [9.0, 10.0, 11.0].into_iter().enumerate() {
            let e = engine.decide(&s, 5, &cpu(v), i as u64 * 15).unwrap();
            assert_eq!(e.decision.desired_replicas, 5);
            assert_eq!(e.decision.reason, DecisionReason::WithinTolerance);
            assert!(!e.decision.is_change());
        }
    }

    #[test]
    fn scale_up_unbounded_by_generous_policy() {
        let mut engine = DecisionEngine::new();
        let e = engine.decide(&spec(1, 10), 2, &cpu(30.0), 0).unwrap();
        assert_eq!(e.decision.desired_replicas, 6);
        assert_eq!(e.decision.reason, DecisionReason::DesiredWithinRange);
        assert_eq!(e.metrics[0].recommendation, 6);
    }

    #[test]
    fn clamped_to_max() {
        let mut engine = DecisionEngine::new();
        let e = engine.decide(&spec(1, 5), 2, &cpu(100.0), 0).unwrap();
        assert_eq!(e.decision.desired_replicas, 5);
        assert!(e.decision.clamped_by_max);
        assert_eq!(e.decision.reason, DecisionReason::TooManyReplicas);
    }

    #[test]
    fn clamped_to_min() {
        let mut engine = DecisionEngine::new();
        let e = engine.decide(&spec(3, 5), 4, &cpu(1.0), 0).unwrap();
        assert_eq!(e.decision.desired_replicas, 3);
        assert!(e.decision.clamped_by_min);
        assert_eq!(e.decision.reason, DecisionReason::TooFewReplicas);
    }

    #[test]
    fn clamp_overrides_disabled_direction() {
        let mut s = spec(3, 5);
        s.behavior.scale_up = Some(ScalingRules {
            stabilization_window_secs: Some(0),
            select_policy: SelectPolicy::Disabled,
            policies: vec![],
        });
        let mut engine = DecisionEngine::new();
        let e = engine.decide(&s, 1, &cpu(10.0), 0).unwrap();
        assert_eq!(e.decision.desired_replicas, 3);
        assert!(e.decision.clamped_by_min);
    }

    #[test]
    fn all_metrics_unavailable_keeps_history() {
        let mut engine = DecisionEngine::new();
        let err = engine
            .decide(&spec(1, 5), 2, &[MetricSample::unavailable("cpu", "timeout")], 0)
            .unwrap_err();
        assert!(matches!(err, AutoscaleError::MetricUnavailable { .. }));
        assert!(engine.history().is_empty());
    }

    #[test]
    fn partial_metrics_never_scale_down() {
        let mut engine = DecisionEngine::new();
        let samples = vec![
            MetricSample::ok("cpu", 1.0, 10.0),
            MetricSample::unavailable("qps", "adapter down"),
        ];
        let e = engine.decide(&spec(1, 10), 6, &samples, 0).unwrap();
        assert_eq!(e.decision.desired_replicas, 6);
        assert_eq!(e.decision.reason, DecisionReason::PartialMetrics);

        // Scale-up on the available metric still goes through.
        let samples = vec![
            MetricSample::ok("cpu", 20.0, 10.0),
            MetricSample::unavailable("qps", "adapter down"),
        ];
        let e = engine.decide(&spec(1, 20), 6, &samples, 15).unwrap();
        assert_eq!(e.decision.desired_replicas, 12);
    }

    #[test]
    fn largest_metric_wins() {
        let mut engine = DecisionEngine::new();
        let samples = vec![
            MetricSample::ok("cpu", 20.0, 10.0),
            MetricSample::ok("memory", 40.0, 10.0),
        ];
        let e = engine.decide(&spec(1, 20), 2, &samples, 0).unwrap();
        assert_eq!(e.decision.raw_recommendation, Some(8));
        assert_eq!(e.decision.desired_replicas, 8);
    }

    #[test]
    fn zero_replicas_disables_scaling() {
        let mut engine = DecisionEngine::new();
        let e = engine.decide(&spec(1, 5), 0, &cpu(50.0), 0).unwrap();
        assert_eq!(e.decision.reason, DecisionReason::ScalingDisabled);
        assert!(e.decision.paused);
        assert!(!e.decision.is_change());
        assert_eq!(e.decision.direction(), None);
        assert!(engine.history().is_empty());
        assert!(!engine.confirm(&e.decision));
    }

    #[test]
    fn replaying_a_tick_is_idempotent() {
        let s = spec(1, 10);
        let mut engine = DecisionEngine::new();
        engine.decide(&s, 4, &cpu(10.0), 0).unwrap();

        let before = engine.clone();
        let first = engine.decide(&s, 4, &cpu(20.0), 15).unwrap();
        let snapshot = engine.clone();
        let again = engine.decide(&s, 4, &cpu(20.0), 15).unwrap();
        assert_eq!(first, again);
        assert_eq!(engine, snapshot);
        assert_ne!(engine, before);

        assert!(engine.confirm(&first.decision));
        assert!(!engine.confirm(&again.decision));
        assert_eq!(engine.ledger().len(), 1);
    }

    #[test]
    fn second_change_in_same_second_counts_against_policy() {
        let mut s = spec(1, 20);
        s.behavior.scale_up = Some(ScalingRules {
            stabilization_window_secs: Some(0),
            select_policy: SelectPolicy::Max,
            policies: vec![ScalingPolicy::pods(4, 60)],
        });
        let mut engine = DecisionEngine::new();

        let first = engine.decide(&s, 2, &cpu(15.0), 0).unwrap();
        assert_eq!(first.decision.desired_replicas, 3);
        assert!(engine.confirm(&first.decision));

        // A redelivered key reconciles again within the same second.
        let second = engine.decide(&s, 3, &cpu(20.0), 0).unwrap();
        assert_eq!(second.decision.desired_replicas, 6);
        assert!(engine.confirm(&second.decision));
        assert_eq!(engine.ledger().len(), 2);

        // Both steps count: the period started at 2, so 6 is the cap.
        let third = engine.decide(&s, 6, &cpu(15.0), 30).unwrap();
        assert_eq!(third.decision.desired_replicas, 6);
        assert_eq!(third.decision.reason, DecisionReason::ScaleUpLimited);
    }

    #[test]
    fn stale_tick_rejected() {
        let s = spec(1, 10);
        let mut engine = DecisionEngine::new();
        engine.decide(&s, 4, &cpu(20.0), 100).unwrap();
        let err = engine.decide(&s, 4, &cpu(20.0), 50).unwrap_err();
        assert!(matches!(err, AutoscaleError::StaleTick { latest: 100, attempted: 50 }));
    }

    #[test]
    fn confirm_ignores_noop() {
        let mut engine = DecisionEngine::new();
        let e = engine.decide(&spec(1, 10), 5, &cpu(10.0), 0).unwrap();
        assert!(!engine.confirm(&e.decision));
        assert!(engine.ledger().is_empty());
    }

    #[test]
    fn pods_policy_limits_and_reports() {
        let mut s = spec(1, 10);
        s.behavior.scale_up = Some(ScalingRules {
            stabilization_window_secs: Some(0),
            select_policy: SelectPolicy::Max,
            policies: vec![ScalingPolicy::pods(1, 90)],
        });
        let mut engine = DecisionEngine::new();
        let e = engine.decide(&s, 1, &cpu(30.0), 0).unwrap();
        assert_eq!(e.decision.desired_replicas, 2);
        assert_eq!(e.decision.reason, DecisionReason::ScaleUpLimited);
        assert_eq!(
            e.decision.applied_policy,
            Some(AppliedPolicy::Policy {
                direction: ScaleDirection::Up,
                select: SelectPolicy::Max,
                policy: ScalingPolicy::pods(1, 90),
            })
        );
    }

    #[test]
    fn default_scale_down_window_vetoes_dip() {
        let mut s = spec(1, 10);
        s.behavior = Behavior::default();
        let mut engine = DecisionEngine::new();
        engine.decide(&s, 5, &cpu(10.0), 0).unwrap();
        let e = engine.decide(&s, 5, &cpu(2.0), 15).unwrap();
        assert_eq!(e.decision.desired_replicas, 5);
        assert_eq!(e.decision.reason, DecisionReason::ScaleDownStabilized);

        // Once the high recommendation ages out of the 300s window, the drop goes through.
        let e = engine.decide(&s, 5, &cpu(2.0), 301).unwrap();
        assert_eq!(e.decision.desired_replicas, 1);
    }
}
