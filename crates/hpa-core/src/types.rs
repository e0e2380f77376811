//! Domain types shared across the autoscaler crates.
//!
//! These describe one horizontal autoscaler object (its replica bounds,
//! metrics, and per-direction behavior rules) and the single output of one
//! reconciliation, the [`Decision`]. All types serialize to/from JSON and
//! TOML.

use serde::{Deserialize, Serialize};

/// Unique identifier for an autoscaler (`{namespace}/{name}`).
pub type AutoscalerKey = String;

/// Default no-op band around a utilization ratio of 1.0.
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Default lower replica bound.
pub const DEFAULT_MIN_REPLICAS: u32 = 1;

/// Default stabilization window for scale-up (react immediately).
pub const DEFAULT_SCALE_UP_WINDOW_SECS: u32 = 0;

/// Default stabilization window for scale-down (five minutes).
pub const DEFAULT_SCALE_DOWN_WINDOW_SECS: u32 = 300;

// ── Autoscaler ──────────────────────────────────────────────────────

/// Specification of one horizontal autoscaler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoscalerSpec {
    pub namespace: String,
    pub name: String,
    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Relative change treated as "no change" (0.1 = ±10%).
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    pub metrics: Vec<MetricSpec>,
    #[serde(default)]
    pub behavior: Behavior,
    /// Bumped by the store whenever the spec changes.
    #[serde(default)]
    pub generation: u64,
}

fn default_min_replicas() -> u32 {
    DEFAULT_MIN_REPLICAS
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl AutoscalerSpec {
    /// Build the composite key used by the store and the work queue.
    pub fn key(&self) -> AutoscalerKey {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Rules for one direction, falling back to the direction's defaults.
    pub fn rules(&self, direction: ScaleDirection) -> ScalingRules {
        let configured = match direction {
            ScaleDirection::Up => self.behavior.scale_up.as_ref(),
            ScaleDirection::Down => self.behavior.scale_down.as_ref(),
        };
        configured
            .cloned()
            .unwrap_or_else(|| ScalingRules::default_for(direction))
    }

    /// Longest stabilization window across both directions.
    pub fn max_stabilization_window(&self) -> u32 {
        ScaleDirection::ALL
            .iter()
            .map(|d| self.rules(*d).stabilization_window(*d))
            .max()
            .unwrap_or(0)
    }

    /// Longest policy period across both directions.
    pub fn max_policy_period(&self) -> u32 {
        ScaleDirection::ALL
            .iter()
            .flat_map(|d| self.rules(*d).policies)
            .map(|p| p.period_secs)
            .max()
            .unwrap_or(0)
    }

    /// Whether any metric reads a per-container resource.
    pub fn uses_container_metrics(&self) -> bool {
        self.metrics
            .iter()
            .any(|m| matches!(m, MetricSpec::ContainerResource { .. }))
    }
}

/// Per-direction rate limiting and stabilization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Behavior {
    #[serde(default)]
    pub scale_up: Option<ScalingRules>,
    #[serde(default)]
    pub scale_down: Option<ScalingRules>,
}

/// Direction of a replica change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Up,
    Down,
}

impl ScaleDirection {
    pub const ALL: [ScaleDirection; 2] = [ScaleDirection::Up, ScaleDirection::Down];

    /// Direction implied by moving from `from` to `to`, if any.
    pub fn between(from: u32, to: u32) -> Option<Self> {
        match to.cmp(&from) {
            std::cmp::Ordering::Greater => Some(ScaleDirection::Up),
            std::cmp::Ordering::Less => Some(ScaleDirection::Down),
            std::cmp::Ordering::Equal => None,
        }
    }
}

impl std::fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleDirection::Up => f.write_str("up"),
            ScaleDirection::Down => f.write_str("down"),
        }
    }
}

/// Rate limits and stabilization for one direction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScalingRules {
    /// Trailing window of recommendations consulted before acting.
    /// `None` means the direction's default.
    #[serde(default)]
    pub stabilization_window_secs: Option<u32>,
    #[serde(default)]
    pub select_policy: SelectPolicy,
    #[serde(default)]
    pub policies: Vec<ScalingPolicy>,
}

impl ScalingRules {
    /// The rules applied when a direction is left unconfigured.
    pub fn default_for(direction: ScaleDirection) -> Self {
        match direction {
            ScaleDirection::Up => Self {
                stabilization_window_secs: Some(DEFAULT_SCALE_UP_WINDOW_SECS),
                select_policy: SelectPolicy::Max,
                policies: vec![
                    ScalingPolicy::percent(100, 15),
                    ScalingPolicy::pods(4, 15),
                ],
            },
            ScaleDirection::Down => Self {
                stabilization_window_secs: Some(DEFAULT_SCALE_DOWN_WINDOW_SECS),
                select_policy: SelectPolicy::Max,
                policies: vec![ScalingPolicy::percent(100, 15)],
            },
        }
    }

    /// Effective stabilization window in seconds.
    pub fn stabilization_window(&self, direction: ScaleDirection) -> u32 {
        self.stabilization_window_secs.unwrap_or(match direction {
            ScaleDirection::Up => DEFAULT_SCALE_UP_WINDOW_SECS,
            ScaleDirection::Down => DEFAULT_SCALE_DOWN_WINDOW_SECS,
        })
    }
}

/// How multiple policies in one direction are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectPolicy {
    /// The policy permitting the largest change wins.
    #[default]
    Max,
    /// The policy permitting the smallest change wins.
    Min,
    /// No change in this direction at all.
    Disabled,
}

/// Kind of a rate-limiting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Absolute number of pods.
    Pods,
    /// Percentage of the replica count at the start of the period.
    Percent,
}

/// One rate-limiting policy: at most `value` change per `period_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub kind: PolicyKind,
    pub value: u32,
    pub period_secs: u32,
}

impl ScalingPolicy {
    pub fn pods(value: u32, period_secs: u32) -> Self {
        Self {
            kind: PolicyKind::Pods,
            value,
            period_secs,
        }
    }

    pub fn percent(value: u32, period_secs: u32) -> Self {
        Self {
            kind: PolicyKind::Percent,
            value,
            period_secs,
        }
    }
}

// ── Metrics ────────────────────────────────────────────────────────

/// Where a metric comes from and what value it should be held at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricSpec {
    /// Per-pod resource usage (e.g. "cpu", "memory").
    Resource { name: String, target: MetricTarget },
    /// Resource usage of one named container in each pod.
    ContainerResource {
        name: String,
        container: String,
        target: MetricTarget,
    },
    /// A custom metric averaged across pods.
    Pods { metric: String, target: MetricTarget },
    /// A metric describing a single related object.
    Object {
        metric: String,
        described_object: String,
        target: MetricTarget,
    },
    /// A metric from outside the cluster.
    External {
        metric: String,
        #[serde(default)]
        selector: Option<String>,
        target: MetricTarget,
    },
}

impl MetricSpec {
    /// Human-readable metric name for logs and status.
    pub fn name(&self) -> String {
        match self {
            MetricSpec::Resource { name, .. } => name.clone(),
            MetricSpec::ContainerResource {
                name, container, ..
            } => format!("{container}/{name}"),
            MetricSpec::Pods { metric, .. } => metric.clone(),
            MetricSpec::Object {
                metric,
                described_object,
                ..
            } => format!("{described_object}/{metric}"),
            MetricSpec::External { metric, .. } => metric.clone(),
        }
    }

    pub fn target(&self) -> &MetricTarget {
        match self {
            MetricSpec::Resource { target, .. }
            | MetricSpec::ContainerResource { target, .. }
            | MetricSpec::Pods { target, .. }
            | MetricSpec::Object { target, .. }
            | MetricSpec::External { target, .. } => target,
        }
    }
}

/// Target value for a metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricTarget {
    /// Average utilization across pods, in percent of the request.
    Utilization { average_utilization: u32 },
    /// Average raw value across pods.
    AverageValue { value: f64 },
    /// Total raw value.
    Value { value: f64 },
}

impl MetricTarget {
    /// The target expressed in the same unit as the metric source reports.
    pub fn value(&self) -> f64 {
        match self {
            MetricTarget::Utilization {
                average_utilization,
            } => *average_utilization as f64,
            MetricTarget::AverageValue { value } | MetricTarget::Value { value } => *value,
        }
    }
}

/// An already-fetched metric value paired with its target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub current_value: f64,
    pub target_value: f64,
}

impl MetricReading {
    pub fn new(current_value: f64, target_value: f64) -> Self {
        Self {
            current_value,
            target_value,
        }
    }

    pub fn ratio(&self) -> f64 {
        self.current_value / self.target_value
    }
}

// ── Decision ───────────────────────────────────────────────────────

/// The rate limit that bounded a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppliedPolicy {
    /// A policy's bound was selected and was tighter than the target.
    Policy {
        direction: ScaleDirection,
        select: SelectPolicy,
        policy: ScalingPolicy,
    },
    /// Changes in this direction are disabled.
    Disabled { direction: ScaleDirection },
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Utilization is inside the tolerance band.
    WithinTolerance,
    /// A recent higher recommendation vetoed (part of) a scale-down.
    ScaleDownStabilized,
    /// A recent lower recommendation held back (part of) a scale-up.
    ScaleUpStabilized,
    /// A scale-up policy capped the change.
    ScaleUpLimited,
    /// A scale-down policy capped the change.
    ScaleDownLimited,
    ScaleUpDisabled,
    ScaleDownDisabled,
    /// Raised to `min_replicas`.
    TooFewReplicas,
    /// Lowered to `max_replicas`.
    TooManyReplicas,
    /// The recommendation was applied as-is.
    DesiredWithinRange,
    /// The target is at zero replicas; autoscaling is paused.
    ScalingDisabled,
    /// Some metrics were unavailable, so scale-down was suppressed.
    PartialMetrics,
}

/// The output of one reconciliation tick.
///
/// `min_replicas <= desired_replicas <= max_replicas` holds for every
/// decision with `paused == false`. A paused decision (target at zero,
/// reason `ScalingDisabled`) carries `desired_replicas == current_replicas`
/// and is never a change, so it cannot be applied or confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// The tick this decision was computed for.
    pub timestamp: u64,
    pub current_replicas: u32,
    pub desired_replicas: u32,
    /// Max across metric recommendations, before stabilization.
    pub raw_recommendation: Option<u32>,
    /// After stabilization, before rate limits and clamping.
    pub stabilized_recommendation: Option<u32>,
    pub applied_policy: Option<AppliedPolicy>,
    pub clamped_by_min: bool,
    pub clamped_by_max: bool,
    /// Autoscaling is paused for this target; the bounds do not apply.
    #[serde(default)]
    pub paused: bool,
    pub reason: DecisionReason,
}

impl Decision {
    /// Whether the caller has to change the replica count.
    pub fn is_change(&self) -> bool {
        !self.paused && self.desired_replicas != self.current_replicas
    }

    pub fn direction(&self) -> Option<ScaleDirection> {
        if self.paused {
            return None;
        }
        ScaleDirection::between(self.current_replicas, self.desired_replicas)
    }
}
