//! Admission: defaulting, validation, and feature-gated field dropping.
//!
//! Runs when an autoscaler object is created or updated, before it is
//! stored. The decision engine assumes every spec it sees has passed
//! through [`apply_defaults`] and [`validate`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{FieldError, InvalidSpec};
use crate::types::*;

/// Longest stabilization window accepted, in seconds.
pub const MAX_STABILIZATION_WINDOW_SECS: u32 = 3600;

/// Longest policy period accepted, in seconds.
pub const MAX_POLICY_PERIOD_SECS: u32 = 1800;

/// Capability flags that gate optional spec fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureGates {
    /// Allow `ContainerResource` metric sources.
    #[serde(default = "enabled")]
    pub container_resource_metrics: bool,
}

fn enabled() -> bool {
    true
}

impl Default for FeatureGates {
    fn default() -> Self {
        Self {
            container_resource_metrics: true,
        }
    }
}

/// Fill in unset behavior with the per-direction defaults.
///
/// Rules that are present keep their policies; only a missing window is
/// filled in, and empty policy lists are replaced unless the direction is
/// disabled.
pub fn apply_defaults(spec: &mut AutoscalerSpec) {
    for direction in ScaleDirection::ALL {
        let slot = match direction {
            ScaleDirection::Up => &mut spec.behavior.scale_up,
            ScaleDirection::Down => &mut spec.behavior.scale_down,
        };
        let defaults = ScalingRules::default_for(direction);
        match slot {
            None => *slot = Some(defaults),
            Some(rules) => {
                if rules.stabilization_window_secs.is_none() {
                    rules.stabilization_window_secs = defaults.stabilization_window_secs;
                }
                if rules.policies.is_empty() && rules.select_policy != SelectPolicy::Disabled {
                    rules.policies = defaults.policies;
                }
            }
        }
    }
}

/// Check a spec, collecting every field error rather than stopping at the
/// first.
pub fn validate(spec: &AutoscalerSpec) -> Result<(), InvalidSpec> {
    let mut errors = Vec::new();

    if spec.name.is_empty() {
        errors.push(FieldError::new("name", "must not be empty"));
    }
    if spec.max_replicas < 1 {
        errors.push(FieldError::new("max_replicas", "must be at least 1"));
    }
    if spec.min_replicas > spec.max_replicas {
        errors.push(FieldError::new(
            "min_replicas",
            format!(
                "must be less than or equal to max_replicas ({})",
                spec.max_replicas
            ),
        ));
    }
    if !(spec.tolerance.is_finite() && (0.0..1.0).contains(&spec.tolerance)) {
        errors.push(FieldError::new("tolerance", "must be in [0, 1)"));
    }

    if spec.metrics.is_empty() {
        errors.push(FieldError::new("metrics", "at least one metric is required"));
    }
    for (i, metric) in spec.metrics.iter().enumerate() {
        validate_metric(&format!("metrics[{i}]"), metric, &mut errors);
    }

    if let Some(rules) = &spec.behavior.scale_up {
        validate_rules("behavior.scale_up", rules, &mut errors);
    }
    if let Some(rules) = &spec.behavior.scale_down {
        validate_rules("behavior.scale_down", rules, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(InvalidSpec { errors })
    }
}

fn validate_metric(path: &str, metric: &MetricSpec, errors: &mut Vec<FieldError>) {
    let target = metric.target().value();
    if !target.is_finite() || target <= 0.0 {
        errors.push(FieldError::new(
            format!("{path}.target"),
            "must be a positive number",
        ));
    }
    if let MetricSpec::ContainerResource { container, .. } = metric
        && container.is_empty()
    {
        errors.push(FieldError::new(
            format!("{path}.container"),
            "must not be empty",
        ));
    }
}

fn validate_rules(path: &str, rules: &ScalingRules, errors: &mut Vec<FieldError>) {
    if let Some(window) = rules.stabilization_window_secs
        && window > MAX_STABILIZATION_WINDOW_SECS
    {
        errors.push(FieldError::new(
            format!("{path}.stabilization_window_secs"),
            format!("must be at most {MAX_STABILIZATION_WINDOW_SECS}"),
        ));
    }

    if rules.select_policy != SelectPolicy::Disabled && rules.policies.is_empty() {
        errors.push(FieldError::new(
            format!("{path}.policies"),
            "at least one policy is required unless select_policy is disabled",
        ));
    }

    let mut seen = HashSet::new();
    for (i, policy) in rules.policies.iter().enumerate() {
        if policy.value == 0 {
            errors.push(FieldError::new(
                format!("{path}.policies[{i}].value"),
                "must be greater than zero",
            ));
        }
        if policy.period_secs == 0 || policy.period_secs > MAX_POLICY_PERIOD_SECS {
            errors.push(FieldError::new(
                format!("{path}.policies[{i}].period_secs"),
                format!("must be in 1..={MAX_POLICY_PERIOD_SECS}"),
            ));
        }
        if !seen.insert((policy.kind, policy.period_secs)) {
            errors.push(FieldError::new(
                format!("{path}.policies[{i}]"),
                "duplicate policy kind and period",
            ));
        }
    }
}

/// Drop fields whose capability is disabled on a newly created object.
pub fn prepare_for_create(spec: &mut AutoscalerSpec, gates: &FeatureGates) {
    if !gates.container_resource_metrics {
        drop_container_metrics(spec);
    }
}

/// Drop disabled fields on update, unless the stored object already used
/// them.
pub fn prepare_for_update(spec: &mut AutoscalerSpec, old: &AutoscalerSpec, gates: &FeatureGates) {
    if !gates.container_resource_metrics && !old.uses_container_metrics() {
        drop_container_metrics(spec);
    }
}

// A metric entry is its source, so removing the whole entry is how a
// disabled `ContainerResource` source gets cleared.
fn drop_container_metrics(spec: &mut AutoscalerSpec) {
    spec.metrics
        .retain(|m| !matches!(m, MetricSpec::ContainerResource { .. }));
}

/// Run the full create path: drop gated fields, default, then validate.
pub fn admit(mut spec: AutoscalerSpec, gates: &FeatureGates) -> Result<AutoscalerSpec, InvalidSpec> {
    prepare_for_create(&mut spec, gates);
    apply_defaults(&mut spec);
    validate(&spec)?;
    Ok(spec)
}
