//! Status surface persisted by the caller after each reconciliation.

use serde::{Deserialize, Serialize};

/// Observed state of one autoscaler.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AutoscalerStatus {
    pub current_replicas: u32,
    pub desired_replicas: u32,
    #[serde(default)]
    pub current_metrics: Vec<MetricStatus>,
    /// Unix timestamp of the last applied scale change.
    #[serde(default)]
    pub last_scale_time: Option<u64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Spec generation this status was computed from.
    #[serde(default)]
    pub observed_generation: u64,
}

/// Last observed value of one metric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricStatus {
    pub name: String,
    pub current_value: f64,
    pub target_value: f64,
    /// Replica count this metric alone would call for.
    pub recommendation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// Whether the scale target can be read and written.
    AbleToScale,
    /// Whether metrics are available and autoscaling is in effect.
    ScalingActive,
    /// Whether the desired count was bounded by limits or policies.
    ScalingLimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    /// Unix timestamp of the last change of `status`.
    pub last_transition_time: u64,
}

impl AutoscalerStatus {
    /// Set a condition, keeping its transition time unless the status flips.
    pub fn set_condition(
        &mut self,
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
        now: u64,
    ) {
        let message = message.into();
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition_type)
        {
            Some(existing) => {
                if existing.status != status {
                    existing.last_transition_time = now;
                }
                existing.status = status;
                existing.reason = reason.to_string();
                existing.message = message;
            }
            None => self.conditions.push(Condition {
                condition_type,
                status,
                reason: reason.to_string(),
                message,
                last_transition_time: now,
            }),
        }
    }

    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}
