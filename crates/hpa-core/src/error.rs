//! Error taxonomy for autoscaling.

use thiserror::Error;

/// Result type alias for autoscaling operations.
pub type AutoscaleResult<T> = Result<T, AutoscaleError>;

/// Errors surfaced to the caller of the decision engine and the controller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AutoscaleError {
    /// The metric value could not be obtained. Recoverable: keep the
    /// current replica count and retry with backoff.
    #[error("metric {metric} unavailable: {reason}")]
    MetricUnavailable { metric: String, reason: String },

    /// The spec is not admissible. Rejected at admission time.
    #[error(transparent)]
    InvalidSpec(#[from] InvalidSpec),

    /// Setting the replica count on the scale target failed.
    #[error("failed to set replicas on {target}: {reason}")]
    ApplyFailed { target: String, reason: String },

    /// Reading the replica count from the scale target failed.
    #[error("failed to get replicas of {target}: {reason}")]
    ScaleReadFailed { target: String, reason: String },

    /// A tick older than the latest recorded one was replayed.
    #[error("stale tick at {attempted}, latest recorded is {latest}")]
    StaleTick { latest: u64, attempted: u64 },

    #[error("state error: {0}")]
    State(String),
}

impl AutoscaleError {
    pub fn metric_unavailable(metric: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        AutoscaleError::MetricUnavailable {
            metric: metric.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same input later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutoscaleError::MetricUnavailable { .. }
                | AutoscaleError::ApplyFailed { .. }
                | AutoscaleError::ScaleReadFailed { .. }
                | AutoscaleError::State(_)
        )
    }

    /// Short class name, persisted in status conditions.
    pub fn class(&self) -> &'static str {
        match self {
            AutoscaleError::MetricUnavailable { .. } => "MetricUnavailable",
            AutoscaleError::InvalidSpec(_) => "InvalidSpec",
            AutoscaleError::ApplyFailed { .. } => "ApplyFailed",
            AutoscaleError::ScaleReadFailed { .. } => "ScaleReadFailed",
            AutoscaleError::StaleTick { .. } => "StaleTick",
            AutoscaleError::State(_) => "State",
        }
    }
}

/// One invalid field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path, e.g. `behavior.scale_up.policies[0].value`.
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every field error found in one spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid autoscaler spec: {}", join(.errors))]
pub struct InvalidSpec {
    pub errors: Vec<FieldError>,
}

impl InvalidSpec {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
