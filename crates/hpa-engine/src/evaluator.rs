//! Utilization evaluator: one metric reading to a raw replica count.

use hpa_core::{AutoscaleError, AutoscaleResult, InvalidSpec, MetricReading};

/// Slack for float error at the edges of the tolerance band.
const BAND_EPSILON: f64 = 1e-9;

/// Raw recommendation for a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluated {
    pub replicas: u32,
    /// The reading fell inside the tolerance band.
    pub within_tolerance: bool,
}

/// Convert a reading into the replica count that would bring the metric
/// back to its target.
///
/// `current_replicas` must be positive; the engine handles a target at zero
/// replicas before calling this. The result is never below 1.
pub fn evaluate(
    metric: &str,
    reading: &MetricReading,
    current_replicas: u32,
    tolerance: f64,
) -> AutoscaleResult<Evaluated> {
    if !reading.target_value.is_finite() || reading.target_value <= 0.0 {
        return Err(InvalidSpec::single(
            format!("metrics.{metric}.target"),
            "must be a positive number",
        )
        .into());
    }
    if !reading.current_value.is_finite() || reading.current_value < 0.0 {
        return Err(AutoscaleError::metric_unavailable(
            metric,
            format!("unusable value {}", reading.current_value),
        ));
    }

    let ratio = reading.ratio();
    if (ratio - 1.0).abs() <= tolerance + BAND_EPSILON {
        return Ok(Evaluated {
            replicas: current_replicas,
            within_tolerance: true,
        });
    }

    let desired = (current_replicas as f64 * reading.current_value / reading.target_value).ceil();
    let replicas = desired.clamp(1.0, u32::MAX as f64) as u32;
    Ok(Evaluated {
        replicas,
        within_tolerance: false,
    })
}
