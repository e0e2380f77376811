//! Simulation traces: metric values over time.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A scripted run: how long, how often, and what the metrics read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Replica count every scale target starts at.
    #[serde(default = "default_initial_replicas")]
    pub initial_replicas: u32,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    pub duration_secs: u64,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// Sets one metric from `at_secs` until the next step for the same metric.
/// No `current_value` means the metric is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub at_secs: u64,
    pub autoscaler: String,
    pub metric: String,
    pub current_value: Option<f64>,
}

fn default_initial_replicas() -> u32 {
    1
}

fn default_tick_secs() -> u64 {
    15
}

impl Trace {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut trace: Trace = toml::from_str(content)?;
        if trace.tick_secs == 0 {
            anyhow::bail!("tick_secs must be positive");
        }
        trace.steps.sort_by_key(|s| s.at_secs);
        Ok(trace)
    }

    /// Tick timestamps from 0 up to (excluding) `duration_secs`.
    pub fn ticks(&self) -> std::iter::StepBy<std::ops::Range<u64>> {
        (0..self.duration_secs).step_by(self.tick_secs as usize)
    }

    /// Metric values in effect at `t`: (autoscaler, metric) → value.
    pub fn values_at(&self, t: u64) -> HashMap<(String, String), Option<f64>> {
        let mut values = HashMap::new();
        // Steps are sorted, so later steps overwrite earlier ones.
        for step in self.steps.iter().take_while(|s| s.at_secs <= t) {
            values.insert(
                (step.autoscaler.clone(), step.metric.clone()),
                step.current_value,
            );
        }
        values
    }
}
