//! hpa.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::admission::FeatureGates;
use crate::types::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HpaConfig {
    pub controller: Option<ControllerConfig>,
    pub features: Option<FeatureGates>,
    #[serde(default, rename = "autoscaler")]
    pub autoscalers: Vec<AutoscalerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub sync_period_secs: Option<u64>,
    pub workers: Option<usize>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_secs: Option<u64>,
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscalerConfig {
    pub namespace: Option<String>,
    pub name: String,
    pub min_replicas: Option<u32>,
    pub max_replicas: u32,
    pub tolerance: Option<f64>,
    #[serde(default, rename = "metric")]
    pub metrics: Vec<MetricSpec>,
    pub behavior: Option<Behavior>,
}

/// Controller settings with every default resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub sync_period: Duration,
    pub workers: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub data_dir: Option<String>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            sync_period: Duration::from_secs(15),
            workers: 4,
            backoff_base: Duration::from_millis(5),
            backoff_max: Duration::from_secs(1000),
            data_dir: None,
        }
    }
}

impl HpaConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: HpaConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn settings(&self) -> ControllerSettings {
        let defaults = ControllerSettings::default();
        let Some(c) = &self.controller else {
            return defaults;
        };
        ControllerSettings {
            sync_period: c
                .sync_period_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sync_period),
            workers: c.workers.unwrap_or(defaults.workers).max(1),
            backoff_base: c
                .backoff_base_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
            backoff_max: c
                .backoff_max_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.backoff_max),
            data_dir: c.data_dir.clone(),
        }
    }

    pub fn feature_gates(&self) -> FeatureGates {
        self.features.unwrap_or_default()
    }

    /// Convert every `[[autoscaler]]` table into a spec. Specs are not yet
    /// admitted.
    pub fn autoscaler_specs(&self) -> Vec<AutoscalerSpec> {
        self.autoscalers.iter().map(AutoscalerConfig::to_spec).collect()
    }
}

impl AutoscalerConfig {
    pub fn to_spec(&self) -> AutoscalerSpec {
        AutoscalerSpec {
            namespace: self
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            name: self.name.clone(),
            min_replicas: self.min_replicas.unwrap_or(DEFAULT_MIN_REPLICAS),
            max_replicas: self.max_replicas,
            tolerance: self.tolerance.unwrap_or(DEFAULT_TOLERANCE),
            metrics: self.metrics.clone(),
            behavior: self.behavior.clone().unwrap_or_default(),
            generation: 0,
        }
    }
}
