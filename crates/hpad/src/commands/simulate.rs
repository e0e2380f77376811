//! Trace-driven simulation: the real reconciler against in-memory
//! collaborators and a manual clock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use hpa_controller::{InMemoryMetrics, InMemoryScale, ManualClock, ReconcileOutcome, Reconciler};
use hpa_core::admission;
use hpa_core::{AutoscalerKey, AutoscalerStatus, DecisionReason, HpaConfig};
use hpa_state::StateStore;

use crate::trace::Trace;

/// One autoscaler at one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickRecord {
    pub at_secs: u64,
    pub autoscaler: AutoscalerKey,
    pub replicas: u32,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DecisionReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FinalStatus {
    pub autoscaler: AutoscalerKey,
    pub status: Option<AutoscalerStatus>,
}

#[derive(Debug)]
pub struct Report {
    pub ticks: Vec<TickRecord>,
    pub statuses: Vec<FinalStatus>,
}

pub async fn simulate(
    config_path: &Path,
    trace_path: &Path,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = HpaConfig::from_file(config_path)?;
    let trace = Trace::from_file(trace_path)?;
    let data_dir = data_dir.or_else(|| config.settings().data_dir.map(PathBuf::from));

    let report = run(&config, &trace, data_dir.as_deref()).await?;
    for record in &report.ticks {
        println!("{}", serde_json::to_string(record)?);
    }
    for status in &report.statuses {
        println!("{}", serde_json::to_string(status)?);
    }

    let scaled = report
        .ticks
        .iter()
        .filter(|r| r.outcome == "scaled")
        .count();
    info!(ticks = report.ticks.len(), scaled, "simulation finished");
    Ok(())
}

fn open_store(data_dir: Option<&Path>) -> anyhow::Result<StateStore> {
    match data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join("hpa.redb");
            let store = StateStore::open(&path)?;
            info!(path = ?path, "state store opened");
            Ok(store)
        }
        None => Ok(StateStore::open_in_memory()?),
    }
}

/// Admit every configured autoscaler into the store. An autoscaler already
/// stored is admitted as an update.
fn load_autoscalers(config: &HpaConfig, store: &StateStore) -> anyhow::Result<Vec<AutoscalerKey>> {
    let gates = config.feature_gates();
    let mut keys = Vec::new();
    for mut spec in config.autoscaler_specs() {
        let key = spec.key();
        match store.get_autoscaler(&key)? {
            Some(old) => admission::prepare_for_update(&mut spec, &old, &gates),
            None => admission::prepare_for_create(&mut spec, &gates),
        }
        admission::apply_defaults(&mut spec);
        admission::validate(&spec).map_err(|e| anyhow::anyhow!("{key}: {e}"))?;
        let generation = store.put_autoscaler(&spec)?;
        info!(autoscaler = %key, generation, "autoscaler admitted");
        keys.push(key);
    }
    Ok(keys)
}

pub async fn run(
    config: &HpaConfig,
    trace: &Trace,
    data_dir: Option<&Path>,
) -> anyhow::Result<Report> {
    let store = open_store(data_dir)?;
    let keys = load_autoscalers(config, &store)?;

    let metrics = Arc::new(InMemoryMetrics::new());
    let scale = Arc::new(InMemoryScale::new());
    for key in &keys {
        scale.insert(key, trace.initial_replicas).await;
    }
    let clock = ManualClock::new(0);
    let reconciler = Reconciler::new(
        store.clone(),
        metrics.clone(),
        scale.clone(),
        Arc::new(clock.clone()),
    );

    let mut ticks = Vec::new();
    for t in trace.ticks() {
        clock.set(t);
        for ((autoscaler, metric), value) in trace.values_at(t) {
            match value {
                Some(v) => metrics.set(&autoscaler, &metric, v).await,
                None => metrics.set_unavailable(&autoscaler, &metric).await,
            }
        }

        for key in &keys {
            let result = reconciler.reconcile(key).await;
            let replicas = scale.replicas(key).await.unwrap_or(0);
            let (outcome, reason, error) = match result {
                Ok(ReconcileOutcome::Scaled { decision, .. }) => {
                    ("scaled", Some(decision.reason), None)
                }
                Ok(ReconcileOutcome::Unchanged(decision)) => {
                    ("unchanged", Some(decision.reason), None)
                }
                Ok(ReconcileOutcome::Deleted) => ("deleted", None, None),
                Err(e) => ("error", None, Some(e.to_string())),
            };
            ticks.push(TickRecord {
                at_secs: t,
                autoscaler: key.clone(),
                replicas,
                outcome,
                reason,
                error,
            });
        }
    }

    let mut statuses = Vec::with_capacity(keys.len());
    for key in keys {
        let status = store.get_status(&key)?;
        statuses.push(FinalStatus {
            autoscaler: key,
            status,
        });
    }
    Ok(Report { ticks, statuses })
}
