use std::collections::HashSet;
use std::path::Path;

use hpa_core::HpaConfig;
use hpa_core::admission;

/// Admit every autoscaler in the config and report each result.
pub fn validate(config_path: &Path) -> anyhow::Result<()> {
    let config = HpaConfig::from_file(config_path)?;
    let gates = config.feature_gates();

    let mut seen = HashSet::new();
    let mut invalid = 0;
    for spec in config.autoscaler_specs() {
        let key = spec.key();
        if !seen.insert(key.clone()) {
            invalid += 1;
            println!("✗ {key}: defined more than once");
            continue;
        }
        match admission::admit(spec, &gates) {
            Ok(admitted) => println!(
                "✓ {key} ({} metric(s), replicas {}..={})",
                admitted.metrics.len(),
                admitted.min_replicas,
                admitted.max_replicas
            ),
            Err(e) => {
                invalid += 1;
                println!("✗ {key}: {e}");
            }
        }
    }

    if invalid > 0 {
        anyhow::bail!("{invalid} autoscaler(s) failed validation");
    }
    Ok(())
}
