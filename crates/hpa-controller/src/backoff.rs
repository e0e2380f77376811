//! Per-key exponential backoff for requeueing failed reconciliations.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;

/// Tracks consecutive failures per key.
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure and return how long to wait before retrying.
    pub async fn next_delay(&self, key: &str) -> Duration {
        let mut failures = self.failures.lock().await;
        let count = failures.entry(key.to_string()).or_insert(0);
        let delay = delay_for(self.base, self.max, *count);
        *count = count.saturating_add(1);
        delay
    }

    /// Reset a key after a success.
    pub async fn forget(&self, key: &str) {
        self.failures.lock().await.remove(key);
    }

    pub async fn failures(&self, key: &str) -> u32 {
        self.failures.lock().await.get(key).copied().unwrap_or(0)
    }
}

/// `base * 2^failures`, capped at `max`.
fn delay_for(base: Duration, max: Duration, failures: u32) -> Duration {
    let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}
