//! Recommendation history: timestamped raw recommendations for one
//! autoscaler, pruned by stabilization window age.

use std::collections::VecDeque;

use hpa_core::{AutoscaleError, AutoscaleResult};

/// One raw recommendation. Immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recommendation {
    pub timestamp: u64,
    pub desired_replicas: u32,
}

/// Append-only log ordered by non-decreasing timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecommendationHistory {
    entries: VecDeque<Recommendation>,
}

impl RecommendationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a recommendation for tick `timestamp`.
    ///
    /// A second append for the latest timestamp replaces it, so replaying a
    /// tick leaves the history as it was. Older timestamps are rejected.
    pub fn append(&mut self, timestamp: u64, desired_replicas: u32) -> AutoscaleResult<()> {
        let entry = Recommendation {
            timestamp,
            desired_replicas,
        };
        match self.entries.back_mut() {
            Some(last) if last.timestamp > timestamp => Err(AutoscaleError::StaleTick {
                latest: last.timestamp,
                attempted: timestamp,
            }),
            Some(last) if last.timestamp == timestamp => {
                *last = entry;
                Ok(())
            }
            _ => {
                self.entries.push_back(entry);
                Ok(())
            }
        }
    }

    /// Drop entries older than `retention_secs` before the latest entry.
    pub fn prune(&mut self, retention_secs: u32) {
        let Some(latest) = self.latest_timestamp() else {
            return;
        };
        let cutoff = latest.saturating_sub(retention_secs as u64);
        while self
            .entries
            .front()
            .is_some_and(|e| e.timestamp < cutoff)
        {
            self.entries.pop_front();
        }
    }

    /// Entries with `now - window_secs <= timestamp <= now`.
    pub fn within(&self, now: u64, window_secs: u32) -> impl Iterator<Item = &Recommendation> {
        let start = now.saturating_sub(window_secs as u64);
        self.entries
            .iter()
            .filter(move |e| e.timestamp >= start && e.timestamp <= now)
    }

    pub fn latest_timestamp(&self) -> Option<u64> {
        self.entries.back().map(|e| e.timestamp)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recommendation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
