//! Scaling event ledger: applied replica changes, queried by trailing
//! window so rate limits can account for change already consumed.

use std::collections::VecDeque;

use hpa_core::ScaleDirection;

/// One applied replica change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingEvent {
    pub timestamp: u64,
    pub from_replicas: u32,
    pub to_replicas: u32,
    pub direction: ScaleDirection,
}

impl ScalingEvent {
    /// Returns `None` when `from == to`.
    pub fn new(timestamp: u64, from_replicas: u32, to_replicas: u32) -> Option<Self> {
        let direction = ScaleDirection::between(from_replicas, to_replicas)?;
        Some(Self {
            timestamp,
            from_replicas,
            to_replicas,
            direction,
        })
    }

    /// Number of pods changed.
    pub fn magnitude(&self) -> u32 {
        self.from_replicas.abs_diff(self.to_replicas)
    }
}

/// Pods added and removed within a trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowChanges {
    pub added: u32,
    pub removed: u32,
}

/// Events ordered by timestamp. Several distinct changes may share a
/// timestamp; an identical event is stored once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalingLedger {
    events: VecDeque<ScalingEvent>,
}

impl ScalingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an applied change. Returns false if the identical event is
    /// already recorded, so a retried confirmation counts once.
    pub fn record(&mut self, event: ScalingEvent) -> bool {
        if self.events.contains(&event) {
            return false;
        }
        let at = self
            .events
            .partition_point(|e| e.timestamp <= event.timestamp);
        self.events.insert(at, event);
        true
    }

    /// Sum of changes with `now - timestamp < period_secs`.
    pub fn changes_within(&self, now: u64, period_secs: u32) -> WindowChanges {
        let mut changes = WindowChanges::default();
        for e in self.events.iter().rev() {
            if now.saturating_sub(e.timestamp) >= period_secs as u64 {
                break;
            }
            if e.timestamp > now {
                continue;
            }
            match e.direction {
                ScaleDirection::Up => changes.added += e.magnitude(),
                ScaleDirection::Down => changes.removed += e.magnitude(),
            }
        }
        changes
    }

    /// Drop events that no longer fall in any period up to `retention_secs`.
    pub fn prune(&mut self, now: u64, retention_secs: u32) {
        while self
            .events
            .front()
            .is_some_and(|e| now.saturating_sub(e.timestamp) >= retention_secs as u64)
        {
            self.events.pop_front();
        }
    }

    pub fn last(&self) -> Option<&ScalingEvent> {
        self.events.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScalingEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
