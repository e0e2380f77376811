//! Stabilizer: dampens a raw recommendation using recent history.
//!
//! Scale-down takes the highest recommendation in the scale-down window, so
//! any recent high recommendation vetoes the drop. Scale-up takes the
//! lowest recommendation in the scale-up window; with the default window of
//! zero that is the raw recommendation itself.

use crate::history::RecommendationHistory;

/// Result of stabilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stabilized {
    pub replicas: u32,
    /// History moved the result away from the raw recommendation.
    pub dampened: bool,
}

/// Stabilize `raw` at tick `now`.
///
/// `raw` must already be in `history` (appended for `now`).
pub fn stabilize(
    history: &RecommendationHistory,
    now: u64,
    raw: u32,
    current_replicas: u32,
    scale_up_window_secs: u32,
    scale_down_window_secs: u32,
) -> Stabilized {
    let replicas = if raw < current_replicas {
        let highest = history
            .within(now, scale_down_window_secs)
            .map(|e| e.desired_replicas)
            .max()
            .unwrap_or(raw);
        highest.min(current_replicas)
    } else if raw > current_replicas {
        let lowest = history
            .within(now, scale_up_window_secs)
            .map(|e| e.desired_replicas)
            .min()
            .unwrap_or(raw);
        lowest.max(current_replicas)
    } else {
        current_replicas
    };

    Stabilized {
        replicas,
        dampened: replicas != raw,
    }
}
