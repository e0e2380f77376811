//! Rate limiter: bounds how far replicas may move in one direction given
//! the change already consumed within each policy's trailing period.
//!
//! Every policy yields a candidate bound (a replica count). Candidates are
//! reduced by the rule's `select_policy`: `Max` keeps the one permitting the
//! largest change, `Min` the smallest.

use hpa_core::{PolicyKind, ScaleDirection, ScalingPolicy, ScalingRules, SelectPolicy};

use crate::ledger::ScalingLedger;

/// The furthest replicas may move in one direction this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateBound {
    /// No policies: the direction is unbounded.
    Unbounded,
    /// Changes in this direction are forbidden.
    Disabled,
    /// At most `replicas` (scale-up) or at least `replicas` (scale-down).
    Limit {
        replicas: u32,
        policy: ScalingPolicy,
    },
}

impl RateBound {
    /// Apply the bound to a target moving in `direction` from `current`.
    /// Returns the bounded target and whether the bound cut it.
    pub fn apply(&self, direction: ScaleDirection, current: u32, target: u32) -> (u32, bool) {
        match (self, direction) {
            (RateBound::Unbounded, _) => (target, false),
            (RateBound::Disabled, _) => (current, target != current),
            (RateBound::Limit { replicas, .. }, ScaleDirection::Up) => {
                if target > *replicas {
                    (*replicas, true)
                } else {
                    (target, false)
                }
            }
            (RateBound::Limit { replicas, .. }, ScaleDirection::Down) => {
                if target < *replicas {
                    (*replicas, true)
                } else {
                    (target, false)
                }
            }
        }
    }
}

/// Compute the bound for `direction` at tick `now`.
pub fn bound(
    rules: &ScalingRules,
    direction: ScaleDirection,
    current_replicas: u32,
    ledger: &ScalingLedger,
    now: u64,
) -> RateBound {
    if rules.select_policy == SelectPolicy::Disabled {
        return RateBound::Disabled;
    }

    let candidates = rules.policies.iter().map(|policy| {
        let replicas = policy_bound(policy, direction, current_replicas, ledger, now);
        (replicas, *policy)
    });

    let selected = candidates.reduce(|best, next| {
        let prefer_next = match rules.select_policy {
            SelectPolicy::Min => more_permissive(direction, best.0, next.0),
            _ => more_permissive(direction, next.0, best.0),
        };
        if prefer_next { next } else { best }
    });

    match selected {
        None => RateBound::Unbounded,
        Some((replicas, policy)) => {
            // A bound never reverses the direction of the decision.
            let replicas = match direction {
                ScaleDirection::Up => replicas.max(current_replicas),
                ScaleDirection::Down => replicas.min(current_replicas),
            };
            RateBound::Limit { replicas, policy }
        }
    }
}

/// Whether bound `a` permits more change than bound `b`.
fn more_permissive(direction: ScaleDirection, a: u32, b: u32) -> bool {
    match direction {
        ScaleDirection::Up => a > b,
        ScaleDirection::Down => a < b,
    }
}

/// Bound implied by one policy, measured from the replica count at the
/// start of its trailing period.
fn policy_bound(
    policy: &ScalingPolicy,
    direction: ScaleDirection,
    current_replicas: u32,
    ledger: &ScalingLedger,
    now: u64,
) -> u32 {
    let changes = ledger.changes_within(now, policy.period_secs);
    let current = current_replicas as i64;
    let added = changes.added as i64;
    let removed = changes.removed as i64;

    let period_start = match direction {
        ScaleDirection::Up => current - added + removed,
        ScaleDirection::Down => current + removed - added,
    }
    .max(0);

    let allowed = match policy.kind {
        PolicyKind::Pods => policy.value as i64,
        // ceil(start * v / 100)
        PolicyKind::Percent => (period_start * policy.value as i64 + 99) / 100,
    };

    let bound = match direction {
        ScaleDirection::Up => period_start + allowed,
        ScaleDirection::Down => period_start - allowed,
    };
    bound.clamp(0, u32::MAX as i64) as u32
}
