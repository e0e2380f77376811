//! hpa-engine: horizontal autoscaling decisions.
//!
//! Turns already-fetched metric readings into a target replica count.
//! Nothing in this crate performs I/O or reads the clock: the caller passes
//! the tick timestamp, and each autoscaler owns its own [`DecisionEngine`]
//! (recommendation history plus scaling-event ledger).
//!
//! # Decision Pipeline
//!
//! ```text
//! per metric:   raw = ceil(current_replicas * current / target)
//!               raw = current_replicas   if |current/target - 1| <= tolerance
//! aggregate:    raw = max over metrics
//! history:      append (now, raw), prune to the longest stabilization window
//! stabilize:    down → max recommendation within scale_down window
//!               up   → min recommendation within scale_up window
//! rate limit:   per policy, bound from replicas at the start of its period
//!               (reconstructed from the ledger), reduced by select_policy
//! clamp:        [min_replicas, max_replicas]
//! ```
//!
//! A decision that changes replicas is only written to the ledger once the
//! caller reports the change applied, via [`DecisionEngine::confirm`].

pub mod engine;
pub mod evaluator;
pub mod history;
pub mod ledger;
pub mod limiter;
pub mod stabilizer;

pub use engine::{DecisionEngine, Evaluation, MetricSample};
pub use evaluator::{Evaluated, evaluate};
pub use history::{Recommendation, RecommendationHistory};
pub use ledger::{ScalingEvent, ScalingLedger};
pub use limiter::{RateBound, bound};
pub use stabilizer::{Stabilized, stabilize};
