//! hpa-controller: runs the decision engine for every stored autoscaler.
//!
//! # Architecture
//!
//! ```text
//! Controller
//!   ├── resync loop  → enqueue every stored autoscaler each sync period
//!   └── N workers    → WorkQueue::get → Reconciler::reconcile → done
//!                       on retryable error: add_after(backoff)
//!
//! Reconciler::reconcile(key)
//!   load spec → ScaleClient::get_replicas → MetricSource::get_metric (each)
//!   → DecisionEngine::decide → ScaleClient::set_replicas → confirm → status
//! ```
//!
//! The work queue hands a key to at most one worker at a time, so each
//! autoscaler's engine state has a single writer.

pub mod backoff;
pub mod clock;
pub mod controller;
pub mod queue;
pub mod reconciler;
pub mod source;

pub use backoff::Backoff;
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::Controller;
pub use queue::WorkQueue;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use source::{InMemoryMetrics, InMemoryScale, MetricSource, ScaleClient};
