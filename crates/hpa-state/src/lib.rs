//! hpa-state: embedded store for autoscaler objects and their status.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for autoscaler specs and the status surface the controller
//! writes after each reconciliation.
//!
//! # Architecture
//!
//! Specs and statuses are JSON-serialized into redb's `&[u8]` value columns,
//! both keyed by `{namespace}/{name}`. Engine state (recommendation history
//! and scaling-event ledger) is not stored: it is rebuilt from
//! scratch after a restart.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
