pub mod admission;
pub mod config;
pub mod error;
pub mod status;
pub mod types;

pub use admission::FeatureGates;
pub use config::{ControllerSettings, HpaConfig};
pub use error::{AutoscaleError, AutoscaleResult, FieldError, InvalidSpec};
pub use status::*;
pub use types::*;
