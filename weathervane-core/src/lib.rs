//! # weathervane-core - shared foundation for the Weathervane pipeline
//!
//! Domain types (weather classes, image records), the crate-wide error
//! type, configuration, JSON persistence helpers, and the local run
//! tracker used by the validation and training stages.

pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod tracking;

pub use config::WeathervaneConfig;
pub use domain::WeatherClass;
pub use error::WeathervaneError;
pub use tracking::{RunStatus, RunTracker, TrackedRun};
