//! # weathervane-model - training, registry, and inference
//!
//! The burn-based CNN classifier, its dataset and batching adapters, the
//! training runner that produces registered checkpoints, the
//! JSON-backed model registry, and the inference predictor used by the
//! prediction server.

pub mod backend;
pub mod cnn;
pub mod dataset;
pub mod metrics;
pub mod predictor;
pub mod registry;
pub mod training;

pub use backend::{default_device, DefaultBackend, TrainingBackend};
pub use cnn::{Architecture, ModelSpec, WeatherCnn};
pub use metrics::{ClassificationMetrics, TrainingMetrics};
pub use predictor::{ModelMetadata, PredictionResult, Predictor};
pub use registry::{ModelRegistry, ModelStage, RegisteredModel};
pub use training::{TrainedArtifact, TrainingRunner};
