//! Configuration types for the weathervane pipeline.
//!
//! Each subsystem gets its own sub-config with serde defaults so a
//! partial TOML file (or none at all) always yields a usable config.

use crate::error::WeathervaneError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeathervaneConfig {
    /// Data validation configuration.
    #[serde(default)]
    pub data: DataConfig,
    /// Training configuration.
    #[serde(default)]
    pub training: TrainingConfig,
    /// Model registry configuration.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Prediction server configuration.
    #[serde(default)]
    pub server: ServerConfig,
}

impl WeathervaneConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, WeathervaneError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| WeathervaneError::config(e.to_string()))
    }

    /// Load from a TOML file if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, WeathervaneError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Data validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Minimum accepted image edge length in pixels.
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,
    /// Maximum accepted image edge length in pixels.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    /// Class-count ratio above which the dataset counts as imbalanced.
    #[serde(default = "default_imbalance_threshold")]
    pub imbalance_threshold: f64,
    /// Minimum number of class directories required to pass validation.
    #[serde(default = "default_min_classes")]
    pub min_classes: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            min_dimension: default_min_dimension(),
            max_dimension: default_max_dimension(),
            imbalance_threshold: default_imbalance_threshold(),
            min_classes: default_min_classes(),
        }
    }
}

fn default_min_dimension() -> u32 {
    32
}

fn default_max_dimension() -> u32 {
    4096
}

fn default_imbalance_threshold() -> f64 {
    3.0
}

fn default_min_classes() -> usize {
    3
}

/// Training configuration defaults; individual runs can override any of
/// these through the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Architecture identifier ("cnn" or "cnn_lite").
    #[serde(default = "default_architecture")]
    pub architecture: String,
    /// Number of training epochs.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Mini-batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Adam learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Square input edge length fed to the network.
    #[serde(default = "default_image_size")]
    pub image_size: usize,
    /// Dropout rate in the classifier head.
    #[serde(default = "default_dropout")]
    pub dropout: f64,
    /// RNG seed for splits and epoch shuffles.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Validation split fraction.
    #[serde(default = "default_val_split")]
    pub val_split: f64,
    /// Test split fraction.
    #[serde(default = "default_test_split")]
    pub test_split: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            architecture: default_architecture(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            image_size: default_image_size(),
            dropout: default_dropout(),
            seed: default_seed(),
            val_split: default_val_split(),
            test_split: default_test_split(),
        }
    }
}

fn default_architecture() -> String {
    "cnn".to_string()
}

fn default_epochs() -> usize {
    30
}

fn default_batch_size() -> usize {
    32
}

fn default_learning_rate() -> f64 {
    1e-3
}

fn default_image_size() -> usize {
    128
}

fn default_dropout() -> f64 {
    0.3
}

fn default_seed() -> u64 {
    42
}

fn default_val_split() -> f64 {
    0.1
}

fn default_test_split() -> f64 {
    0.2
}

/// Model registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory holding model checkpoints and the registry catalog.
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
    /// Directory holding run artifacts (reports, metadata).
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

fn default_models_dir() -> String {
    "models".to_string()
}

fn default_artifacts_dir() -> String {
    "artifacts".to_string()
}

/// Prediction server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of images per batch prediction request.
    #[serde(default = "default_max_batch")]
    pub max_batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_batch_size: default_max_batch(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_batch() -> usize {
    10
}
