//! Stratified train/validation/test splits.
//!
//! Splits are drawn per class so every split preserves the dataset's
//! class distribution, with a seeded RNG for reproducibility.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use weathervane_core::{persistence, WeatherClass, WeathervaneError};

/// Split fractions and seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    pub val_fraction: f64,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            val_fraction: 0.1,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl SplitConfig {
    fn validate(&self) -> Result<(), WeathervaneError> {
        if self.val_fraction < 0.0 || self.test_fraction < 0.0 {
            return Err(WeathervaneError::invalid_input(
                "split fractions must be non-negative",
            ));
        }
        if self.val_fraction + self.test_fraction >= 1.0 {
            return Err(WeathervaneError::invalid_input(
                "validation and test fractions must sum to less than 1.0",
            ));
        }
        Ok(())
    }
}

/// A labeled sample assigned to a split.
pub type Sample = (PathBuf, WeatherClass);

/// Stratified dataset splits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplits {
    pub train: Vec<Sample>,
    pub val: Vec<Sample>,
    pub test: Vec<Sample>,
    pub config: SplitConfig,
}

impl DatasetSplits {
    /// Partition labeled samples into train/val/test, stratified by class.
    pub fn stratified(samples: Vec<Sample>, config: SplitConfig) -> Result<Self, WeathervaneError> {
        config.validate()?;
        if samples.is_empty() {
            return Err(WeathervaneError::data("no samples to split"));
        }

        let mut by_class: BTreeMap<usize, Vec<Sample>> = BTreeMap::new();
        for sample in samples {
            by_class.entry(sample.1.index()).or_default().push(sample);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut train = Vec::new();
        let mut val = Vec::new();
        let mut test = Vec::new();

        for (_, mut class_samples) in by_class {
            class_samples.shuffle(&mut rng);
            let n = class_samples.len();
            let n_test = (n as f64 * config.test_fraction).round() as usize;
            let n_val = (n as f64 * config.val_fraction).round() as usize;
            // Test and val come off the top; the remainder trains.
            let mut iter = class_samples.into_iter();
            test.extend(iter.by_ref().take(n_test));
            val.extend(iter.by_ref().take(n_val));
            train.extend(iter);
        }

        tracing::info!(
            train = train.len(),
            val = val.len(),
            test = test.len(),
            "stratified splits created"
        );

        Ok(Self {
            train,
            val,
            test,
            config,
        })
    }

    /// Per-split class counts, canonical class order.
    pub fn class_distribution(split: &[Sample]) -> Vec<usize> {
        let mut counts = vec![0usize; WeatherClass::COUNT];
        for (_, class) in split {
            counts[class.index()] += 1;
        }
        counts
    }

    /// Persist the split manifest as JSON.
    pub fn save(&self, output_path: &Path) -> Result<PathBuf, WeathervaneError> {
        let path = output_path.join("splits.json");
        persistence::atomic_write_json(&path, self)?;
        Ok(path)
    }

    /// Load a previously saved split manifest.
    pub fn load(path: &Path) -> Result<Self, WeathervaneError> {
        persistence::load_json(path)?
            .ok_or_else(|| WeathervaneError::not_found(format!("split manifest {}", path.display())))
    }
}
