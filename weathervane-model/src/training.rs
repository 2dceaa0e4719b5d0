//! Training runner: fits a classifier on stratified splits, evaluates
//! on the held-out test split, saves the checkpoint, and registers it.

use burn::data::dataloader::batcher::Batcher;
use burn::module::{AutodiffModule, Module};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::CompactRecorder;
use burn::tensor::ElementConversion;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::time::Instant;
use weathervane_core::config::TrainingConfig;
use weathervane_core::persistence::atomic_write_json;
use weathervane_core::{WeatherClass, WeathervaneError};
use weathervane_data::split::{DatasetSplits, Sample};

use crate::backend::{default_device, DefaultBackend, TrainingBackend};
use crate::cnn::{Architecture, ModelSpec, WeatherCnn};
use crate::dataset::{WeatherBatcher, WeatherItem};
use crate::metrics::{ClassificationMetrics, TrainingMetrics};
use crate::predictor::ModelMetadata;
use crate::registry::ModelRegistry;

/// Everything a completed training run produced.
#[derive(Debug, Clone)]
pub struct TrainedArtifact {
    pub model_name: String,
    pub checkpoint_path: PathBuf,
    pub metadata_path: PathBuf,
    pub metrics: TrainingMetrics,
    pub evaluation: ClassificationMetrics,
}

/// Orchestrates a full training run end to end.
pub struct TrainingRunner {
    models_path: PathBuf,
    artifacts_path: PathBuf,
    config: TrainingConfig,
}

impl TrainingRunner {
    pub fn new(models_path: PathBuf, artifacts_path: PathBuf, config: TrainingConfig) -> Self {
        Self {
            models_path,
            artifacts_path,
            config,
        }
    }

    /// Train on the given splits and register the resulting checkpoint.
    pub fn run(&self, splits: &DatasetSplits) -> Result<TrainedArtifact, WeathervaneError> {
        if splits.train.is_empty() {
            return Err(WeathervaneError::training("training split is empty"));
        }
        if self.config.batch_size == 0 {
            return Err(WeathervaneError::invalid_input("batch size must be at least 1"));
        }

        let architecture = Architecture::parse(&self.config.architecture)?;
        let spec = ModelSpec::new(architecture, self.config.image_size, self.config.dropout);
        let device = default_device();

        tracing::info!(
            architecture = %architecture,
            epochs = self.config.epochs,
            train = splits.train.len(),
            val = splits.val.len(),
            test = splits.test.len(),
            "starting training run"
        );

        let started = Instant::now();
        let (model, mut metrics) = self.fit(&spec, splits, &device)?;
        metrics.total_training_time_secs = started.elapsed().as_secs_f64();

        let (truth, predicted) = evaluate(
            &model,
            &splits.test,
            self.config.image_size,
            self.config.batch_size,
            &device,
        )?;
        let evaluation = ClassificationMetrics::from_predictions(&truth, &predicted);
        tracing::info!(
            test_accuracy = evaluation.accuracy,
            macro_f1 = evaluation.macro_f1,
            "evaluation complete"
        );

        let model_name = format!(
            "weather_classifier_{}_{}",
            architecture,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let (checkpoint_path, metadata_path) =
            self.persist(&model, &spec, &model_name, &evaluation)?;

        let mut registry = ModelRegistry::load(&self.models_path)?;
        registry.register(
            &model_name,
            architecture,
            checkpoint_path.clone(),
            Some(evaluation.accuracy),
        );
        registry.save(&self.models_path)?;

        Ok(TrainedArtifact {
            model_name,
            checkpoint_path,
            metadata_path,
            metrics,
            evaluation,
        })
    }

    /// The epoch loop. Returns the trained inference-side model.
    fn fit(
        &self,
        spec: &ModelSpec,
        splits: &DatasetSplits,
        device: &<DefaultBackend as burn::tensor::backend::BackendTypes>::Device,
    ) -> Result<(WeatherCnn<DefaultBackend>, TrainingMetrics), WeathervaneError> {
        let mut model = WeatherCnn::<TrainingBackend>::new(spec, device);
        let mut optimizer = AdamConfig::new().init();
        let loss_fn = CrossEntropyLossConfig::new().init(device);
        let batcher = WeatherBatcher::new(self.config.image_size);

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut order: Vec<usize> = (0..splits.train.len()).collect();
        let mut metrics = TrainingMetrics::default();

        for epoch in 1..=self.config.epochs {
            order.shuffle(&mut rng);

            let mut epoch_loss = 0.0f64;
            let mut batches = 0usize;
            let mut train_correct = 0usize;
            let mut train_total = 0usize;

            for chunk in order.chunks(self.config.batch_size) {
                let items = load_items(
                    chunk.iter().map(|&i| &splits.train[i]),
                    self.config.image_size,
                );
                if items.is_empty() {
                    continue;
                }

                let batch: crate::dataset::WeatherBatch<TrainingBackend> =
                    batcher.batch(items, device);
                let logits = model.forward(batch.images);
                let loss = loss_fn.forward(logits.clone(), batch.targets.clone());

                epoch_loss += loss.clone().into_scalar().elem::<f64>();
                batches += 1;

                let targets: Vec<i64> = batch
                    .targets
                    .into_data()
                    .to_vec()
                    .map_err(|e| WeathervaneError::training(format!("{e:?}")))?;
                let probs: Vec<f32> = logits
                    .into_data()
                    .to_vec()
                    .map_err(|e| WeathervaneError::training(format!("{e:?}")))?;
                for (row, &target) in argmax_rows(&probs, spec.num_classes)
                    .iter()
                    .zip(targets.iter())
                {
                    if *row == target as usize {
                        train_correct += 1;
                    }
                    train_total += 1;
                }

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(self.config.learning_rate, model, grads);
            }

            let avg_loss = if batches > 0 {
                epoch_loss / batches as f64
            } else {
                0.0
            };
            let train_accuracy = if train_total > 0 {
                train_correct as f64 / train_total as f64
            } else {
                0.0
            };

            let val_accuracy = if splits.val.is_empty() {
                0.0
            } else {
                let (truth, predicted) = evaluate(
                    &model.valid(),
                    &splits.val,
                    self.config.image_size,
                    self.config.batch_size,
                    device,
                )?;
                ClassificationMetrics::from_predictions(&truth, &predicted).accuracy
            };

            metrics.record_epoch(avg_loss, train_accuracy, val_accuracy);
            tracing::info!(
                epoch,
                loss = avg_loss,
                train_accuracy,
                val_accuracy,
                "epoch complete"
            );
        }

        Ok((model.valid(), metrics))
    }

    /// Save the checkpoint and its metadata sidecar.
    fn persist(
        &self,
        model: &WeatherCnn<DefaultBackend>,
        spec: &ModelSpec,
        model_name: &str,
        evaluation: &ClassificationMetrics,
    ) -> Result<(PathBuf, PathBuf), WeathervaneError> {
        std::fs::create_dir_all(&self.models_path)?;
        std::fs::create_dir_all(&self.artifacts_path)?;

        // CompactRecorder appends the .mpk extension itself.
        let stem = self.models_path.join(model_name);
        model
            .clone()
            .save_file(&stem, &CompactRecorder::new())
            .map_err(|e| WeathervaneError::model(format!("{e:?}")))?;
        let checkpoint_path = stem.with_extension("mpk");

        let metadata = ModelMetadata {
            classes: WeatherClass::names(),
            input_size: spec.image_size,
            architecture: spec.architecture.as_str().to_string(),
            dropout: spec.dropout,
            accuracy: Some(evaluation.accuracy),
        };
        let metadata_path = self.models_path.join(format!("{model_name}.json"));
        atomic_write_json(&metadata_path, &metadata)?;

        let eval_path = self
            .artifacts_path
            .join(format!("{model_name}_evaluation.json"));
        atomic_write_json(&eval_path, evaluation)?;

        Ok((checkpoint_path, metadata_path))
    }
}

/// Run inference over `samples` and collect truth/predicted label pairs.
fn evaluate(
    model: &WeatherCnn<DefaultBackend>,
    samples: &[Sample],
    image_size: usize,
    batch_size: usize,
    device: &<DefaultBackend as burn::tensor::backend::BackendTypes>::Device,
) -> Result<(Vec<usize>, Vec<usize>), WeathervaneError> {
    let batcher = WeatherBatcher::new(image_size);
    let mut truth = Vec::with_capacity(samples.len());
    let mut predicted = Vec::with_capacity(samples.len());

    for chunk in samples.chunks(batch_size.max(1)) {
        let items = load_items(chunk.iter(), image_size);
        if items.is_empty() {
            continue;
        }
        truth.extend(items.iter().map(|item| item.label));

        let batch: crate::dataset::WeatherBatch<DefaultBackend> = batcher.batch(items, device);
        let probs: Vec<f32> = model
            .forward_softmax(batch.images)
            .into_data()
            .to_vec()
            .map_err(|e| WeathervaneError::inference(format!("{e:?}")))?;
        predicted.extend(argmax_rows(&probs, WeatherClass::COUNT));
    }

    Ok((truth, predicted))
}

/// Load a chunk of labeled samples, dropping files that fail to decode.
fn load_items<'a>(
    samples: impl Iterator<Item = &'a Sample>,
    image_size: usize,
) -> Vec<WeatherItem> {
    samples
        .filter_map(|(path, class)| {
            match WeatherItem::from_path(path, class.index(), image_size) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image");
                    None
                }
            }
        })
        .collect()
}

/// Row-wise argmax over a flattened `[rows, num_classes]` matrix.
pub(crate) fn argmax_rows(values: &[f32], num_classes: usize) -> Vec<usize> {
    values
        .chunks(num_classes)
        .map(|row| {
            row.iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(i, _)| i)
                .unwrap_or(0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;
    use weathervane_data::split::SplitConfig;

    fn write_dataset(root: &Path, per_class: usize) -> Vec<Sample> {
        let mut samples = Vec::new();
        for (ci, class) in WeatherClass::ALL.iter().enumerate() {
            let dir = root.join(class.as_str());
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let path = dir.join(format!("img_{i}.png"));
                let shade = (ci * 50) as u8;
                let img = image::RgbImage::from_pixel(16, 16, image::Rgb([shade, shade, shade]));
                img.save(&path).unwrap();
                samples.push((path, *class));
            }
        }
        samples
    }

    fn tiny_config() -> TrainingConfig {
        TrainingConfig {
            architecture: "cnn_lite".to_string(),
            epochs: 1,
            batch_size: 4,
            learning_rate: 1e-3,
            image_size: 16,
            dropout: 0.0,
            seed: 42,
            val_split: 0.1,
            test_split: 0.2,
        }
    }

    #[test]
    fn test_argmax_rows() {
        let values = vec![0.1, 0.7, 0.2, 0.9, 0.05, 0.05];
        assert_eq!(argmax_rows(&values, 3), vec![1, 0]);
    }

    #[test]
    fn test_training_run_produces_registered_checkpoint() {
        let data_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let samples = write_dataset(data_dir.path(), 3);

        let splits = DatasetSplits::stratified(
            samples,
            SplitConfig {
                val_fraction: 0.0,
                test_fraction: 0.34,
                seed: 42,
            },
        )
        .unwrap();

        let models = out_dir.path().join("models");
        let artifacts = out_dir.path().join("artifacts");
        let runner = TrainingRunner::new(models.clone(), artifacts, tiny_config());

        let artifact = runner.run(&splits).unwrap();
        assert!(artifact.checkpoint_path.exists());
        assert!(artifact.metadata_path.exists());
        assert_eq!(artifact.metrics.epochs_completed, 1);
        assert!(artifact.model_name.starts_with("weather_classifier_cnn_lite_"));

        let registry = ModelRegistry::load(&models).unwrap();
        let registered = registry.find_by_name(&artifact.model_name).unwrap();
        assert_eq!(registered.version, 1);
        assert_eq!(registered.accuracy, Some(artifact.evaluation.accuracy));
    }

    #[test]
    fn test_empty_train_split_rejected() {
        let dir = TempDir::new().unwrap();
        let runner = TrainingRunner::new(
            dir.path().join("models"),
            dir.path().join("artifacts"),
            tiny_config(),
        );
        let splits = DatasetSplits {
            train: Vec::new(),
            val: Vec::new(),
            test: Vec::new(),
            config: SplitConfig::default(),
        };
        assert!(runner.run(&splits).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let samples = write_dataset(data_dir.path(), 2);
        let splits = DatasetSplits {
            train: samples,
            val: Vec::new(),
            test: Vec::new(),
            config: SplitConfig::default(),
        };
        let config = TrainingConfig {
            batch_size: 0,
            ..tiny_config()
        };
        let runner = TrainingRunner::new(
            dir.path().join("models"),
            dir.path().join("artifacts"),
            config,
        );
        // Must surface as an error, not a panic from the batching loop.
        let err = runner.run(&splits).unwrap_err();
        assert!(err.to_string().contains("batch size"));
    }

    #[test]
    fn test_unknown_architecture_rejected() {
        let dir = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let samples = write_dataset(data_dir.path(), 2);
        let splits = DatasetSplits {
            train: samples,
            val: Vec::new(),
            test: Vec::new(),
            config: SplitConfig::default(),
        };

        let mut config = tiny_config();
        config.architecture = "transformer".to_string();
        let runner = TrainingRunner::new(
            dir.path().join("models"),
            dir.path().join("artifacts"),
            config,
        );
        assert!(runner.run(&splits).is_err());
    }
}
