//! Inference: load a checkpoint, classify raw image bytes.

use burn::data::dataloader::batcher::Batcher;
use burn::module::Module;
use burn::record::CompactRecorder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use weathervane_core::persistence::load_json;
use weathervane_core::{WeatherClass, WeathervaneError};

use crate::backend::{default_device, DefaultBackend};
use crate::cnn::{Architecture, ModelSpec, WeatherCnn};
use crate::dataset::{preprocess, WeatherBatch, WeatherBatcher, WeatherItem};
use crate::training::argmax_rows;

/// Metadata saved beside each checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub classes: Vec<String>,
    pub input_size: usize,
    pub architecture: String,
    #[serde(default)]
    pub dropout: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            classes: WeatherClass::names(),
            input_size: 128,
            architecture: "cnn".to_string(),
            dropout: 0.0,
            accuracy: None,
        }
    }
}

/// One classification result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_class: String,
    pub confidence: f32,
    pub probabilities: BTreeMap<String, f32>,
    pub processing_time_seconds: f64,
}

/// A loaded model ready to classify images.
pub struct Predictor {
    model: WeatherCnn<DefaultBackend>,
    metadata: ModelMetadata,
    model_name: String,
    loaded_at: DateTime<Utc>,
}

impl Predictor {
    /// Load a named checkpoint from the models directory.
    ///
    /// `name` is the checkpoint file stem; the metadata sidecar is
    /// optional and defaults apply when it is missing.
    pub fn load(models_path: &Path, name: &str) -> Result<Self, WeathervaneError> {
        let checkpoint = models_path.join(format!("{name}.mpk"));
        if !checkpoint.exists() {
            return Err(WeathervaneError::not_found(format!("model '{name}'")));
        }

        let metadata: ModelMetadata =
            load_json(&models_path.join(format!("{name}.json")))?.unwrap_or_default();

        let architecture = Architecture::parse(&metadata.architecture)?;
        let spec = ModelSpec::new(architecture, metadata.input_size, metadata.dropout);
        let device = default_device();
        let model = WeatherCnn::<DefaultBackend>::new(&spec, &device)
            .load_file(models_path.join(name), &CompactRecorder::new(), &device)
            .map_err(|e| WeathervaneError::model(format!("{e:?}")))?;

        tracing::info!(model = name, architecture = %architecture, "model loaded");

        Ok(Self {
            model,
            metadata,
            model_name: name.to_string(),
            loaded_at: Utc::now(),
        })
    }

    /// Load the most recently modified checkpoint, if any exist.
    pub fn load_latest(models_path: &Path) -> Result<Option<Self>, WeathervaneError> {
        let mut newest: Option<(std::time::SystemTime, String)> = None;
        for name in Self::available_models(models_path)? {
            let path = models_path.join(format!("{name}.mpk"));
            let modified = std::fs::metadata(&path)?.modified()?;
            if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
                newest = Some((modified, name));
            }
        }

        match newest {
            Some((_, name)) => Ok(Some(Self::load(models_path, &name)?)),
            None => Ok(None),
        }
    }

    /// Checkpoint stems present in the models directory, sorted.
    pub fn available_models(models_path: &Path) -> Result<Vec<String>, WeathervaneError> {
        if !models_path.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(models_path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "mpk") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Classify one image from its raw encoded bytes.
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<PredictionResult, WeathervaneError> {
        let results = self.predict_batch(std::slice::from_ref(&bytes))?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| WeathervaneError::inference("empty prediction batch"))
    }

    /// Classify several images with a single forward pass.
    pub fn predict_batch(&self, images: &[&[u8]]) -> Result<Vec<PredictionResult>, WeathervaneError> {
        if images.is_empty() {
            return Err(WeathervaneError::invalid_input("no images to classify"));
        }

        let started = std::time::Instant::now();
        let size = self.metadata.input_size;

        let items: Result<Vec<WeatherItem>, WeathervaneError> = images
            .iter()
            .map(|bytes| {
                let img = image::load_from_memory(bytes)
                    .map_err(|e| WeathervaneError::invalid_input(format!("undecodable image: {e}")))?;
                Ok(WeatherItem::from_data(preprocess(&img, size), 0, String::new()))
            })
            .collect();

        let device = default_device();
        let batcher = WeatherBatcher::new(size);
        let batch: WeatherBatch<DefaultBackend> = batcher.batch(items?, &device);

        let probs: Vec<f32> = self
            .model
            .forward_softmax(batch.images)
            .into_data()
            .to_vec()
            .map_err(|e| WeathervaneError::inference(format!("{e:?}")))?;

        let num_classes = self.metadata.classes.len();
        let elapsed = started.elapsed().as_secs_f64();

        let mut results = Vec::with_capacity(images.len());
        for (row, &winner) in probs
            .chunks(num_classes)
            .zip(argmax_rows(&probs, num_classes).iter())
        {
            let probabilities: BTreeMap<String, f32> = self
                .metadata
                .classes
                .iter()
                .cloned()
                .zip(row.iter().copied())
                .collect();

            results.push(PredictionResult {
                predicted_class: self.metadata.classes[winner].clone(),
                confidence: row[winner],
                probabilities,
                processing_time_seconds: elapsed,
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::TrainingRunner;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use weathervane_core::config::TrainingConfig;
    use weathervane_data::split::{DatasetSplits, SplitConfig};

    fn png_bytes(value: u8) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(20, 20, image::Rgb([value, value, value]));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        bytes
    }

    fn train_tiny_model(out: &Path) -> String {
        let data_dir = TempDir::new().unwrap();
        let mut samples = Vec::new();
        for (ci, class) in WeatherClass::ALL.iter().enumerate() {
            let dir = data_dir.path().join(class.as_str());
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..2 {
                let path = dir.join(format!("img_{i}.png"));
                let shade = (ci * 40) as u8;
                image::RgbImage::from_pixel(16, 16, image::Rgb([shade, shade, shade]))
                    .save(&path)
                    .unwrap();
                samples.push((path, *class));
            }
        }

        let splits = DatasetSplits::stratified(
            samples,
            SplitConfig {
                val_fraction: 0.0,
                test_fraction: 0.5,
                seed: 42,
            },
        )
        .unwrap();

        let config = TrainingConfig {
            architecture: "cnn_lite".to_string(),
            epochs: 1,
            batch_size: 4,
            learning_rate: 1e-3,
            image_size: 16,
            dropout: 0.0,
            seed: 42,
            val_split: 0.0,
            test_split: 0.5,
        };
        let runner = TrainingRunner::new(out.to_path_buf(), out.join("artifacts"), config);
        runner.run(&splits).unwrap().model_name
    }

    #[test]
    fn test_load_missing_model() {
        let dir = TempDir::new().unwrap();
        assert!(Predictor::load(dir.path(), "nope").is_err());
    }

    #[test]
    fn test_available_models_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(Predictor::available_models(dir.path()).unwrap().is_empty());
        assert!(Predictor::available_models(&dir.path().join("missing"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_load_latest_none_when_no_checkpoints() {
        let dir = TempDir::new().unwrap();
        assert!(Predictor::load_latest(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_round_trip_predict() {
        let models = TempDir::new().unwrap();
        let name = train_tiny_model(models.path());

        assert_eq!(
            Predictor::available_models(models.path()).unwrap(),
            vec![name.clone()]
        );

        let predictor = Predictor::load_latest(models.path()).unwrap().unwrap();
        assert_eq!(predictor.model_name(), name);

        let result = predictor.predict_bytes(&png_bytes(128)).unwrap();
        assert!(WeatherClass::names().contains(&result.predicted_class));
        assert_eq!(result.probabilities.len(), WeatherClass::COUNT);

        let total: f32 = result.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-3);
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn test_predict_batch_sizes() {
        let models = TempDir::new().unwrap();
        train_tiny_model(models.path());
        let predictor = Predictor::load_latest(models.path()).unwrap().unwrap();

        let a = png_bytes(10);
        let b = png_bytes(200);
        let results = predictor.predict_batch(&[a.as_slice(), b.as_slice()]).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_undecodable_bytes_rejected() {
        let models = TempDir::new().unwrap();
        train_tiny_model(models.path());
        let predictor = Predictor::load_latest(models.path()).unwrap().unwrap();
        assert!(predictor.predict_bytes(b"not an image").is_err());
    }

    #[test]
    fn test_empty_batch_rejected() {
        let models = TempDir::new().unwrap();
        train_tiny_model(models.path());
        let predictor = Predictor::load_latest(models.path()).unwrap().unwrap();
        assert!(predictor.predict_batch(&[]).is_err());
    }
}
