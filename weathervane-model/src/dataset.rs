//! Burn dataset and batching adapters for labeled weather images.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use weathervane_core::WeathervaneError;

/// A single image ready for the network: flattened CHW floats in [0, 1].
#[derive(Clone, Debug)]
pub struct WeatherItem {
    pub image: Vec<f32>,
    pub label: usize,
    pub path: String,
}

impl WeatherItem {
    /// Load and preprocess an image file.
    pub fn from_path(
        path: &Path,
        label: usize,
        image_size: usize,
    ) -> Result<Self, WeathervaneError> {
        let img = image::ImageReader::open(path)
            .map_err(|e| WeathervaneError::data(format!("{}: {e}", path.display())))?
            .decode()
            .map_err(|e| WeathervaneError::data(format!("{}: {e}", path.display())))?;
        let image = preprocess(&img, image_size);

        Ok(Self {
            image,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }

    pub fn from_data(image: Vec<f32>, label: usize, path: String) -> Self {
        Self { image, label, path }
    }
}

/// Resize to a square and flatten into CHW floats scaled to [0, 1].
pub fn preprocess(img: &image::DynamicImage, image_size: usize) -> Vec<f32> {
    let rgb = img
        .resize_exact(image_size as u32, image_size as u32, FilterType::Triangle)
        .to_rgb8();

    let pixels = image_size * image_size;
    let mut out = vec![0.0f32; 3 * pixels];
    for (i, pixel) in rgb.pixels().enumerate() {
        out[i] = pixel[0] as f32 / 255.0;
        out[pixels + i] = pixel[1] as f32 / 255.0;
        out[2 * pixels + i] = pixel[2] as f32 / 255.0;
    }
    out
}

/// Dataset over `(path, label)` pairs.
///
/// Either lazy (loads on access, decode failures skip the item) or
/// cached (all images loaded up front, failures surface immediately).
#[derive(Debug, Clone)]
pub struct WeatherDataset {
    samples: Vec<(PathBuf, usize)>,
    image_size: usize,
    cached_items: Option<Vec<WeatherItem>>,
}

impl WeatherDataset {
    pub fn new(samples: Vec<(PathBuf, usize)>, image_size: usize) -> Self {
        Self {
            samples,
            image_size,
            cached_items: None,
        }
    }

    /// Load every image into memory up front.
    pub fn cached(
        samples: Vec<(PathBuf, usize)>,
        image_size: usize,
    ) -> Result<Self, WeathervaneError> {
        let cached: Result<Vec<_>, _> = samples
            .iter()
            .map(|(path, label)| WeatherItem::from_path(path, *label, image_size))
            .collect();

        Ok(Self {
            samples,
            image_size,
            cached_items: Some(cached?),
        })
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }
}

impl Dataset<WeatherItem> for WeatherDataset {
    fn get(&self, index: usize) -> Option<WeatherItem> {
        if let Some(ref cached) = self.cached_items {
            return cached.get(index).cloned();
        }
        let (path, label) = self.samples.get(index)?;
        WeatherItem::from_path(path, *label, self.image_size).ok()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A training batch.
#[derive(Clone, Debug)]
pub struct WeatherBatch<B: Backend> {
    /// Shape `[batch, 3, size, size]`.
    pub images: Tensor<B, 4>,
    /// Shape `[batch]`.
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks items into tensors.
#[derive(Clone, Debug)]
pub struct WeatherBatcher {
    image_size: usize,
}

impl WeatherBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, WeatherItem, WeatherBatch<B>> for WeatherBatcher {
    fn batch(&self, items: Vec<WeatherItem>, device: &B::Device) -> WeatherBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        WeatherBatch { images, targets }
    }
}
