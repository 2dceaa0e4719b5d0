//! Per-image integrity validation and class-balance checks.

use crate::report::ValidationReport;
use crate::scan::{self, StructureScan};
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use weathervane_core::config::DataConfig;
use weathervane_core::domain::{FailureReason, ImageRecord};
use weathervane_core::{WeatherClass, WeathervaneError};

/// Summary statistics over one image dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionStats {
    pub mean: f64,
    pub std: f64,
    pub min: u32,
    pub max: u32,
}

impl DimensionStats {
    fn from_samples(samples: &[u32]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n;
        let variance = samples
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        Some(Self {
            mean,
            std: variance.sqrt(),
            min: samples.iter().copied().min().unwrap_or(0),
            max: samples.iter().copied().max().unwrap_or(0),
        })
    }
}

/// Outcome of checking every image file individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageValidation {
    pub valid_images: usize,
    /// Records for every rejected file, with the reason.
    pub flagged: Vec<ImageRecord>,
    pub width: Option<DimensionStats>,
    pub height: Option<DimensionStats>,
    /// Distinct channel counts observed across valid images.
    pub channels: Vec<u8>,
}

impl ImageValidation {
    pub fn count_by(&self, reason: FailureReason) -> usize {
        self.flagged.iter().filter(|r| r.failure == reason).count()
    }
}

/// Class-balance assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceReport {
    pub balanced: bool,
    /// Largest-to-smallest class count ratio; `None` when unknowable
    /// (no classes, or an empty class).
    pub imbalance_ratio: Option<f64>,
    pub recommendations: Vec<String>,
}

/// Validates a directory of labeled weather images.
pub struct DataValidator {
    data_path: PathBuf,
    output_path: PathBuf,
    config: DataConfig,
}

impl DataValidator {
    pub fn new(
        data_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        config: DataConfig,
    ) -> Self {
        Self {
            data_path: data_path.into(),
            output_path: output_path.into(),
            config,
        }
    }

    /// Run the complete validation pipeline and write report artifacts.
    pub fn run(&self) -> Result<ValidationReport, WeathervaneError> {
        tracing::info!(data_path = %self.data_path.display(), "starting data validation");

        let structure = scan::scan_structure(&self.data_path);
        let images = self.validate_images(&structure);
        let balance = self.check_class_balance(&structure.class_counts);

        let report = ValidationReport::assemble(structure, images, balance, &self.config);
        report.write_artifacts(&self.output_path)?;

        tracing::info!(
            passed = report.validation_passed,
            valid = report.images.valid_images,
            "data validation complete"
        );
        Ok(report)
    }

    /// Check every file in the found class directories for format,
    /// corruption, and size problems.
    pub fn validate_images(&self, structure: &StructureScan) -> ImageValidation {
        let mut valid_images = 0usize;
        let mut flagged = Vec::new();
        let mut widths = Vec::new();
        let mut heights = Vec::new();
        let mut channels = Vec::new();

        for &class in &structure.classes_found {
            tracing::debug!(class = %class, "validating images");
            for path in scan::class_files(&self.data_path, class) {
                match self.check_image(&path) {
                    Ok((w, h, c)) => {
                        widths.push(w);
                        heights.push(h);
                        if !channels.contains(&c) {
                            channels.push(c);
                        }
                        valid_images += 1;
                    }
                    Err(reason) => {
                        tracing::warn!(path = %path.display(), ?reason, "image rejected");
                        flagged.push(ImageRecord::flagged(path, class, reason));
                    }
                }
            }
        }
        channels.sort_unstable();

        ImageValidation {
            valid_images,
            flagged,
            width: DimensionStats::from_samples(&widths),
            height: DimensionStats::from_samples(&heights),
            channels,
        }
    }

    /// Validate a single file; returns (width, height, channels) on success.
    fn check_image(&self, path: &Path) -> Result<(u32, u32, u8), FailureReason> {
        if !crate::has_supported_extension(path) {
            return Err(FailureReason::WrongFormat);
        }

        let decoded = image::ImageReader::open(path)
            .map_err(|_| FailureReason::Corrupted)?
            .with_guessed_format()
            .map_err(|_| FailureReason::Corrupted)?
            .decode()
            .map_err(|_| FailureReason::Corrupted)?;

        let (width, height) = decoded.dimensions();
        let min = self.config.min_dimension;
        let max = self.config.max_dimension;
        if width < min || height < min || width > max || height > max {
            return Err(FailureReason::WrongSize);
        }

        Ok((width, height, decoded.color().channel_count()))
    }

    /// Assess class balance from the per-class counts.
    pub fn check_class_balance(&self, class_counts: &BTreeMap<String, usize>) -> BalanceReport {
        if class_counts.is_empty() {
            return BalanceReport {
                balanced: false,
                imbalance_ratio: None,
                recommendations: Vec::new(),
            };
        }

        let min = class_counts.values().copied().min().unwrap_or(0);
        let max = class_counts.values().copied().max().unwrap_or(0);
        let ratio = if min > 0 {
            Some(max as f64 / min as f64)
        } else {
            None
        };
        let balanced = ratio.map(|r| r <= self.config.imbalance_threshold) == Some(true);

        let mut recommendations = Vec::new();
        if !balanced {
            match ratio {
                Some(r) => recommendations.push(format!("Dataset is imbalanced (ratio: {r:.2}:1)")),
                None => recommendations.push("At least one class directory is empty".to_string()),
            }
            recommendations
                .push("Consider data augmentation for underrepresented classes".to_string());
            recommendations
                .push("Or use stratified sampling during train/test split".to_string());
        }

        BalanceReport {
            balanced,
            imbalance_ratio: ratio,
            recommendations,
        }
    }

    /// All valid labeled images, ready for splitting or training.
    pub fn labeled_images(&self) -> Vec<(PathBuf, WeatherClass)> {
        let structure = scan::scan_structure(&self.data_path);
        let mut samples = Vec::new();
        for &class in &structure.classes_found {
            for path in scan::class_images(&self.data_path, class) {
                samples.push((path, class));
            }
        }
        samples
    }
}
