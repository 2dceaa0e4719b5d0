//! Validation report assembly and artifact output.

use crate::scan::StructureScan;
use crate::validate::{BalanceReport, ImageValidation};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use weathervane_core::config::DataConfig;
use weathervane_core::domain::FailureReason;
use weathervane_core::{persistence, WeathervaneError};

/// Complete outcome of a data validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub structure: StructureScan,
    pub images: ImageValidation,
    pub balance: BalanceReport,
    /// Overall gate: directory exists, enough classes found, at least
    /// one valid image, and zero corrupted files.
    pub validation_passed: bool,
}

impl ValidationReport {
    pub fn assemble(
        structure: StructureScan,
        images: ImageValidation,
        balance: BalanceReport,
        config: &DataConfig,
    ) -> Self {
        let validation_passed = structure.directory_exists
            && structure.classes_found.len() >= config.min_classes
            && images.valid_images > 0
            && images.count_by(FailureReason::Corrupted) == 0;

        Self {
            structure,
            images,
            balance,
            validation_passed,
        }
    }

    /// Human-readable summary in the report format the demo script prints.
    pub fn summary_text(&self) -> String {
        let mut lines = vec![
            "=== DATA VALIDATION REPORT ===".to_string(),
            format!("Total Images: {}", self.structure.total_images),
            format!("Valid Images: {}", self.images.valid_images),
            format!("Classes Found: {}", self.structure.classes_found.len()),
            format!("Dataset Balanced: {}", self.balance.balanced),
        ];

        let corrupted = self.images.count_by(FailureReason::Corrupted);
        if corrupted > 0 {
            lines.push(format!("WARNING: Corrupted Images: {corrupted}"));
        }
        let wrong_size = self.images.count_by(FailureReason::WrongSize);
        if wrong_size > 0 {
            lines.push(format!("WARNING: Invalid Size Images: {wrong_size}"));
        }
        let wrong_format = self.images.count_by(FailureReason::WrongFormat);
        if wrong_format > 0 {
            lines.push(format!("WARNING: Unsupported Format Images: {wrong_format}"));
        }

        if !self.balance.recommendations.is_empty() {
            lines.push(String::new());
            lines.push("Recommendations:".to_string());
            for rec in &self.balance.recommendations {
                lines.push(format!("  - {rec}"));
            }
        }

        lines.join("\n")
    }

    /// Write the JSON report and text summary into the output directory.
    /// Returns the paths written.
    pub fn write_artifacts(
        &self,
        output_path: &Path,
    ) -> Result<(PathBuf, PathBuf), WeathervaneError> {
        let report_path = output_path.join("data_validation_report.json");
        let summary_path = output_path.join("validation_summary.txt");

        persistence::atomic_write_json(&report_path, self)?;
        persistence::atomic_write(&summary_path, self.summary_text().as_bytes())?;

        tracing::info!(report = %report_path.display(), "validation report saved");
        Ok((report_path, summary_path))
    }
}
