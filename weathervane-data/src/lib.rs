//! # weathervane-data - dataset validation and preparation
//!
//! Scans a directory of class-labeled weather images, checks every file
//! for corruption, size, and format problems, reports on class balance,
//! and produces reproducible stratified splits for training.

pub mod report;
pub mod scan;
pub mod split;
pub mod validate;

pub use report::ValidationReport;
pub use scan::{scan_structure, StructureScan};
pub use split::{DatasetSplits, SplitConfig};
pub use validate::DataValidator;

/// File extensions accepted as dataset images (lowercase, without dot).
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Whether a path carries a supported image extension.
pub fn has_supported_extension(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}
