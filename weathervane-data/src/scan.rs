//! Dataset directory structure scanning.

use crate::has_supported_extension;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use weathervane_core::WeatherClass;

/// Result of scanning the dataset directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureScan {
    pub directory_exists: bool,
    /// Expected class directories that were actually present.
    pub classes_found: Vec<WeatherClass>,
    /// Subdirectories that do not match any expected class name.
    pub unexpected_directories: Vec<String>,
    /// Image count per class directory.
    pub class_counts: BTreeMap<String, usize>,
    pub total_images: usize,
}

impl StructureScan {
    fn missing(path: &Path) -> Self {
        tracing::error!(path = %path.display(), "data directory does not exist");
        Self {
            directory_exists: false,
            classes_found: Vec::new(),
            unexpected_directories: Vec::new(),
            class_counts: BTreeMap::new(),
            total_images: 0,
        }
    }
}

/// Scan the dataset root for expected class directories and count their
/// images. Non-class subdirectories are reported, not descended into.
pub fn scan_structure(data_path: &Path) -> StructureScan {
    if !data_path.is_dir() {
        return StructureScan::missing(data_path);
    }

    let mut scan = StructureScan {
        directory_exists: true,
        classes_found: Vec::new(),
        unexpected_directories: Vec::new(),
        class_counts: BTreeMap::new(),
        total_images: 0,
    };

    for class in WeatherClass::ALL {
        let class_path = data_path.join(class.as_str());
        if !class_path.is_dir() {
            tracing::warn!(class = %class, "expected class directory not found");
            continue;
        }
        scan.classes_found.push(class);
        let count = class_images(data_path, class).len();
        scan.class_counts.insert(class.as_str().to_string(), count);
        scan.total_images += count;
    }

    if let Ok(entries) = std::fs::read_dir(data_path) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.path().is_dir() && WeatherClass::from_dir_name(&name).is_none() {
                scan.unexpected_directories.push(name);
            }
        }
    }
    scan.unexpected_directories.sort();

    tracing::info!(
        classes = scan.classes_found.len(),
        total_images = scan.total_images,
        "structure scan complete"
    );
    scan
}

/// Supported-format image paths inside one class directory, sorted for
/// deterministic ordering.
pub fn class_images(data_path: &Path, class: WeatherClass) -> Vec<PathBuf> {
    let class_path = data_path.join(class.as_str());
    let mut files: Vec<PathBuf> = WalkDir::new(&class_path)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| has_supported_extension(p))
        .collect();
    files.sort();
    files
}

/// Every file (supported or not) inside one class directory.
pub fn class_files(data_path: &Path, class: WeatherClass) -> Vec<PathBuf> {
    let class_path = data_path.join(class.as_str());
    let mut files: Vec<PathBuf> = WalkDir::new(&class_path)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
