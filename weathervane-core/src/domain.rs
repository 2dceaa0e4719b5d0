//! Domain types shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The five weather conditions the classifier distinguishes.
///
/// Label indices follow the order of [`WeatherClass::ALL`]; the model's
/// output layer and the label maps in saved metadata both rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherClass {
    Cloudy,
    Foggy,
    Rainy,
    Snowy,
    Sunny,
}

impl WeatherClass {
    /// Canonical class ordering.
    pub const ALL: [WeatherClass; 5] = [
        WeatherClass::Cloudy,
        WeatherClass::Foggy,
        WeatherClass::Rainy,
        WeatherClass::Snowy,
        WeatherClass::Sunny,
    ];

    /// Number of classes.
    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherClass::Cloudy => "cloudy",
            WeatherClass::Foggy => "foggy",
            WeatherClass::Rainy => "rainy",
            WeatherClass::Snowy => "snowy",
            WeatherClass::Sunny => "sunny",
        }
    }

    /// Resolve a dataset directory name to a class.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }

    /// Label index in the canonical ordering.
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|c| c == self).unwrap_or(0)
    }

    /// Class for a label index, if in range.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Class names in canonical order.
    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|c| c.as_str().to_string()).collect()
    }
}

impl std::fmt::Display for WeatherClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an image was rejected during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Corrupted,
    WrongSize,
    WrongFormat,
    None,
}

/// A single image discovered during a dataset scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub label: WeatherClass,
    pub valid: bool,
    pub failure: FailureReason,
}

impl ImageRecord {
    pub fn valid(path: PathBuf, label: WeatherClass) -> Self {
        Self {
            path,
            label,
            valid: true,
            failure: FailureReason::None,
        }
    }

    pub fn flagged(path: PathBuf, label: WeatherClass, failure: FailureReason) -> Self {
        Self {
            path,
            label,
            valid: false,
            failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_ordering_round_trip() {
        for (i, class) in WeatherClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), i);
            assert_eq!(WeatherClass::from_index(i), Some(*class));
        }
        assert_eq!(WeatherClass::from_index(5), None);
    }

    #[test]
    fn test_dir_name_resolution() {
        assert_eq!(
            WeatherClass::from_dir_name("foggy"),
            Some(WeatherClass::Foggy)
        );
        assert_eq!(WeatherClass::from_dir_name("tornado"), None);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&WeatherClass::Snowy).unwrap();
        assert_eq!(json, "\"snowy\"");
    }
}
