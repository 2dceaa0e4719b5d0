//! JSON-backed model registry.
//!
//! Tracks every trained checkpoint with a name, an auto-incremented
//! version, and a lifecycle stage. Promotion to production demotes the
//! previous production version of the same name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use weathervane_core::persistence::{atomic_write_json, load_json};
use weathervane_core::WeathervaneError;

use crate::cnn::Architecture;

const REGISTRY_FILE: &str = "registry.json";

/// Lifecycle stage of a registered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStage {
    Staging,
    Production,
}

impl std::fmt::Display for ModelStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelStage::Staging => f.write_str("staging"),
            ModelStage::Production => f.write_str("production"),
        }
    }
}

/// One registered model version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub stage: ModelStage,
    pub architecture: Architecture,
    pub checkpoint: PathBuf,
    pub accuracy: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Registry of trained models, persisted under the models directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRegistry {
    models: Vec<RegisteredModel>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the registry from `models_dir`, empty if none exists yet.
    pub fn load(models_dir: &Path) -> Result<Self, WeathervaneError> {
        let path = models_dir.join(REGISTRY_FILE);
        Ok(load_json(&path)?.unwrap_or_default())
    }

    /// Persist the registry under `models_dir`.
    pub fn save(&self, models_dir: &Path) -> Result<(), WeathervaneError> {
        let path = models_dir.join(REGISTRY_FILE);
        atomic_write_json(&path, self)?;
        Ok(())
    }

    /// Register a new version of `name` at the staging stage.
    pub fn register(
        &mut self,
        name: &str,
        architecture: Architecture,
        checkpoint: PathBuf,
        accuracy: Option<f64>,
    ) -> &RegisteredModel {
        let version = self
            .models
            .iter()
            .filter(|m| m.name == name)
            .map(|m| m.version)
            .max()
            .unwrap_or(0)
            + 1;

        self.models.push(RegisteredModel {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            version,
            stage: ModelStage::Staging,
            architecture,
            checkpoint,
            accuracy,
            created_at: Utc::now(),
        });

        &self.models[self.models.len() - 1]
    }

    /// Latest version registered under `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&RegisteredModel> {
        self.models
            .iter()
            .filter(|m| m.name == name)
            .max_by_key(|m| m.version)
    }

    /// Most recently created model at `stage`.
    pub fn latest(&self, stage: ModelStage) -> Option<&RegisteredModel> {
        self.models
            .iter()
            .filter(|m| m.stage == stage)
            .max_by_key(|m| m.created_at)
    }

    /// Promote the latest version of `name` to production.
    ///
    /// Any prior production version of the same name moves back to
    /// staging so at most one version per name serves production.
    pub fn promote(&mut self, name: &str) -> Result<&RegisteredModel, WeathervaneError> {
        let target_version = self
            .find_by_name(name)
            .map(|m| m.version)
            .ok_or_else(|| WeathervaneError::not_found(format!("model '{name}'")))?;

        let mut promoted_idx = None;
        for (idx, model) in self.models.iter_mut().enumerate() {
            if model.name != name {
                continue;
            }
            if model.version == target_version {
                model.stage = ModelStage::Production;
                promoted_idx = Some(idx);
            } else if model.stage == ModelStage::Production {
                model.stage = ModelStage::Staging;
            }
        }

        match promoted_idx {
            Some(idx) => Ok(&self.models[idx]),
            None => Err(WeathervaneError::not_found(format!("model '{name}'"))),
        }
    }

    /// Remove every version registered under `name`.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.models.len();
        self.models.retain(|m| m.name != name);
        before - self.models.len()
    }

    pub fn list(&self) -> &[RegisteredModel] {
        &self.models
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn registry_with(name: &str, versions: u32) -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        for _ in 0..versions {
            registry.register(name, Architecture::Cnn, PathBuf::from("m.mpk"), Some(0.9));
        }
        registry
    }

    #[test]
    fn test_register_increments_version() {
        let registry = registry_with("weather_classifier_cnn_20250101_000000", 3);
        let latest = registry
            .find_by_name("weather_classifier_cnn_20250101_000000")
            .unwrap();
        assert_eq!(latest.version, 3);
        assert_eq!(latest.stage, ModelStage::Staging);
    }

    #[test]
    fn test_promote_demotes_previous_production() {
        let mut registry = registry_with("alpha", 1);
        registry.promote("alpha").unwrap();
        assert_eq!(
            registry.find_by_name("alpha").unwrap().stage,
            ModelStage::Production
        );

        registry.register("alpha", Architecture::Cnn, PathBuf::from("m2.mpk"), None);
        registry.promote("alpha").unwrap();

        let production: Vec<_> = registry
            .list()
            .iter()
            .filter(|m| m.stage == ModelStage::Production)
            .collect();
        assert_eq!(production.len(), 1);
        assert_eq!(production[0].version, 2);
    }

    #[test]
    fn test_promote_unknown_model() {
        let mut registry = ModelRegistry::new();
        assert!(registry.promote("missing").is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with("beta", 2);
        registry.save(dir.path()).unwrap();

        let loaded = ModelRegistry::load(dir.path()).unwrap();
        assert_eq!(loaded.list().len(), 2);
        assert_eq!(loaded.find_by_name("beta").unwrap().version, 2);
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::load(dir.path()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut registry = registry_with("gamma", 2);
        assert_eq!(registry.remove("gamma"), 2);
        assert!(registry.is_empty());
    }
}
