//! Shared server state: the currently loaded predictor.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use weathervane_core::config::ServerConfig;
use weathervane_core::WeathervaneError;
use weathervane_model::Predictor;

/// Thread-safe shared state for axum handlers.
pub type SharedState = Arc<Mutex<ServerState>>;

/// The prediction server's mutable state.
///
/// The predictor is held behind an `Arc` so handlers can take a cheap
/// handle and run forward passes without holding the state lock.
pub struct ServerState {
    models_path: PathBuf,
    config: ServerConfig,
    predictor: Option<Arc<Predictor>>,
    started_at: DateTime<Utc>,
}

impl ServerState {
    /// Create server state and load the most recent checkpoint if one
    /// exists. Starting with no model is not an error; prediction
    /// endpoints report it until a model is loaded.
    pub fn new(models_path: PathBuf, config: ServerConfig) -> Result<Self, WeathervaneError> {
        let predictor = Predictor::load_latest(&models_path)?.map(Arc::new);
        match &predictor {
            Some(p) => tracing::info!(model = p.model_name(), "startup model loaded"),
            None => tracing::warn!("no checkpoints found, starting without a model"),
        }

        Ok(Self {
            models_path,
            config,
            predictor,
            started_at: Utc::now(),
        })
    }

    /// State with no startup model scan.
    pub fn empty(models_path: PathBuf, config: ServerConfig) -> Self {
        Self {
            models_path,
            config,
            predictor: None,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn models_path(&self) -> &PathBuf {
        &self.models_path
    }

    pub fn predictor(&self) -> Option<&Predictor> {
        self.predictor.as_deref()
    }

    /// A clonable handle to the active predictor, for use outside the
    /// state lock.
    pub fn predictor_handle(&self) -> Option<Arc<Predictor>> {
        self.predictor.clone()
    }

    pub fn model_loaded(&self) -> bool {
        self.predictor.is_some()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Replace the active predictor with a named checkpoint.
    pub fn load_model(&mut self, name: &str) -> Result<(), WeathervaneError> {
        let predictor = Predictor::load(&self.models_path, name)?;
        self.predictor = Some(Arc::new(predictor));
        Ok(())
    }

    /// Checkpoint stems available for loading.
    pub fn available_models(&self) -> Result<Vec<String>, WeathervaneError> {
        Predictor::available_models(&self.models_path)
    }
}

/// Wrap state for sharing across handlers.
pub fn shared(state: ServerState) -> SharedState {
    Arc::new(Mutex::new(state))
}
