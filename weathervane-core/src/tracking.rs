//! Local run tracking - parameters, metrics, and artifacts per pipeline run.
//!
//! A lightweight, JSON-file-backed stand-in for a remote tracking
//! service: every validation or training invocation records what it was
//! given and what it produced, so runs stay comparable after the fact.

use crate::error::WeathervaneError;
use crate::persistence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Lifecycle state of a tracked run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One recorded pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedRun {
    pub id: String,
    pub name: String,
    /// Pipeline step this run belongs to, e.g. "data_validation" or "training".
    pub step: String,
    pub status: RunStatus,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub artifacts: Vec<PathBuf>,
    pub tags: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TrackedRun {
    fn new(name: &str, step: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            step: step.to_string(),
            status: RunStatus::Running,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
            tags: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn log_param(&mut self, key: &str, value: impl ToString) {
        self.params.insert(key.to_string(), value.to_string());
    }

    pub fn log_metric(&mut self, key: &str, value: f64) {
        self.metrics.insert(key.to_string(), value);
    }

    pub fn log_artifact(&mut self, path: impl Into<PathBuf>) {
        self.artifacts.push(path.into());
    }

    pub fn tag(&mut self, tag: impl Into<String>) {
        self.tags.push(tag.into());
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

/// All runs recorded under one tracking root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RunLog {
    runs: Vec<TrackedRun>,
}

/// File-backed run tracker.
///
/// Runs are stored in `<root>/runs.json`; saving is atomic.
#[derive(Debug, Clone)]
pub struct RunTracker {
    root: PathBuf,
}

impl RunTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn log_path(&self) -> PathBuf {
        self.root.join("runs.json")
    }

    /// Start a new run. The run is not persisted until [`RunTracker::record`].
    pub fn start_run(&self, name: &str, step: &str) -> TrackedRun {
        tracing::info!(run_name = name, step, "starting tracked run");
        TrackedRun::new(name, step)
    }

    /// Persist a run, replacing any earlier snapshot with the same id.
    pub fn record(&self, run: &TrackedRun) -> Result<(), WeathervaneError> {
        let mut log = self.load_log()?;
        log.runs.retain(|r| r.id != run.id);
        log.runs.push(run.clone());
        persistence::atomic_write_json(&self.log_path(), &log)
            .map_err(|e| WeathervaneError::Tracking(e.to_string()))?;
        Ok(())
    }

    /// All recorded runs, oldest first.
    pub fn list(&self) -> Result<Vec<TrackedRun>, WeathervaneError> {
        Ok(self.load_log()?.runs)
    }

    /// Runs for a given pipeline step.
    pub fn list_by_step(&self, step: &str) -> Result<Vec<TrackedRun>, WeathervaneError> {
        Ok(self
            .load_log()?
            .runs
            .into_iter()
            .filter(|r| r.step == step)
            .collect())
    }

    /// Look up a run by id.
    pub fn find(&self, id: &str) -> Result<Option<TrackedRun>, WeathervaneError> {
        Ok(self.load_log()?.runs.into_iter().find(|r| r.id == id))
    }

    fn load_log(&self) -> Result<RunLog, WeathervaneError> {
        Ok(persistence::load_json(&self.log_path())
            .map_err(|e| WeathervaneError::Tracking(e.to_string()))?
            .unwrap_or_default())
    }
}

impl RunTracker {
    /// Root directory of this tracker.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_run_lifecycle() {
        let dir = TempDir::new().unwrap();
        let tracker = RunTracker::new(dir.path());

        let mut run = tracker.start_run("weather_data_validation", "data_validation");
        run.log_param("data_path", "/data");
        run.log_metric("total_images", 18038.0);
        run.log_metric("valid_images", 18029.0);
        run.finish(RunStatus::Completed);
        tracker.record(&run).unwrap();

        let runs = tracker.list().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[0].metrics["valid_images"], 18029.0);
        assert!(runs[0].ended_at.is_some());
    }

    #[test]
    fn test_record_replaces_snapshot() {
        let dir = TempDir::new().unwrap();
        let tracker = RunTracker::new(dir.path());

        let mut run = tracker.start_run("training_cnn", "training");
        tracker.record(&run).unwrap();

        run.log_metric("accuracy", 0.91);
        run.finish(RunStatus::Completed);
        tracker.record(&run).unwrap();

        let runs = tracker.list().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].metrics["accuracy"], 0.91);
    }

    #[test]
    fn test_list_by_step() {
        let dir = TempDir::new().unwrap();
        let tracker = RunTracker::new(dir.path());

        let a = tracker.start_run("a", "data_validation");
        let b = tracker.start_run("b", "training");
        tracker.record(&a).unwrap();
        tracker.record(&b).unwrap();

        let training = tracker.list_by_step("training").unwrap();
        assert_eq!(training.len(), 1);
        assert_eq!(training[0].name, "b");
    }

    #[test]
    fn test_find_missing() {
        let dir = TempDir::new().unwrap();
        let tracker = RunTracker::new(dir.path());
        assert!(tracker.find("nope").unwrap().is_none());
    }
}
