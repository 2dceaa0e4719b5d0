//! Training and evaluation metrics.

use serde::{Deserialize, Serialize};
use weathervane_core::WeatherClass;

/// Per-epoch metric history for one training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    pub loss_history: Vec<f64>,
    pub train_accuracy_history: Vec<f64>,
    pub val_accuracy_history: Vec<f64>,
    pub best_epoch: Option<usize>,
    pub best_val_accuracy: Option<f64>,
    pub total_training_time_secs: f64,
}

impl TrainingMetrics {
    /// Record one epoch; tracks the best validation accuracy seen.
    pub fn record_epoch(&mut self, loss: f64, train_accuracy: f64, val_accuracy: f64) {
        self.loss_history.push(loss);
        self.train_accuracy_history.push(train_accuracy);
        self.val_accuracy_history.push(val_accuracy);
        self.epochs_completed += 1;

        if self.best_val_accuracy.is_none_or(|best| val_accuracy > best) {
            self.best_val_accuracy = Some(val_accuracy);
            self.best_epoch = Some(self.epochs_completed);
        }
    }
}

/// Precision/recall/F1 for a single class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassScore {
    pub class: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Classification quality on a held-out split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub macro_f1: f64,
    pub per_class: Vec<ClassScore>,
    /// `confusion_matrix[truth][predicted]`, canonical class order.
    pub confusion_matrix: Vec<Vec<usize>>,
}

impl ClassificationMetrics {
    /// Compute metrics from parallel truth/prediction label vectors.
    pub fn from_predictions(truth: &[usize], predicted: &[usize]) -> Self {
        let n = WeatherClass::COUNT;
        let mut confusion = vec![vec![0usize; n]; n];
        let mut correct = 0usize;
        for (&t, &p) in truth.iter().zip(predicted) {
            if t < n && p < n {
                confusion[t][p] += 1;
                if t == p {
                    correct += 1;
                }
            }
        }

        let total = truth.len();
        let accuracy = if total > 0 {
            correct as f64 / total as f64
        } else {
            0.0
        };

        let mut per_class = Vec::with_capacity(n);
        for (i, class) in WeatherClass::ALL.iter().enumerate() {
            let tp = confusion[i][i];
            let support: usize = confusion[i].iter().sum();
            let predicted_as: usize = confusion.iter().map(|row| row[i]).sum();

            let precision = if predicted_as > 0 {
                tp as f64 / predicted_as as f64
            } else {
                0.0
            };
            let recall = if support > 0 {
                tp as f64 / support as f64
            } else {
                0.0
            };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            per_class.push(ClassScore {
                class: class.as_str().to_string(),
                precision,
                recall,
                f1,
                support,
            });
        }

        let macro_f1 = per_class.iter().map(|c| c.f1).sum::<f64>() / n as f64;

        Self {
            accuracy,
            macro_f1,
            per_class,
            confusion_matrix: confusion,
        }
    }
}
