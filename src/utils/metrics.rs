//! Metrics Module
//!
//! Per-epoch running accumulators and the training history retained across
//! a fine-tuning run.

use serde::{Deserialize, Serialize};

/// Running accumulators for one pass over a split.
///
/// Losses are accumulated weighted by batch size so the finalized average is
/// a per-sample mean regardless of a short last batch.
#[derive(Debug, Clone, Default)]
pub struct RunningTotals {
    loss_sum: f64,
    correct: usize,
    samples: usize,
}

impl RunningTotals {
    /// Create empty accumulators
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the empty state (start of a new pass)
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record one batch: its mean loss, correct-prediction count and size
    pub fn record_batch(&mut self, mean_loss: f64, correct: usize, batch_size: usize) {
        self.loss_sum += mean_loss * batch_size as f64;
        self.correct += correct;
        self.samples += batch_size;
    }

    /// Number of samples seen so far
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Number of correct predictions so far
    pub fn correct(&self) -> usize {
        self.correct
    }

    /// Running accuracy over the samples seen so far
    pub fn running_accuracy(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.correct as f64 / self.samples as f64
    }

    /// Finalize into per-sample averages
    pub fn finalize(&self) -> EpochMetrics {
        if self.samples == 0 {
            return EpochMetrics {
                loss: 0.0,
                accuracy: 0.0,
            };
        }
        EpochMetrics {
            loss: self.loss_sum / self.samples as f64,
            accuracy: self.correct as f64 / self.samples as f64,
        }
    }
}

/// Averaged metrics for one pass over a split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Average per-sample loss
    pub loss: f64,
    /// Fraction of correct predictions (0.0 - 1.0)
    pub accuracy: f64,
}

/// Metrics tracked across a fine-tuning run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Training loss history (per epoch)
    pub train_loss: Vec<f64>,
    /// Training accuracy history
    pub train_accuracy: Vec<f64>,
    /// Validation loss history
    pub val_loss: Vec<f64>,
    /// Validation accuracy history
    pub val_accuracy: Vec<f64>,
}

impl TrainingHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Append metrics for a completed epoch
    pub fn add_epoch(&mut self, train: EpochMetrics, validation: EpochMetrics) {
        self.train_loss.push(train.loss);
        self.train_accuracy.push(train.accuracy);
        self.val_loss.push(validation.loss);
        self.val_accuracy.push(validation.accuracy);
    }

    /// Number of recorded epochs
    pub fn len(&self) -> usize {
        self.val_accuracy.len()
    }

    /// Whether any epoch has been recorded
    pub fn is_empty(&self) -> bool {
        self.val_accuracy.is_empty()
    }

    /// Best validation accuracy seen so far
    pub fn best_val_accuracy(&self) -> Option<f64> {
        self.val_accuracy
            .iter()
            .copied()
            .max_by(|a, b| a.partial_cmp(b).unwrap())
    }

    /// Epoch index with the best validation accuracy.
    ///
    /// Ties resolve to the earliest epoch, matching the training loop's
    /// strict-improvement snapshot rule.
    pub fn best_epoch(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, acc) in self.val_accuracy.iter().enumerate() {
            match best {
                Some((_, best_acc)) if *acc <= best_acc => {}
                _ => best = Some((idx, *acc)),
            }
        }
        best.map(|(idx, _)| idx)
    }
}
