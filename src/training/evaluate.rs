//! Test-Split Evaluation
//!
//! Runs a model over an entire held-out split with gradients disabled,
//! accumulating average loss and accuracy. Pure with respect to the model
//! and the split: repeated calls return identical metrics.

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    tensor::{backend::Backend, ElementConversion},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::batcher::{BatchPlan, OctBatcher, OctBurnDataset, OctItem};
use crate::model::vgg::{RunMode, Vgg16};
use crate::utils::error::{OctError, Result};
use crate::utils::metrics::RunningTotals;

/// Averaged metrics over a held-out split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    /// Average per-sample cross-entropy loss
    pub loss: f64,
    /// Fraction of correct predictions (0.0 - 1.0)
    pub accuracy: f64,
    /// Number of samples evaluated
    pub samples: usize,
}

/// Evaluate `model` over the whole split held by `dataset`.
///
/// Takes a non-autodiff model, so no gradient state exists to mutate; the
/// only side effect is progress reporting.
pub fn evaluate<B: Backend>(
    model: &Vgg16<B>,
    dataset: &OctBurnDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<TestMetrics> {
    if dataset.len() == 0 {
        return Err(OctError::Dataset("evaluation split is empty".to_string()));
    }

    let batcher = OctBatcher::<B>::new(device.clone(), dataset.transform().crop_size());
    let loss_fn: CrossEntropyLoss<B> = CrossEntropyLossConfig::new().init(device);

    let plan = BatchPlan::sequential(dataset.len(), batch_size);
    let num_batches = plan.num_batches();
    let mut totals = RunningTotals::new();

    info!(
        "Evaluating {} samples in {} batches",
        plan.len(),
        num_batches
    );

    for (batch_idx, batch_indices) in plan.batches().enumerate() {
        let items: Vec<OctItem> = batch_indices
            .iter()
            .filter_map(|&i| dataset.get(i))
            .collect();
        if items.is_empty() {
            continue;
        }

        let batch = batcher.batch(items, device);

        let output = model.forward(batch.images.clone(), RunMode::Eval);
        let loss = loss_fn.forward(output.clone(), batch.targets.clone());

        let loss_value: f64 = loss.into_scalar().elem();
        let predictions = output.argmax(1).flatten::<1>(0, 1);
        let batch_correct: i64 = predictions
            .equal(batch.targets.clone())
            .int()
            .sum()
            .into_scalar()
            .elem();
        totals.record_batch(loss_value, batch_correct as usize, batch.targets.dims()[0]);

        if (batch_idx + 1) % 10 == 0 || batch_idx + 1 == num_batches {
            debug!(
                "Batch {}/{}: running acc = {:.2}%",
                batch_idx + 1,
                num_batches,
                100.0 * totals.running_accuracy()
            );
        }

        drop(batch);
    }

    let metrics = totals.finalize();
    info!(
        "Evaluation complete: loss = {:.4}, accuracy = {:.2}%",
        metrics.loss,
        100.0 * metrics.accuracy
    );

    Ok(TestMetrics {
        loss: metrics.loss,
        accuracy: metrics.accuracy,
        samples: totals.samples(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::transform::Transform;
    use crate::model::vgg::Vgg16Config;
    use burn_ndarray::NdArray;
    use image::{ImageBuffer, Rgb};
    use std::path::PathBuf;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn tiny_model(device: &<TestBackend as Backend>::Device) -> Vgg16<TestBackend> {
        let config = Vgg16Config::new()
            .with_num_classes(2)
            .with_base_width(2)
            .with_hidden_size(8);
        Vgg16::new(&config, device)
    }

    fn tiny_image_set(dir: &std::path::Path, count: usize) -> Vec<(PathBuf, usize)> {
        (0..count)
            .map(|i| {
                let label = i % 2;
                let shade = if label == 0 { 40u8 } else { 200u8 };
                let mut img = ImageBuffer::new(16, 16);
                for (_, _, pixel) in img.enumerate_pixels_mut() {
                    *pixel = Rgb([shade, shade / 2, 90]);
                }
                let path = dir.join(format!("eval_{}.png", i));
                img.save(&path).unwrap();
                (path, label)
            })
            .collect()
    }

    #[test]
    fn test_evaluate_is_repeatable() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let samples = tiny_image_set(dir.path(), 5);

        let dataset = OctBurnDataset::new(samples, Transform::eval_with(32, 32));
        let model = tiny_model(&device);

        let first = evaluate(&model, &dataset, 2, &device).unwrap();
        let second = evaluate(&model, &dataset, 2, &device).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.samples, 5);
        assert!(first.loss.is_finite());
        assert!(first.accuracy >= 0.0 && first.accuracy <= 1.0);
    }

    #[test]
    fn test_evaluate_covers_all_samples() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let samples = tiny_image_set(dir.path(), 7);

        let dataset = OctBurnDataset::new(samples, Transform::eval_with(32, 32));
        let model = tiny_model(&device);

        // 7 samples with batch size 3: batches of 3, 3, 1
        let metrics = evaluate(&model, &dataset, 3, &device).unwrap();
        assert_eq!(metrics.samples, 7);
    }

    #[test]
    fn test_evaluate_rejects_empty_split() {
        let device = Default::default();
        let dataset = OctBurnDataset::new(Vec::new(), Transform::eval_with(32, 32));
        let model = tiny_model(&device);

        assert!(evaluate(&model, &dataset, 2, &device).is_err());
    }
}
