//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` and `Batcher` traits for the OCT data, plus
//! `BatchPlan`, a restartable, finite batch sequence over a split. A plan
//! covers every sample exactly once; a new pass over the data is a new plan
//! instance.

use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::ImageReader;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::dataset::loader::ImageSample;
use crate::dataset::transform::Transform;
use crate::utils::error::{OctError, Result};

/// A single OCT item ready for batching
#[derive(Clone, Debug)]
pub struct OctItem {
    /// Image data as flattened CHW float array [3 * H * W], values in [0, 1]
    pub image: Vec<f32>,
    /// Class label (0-3)
    pub label: usize,
    /// Image path (for debugging and visualization)
    pub path: String,
}

/// OCT dataset implementing Burn's `Dataset` trait.
///
/// Images are decoded and transformed on demand, so a stochastic train
/// transform is re-applied on every draw. `new_cached` pre-decodes all items
/// for deterministic transforms.
#[derive(Debug, Clone)]
pub struct OctBurnDataset {
    samples: Vec<(PathBuf, usize)>,
    transform: Transform,
    cached_items: Option<Vec<OctItem>>,
}

impl OctBurnDataset {
    /// Create a lazy dataset from (path, label) pairs
    pub fn new(samples: Vec<(PathBuf, usize)>, transform: Transform) -> Self {
        Self {
            samples,
            transform,
            cached_items: None,
        }
    }

    /// Create a dataset from loader samples
    pub fn from_samples(samples: &[ImageSample], transform: Transform) -> Self {
        let samples = samples
            .iter()
            .map(|s| (s.path.clone(), s.label))
            .collect();
        Self::new(samples, transform)
    }

    /// Pre-decode every item into memory.
    ///
    /// Only valid for deterministic transforms; caching a stochastic
    /// transform would freeze one augmentation draw for the whole run.
    pub fn new_cached(samples: Vec<(PathBuf, usize)>, transform: Transform) -> Result<Self> {
        if transform.is_stochastic() {
            return Err(OctError::Dataset(
                "cannot cache items under a stochastic transform".to_string(),
            ));
        }

        let cached_items: Result<Vec<OctItem>> = samples
            .par_iter()
            .map(|(path, label)| load_item(path, *label, &transform))
            .collect();

        Ok(Self {
            samples,
            transform,
            cached_items: Some(cached_items?),
        })
    }

    /// Cached variant of `from_samples`
    pub fn from_samples_cached(samples: &[ImageSample], transform: Transform) -> Result<Self> {
        let samples = samples
            .iter()
            .map(|s| (s.path.clone(), s.label))
            .collect();
        Self::new_cached(samples, transform)
    }

    /// The transform applied to every draw
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// (path, label) pairs backing this dataset
    pub fn samples(&self) -> &[(PathBuf, usize)] {
        &self.samples
    }
}

impl Dataset<OctItem> for OctBurnDataset {
    fn get(&self, index: usize) -> Option<OctItem> {
        if index >= self.samples.len() {
            return None;
        }

        if let Some(ref cached) = self.cached_items {
            return cached.get(index).cloned();
        }

        let (path, label) = &self.samples[index];
        load_item(path, *label, &self.transform).ok()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Decode one image and run it through the transform
fn load_item(path: &PathBuf, label: usize, transform: &Transform) -> Result<OctItem> {
    let img = ImageReader::open(path)
        .map_err(|e| OctError::ImageLoad(path.clone(), e.to_string()))?
        .decode()
        .map_err(|e| OctError::ImageLoad(path.clone(), e.to_string()))?;

    Ok(OctItem {
        image: transform.apply(&img),
        label,
        path: path.to_string_lossy().to_string(),
    })
}

/// A batch of OCT images for one forward/backward step
#[derive(Clone, Debug)]
pub struct OctBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for creating OCT training batches
#[derive(Clone, Debug)]
pub struct OctBatcher<B: Backend> {
    #[allow(dead_code)]
    device: B::Device,
    image_size: usize,
}

impl<B: Backend> OctBatcher<B> {
    /// Create a new batcher for the given device and image side length
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

impl<B: Backend> Batcher<B, OctItem, OctBatch<B>> for OctBatcher<B> {
    fn batch(&self, items: Vec<OctItem>, device: &B::Device) -> OctBatch<B> {
        let batch_size = items.len();
        let channels = 3;
        let height = self.image_size;
        let width = self.image_size;

        // Flatten all images into a single vector
        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );

        // Apply ImageNet normalization: (x - mean) / std
        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(vec![0.485f32, 0.456, 0.406], [1, 3, 1, 1]),
            device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(vec![0.229f32, 0.224, 0.225], [1, 3, 1, 1]),
            device,
        );
        let images = (images - mean) / std;

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        OctBatch { images, targets }
    }
}

/// One finite, restartable pass over a split, chunked into batches.
///
/// The plan fixes the sample order up front; iterating it yields index
/// slices that together cover every sample exactly once. Restarting a pass
/// means constructing a new plan.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    indices: Vec<usize>,
    batch_size: usize,
}

impl BatchPlan {
    /// Randomly ordered pass (training)
    pub fn shuffled(len: usize, batch_size: usize, rng: &mut ChaCha8Rng) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(rng);
        Self {
            indices,
            batch_size,
        }
    }

    /// In-order pass (validation/test)
    pub fn sequential(len: usize, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        Self {
            indices: (0..len).collect(),
            batch_size,
        }
    }

    /// Total samples covered by the plan
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the plan covers no samples
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of batches in a full pass (last batch may be short)
    pub fn num_batches(&self) -> usize {
        (self.indices.len() + self.batch_size - 1) / self.batch_size
    }

    /// Number of batches in a half pass, rounded up.
    ///
    /// This is the per-epoch training cap: only the first
    /// `ceil(num_batches / 2)` batches of a shuffled plan are trained.
    pub fn half_num_batches(&self) -> usize {
        (self.num_batches() + 1) / 2
    }

    /// Iterate over the batch index slices of this pass
    pub fn batches(&self) -> impl Iterator<Item = &[usize]> {
        self.indices.chunks(self.batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    type TestBackend = burn_ndarray::NdArray;

    fn item(value: f32, label: usize, size: usize) -> OctItem {
        OctItem {
            image: vec![value; 3 * size * size],
            label,
            path: format!("item_{}.jpeg", label),
        }
    }

    #[test]
    fn test_batch_shapes() {
        let device = Default::default();
        let batcher = OctBatcher::<TestBackend>::new(device, 16);

        let batch = batcher.batch(vec![item(0.5, 0, 16), item(0.2, 3, 16)], &Default::default());

        assert_eq!(batch.images.dims(), [2, 3, 16, 16]);
        assert_eq!(batch.targets.dims(), [2]);

        let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![0, 3]);
    }

    #[test]
    fn test_batch_applies_imagenet_normalization() {
        let device = Default::default();
        let batcher = OctBatcher::<TestBackend>::new(device, 4);

        let batch = batcher.batch(vec![item(0.0, 1, 4)], &Default::default());
        let values: Vec<f32> = batch.images.into_data().to_vec().unwrap();

        // First value is in the red channel: (0 - 0.485) / 0.229
        assert!((values[0] - (-0.485 / 0.229)).abs() < 1e-4);
        // First value of the blue channel: (0 - 0.406) / 0.225
        assert!((values[2 * 16] - (-0.406 / 0.225)).abs() < 1e-4);
    }

    #[test]
    fn test_plan_covers_every_sample_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let plan = BatchPlan::shuffled(103, 8, &mut rng);

        let total: usize = plan.batches().map(|b| b.len()).sum();
        assert_eq!(total, 103);
        assert_eq!(plan.num_batches(), 13);

        let mut seen: Vec<usize> = plan.batches().flatten().copied().collect();
        seen.sort();
        assert_eq!(seen, (0..103).collect::<Vec<_>>());
    }

    #[test]
    fn test_plan_half_pass_rounds_up() {
        let plan = BatchPlan::sequential(1000, 8);
        // 125 batches in a full pass, 63 in the half pass
        assert_eq!(plan.num_batches(), 125);
        assert_eq!(plan.half_num_batches(), 63);

        let even = BatchPlan::sequential(64, 8);
        assert_eq!(even.num_batches(), 8);
        assert_eq!(even.half_num_batches(), 4);
    }

    #[test]
    fn test_plan_restart_is_a_new_pass() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let first = BatchPlan::shuffled(50, 8, &mut rng);
        let second = BatchPlan::shuffled(50, 8, &mut rng);

        // Both passes cover everything; the orders are independent draws
        let collect = |p: &BatchPlan| p.batches().flatten().copied().collect::<Vec<_>>();
        let a = collect(&first);
        let b = collect(&second);

        let mut a_sorted = a.clone();
        let mut b_sorted = b.clone();
        a_sorted.sort();
        b_sorted.sort();
        assert_eq!(a_sorted, b_sorted);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sequential_plan_is_in_order() {
        let plan = BatchPlan::sequential(10, 4);
        let batches: Vec<Vec<usize>> = plan.batches().map(|b| b.to_vec()).collect();
        assert_eq!(batches, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);
    }

    #[test]
    fn test_cached_rejects_stochastic_transform() {
        let result = OctBurnDataset::new_cached(Vec::new(), Transform::train());
        assert!(result.is_err());
    }

    #[test]
    fn test_dataset_get_out_of_bounds() {
        let dataset = OctBurnDataset::new(Vec::new(), Transform::eval());
        assert_eq!(dataset.len(), 0);
        assert!(dataset.get(0).is_none());
    }
}
