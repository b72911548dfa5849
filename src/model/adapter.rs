//! Fine-Tuning Adapter
//!
//! Turns a pretrained VGG-16 checkpoint into a model ready for fine-tuning:
//! the feature-extraction parameters are frozen and the classification head
//! is replaced with a freshly initialized layer sized for the target label
//! count. A previously fine-tuned checkpoint can be resumed instead, which
//! restores all parameters in place of the fresh head.

use std::path::Path;

use burn::module::Module;
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::backend::Backend;
use tracing::info;

use crate::model::vgg::{Vgg16, Vgg16Config, Vgg16Record};
use crate::utils::error::{OctError, Result};

/// Load the pretrained backbone from a parameter blob on disk.
///
/// `config` must describe the checkpoint's shape (for an ImageNet VGG-16
/// that is the default configuration with 1000 classes).
pub fn load_backbone<B: Backend>(
    config: &Vgg16Config,
    weights: &Path,
    device: &B::Device,
) -> Result<Vgg16<B>> {
    info!("Loading pretrained backbone from {:?}", weights);

    let record: Vgg16Record<B> = CompactRecorder::new()
        .load(weights.to_path_buf(), device)
        .map_err(|e| {
            OctError::Config(format!(
                "failed to load pretrained weights from '{}': {:?}",
                weights.display(),
                e
            ))
        })?;

    Ok(Vgg16::new(config, device).load_record(record))
}

/// Adapt a pretrained backbone for fine-tuning on `num_classes` labels.
///
/// Freezes every feature-extraction parameter and replaces the head with a
/// freshly initialized `hidden_size -> num_classes` linear layer.
pub fn adapt_for_classes<B: Backend>(
    backbone: Vgg16<B>,
    num_classes: usize,
    device: &B::Device,
) -> Vgg16<B> {
    info!(
        "Adapting backbone: freezing features, new head with {} classes",
        num_classes
    );
    backbone.freeze_backbone().with_head(num_classes, device)
}

/// Restore a previously fine-tuned checkpoint.
///
/// `config` must already carry the fine-tuned class count. The restored
/// parameters override fresh-head initialization; the backbone is frozen
/// again since trainability is not part of the checkpoint.
pub fn resume_from_checkpoint<B: Backend>(
    config: &Vgg16Config,
    checkpoint: &Path,
    device: &B::Device,
) -> Result<Vgg16<B>> {
    info!("Resuming fine-tuned model from {:?}", checkpoint);

    let record: Vgg16Record<B> = CompactRecorder::new()
        .load(checkpoint.to_path_buf(), device)
        .map_err(|e| {
            OctError::Config(format!(
                "failed to load checkpoint from '{}': {:?}",
                checkpoint.display(),
                e
            ))
        })?;

    Ok(Vgg16::new(config, device)
        .load_record(record)
        .freeze_backbone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::vgg::RunMode;
    use burn::backend::Autodiff;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn tiny_config(num_classes: usize) -> Vgg16Config {
        Vgg16Config::new()
            .with_num_classes(num_classes)
            .with_base_width(2)
            .with_hidden_size(16)
    }

    #[test]
    fn test_adapter_replaces_head_with_class_count() {
        let device = Default::default();
        let backbone = Vgg16::<TestBackend>::new(&tiny_config(1000), &device);

        let model = adapt_for_classes(backbone, 4, &device);

        assert_eq!(model.num_classes(), 4);
        assert_eq!(model.head.weight.val().dims(), [16, 4]);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        assert_eq!(model.forward(input, RunMode::Eval).dims(), [2, 4]);
    }

    #[test]
    fn test_adapter_freezes_backbone_parameters() {
        let device = Default::default();
        let backbone = Vgg16::<TestBackend>::new(&tiny_config(1000), &device);

        let model = adapt_for_classes(backbone, 4, &device);

        for stage in &model.stages {
            for conv in &stage.convs {
                assert!(!conv.weight.val().is_require_grad());
            }
        }
        assert!(!model.fc1.weight.val().is_require_grad());
        assert!(!model.fc2.weight.val().is_require_grad());

        // The fresh head stays trainable
        assert!(model.head.weight.val().is_require_grad());
    }

    #[test]
    fn test_resume_restores_parameters() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("finetuned");

        let config = tiny_config(4);
        let original = Vgg16::<TestBackend>::new(&config, &device);
        let head_weights: Vec<f32> = original.head.weight.val().into_data().to_vec().unwrap();

        original
            .clone()
            .save_file(path.clone(), &CompactRecorder::new())
            .unwrap();

        let restored = resume_from_checkpoint::<TestBackend>(&config, &path, &device).unwrap();
        let restored_weights: Vec<f32> =
            restored.head.weight.val().into_data().to_vec().unwrap();

        assert_eq!(head_weights, restored_weights);
        assert!(!restored.fc1.weight.val().is_require_grad());
    }

    #[test]
    fn test_missing_weights_file_is_config_error() {
        let device = Default::default();
        let err =
            load_backbone::<TestBackend>(&tiny_config(1000), Path::new("/no/such/file"), &device)
                .unwrap_err();
        assert!(matches!(err, OctError::Config(_)));
    }
}
