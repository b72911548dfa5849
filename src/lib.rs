//! # Retinal OCT Classification
//!
//! A Rust library for classifying retinal OCT scans into four diagnostic
//! classes (CNV, DME, DRUSEN, NORMAL) by fine-tuning a pretrained VGG-16
//! network with the Burn framework.
//!
//! ## Features
//!
//! - **Folder-structured dataset loading** with per-split train/eval image
//!   transforms and batched iteration
//! - **Transfer learning**: the convolutional backbone stays frozen while a
//!   freshly initialized classification head is trained
//! - **Burn framework** for portable, efficient training and inference, with
//!   CUDA acceleration behind the `cuda` feature and an ndarray host fallback
//! - **Qualitative inspection** via SVG prediction grids
//!
//! ## Modules
//!
//! - `dataset`: Directory walking, image transforms, batching
//! - `model`: VGG-16 architecture and the fine-tuning adapter
//! - `training`: Fine-tuning loop and test-split evaluation
//! - `utils`: Logging, metrics, error handling, visualization
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use oct_classifier::{OctDataset, Vgg16Config};
//! use oct_classifier::model::adapter::{adapt_for_classes, load_backbone};
//!
//! let dataset = OctDataset::new("data/oct2017")?;
//! let backbone = load_backbone(&Vgg16Config::new(), "weights/vgg16".as_ref(), &device)?;
//! let model = adapt_for_classes(backbone, dataset.num_classes(), &device);
//! // ... fine-tuning and evaluation
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::batcher::{BatchPlan, OctBatch, OctBatcher, OctBurnDataset, OctItem};
pub use dataset::loader::{DatasetStats, ImageSample, OctDataset, Split};
pub use dataset::transform::Transform;
pub use model::vgg::{RunMode, Vgg16, Vgg16Config};
pub use training::evaluate::{evaluate, TestMetrics};
pub use training::finetune::{run_finetune, FineTuneConfig, FineTuneResult};
pub use utils::error::{OctError, Result};
pub use utils::metrics::{EpochMetrics, RunningTotals, TrainingHistory};

/// Diagnostic classes in the retinal OCT dataset (4 total)
pub const NUM_CLASSES: usize = 4;

/// Class names as they appear as dataset directory names
pub const CLASS_NAMES: [&str; NUM_CLASSES] = ["CNV", "DME", "DRUSEN", "NORMAL"];

/// Shorter image side after the deterministic resize step
pub const RESIZE_SIZE: usize = 256;

/// Final square crop fed to the network
pub const CROP_SIZE: usize = 224;

/// Default batch size for fine-tuning runs
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
