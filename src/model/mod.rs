//! VGG-16 architecture and the fine-tuning adapter

pub mod adapter;
pub mod vgg;

pub use adapter::{adapt_for_classes, load_backbone, resume_from_checkpoint};
pub use vgg::{RunMode, Vgg16, Vgg16Config};
