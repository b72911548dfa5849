//! Image Transforms
//!
//! Two preprocessing paths feed the network:
//!
//! - **Train**: a randomly sized, randomly placed square crop followed by a
//!   random horizontal flip. The RNG is reseeded on every draw, so two draws
//!   of the same source image may differ.
//! - **Eval** (validation/test): resize the shorter side to a fixed length,
//!   then center-crop. Fully deterministic: the same source image always
//!   yields the same tensor.
//!
//! Both paths emit CHW float data in [0, 1]; ImageNet mean/std normalization
//! happens later in the batcher.

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{CROP_SIZE, RESIZE_SIZE};

/// Smallest fraction of the shorter source side a random crop may take
const MIN_CROP_FRACTION: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransformKind {
    Train,
    Eval,
}

/// Per-split image preprocessing
#[derive(Debug, Clone)]
pub struct Transform {
    kind: TransformKind,
    resize_size: u32,
    crop_size: u32,
}

impl Transform {
    /// Stochastic training transform with default sizes
    pub fn train() -> Self {
        Self::train_with(RESIZE_SIZE as u32, CROP_SIZE as u32)
    }

    /// Deterministic validation/test transform with default sizes
    pub fn eval() -> Self {
        Self::eval_with(RESIZE_SIZE as u32, CROP_SIZE as u32)
    }

    /// Training transform with custom sizes
    pub fn train_with(resize_size: u32, crop_size: u32) -> Self {
        assert!(crop_size > 0 && crop_size <= resize_size);
        Self {
            kind: TransformKind::Train,
            resize_size,
            crop_size,
        }
    }

    /// Evaluation transform with custom sizes
    pub fn eval_with(resize_size: u32, crop_size: u32) -> Self {
        assert!(crop_size > 0 && crop_size <= resize_size);
        Self {
            kind: TransformKind::Eval,
            resize_size,
            crop_size,
        }
    }

    /// Side length of the emitted square image
    pub fn crop_size(&self) -> usize {
        self.crop_size as usize
    }

    /// Whether two applications to the same image may differ
    pub fn is_stochastic(&self) -> bool {
        self.kind == TransformKind::Train
    }

    /// Apply the transform, returning CHW float data in [0, 1].
    ///
    /// The training path draws a fresh RNG seed per call.
    pub fn apply(&self, img: &DynamicImage) -> Vec<f32> {
        match self.kind {
            TransformKind::Train => {
                let mut rng = ChaCha8Rng::seed_from_u64(rand::random());
                self.apply_train(img, &mut rng)
            }
            TransformKind::Eval => self.apply_eval(img),
        }
    }

    /// Training path with a caller-supplied RNG (reproducible draws)
    pub fn apply_with_rng(&self, img: &DynamicImage, rng: &mut ChaCha8Rng) -> Vec<f32> {
        match self.kind {
            TransformKind::Train => self.apply_train(img, rng),
            TransformKind::Eval => self.apply_eval(img),
        }
    }

    fn apply_train(&self, img: &DynamicImage, rng: &mut ChaCha8Rng) -> Vec<f32> {
        let (width, height) = img.dimensions();
        let shorter = width.min(height).max(1);

        let fraction = rng.gen_range(MIN_CROP_FRACTION..=1.0);
        let side = ((shorter as f32 * fraction) as u32).max(1);
        let x = rng.gen_range(0..=width.saturating_sub(side));
        let y = rng.gen_range(0..=height.saturating_sub(side));

        let mut crop = img
            .crop_imm(x, y, side, side)
            .resize_exact(self.crop_size, self.crop_size, FilterType::Triangle);

        if rng.gen::<f32>() < 0.5 {
            crop = crop.fliph();
        }

        to_tensor_data(&crop)
    }

    fn apply_eval(&self, img: &DynamicImage) -> Vec<f32> {
        let (width, height) = img.dimensions();
        let shorter = width.min(height).max(1);
        let scale = self.resize_size as f32 / shorter as f32;

        let new_w = ((width as f32 * scale).round() as u32).max(self.resize_size);
        let new_h = ((height as f32 * scale).round() as u32).max(self.resize_size);
        let resized = img.resize_exact(new_w, new_h, FilterType::Triangle);

        let x = (new_w - self.crop_size) / 2;
        let y = (new_h - self.crop_size) / 2;
        let crop = resized.crop_imm(x, y, self.crop_size, self.crop_size);

        to_tensor_data(&crop)
    }
}

/// Convert an image to CHW float data normalized to [0, 1]
fn to_tensor_data(img: &DynamicImage) -> Vec<f32> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut data = Vec::with_capacity(3 * height as usize * width as usize);

    for c in 0..3 {
        for y in 0..height {
            for x in 0..width {
                let pixel = rgb.get_pixel(x, y);
                data.push(pixel[c] as f32 / 255.0);
            }
        }
    }

    data
}
