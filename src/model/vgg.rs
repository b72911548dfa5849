//! VGG-16 Architecture
//!
//! The classic VGG-16 convolutional network built with Burn: five
//! convolutional stages (3x3 kernels, ReLU, 2x2 max-pooling), adaptive
//! average pooling to 7x7, and a three-layer fully connected classifier.
//!
//! `base_width` and `hidden_size` default to the canonical 64/4096 but are
//! configurable so tests can run a scaled-down network.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Spatial size after adaptive average pooling
const POOL_OUTPUT: usize = 7;

/// Convolution counts of the five VGG-16 stages
const STAGE_DEPTHS: [usize; 5] = [2, 2, 3, 3, 3];

/// Width multiplier of each stage relative to `base_width`
const STAGE_WIDTHS: [usize; 5] = [1, 2, 4, 8, 8];

/// Configuration for the VGG-16 model
#[derive(Config, Debug)]
pub struct Vgg16Config {
    /// Number of output classes (1000 for the pretrained ImageNet checkpoint)
    #[config(default = "1000")]
    pub num_classes: usize,

    /// Channel width of the first stage (64 for canonical VGG-16)
    #[config(default = "64")]
    pub base_width: usize,

    /// Width of the two hidden classifier layers (4096 for canonical VGG-16)
    #[config(default = "4096")]
    pub hidden_size: usize,

    /// Dropout rate applied after each hidden classifier layer
    #[config(default = "0.5")]
    pub dropout: f64,
}

/// Explicit forward-computation mode.
///
/// Dropout is applied only in `Train`; `Eval` runs the deterministic path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Train,
    Eval,
}

/// One VGG stage: a run of 3x3 convolutions followed by 2x2 max-pooling
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvStage<B> {
    /// Create a stage of `depth` convolutions mapping `in_channels` to
    /// `out_channels`
    pub fn new(in_channels: usize, out_channels: usize, depth: usize, device: &B::Device) -> Self {
        let mut convs = Vec::with_capacity(depth);
        let mut channels = in_channels;
        for _ in 0..depth {
            convs.push(
                Conv2dConfig::new([channels, out_channels], [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device),
            );
            channels = out_channels;
        }

        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            convs,
            relu: Relu::new(),
            pool,
        }
    }

    /// Forward pass through the stage
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = x;
        for conv in &self.convs {
            x = self.relu.forward(conv.forward(x));
        }
        self.pool.forward(x)
    }
}

/// VGG-16 image classifier
///
/// Architecture:
/// - 13 convolutions in 5 stages (widths 64, 128, 256, 512, 512)
/// - Adaptive average pooling to 7x7
/// - Classifier: fc1 -> ReLU -> dropout -> fc2 -> ReLU -> dropout -> head
#[derive(Module, Debug)]
pub struct Vgg16<B: Backend> {
    // Feature extraction (public for the fine-tuning adapter and tests)
    pub stages: Vec<ConvStage<B>>,
    pub avgpool: AdaptiveAvgPool2d,

    // Classifier
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub head: Linear<B>,
    pub dropout: Dropout,
    pub relu: Relu,

    num_classes: usize,
    hidden_size: usize,
}

impl<B: Backend> Vgg16<B> {
    /// Create a new VGG-16 from configuration
    pub fn new(config: &Vgg16Config, device: &B::Device) -> Self {
        let mut stages = Vec::with_capacity(STAGE_DEPTHS.len());
        let mut in_channels = 3;
        for (depth, width) in STAGE_DEPTHS.iter().zip(STAGE_WIDTHS.iter()) {
            let out_channels = config.base_width * width;
            stages.push(ConvStage::new(in_channels, out_channels, *depth, device));
            in_channels = out_channels;
        }

        let avgpool = AdaptiveAvgPool2dConfig::new([POOL_OUTPUT, POOL_OUTPUT]).init();

        let feature_dim = in_channels * POOL_OUTPUT * POOL_OUTPUT;
        let fc1 = LinearConfig::new(feature_dim, config.hidden_size).init(device);
        let fc2 = LinearConfig::new(config.hidden_size, config.hidden_size).init(device);
        let head = LinearConfig::new(config.hidden_size, config.num_classes).init(device);
        let dropout = DropoutConfig::new(config.dropout).init();

        Self {
            stages,
            avgpool,
            fc1,
            fc2,
            head,
            dropout,
            relu: Relu::new(),
            num_classes: config.num_classes,
            hidden_size: config.hidden_size,
        }
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    /// * `mode` - Explicit run mode; dropout is active only in `Train`
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>, mode: RunMode) -> Tensor<B, 2> {
        let mut x = x;
        for stage in &self.stages {
            x = stage.forward(x);
        }

        let x = self.avgpool.forward(x);

        // Flatten: [B, C, 7, 7] -> [B, C * 49]
        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.relu.forward(self.fc1.forward(x));
        let x = self.apply_dropout(x, mode);
        let x = self.relu.forward(self.fc2.forward(x));
        let x = self.apply_dropout(x, mode);
        self.head.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x, RunMode::Eval);
        burn::tensor::activation::softmax(logits, 1)
    }

    fn apply_dropout(&self, x: Tensor<B, 2>, mode: RunMode) -> Tensor<B, 2> {
        match mode {
            RunMode::Train => self.dropout.forward(x),
            RunMode::Eval => x,
        }
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Width of the penultimate (hidden) classifier layers
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Mark every feature-extraction parameter as non-trainable.
    ///
    /// Covers the convolutional stages and both hidden classifier layers;
    /// only the head remains trainable afterwards.
    pub fn freeze_backbone(mut self) -> Self {
        self.stages = self.stages.no_grad();
        self.fc1 = self.fc1.no_grad();
        self.fc2 = self.fc2.no_grad();
        self
    }

    /// Replace the head with a freshly initialized linear layer of
    /// `(hidden_size -> num_classes)`
    pub fn with_head(mut self, num_classes: usize, device: &B::Device) -> Self {
        self.head = LinearConfig::new(self.hidden_size, num_classes).init(device);
        self.num_classes = num_classes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    /// Scaled-down config keeping the architecture shape
    fn tiny_config(num_classes: usize) -> Vgg16Config {
        Vgg16Config::new()
            .with_num_classes(num_classes)
            .with_base_width(2)
            .with_hidden_size(16)
    }

    #[test]
    fn test_forward_output_shape() {
        let device = Default::default();
        let model = Vgg16::<TestBackend>::new(&tiny_config(4), &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let output = model.forward(input, RunMode::Eval);

        assert_eq!(output.dims(), [2, 4]);
    }

    #[test]
    fn test_eval_forward_is_deterministic() {
        let device = Default::default();
        let model = Vgg16::<TestBackend>::new(&tiny_config(4), &device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 64, 64], &device);
        let first: Vec<f32> = model
            .forward(input.clone(), RunMode::Eval)
            .into_data()
            .to_vec()
            .unwrap();
        let second: Vec<f32> = model
            .forward(input, RunMode::Eval)
            .into_data()
            .to_vec()
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = Vgg16::<TestBackend>::new(&tiny_config(4), &device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 64, 64], &device);
        let probs: Vec<f32> = model.forward_softmax(input).into_data().to_vec().unwrap();

        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_stage_count_and_depths() {
        let device = Default::default();
        let model = Vgg16::<TestBackend>::new(&tiny_config(10), &device);

        assert_eq!(model.stages.len(), 5);
        let depths: Vec<usize> = model.stages.iter().map(|s| s.convs.len()).collect();
        assert_eq!(depths, vec![2, 2, 3, 3, 3]);
        assert_eq!(model.num_classes(), 10);
    }

    #[test]
    fn test_with_head_resizes_output() {
        let device = Default::default();
        let model = Vgg16::<TestBackend>::new(&tiny_config(1000), &device);
        let model = model.with_head(4, &device);

        assert_eq!(model.num_classes(), 4);
        assert_eq!(model.head.weight.val().dims(), [16, 4]);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 64, 64], &device);
        assert_eq!(model.forward(input, RunMode::Eval).dims(), [1, 4]);
    }
}
