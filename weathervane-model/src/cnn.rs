//! CNN architectures for weather classification.
//!
//! Two variants share one module type: the full `cnn` (four conv
//! blocks) and the smaller `cnn_lite` (three blocks) for faster CPU
//! inference. Global average pooling keeps both input-size agnostic.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};
use weathervane_core::{WeatherClass, WeathervaneError};

/// Supported classifier architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    Cnn,
    CnnLite,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Cnn => "cnn",
            Architecture::CnnLite => "cnn_lite",
        }
    }

    pub fn parse(name: &str) -> Result<Self, WeathervaneError> {
        match name {
            "cnn" => Ok(Architecture::Cnn),
            "cnn_lite" => Ok(Architecture::CnnLite),
            other => Err(WeathervaneError::invalid_input(format!(
                "unsupported architecture '{other}' (expected 'cnn' or 'cnn_lite')"
            ))),
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to build (or rebuild) a classifier module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub architecture: Architecture,
    pub num_classes: usize,
    pub image_size: usize,
    pub dropout: f64,
    pub base_filters: usize,
}

impl ModelSpec {
    pub fn new(architecture: Architecture, image_size: usize, dropout: f64) -> Self {
        Self {
            architecture,
            num_classes: WeatherClass::COUNT,
            image_size,
            dropout,
            base_filters: 32,
        }
    }

    /// Channel widths of the conv blocks for this architecture.
    fn block_channels(&self) -> Vec<usize> {
        let base = self.base_filters;
        match self.architecture {
            Architecture::Cnn => vec![base, base * 2, base * 4, base * 8],
            Architecture::CnnLite => vec![16, 32, 64],
        }
    }

    /// Widths of the two hidden layers in the classifier head.
    fn head_widths(&self) -> (usize, usize) {
        match self.architecture {
            Architecture::Cnn => (512, 256),
            Architecture::CnnLite => (256, 128),
        }
    }
}

/// A conv block: Conv2d (same padding), ReLU, 2x2 max pool.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    relu: Relu,
    pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            conv,
            relu: Relu::new(),
            pool,
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// The weather classifier network.
///
/// Conv blocks with increasing filter counts, global average pooling,
/// then two hidden dense layers with dropout after each before the
/// class logits. The first dropout is fixed at 0.5; the second is the
/// configured rate.
#[derive(Module, Debug)]
pub struct WeatherCnn<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    global_pool: AdaptiveAvgPool2d,
    fc1: Linear<B>,
    dropout1: Dropout,
    fc2: Linear<B>,
    dropout2: Dropout,
    fc3: Linear<B>,
}

impl<B: Backend> WeatherCnn<B> {
    /// Build a fresh (untrained) network from a spec.
    pub fn new(spec: &ModelSpec, device: &B::Device) -> Self {
        let channels = spec.block_channels();
        let mut blocks = Vec::with_capacity(channels.len());
        let mut in_channels = 3;
        for &out_channels in &channels {
            blocks.push(ConvBlock::new(in_channels, out_channels, device));
            in_channels = out_channels;
        }

        let (wide, narrow) = spec.head_widths();
        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc1 = LinearConfig::new(in_channels, wide).init(device);
        let dropout1 = DropoutConfig::new(0.5).init();
        let fc2 = LinearConfig::new(wide, narrow).init(device);
        let dropout2 = DropoutConfig::new(spec.dropout).init();
        let fc3 = LinearConfig::new(narrow, spec.num_classes).init(device);

        Self {
            blocks,
            global_pool,
            fc1,
            dropout1,
            fc2,
            dropout2,
            fc3,
        }
    }

    /// Forward pass.
    ///
    /// Input shape `[batch, 3, height, width]`, output logits shape
    /// `[batch, num_classes]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout1.forward(x);
        let x = self.fc2.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout2.forward(x);
        self.fc3.forward(x)
    }

    /// Forward pass with softmax over the class dimension.
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x);
        burn::tensor::activation::softmax(logits, 1)
    }
}
