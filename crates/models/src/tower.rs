//! VGG-style convolutional tower with residual skips and a fully connected head.
//!
//! `EdgeNet` builds two of these from the same layout: one ending in class logits, one in box
//! coordinates. Channel widths are multiples of `base_width`:
//!
//! | block | pooled (default) | conv output widths |
//! |-------|------------------|--------------------|
//! | 1     |                  | 1w                 |
//! | 2     |                  | 1w, 2w, 2w         |
//! | 3     | yes              | 4w, 4w             |
//! | 4     |                  | 4w, 4w             |
//! | 5     | yes              | 8w, 8w             |
//! | 6     | yes              | 8w, 8w             |
//! | 7     | yes              | 16w, 16w           |
//! | 8     |                  | 16w, 16w           |
//!
//! Blocks 2, 3, 5 and 7 end with a residual skip: `x + relu(bn(conv(x)))`.

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Conv output widths per block, in units of `base_width`.
const BLOCK_LAYOUT: [&[usize]; 8] = [
    &[1],
    &[1, 2, 2],
    &[4, 4],
    &[4, 4],
    &[8, 8],
    &[8, 8],
    &[16, 16],
    &[16, 16],
];

/// Blocks (1-based) followed by a residual skip.
const SKIP_BLOCKS: [usize; 4] = [2, 3, 5, 7];

/// Width of the last block, in units of `base_width`.
const FINAL_WIDTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadConfig {
    /// Hidden layer widths between the flattened features and the output layer.
    pub hidden: Vec<usize>,
    pub dropout: f64,
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            hidden: vec![4096, 1000],
            dropout: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerConfig {
    pub base_width: usize,
    /// Blocks (1-based) preceded by a 2x2 max-pool.
    pub pooled_blocks: Vec<usize>,
    /// Spatial size after adaptive average pooling.
    pub pooled_size: [usize; 2],
    pub head: HeadConfig,
}

impl Default for TowerConfig {
    fn default() -> Self {
        Self::classification()
    }
}

impl TowerConfig {
    pub fn classification() -> Self {
        Self {
            base_width: 64,
            pooled_blocks: vec![3, 5, 6, 7],
            pooled_size: [7, 7],
            head: HeadConfig::default(),
        }
    }

    pub fn regression() -> Self {
        Self {
            head: HeadConfig {
                hidden: vec![4096, 512],
                ..HeadConfig::default()
            },
            ..Self::classification()
        }
    }

    pub fn with_base_width(mut self, base_width: usize) -> Self {
        self.base_width = base_width;
        self
    }

    pub fn with_head_hidden(mut self, hidden: Vec<usize>) -> Self {
        self.head.hidden = hidden;
        self
    }

    pub fn with_pooled_blocks(mut self, pooled_blocks: Vec<usize>) -> Self {
        self.pooled_blocks = pooled_blocks;
        self
    }

    pub fn init<B: Backend>(
        &self,
        in_channels: usize,
        outputs: usize,
        device: &B::Device,
    ) -> Tower<B> {
        Tower::new(in_channels, outputs, self, device)
    }

    /// Length of the flattened vector entering the head.
    pub fn flattened_features(&self) -> usize {
        FINAL_WIDTH * self.base_width * self.pooled_size[0] * self.pooled_size[1]
    }

    /// Total spatial downsampling factor of the conv stack.
    pub fn downsampling(&self) -> usize {
        let pools = (1..=BLOCK_LAYOUT.len())
            .filter(|b| self.pooled_blocks.contains(b))
            .count();
        1 << pools
    }
}

/// 3x3 same-padded convolution, batch norm, ReLU.
#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBnRelu<B> {
    pub fn new(channels: [usize; 2], device: &B::Device) -> Self {
        let conv = Conv2dConfig::new(channels, [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let norm = BatchNormConfig::new(channels[1]).init(device);
        Self { conv, norm }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.norm.forward(self.conv.forward(input)))
    }
}

#[derive(Module, Debug)]
pub struct TowerBlock<B: Backend> {
    pool: Option<MaxPool2d>,
    layers: Vec<ConvBnRelu<B>>,
    skip: Option<ConvBnRelu<B>>,
}

impl<B: Backend> TowerBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = match &self.pool {
            Some(pool) => pool.forward(input),
            None => input,
        };
        for layer in &self.layers {
            x = layer.forward(x);
        }
        match &self.skip {
            Some(skip) => skip.forward(x.clone()) + x,
            None => x,
        }
    }
}

#[derive(Module, Debug)]
pub struct Tower<B: Backend> {
    blocks: Vec<TowerBlock<B>>,
    pool: AdaptiveAvgPool2d,
    head: Vec<nn::Linear<B>>,
    dropout: nn::Dropout,
}

impl<B: Backend> Tower<B> {
    pub fn new(
        in_channels: usize,
        outputs: usize,
        cfg: &TowerConfig,
        device: &B::Device,
    ) -> Self {
        assert!(cfg.base_width > 0, "tower base_width must be positive");
        assert!(outputs > 0, "tower head needs at least one output");
        let width = cfg.base_width;
        let mut channels = in_channels;
        let mut blocks = Vec::with_capacity(BLOCK_LAYOUT.len());
        for (index, widths) in BLOCK_LAYOUT.iter().enumerate() {
            let number = index + 1;
            let pool = cfg
                .pooled_blocks
                .contains(&number)
                .then(|| MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init());
            let mut layers = Vec::with_capacity(widths.len());
            for multiple in widths.iter() {
                let out = multiple * width;
                layers.push(ConvBnRelu::new([channels, out], device));
                channels = out;
            }
            let skip = SKIP_BLOCKS
                .contains(&number)
                .then(|| ConvBnRelu::new([channels, channels], device));
            blocks.push(TowerBlock { pool, layers, skip });
        }

        let mut dims = Vec::with_capacity(cfg.head.hidden.len() + 2);
        dims.push(cfg.flattened_features());
        dims.extend(cfg.head.hidden.iter().copied());
        dims.push(outputs);
        let head = dims
            .windows(2)
            .map(|pair| nn::LinearConfig::new(pair[0], pair[1]).init(device))
            .collect();

        Self {
            blocks,
            pool: AdaptiveAvgPool2dConfig::new(cfg.pooled_size).init(),
            head,
            dropout: nn::DropoutConfig::new(cfg.head.dropout).init(),
        }
    }

    /// Output of the eighth block, before adaptive pooling.
    pub fn features(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input;
        for block in &self.blocks {
            x = block.forward(x);
        }
        x
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(self.features(input));
        let mut x: Tensor<B, 2> = x.flatten(1, 3);
        let last = self.head.len().saturating_sub(1);
        for (i, linear) in self.head.iter().enumerate() {
            x = linear.forward(x);
            if i < last {
                x = self.dropout.forward(relu(x));
            }
        }
        x
    }

    pub fn outputs(&self) -> usize {
        self.head.last().map(|l| l.weight.dims()[1]).unwrap_or(0)
    }
}
