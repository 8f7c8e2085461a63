use burn::module::{Ignored, Module};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::filters::{ChannelSplit, FixedFilterBank, FILTERED_CHANNELS};
use crate::tower::{Tower, TowerConfig};

/// What `EdgeNet::forward` returns.
///
/// Serialized as the integer flag used by older configs: `0` detect, `1` feature maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HeadMode {
    /// Run both heads and return class logits and box coordinates.
    #[default]
    Detect,
    /// Stop after the conv stacks and return both towers' final feature maps.
    FeatureMaps,
}

impl HeadMode {
    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(HeadMode::Detect),
            1 => Some(HeadMode::FeatureMaps),
            _ => None,
        }
    }

    pub fn flag(self) -> u8 {
        match self {
            HeadMode::Detect => 0,
            HeadMode::FeatureMaps => 1,
        }
    }
}

impl TryFrom<u8> for HeadMode {
    type Error = String;

    fn try_from(flag: u8) -> Result<Self, Self::Error> {
        HeadMode::from_flag(flag).ok_or_else(|| format!("unknown head mode flag {flag}"))
    }
}

impl From<HeadMode> for u8 {
    fn from(mode: HeadMode) -> Self {
        mode.flag()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeNetConfig {
    pub in_channels: usize,
    pub num_classes: usize,
    pub num_reg_outputs: usize,
    #[serde(default)]
    pub mode: HeadMode,
    #[serde(default)]
    pub split: ChannelSplit,
    #[serde(default = "TowerConfig::classification")]
    pub classification: TowerConfig,
    #[serde(default = "TowerConfig::regression")]
    pub regression: TowerConfig,
}

impl Default for EdgeNetConfig {
    fn default() -> Self {
        Self::new(3, 5, 4)
    }
}

impl EdgeNetConfig {
    pub fn new(in_channels: usize, num_classes: usize, num_reg_outputs: usize) -> Self {
        Self {
            in_channels,
            num_classes,
            num_reg_outputs,
            mode: HeadMode::Detect,
            split: ChannelSplit::ReplicateFirst,
            classification: TowerConfig::classification(),
            regression: TowerConfig::regression(),
        }
    }

    /// Narrow towers with small heads; same topology, a tiny fraction of the weights.
    pub fn small(in_channels: usize, num_classes: usize, num_reg_outputs: usize) -> Self {
        Self {
            classification: TowerConfig::classification()
                .with_base_width(4)
                .with_head_hidden(vec![64, 32]),
            regression: TowerConfig::regression()
                .with_base_width(4)
                .with_head_hidden(vec![64, 16]),
            ..Self::new(in_channels, num_classes, num_reg_outputs)
        }
    }

    pub fn with_mode(mut self, mode: HeadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_split(mut self, split: ChannelSplit) -> Self {
        self.split = split;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> EdgeNet<B> {
        EdgeNet::new(self.clone(), device)
    }
}

#[derive(Debug, Clone)]
pub struct Detection<B: Backend> {
    /// Class logits, `[batch, num_classes]`.
    pub classes: Tensor<B, 2>,
    /// Box regression, `[batch, num_reg_outputs]`.
    pub boxes: Tensor<B, 2>,
}

#[derive(Debug, Clone)]
pub enum EdgeNetOutput<B: Backend> {
    Detection(Detection<B>),
    FeatureMaps {
        classification: Tensor<B, 4>,
        regression: Tensor<B, 4>,
    },
}

impl<B: Backend> EdgeNetOutput<B> {
    pub fn into_detection(self) -> Option<Detection<B>> {
        match self {
            EdgeNetOutput::Detection(detection) => Some(detection),
            EdgeNetOutput::FeatureMaps { .. } => None,
        }
    }
}

/// Fixed filter bank feeding two independent towers: class logits and box regression.
#[derive(Module, Debug)]
pub struct EdgeNet<B: Backend> {
    filters: FixedFilterBank<B>,
    classification: Tower<B>,
    regression: Tower<B>,
    mode: Ignored<HeadMode>,
    split: Ignored<ChannelSplit>,
}

impl<B: Backend> EdgeNet<B> {
    pub fn new(cfg: EdgeNetConfig, device: &B::Device) -> Self {
        assert!(
            cfg.in_channels >= cfg.split.required_channels(),
            "{:?} split needs {} input channels, config has {}",
            cfg.split,
            cfg.split.required_channels(),
            cfg.in_channels
        );
        let classification = Tower::new(
            FILTERED_CHANNELS,
            cfg.num_classes,
            &cfg.classification,
            device,
        );
        let regression = Tower::new(
            FILTERED_CHANNELS,
            cfg.num_reg_outputs,
            &cfg.regression,
            device,
        );
        Self {
            filters: FixedFilterBank::new(device),
            classification,
            regression,
            mode: Ignored(cfg.mode),
            split: Ignored(cfg.split),
        }
    }

    pub fn mode(&self) -> HeadMode {
        self.mode.0
    }

    pub fn filter_bank(&self) -> &FixedFilterBank<B> {
        &self.filters
    }

    pub fn classification_tower(&self) -> &Tower<B> {
        &self.classification
    }

    pub fn regression_tower(&self) -> &Tower<B> {
        &self.regression
    }

    /// Filter-bank output shared by both towers, `[batch, 3, h, w]`.
    ///
    /// Images are moved to the device holding the fixed kernels first.
    pub fn filter(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let images = images.to_device(&self.filters.device());
        self.filters.forward(images, self.split.0)
    }

    /// Runs both heads regardless of the configured mode.
    pub fn detect(&self, images: Tensor<B, 4>) -> Detection<B> {
        let filtered = self.filter(images);
        Detection {
            classes: self.classification.forward(filtered.clone()),
            boxes: self.regression.forward(filtered),
        }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> EdgeNetOutput<B> {
        match self.mode.0 {
            HeadMode::Detect => EdgeNetOutput::Detection(self.detect(images)),
            HeadMode::FeatureMaps => {
                let filtered = self.filter(images);
                EdgeNetOutput::FeatureMaps {
                    classification: self.classification.features(filtered.clone()),
                    regression: self.regression.features(filtered),
                }
            }
        }
    }
}
