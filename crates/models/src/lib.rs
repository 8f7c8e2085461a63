//! Burn models for shape detection and localization.
//!
//! `EdgeNet` runs every image through a bank of fixed filters (Gaussian blur, horizontal and
//! vertical Sobel), then feeds the three filtered channels to two independent VGG-style towers:
//! one predicts class logits, the other a 4-value bounding box.
//!
//! - `filters`: constant kernels and the channel split feeding them.
//! - `tower`: the parameterized conv tower (eight blocks, four residual skips, dense head).
//! - `edgenet`: the composed model and its config.
//!
//! These are pure Burn modules. Device placement is always passed in by the caller; nothing here
//! picks a device on its own.

pub mod edgenet;
pub mod filters;
pub mod tower;

pub use edgenet::{Detection, EdgeNet, EdgeNetConfig, EdgeNetOutput, HeadMode};
pub use filters::{ChannelSplit, FixedFilterBank, FILTERED_CHANNELS};
pub use tower::{HeadConfig, Tower, TowerConfig};

pub mod prelude {
    pub use super::{
        ChannelSplit, Detection, EdgeNet, EdgeNetConfig, EdgeNetOutput, FixedFilterBank,
        HeadMode, TowerConfig,
    };
}
