//! Fixed (non-learned) image filters applied before the learned towers.
//!
//! The bank holds three constant kernels: a 15x15 Gaussian blur and the two 3x3 Sobel gradient
//! operators. They are stored as plain constant tensors on the module, so they follow the module
//! across devices but are never visited by optimizers and never written into records.

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::module::conv2d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};

/// Number of channels produced by the bank (smoothed, horizontal edges, vertical edges).
pub const FILTERED_CHANNELS: usize = 3;

pub const SOBEL_X: [[f32; 3]; 3] = [[1.0, 0.0, -1.0], [2.0, 0.0, -2.0], [1.0, 0.0, -1.0]];
pub const SOBEL_Y: [[f32; 3]; 3] = [[1.0, 2.0, 1.0], [0.0, 0.0, 0.0], [-1.0, -2.0, -1.0]];

/// Precomputed 15x15 smoothing kernel (support is the central 9x9 window).
///
/// Row 10 sits one column left of its mirror image in row 4; the table is kept exactly as
/// calibrated, so the values sum to 0.99961 rather than 1.
#[rustfmt::skip]
#[allow(clippy::excessive_precision)]
pub const GAUSSIAN: [[f32; 15]; 15] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.00010654271, 0.000301935253, 0.000427277986, 0.000301935253, 0.00010654271, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.000213362027, 0.0012108786, 0.00343155282, 0.00485609734, 0.00343155282, 0.0012108786, 0.000213362027, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.00010654271, 0.0012108786, 0.00687201468, 0.0194748519, 0.0275594699, 0.0194748519, 0.00687201468, 0.0012108786, 0.00010654271, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.000301935253, 0.00343155282, 0.0194748519, 0.0551904899, 0.0781017823, 0.0551904899, 0.0194748519, 0.00343155282, 0.000301935253, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.000427277986, 0.00485609734, 0.0275594699, 0.0781017823, 0.110524266, 0.0781017823, 0.0275594699, 0.00485609734, 0.000427277986, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.000301935253, 0.00343155282, 0.0194748519, 0.0551904899, 0.0781017823, 0.0551904899, 0.0194748519, 0.00343155282, 0.000301935253, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.00010654271, 0.0012108786, 0.00687201468, 0.0194748519, 0.0275594699, 0.0194748519, 0.00687201468, 0.0012108786, 0.00010654271, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.000213362027, 0.0012108786, 0.00343155282, 0.00485609734, 0.00343155282, 0.0012108786, 0.000213362027, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.00010654271, 0.000301935253, 0.000427277986, 0.000301935253, 0.00010654271, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
];

/// How the input image is split into the three single-channel views fed to the filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSplit {
    /// All three views are channel 0.
    #[default]
    ReplicateFirst,
    /// Views are channels 0, 1 and 2.
    PerChannel,
}

impl ChannelSplit {
    /// Minimum number of input channels the split reads from.
    pub fn required_channels(self) -> usize {
        match self {
            ChannelSplit::ReplicateFirst => 1,
            ChannelSplit::PerChannel => 3,
        }
    }
}

#[derive(Module, Debug)]
pub struct FixedFilterBank<B: Backend> {
    gaussian: Tensor<B, 4>,
    sobel_x: Tensor<B, 4>,
    sobel_y: Tensor<B, 4>,
}

impl<B: Backend> FixedFilterBank<B> {
    pub fn new(device: &B::Device) -> Self {
        Self {
            gaussian: kernel_tensor(&GAUSSIAN, device),
            sobel_x: kernel_tensor(&SOBEL_X, device),
            sobel_y: kernel_tensor(&SOBEL_Y, device),
        }
    }

    /// Device the kernels live on.
    pub fn device(&self) -> B::Device {
        self.gaussian.device()
    }

    /// Kernels as `[1, 1, k, k]` tensors, in application order.
    pub fn kernels(&self) -> [Tensor<B, 4>; 3] {
        [
            self.gaussian.clone(),
            self.sobel_x.clone(),
            self.sobel_y.clone(),
        ]
    }

    /// Extracts three `[batch, 1, h, w]` views from `[batch, channels, h, w]` images.
    pub fn split(&self, images: Tensor<B, 4>, split: ChannelSplit) -> [Tensor<B, 4>; 3] {
        let [batch, channels, height, width] = images.dims();
        assert!(
            channels >= split.required_channels(),
            "{split:?} needs at least {} input channels, got {channels}",
            split.required_channels()
        );
        let channel = |c: usize| {
            images
                .clone()
                .slice([0..batch, c..c + 1, 0..height, 0..width])
        };
        match split {
            ChannelSplit::ReplicateFirst => {
                let first = channel(0);
                [first.clone(), first.clone(), first]
            }
            ChannelSplit::PerChannel => [channel(0), channel(1), channel(2)],
        }
    }

    /// Gaussian on view 0, Sobel-X on view 1, Sobel-Y on view 2; results stacked on channels.
    pub fn apply(&self, views: [Tensor<B, 4>; 3]) -> Tensor<B, 4> {
        let [smooth, edge_x, edge_y] = views;
        let smooth = same_conv(smooth, self.gaussian.clone());
        let edge_x = same_conv(edge_x, self.sobel_x.clone());
        let edge_y = same_conv(edge_y, self.sobel_y.clone());
        Tensor::cat(vec![smooth, edge_x, edge_y], 1)
    }

    pub fn forward(&self, images: Tensor<B, 4>, split: ChannelSplit) -> Tensor<B, 4> {
        self.apply(self.split(images, split))
    }
}

/// Stride-1 convolution without bias, padded by `k / 2` so the spatial size is preserved.
fn same_conv<B: Backend>(view: Tensor<B, 4>, kernel: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, _, kh, kw] = kernel.dims();
    let options = ConvOptions::new([1, 1], [kh / 2, kw / 2], [1, 1], 1);
    conv2d(view, kernel, None, options)
}

fn kernel_tensor<B: Backend, const K: usize>(
    rows: &[[f32; K]; K],
    device: &B::Device,
) -> Tensor<B, 4> {
    let values: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::from_data(TensorData::new(values, [1, 1, K, K]), device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum<const K: usize>(rows: &[[f32; K]; K]) -> f32 {
        rows.iter().flatten().sum()
    }

    #[test]
    fn gaussian_is_normalized() {
        assert!((sum(&GAUSSIAN) - 1.0).abs() < 1e-3);
        assert!(GAUSSIAN.iter().flatten().all(|v| *v >= 0.0));
    }

    #[test]
    fn sobel_kernels_sum_to_zero() {
        assert_eq!(sum(&SOBEL_X), 0.0);
        assert_eq!(sum(&SOBEL_Y), 0.0);
    }

    #[test]
    fn sobel_kernels_are_transposes() {
        for (i, row) in SOBEL_X.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                assert_eq!(*v, SOBEL_Y[j][i]);
            }
        }
    }

    #[test]
    fn gaussian_support_is_central() {
        for (i, row) in GAUSSIAN.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                if !(3..=11).contains(&i) || !(3..=11).contains(&j) {
                    assert_eq!(*v, 0.0, "nonzero outside support at ({i}, {j})");
                }
            }
        }
    }
}
