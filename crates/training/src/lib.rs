#![recursion_limit = "256"]

pub mod config;
pub mod dataset;
pub mod metrics;
pub mod synth;
pub mod util;

pub use config::TrainConfig;
pub use dataset::{collate, DatasetPathConfig, ShapeBatch, ShapeSample};
pub use metrics::{evaluate, iou_xyxy, EvalReport};
pub use models::{EdgeNet, EdgeNetConfig};
pub use synth::{write_dataset, ShapeGenerator};
pub use util::{
    init_tracing, load_checkpoint, run_train, save_checkpoint, train_step, StepLosses, TrainArgs,
};
/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
