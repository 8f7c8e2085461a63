use anyhow::Context;
use burn::backend::Autodiff;
use burn::module::Module;
use burn::nn::loss::{CrossEntropyLossConfig, MseLoss, Reduction};
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::ElementConversion;
use clap::{Parser, ValueEnum};
use data_contracts::shapes::ShapeClass;
use models::{ChannelSplit, EdgeNet, EdgeNetConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::config::TrainConfig;
use crate::dataset::{collate, ShapeBatch, ShapeSample};
use crate::TrainBackend;

pub type ADBackend = Autodiff<TrainBackend>;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug, Default)]
#[command(name = "train", about = "Train EdgeNet on a labeled shapes dataset")]
pub struct TrainArgs {
    /// TOML config file (defaults to $EDGENET_CONFIG, then ./edgenet.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Dataset root containing labels/ and images/.
    #[arg(long)]
    pub dataset_root: Option<PathBuf>,
    /// Number of epochs.
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Batch size.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Learning rate.
    #[arg(long)]
    pub lr: Option<f64>,
    /// Seed for weight init and shuffling.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Loss weight for box regression.
    #[arg(long)]
    pub lambda_box: Option<f32>,
    /// Checkpoint output path.
    #[arg(long)]
    pub checkpoint_out: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
    /// Use narrow towers and small heads.
    #[arg(long)]
    pub small: bool,
    /// Feed R, G and B to the three filters instead of channel 0 to all of them.
    #[arg(long)]
    pub per_channel: bool,
}

impl TrainArgs {
    /// Config file (or defaults) with command-line overrides applied.
    pub fn resolve(&self) -> anyhow::Result<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => TrainConfig::from_path(path)?,
            None => TrainConfig::load(),
        };
        if let Some(root) = &self.dataset_root {
            cfg.dataset.root = root.clone();
        }
        if let Some(epochs) = self.epochs {
            cfg.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            cfg.batch_size = batch_size;
        }
        if let Some(lr) = self.lr {
            cfg.learning_rate = lr;
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if let Some(lambda_box) = self.lambda_box {
            cfg.lambda_box = lambda_box;
        }
        if let Some(path) = &self.checkpoint_out {
            cfg.checkpoint = path.clone();
        }
        if self.small {
            let model = &cfg.model;
            cfg.model = EdgeNetConfig::small(
                model.in_channels,
                model.num_classes,
                model.num_reg_outputs,
            )
            .with_mode(model.mode)
            .with_split(model.split);
        }
        if self.per_channel {
            cfg.model.split = ChannelSplit::PerChannel;
        }
        Ok(cfg)
    }
}

/// Installs the global fmt subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLosses {
    pub total: f32,
    pub classification: f32,
    pub regression: f32,
}

/// One SGD step on `cross_entropy + lambda_box * mse(boxes)`.
pub fn train_step<B, O>(
    model: EdgeNet<B>,
    optim: &mut O,
    batch: &ShapeBatch<B>,
    lr: f64,
    lambda_box: f32,
) -> (EdgeNet<B>, StepLosses)
where
    B: AutodiffBackend,
    O: Optimizer<EdgeNet<B>, B>,
{
    let detection = model.detect(batch.images.clone());
    let device = detection.classes.device();
    let ce = CrossEntropyLossConfig::new()
        .init::<B>(&device)
        .forward(detection.classes, batch.classes.clone());
    let mse = MseLoss::new().forward(detection.boxes, batch.boxes.clone(), Reduction::Mean);
    let loss = ce.clone() + mse.clone().mul_scalar(lambda_box);

    let losses = StepLosses {
        total: loss.clone().detach().into_scalar().elem::<f32>(),
        classification: ce.detach().into_scalar().elem::<f32>(),
        regression: mse.detach().into_scalar().elem::<f32>(),
    };
    let grads = GradientsParams::from_grads(loss.backward(), &model);
    let model = optim.step(lr, model, grads);
    (model, losses)
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    if let Some(kind) = args.backend {
        validate_backend_choice(kind)?;
    }
    let cfg = args.resolve()?;
    let samples = cfg.dataset.load()?;
    if samples.is_empty() {
        tracing::warn!("no samples found under {}", cfg.dataset.root.display());
        return Ok(());
    }
    train_on_samples(&cfg, &samples)?;
    Ok(())
}

/// Trains a fresh model on `samples` and writes the checkpoint named in `cfg`.
pub fn train_on_samples(
    cfg: &TrainConfig,
    samples: &[ShapeSample],
) -> anyhow::Result<EdgeNet<ADBackend>> {
    if cfg.model.num_classes < ShapeClass::COUNT {
        anyhow::bail!(
            "model has {} class outputs but the dataset uses {}",
            cfg.model.num_classes,
            ShapeClass::COUNT
        );
    }
    if cfg.model.num_reg_outputs != 4 {
        anyhow::bail!(
            "box targets have 4 coordinates, model regresses {}",
            cfg.model.num_reg_outputs
        );
    }

    let device = <ADBackend as Backend>::Device::default();
    <ADBackend as Backend>::seed(cfg.seed);
    let mut model = cfg.model.init::<ADBackend>(&device);
    let mut optim = SgdConfig::new()
        .with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(cfg.momentum)
                .with_dampening(0.0),
        ))
        .init::<ADBackend, EdgeNet<ADBackend>>();
    tracing::info!(
        params = model.num_params(),
        samples = samples.len(),
        epochs = cfg.epochs,
        batch_size = cfg.batch_size,
        lr = cfg.learning_rate,
        "training EdgeNet"
    );

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut order: Vec<usize> = (0..samples.len()).collect();
    let batch_size = cfg.batch_size.max(1);
    for epoch in 0..cfg.epochs {
        order.shuffle(&mut rng);
        let mut totals = [0.0f32; 3];
        let mut steps = 0usize;
        for chunk in order.chunks(batch_size) {
            let picked: Vec<ShapeSample> = chunk.iter().map(|&i| samples[i].clone()).collect();
            let batch = collate::<ADBackend>(&picked, &device)?;
            let (next, losses) =
                train_step(model, &mut optim, &batch, cfg.learning_rate, cfg.lambda_box);
            model = next;
            totals[0] += losses.total;
            totals[1] += losses.classification;
            totals[2] += losses.regression;
            steps += 1;
            tracing::debug!(epoch, step = steps, loss = losses.total, "step");
        }
        let steps = steps.max(1) as f32;
        tracing::info!(
            "epoch {epoch}: loss {:.4} (ce {:.4}, box {:.4})",
            totals[0] / steps,
            totals[1] / steps,
            totals[2] / steps
        );
    }

    save_checkpoint(&model, &cfg.model, &cfg.checkpoint)?;
    tracing::info!("saved checkpoint to {}", cfg.checkpoint.display());
    Ok(model)
}

/// Writes the weights to `path` and the model config next to it as `.json`.
pub fn save_checkpoint<B: Backend>(
    model: &EdgeNet<B>,
    cfg: &EdgeNetConfig,
    path: &Path,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))?;
    fs::write(
        path.with_extension("json"),
        serde_json::to_vec_pretty(cfg)?,
    )?;
    Ok(())
}

/// Rebuilds the model from the `.json` config beside `path` and loads its weights.
pub fn load_checkpoint<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<(EdgeNet<B>, EdgeNetConfig)> {
    let cfg_path = path.with_extension("json");
    let raw = fs::read(&cfg_path)
        .with_context(|| format!("failed to read model config {}", cfg_path.display()))?;
    let cfg: EdgeNetConfig = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse model config {}", cfg_path.display()))?;
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let model = cfg
        .init::<B>(device)
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", path.display()))?;
    Ok((model, cfg))
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; using the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("edgenet.toml");
        fs::write(&cfg_path, "epochs = 9\nbatch_size = 2\n").unwrap();

        let args = TrainArgs {
            config: Some(cfg_path),
            batch_size: Some(8),
            lr: Some(0.01),
            small: true,
            per_channel: true,
            ..Default::default()
        };
        let cfg = args.resolve().unwrap();
        assert_eq!(cfg.epochs, 9);
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.learning_rate, 0.01);
        assert_eq!(cfg.model.split, ChannelSplit::PerChannel);
        assert_eq!(cfg.model.classification.base_width, 4);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = TrainArgs {
            config: Some(PathBuf::from("/nonexistent/edgenet.toml")),
            ..Default::default()
        };
        assert!(args.resolve().is_err());
    }
}
