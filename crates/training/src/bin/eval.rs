use clap::Parser;
use std::path::PathBuf;
use training::util::{init_tracing, load_checkpoint, validate_backend_choice, BackendKind};
use training::{evaluate, DatasetPathConfig, TrainBackend, TrainConfig};

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Evaluate an EdgeNet checkpoint on a dataset (accuracy, box MSE, IoU)"
)]
struct Args {
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    backend: BackendKind,
    /// Dataset root containing labels/ and images/.
    #[arg(long)]
    dataset_root: Option<PathBuf>,
    /// Labels subdirectory relative to dataset root.
    #[arg(long, default_value = "labels")]
    labels_subdir: String,
    /// Images subdirectory relative to dataset root.
    #[arg(long, default_value = ".")]
    images_subdir: String,
    /// Checkpoint path to load (defaults to the configured checkpoint).
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    #[arg(long, default_value_t = 8)]
    batch_size: usize,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    validate_backend_choice(args.backend)?;

    let train_cfg = TrainConfig::load();
    let cfg = DatasetPathConfig {
        root: args.dataset_root.unwrap_or(train_cfg.dataset.root),
        labels_subdir: args.labels_subdir,
        images_subdir: args.images_subdir,
    };
    let samples = cfg.load()?;
    if samples.is_empty() {
        tracing::warn!("no samples found under {}", cfg.root.display());
        return Ok(());
    }

    let device = <TrainBackend as burn::tensor::backend::Backend>::Device::default();
    let ckpt = args.checkpoint.unwrap_or(train_cfg.checkpoint);
    let model = match load_checkpoint::<TrainBackend>(&ckpt, &device) {
        Ok((model, _)) => model,
        Err(e) => {
            tracing::warn!(
                "failed to load checkpoint {}; using fresh model ({e:#})",
                ckpt.display()
            );
            train_cfg.model.init::<TrainBackend>(&device)
        }
    };

    let report = evaluate(&model, &samples, args.batch_size, &device)?;
    tracing::info!("eval complete on {} samples", report.samples());
    println!("{report}");
    Ok(())
}
