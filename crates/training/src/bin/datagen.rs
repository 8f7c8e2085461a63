use clap::Parser;
use std::path::PathBuf;
use training::util::init_tracing;
use training::{write_dataset, ShapeGenerator};

#[derive(Parser, Debug)]
#[command(name = "datagen", about = "Write a synthetic labeled shapes dataset")]
struct Args {
    /// Output root; images/ and labels/ are created under it.
    #[arg(long, default_value = "assets/datasets/shapes")]
    output_root: PathBuf,
    /// Number of images.
    #[arg(long, default_value_t = 1000)]
    count: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Image side in pixels.
    #[arg(long, default_value_t = 32)]
    size: u32,
    /// Fraction of pixels replaced with random noise.
    #[arg(long, default_value_t = 0.0)]
    noise_level: f32,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    if !(0.0..=1.0).contains(&args.noise_level) {
        anyhow::bail!("--noise-level must be within [0, 1], got {}", args.noise_level);
    }
    let generator = ShapeGenerator {
        size: args.size,
        noise_level: args.noise_level,
    };
    let records = write_dataset(&args.output_root, args.count, args.seed, generator)?;
    tracing::info!(
        "wrote {} samples to {}",
        records.len(),
        args.output_root.display()
    );
    Ok(())
}
