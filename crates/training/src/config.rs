use anyhow::Context;
use models::EdgeNetConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dataset::DatasetPathConfig;

const DEFAULT_CONFIG_NAME: &str = "edgenet.toml";
const CONFIG_ENV: &str = "EDGENET_CONFIG";

/// Training hyperparameters, dataset location and model shape.
///
/// Every field is optional in the TOML file; missing ones take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub model: EdgeNetConfig,
    pub learning_rate: f64,
    pub momentum: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
    /// Weight of the box regression loss relative to cross-entropy.
    pub lambda_box: f32,
    pub dataset: DatasetPathConfig,
    pub checkpoint: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model: EdgeNetConfig::default(),
            learning_rate: 1e-4,
            momentum: 0.9,
            epochs: 4,
            batch_size: 4,
            seed: 0,
            lambda_box: 1.0,
            dataset: DatasetPathConfig::default(),
            checkpoint: PathBuf::from("checkpoints/edgenet.bin"),
        }
    }
}

impl TrainConfig {
    /// Loads `$EDGENET_CONFIG`, else `edgenet.toml` in the working directory, else defaults.
    pub fn load() -> Self {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_NAME));
        if !path.exists() {
            return Self::default();
        }
        match Self::from_path(&path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!("ignoring config {}: {err:#}", path.display());
                Self::default()
            }
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut cfg: TrainConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        cfg.dataset.root = expand_path(&cfg.dataset.root.to_string_lossy());
        cfg.checkpoint = expand_path(&cfg.checkpoint.to_string_lossy());
        cfg.warn_if_invalid();
        Ok(cfg)
    }

    fn warn_if_invalid(&self) {
        if self.batch_size == 0 {
            tracing::warn!("config: batch_size is 0; training will use 1");
        }
        if self.learning_rate <= 0.0 {
            tracing::warn!("config: learning_rate {} is not positive", self.learning_rate);
        }
        if self.model.num_classes == 0 || self.model.num_reg_outputs == 0 {
            tracing::warn!("config: model heads need at least one output; model init will panic");
        }
    }
}

/// Expands a leading `~` and `${VAR}` references.
fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{stripped}");
        }
    }
    PathBuf::from(expand_env(&out))
}

fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let key = &rest[start + 2..start + 2 + len];
        match std::env::var(key) {
            Ok(val) => out.push_str(&val),
            Err(_) => out.push_str(&rest[start..start + len + 3]),
        }
        rest = &rest[start + len + 3..];
    }
    out.push_str(rest);
    out
}
