use anyhow::Context;
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use data_contracts::shapes::ShapeRecord;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetPathConfig {
    pub root: PathBuf,
    pub labels_subdir: String,
    pub images_subdir: String,
}

impl Default for DatasetPathConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("assets/datasets/shapes"),
            labels_subdir: "labels".into(),
            images_subdir: ".".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShapeSample {
    pub image: PathBuf,
    pub record: ShapeRecord,
}

#[derive(Debug, Clone)]
pub struct ShapeBatch<B: Backend> {
    /// RGB images scaled to [0, 1], `[batch, 3, height, width]`.
    pub images: Tensor<B, 4>,
    /// Class indices, `[batch]`.
    pub classes: Tensor<B, 1, Int>,
    /// Pixel-space boxes `[x0, y0, x1, y1]`, `[batch, 4]`.
    pub boxes: Tensor<B, 2>,
}

impl DatasetPathConfig {
    /// Reads and validates every label file; samples come back ordered by record id.
    pub fn load(&self) -> anyhow::Result<Vec<ShapeSample>> {
        let labels_dir = self.root.join(&self.labels_subdir);
        let entries = fs::read_dir(&labels_dir)
            .with_context(|| format!("failed to read labels dir {}", labels_dir.display()))?;
        let mut samples = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let record: ShapeRecord = serde_json::from_slice(&fs::read(&path)?)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            record
                .validate()
                .map_err(|e| anyhow::anyhow!("invalid record {:?}: {e}", path))?;
            let image = self.root.join(&self.images_subdir).join(&record.image);
            samples.push(ShapeSample { image, record });
        }
        samples.sort_by_key(|s| s.record.id);
        Ok(samples)
    }
}

pub fn collate<B: Backend>(
    samples: &[ShapeSample],
    device: &B::Device,
) -> anyhow::Result<ShapeBatch<B>> {
    if samples.is_empty() {
        anyhow::bail!("cannot collate empty batch");
    }

    let mut dims = None;
    let mut image_buf: Vec<f32> = Vec::new();
    let mut classes: Vec<i64> = Vec::with_capacity(samples.len());
    let mut boxes: Vec<f32> = Vec::with_capacity(samples.len() * 4);

    for sample in samples {
        let img = image::open(&sample.image)
            .map_err(|e| anyhow::anyhow!("failed to open image {:?}: {e}", sample.image))?
            .to_rgb8();
        let (w, h) = img.dimensions();
        match dims {
            None => {
                dims = Some((w, h));
                image_buf.reserve(samples.len() * (w * h) as usize * 3);
            }
            Some((width, height)) if (w, h) != (width, height) => {
                anyhow::bail!(
                    "image dimensions differ within batch: {:?} is {}x{}, expected {}x{}",
                    sample.image,
                    w,
                    h,
                    width,
                    height
                );
            }
            Some(_) => {}
        }

        // CHW order.
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    image_buf.push(img.get_pixel(x, y)[c] as f32 / 255.0);
                }
            }
        }
        classes.push(sample.record.class.index() as i64);
        boxes.extend_from_slice(&sample.record.bbox_px);
    }

    let (width, height) = dims.unwrap_or_default();
    let batch = samples.len();
    let images = Tensor::<B, 4>::from_data(
        TensorData::new(image_buf, [batch, 3, height as usize, width as usize]),
        device,
    );
    let classes = Tensor::<B, 1, Int>::from_data(TensorData::new(classes, [batch]), device);
    let boxes = Tensor::<B, 2>::from_data(TensorData::new(boxes, [batch, 4]), device);

    Ok(ShapeBatch {
        images,
        classes,
        boxes,
    })
}
