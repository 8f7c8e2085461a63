use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Object classes of the shape dataset, in label-index order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShapeClass {
    Rectangle,
    Triangle,
    Disk,
    Oval,
    Star,
}

impl ShapeClass {
    pub const ALL: [ShapeClass; 5] = [
        ShapeClass::Rectangle,
        ShapeClass::Triangle,
        ShapeClass::Disk,
        ShapeClass::Oval,
        ShapeClass::Star,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        match self {
            ShapeClass::Rectangle => 0,
            ShapeClass::Triangle => 1,
            ShapeClass::Disk => 2,
            ShapeClass::Oval => 3,
            ShapeClass::Star => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            ShapeClass::Rectangle => "rectangle",
            ShapeClass::Triangle => "triangle",
            ShapeClass::Disk => "disk",
            ShapeClass::Oval => "oval",
            ShapeClass::Star => "star",
        }
    }
}

/// One labeled image: a single shape with its class and pixel-space box `[x0, y0, x1, y1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub id: u64,
    pub image: String,
    pub class: ShapeClass,
    pub bbox_px: [f32; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_level: Option<f32>,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("bbox_px invalid order or negative: {0:?}")]
    InvalidBbox([f32; 4]),
    #[error("missing image path")]
    MissingImage,
    #[error("noise_level out of range: {0}")]
    InvalidNoiseLevel(f32),
}

impl ShapeRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.image.trim().is_empty() {
            return Err(ValidationError::MissingImage);
        }
        let px = self.bbox_px;
        if px.iter().any(|v| !v.is_finite() || *v < 0.0) || px[0] > px[2] || px[1] > px[3] {
            return Err(ValidationError::InvalidBbox(px));
        }
        if let Some(noise) = self.noise_level {
            if noise.is_nan() || !(0.0..=1.0).contains(&noise) {
                return Err(ValidationError::InvalidNoiseLevel(noise));
            }
        }
        Ok(())
    }
}
