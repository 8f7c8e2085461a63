//! Synthetic shape images: one filled shape per image on a dark background, with its tight
//! pixel bounding box. Used by `datagen` and by tests that need a dataset on disk.

use anyhow::Context;
use data_contracts::shapes::{ShapeClass, ShapeRecord};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;
use std::fs;
use std::path::Path;

/// Ratio of inner to outer radius for the five-point star.
const STAR_INNER_RATIO: f32 = 0.45;

#[derive(Debug, Clone, Copy)]
pub struct ShapeGenerator {
    /// Square image side in pixels.
    pub size: u32,
    /// Fraction of pixels replaced by random colors.
    pub noise_level: f32,
}

impl Default for ShapeGenerator {
    fn default() -> Self {
        Self {
            size: 32,
            noise_level: 0.0,
        }
    }
}

impl ShapeGenerator {
    /// Renders one shape of `class` and returns the image with its `[x0, y0, x1, y1]` box.
    ///
    /// Box corners are inclusive pixel indices of the shape before noise is applied.
    pub fn generate<R: Rng>(&self, rng: &mut R, class: ShapeClass) -> (RgbImage, [f32; 4]) {
        let size = self.size.max(8) as f32;
        let min_half = (size / 8.0).max(3.0);
        let max_half = (size / 3.0).max(min_half + 1.0);
        let half_w = rng.gen_range(min_half..max_half);
        let half_h = match class {
            ShapeClass::Disk | ShapeClass::Star => half_w,
            ShapeClass::Oval => half_w * rng.gen_range(0.45..0.7),
            _ => rng.gen_range(min_half..max_half),
        };
        let cx = rng.gen_range(half_w..size - half_w);
        let cy = rng.gen_range(half_h..size - half_h);
        let shape = Shape {
            class,
            cx,
            cy,
            half_w,
            half_h,
            rotation: rng.gen_range(0.0..2.0 * PI / 5.0),
        };

        let background = Rgb([rng.gen_range(0..40), rng.gen_range(0..40), rng.gen_range(0..40)]);
        let color = Rgb([
            rng.gen_range(128..=255),
            rng.gen_range(128..=255),
            rng.gen_range(128..=255),
        ]);

        let side = self.size.max(8);
        let mut img = RgbImage::from_pixel(side, side, background);
        let mut bbox = [f32::MAX, f32::MAX, f32::MIN, f32::MIN];
        for y in 0..side {
            for x in 0..side {
                if shape.contains(x as f32 + 0.5, y as f32 + 0.5) {
                    img.put_pixel(x, y, color);
                    bbox[0] = bbox[0].min(x as f32);
                    bbox[1] = bbox[1].min(y as f32);
                    bbox[2] = bbox[2].max(x as f32);
                    bbox[3] = bbox[3].max(y as f32);
                }
            }
        }
        if bbox[0] > bbox[2] {
            // Nothing rasterized; mark the center pixel so the label stays meaningful.
            let (x, y) = (cx as u32, cy as u32);
            img.put_pixel(x, y, color);
            bbox = [x as f32, y as f32, x as f32, y as f32];
        }

        if self.noise_level > 0.0 {
            for pixel in img.pixels_mut() {
                if rng.gen::<f32>() < self.noise_level {
                    *pixel = Rgb([rng.gen(), rng.gen(), rng.gen()]);
                }
            }
        }

        (img, bbox)
    }
}

struct Shape {
    class: ShapeClass,
    cx: f32,
    cy: f32,
    half_w: f32,
    half_h: f32,
    rotation: f32,
}

impl Shape {
    fn contains(&self, px: f32, py: f32) -> bool {
        let dx = px - self.cx;
        let dy = py - self.cy;
        match self.class {
            ShapeClass::Rectangle => dx.abs() <= self.half_w && dy.abs() <= self.half_h,
            ShapeClass::Disk | ShapeClass::Oval => {
                (dx / self.half_w).powi(2) + (dy / self.half_h).powi(2) <= 1.0
            }
            ShapeClass::Triangle => {
                let a = (self.cx, self.cy - self.half_h);
                let b = (self.cx - self.half_w, self.cy + self.half_h);
                let c = (self.cx + self.half_w, self.cy + self.half_h);
                point_in_polygon((px, py), &[a, b, c])
            }
            ShapeClass::Star => {
                let outer = self.half_w;
                let inner = outer * STAR_INNER_RATIO;
                let vertices: Vec<(f32, f32)> = (0..10)
                    .map(|i| {
                        let radius = if i % 2 == 0 { outer } else { inner };
                        let angle = self.rotation - PI / 2.0 + i as f32 * PI / 5.0;
                        (
                            self.cx + radius * angle.cos(),
                            self.cy + radius * angle.sin(),
                        )
                    })
                    .collect();
                point_in_polygon((px, py), &vertices)
            }
        }
    }
}

/// Even-odd ray casting.
fn point_in_polygon(p: (f32, f32), vertices: &[(f32, f32)]) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];
        if (yi > p.1) != (yj > p.1) && p.0 < (xj - xi) * (p.1 - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Writes `count` images under `root/images` and their labels under `root/labels`.
///
/// Classes cycle in label order so every class is equally represented.
pub fn write_dataset(
    root: &Path,
    count: usize,
    seed: u64,
    generator: ShapeGenerator,
) -> anyhow::Result<Vec<ShapeRecord>> {
    let images_dir = root.join("images");
    let labels_dir = root.join("labels");
    fs::create_dir_all(&images_dir)?;
    fs::create_dir_all(&labels_dir)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let class = ShapeClass::ALL[i % ShapeClass::COUNT];
        let (img, bbox_px) = generator.generate(&mut rng, class);
        let name = format!("shape_{i:05}");
        let image = format!("images/{name}.png");
        img.save(root.join(&image))
            .with_context(|| format!("failed to write {image}"))?;

        let record = ShapeRecord {
            id: i as u64,
            image,
            class,
            bbox_px,
            noise_level: (generator.noise_level > 0.0).then_some(generator.noise_level),
        };
        record
            .validate()
            .map_err(|e| anyhow::anyhow!("generated invalid record {name}: {e}"))?;
        fs::write(
            labels_dir.join(format!("{name}.json")),
            serde_json::to_vec_pretty(&record)?,
        )?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_encloses_every_shape_pixel() {
        let mut rng = StdRng::seed_from_u64(3);
        let generator = ShapeGenerator::default();
        for class in ShapeClass::ALL {
            for _ in 0..8 {
                let (img, bbox) = generator.generate(&mut rng, class);
                assert!(bbox[0] <= bbox[2] && bbox[1] <= bbox[3], "{class:?}: {bbox:?}");
                assert!(bbox[2] < 32.0 && bbox[3] < 32.0);
                let outside: Vec<_> = img
                    .enumerate_pixels()
                    .filter(|(x, y, _)| {
                        (*x as f32) < bbox[0]
                            || (*x as f32) > bbox[2]
                            || (*y as f32) < bbox[1]
                            || (*y as f32) > bbox[3]
                    })
                    .map(|(_, _, pixel)| *pixel)
                    .collect();
                assert!(!outside.is_empty());
                assert!(
                    outside.iter().all(|p| *p == outside[0]),
                    "{class:?} leaks outside its box"
                );
            }
        }
    }

    #[test]
    fn ovals_are_not_round() {
        let mut rng = StdRng::seed_from_u64(11);
        let (_, bbox) = ShapeGenerator::default().generate(&mut rng, ShapeClass::Oval);
        assert!(bbox[2] - bbox[0] > bbox[3] - bbox[1]);
    }

    #[test]
    fn same_seed_same_image() {
        let generator = ShapeGenerator {
            size: 32,
            noise_level: 0.2,
        };
        let (a, box_a) = generator.generate(&mut StdRng::seed_from_u64(5), ShapeClass::Star);
        let (b, box_b) = generator.generate(&mut StdRng::seed_from_u64(5), ShapeClass::Star);
        assert_eq!(box_a, box_b);
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn polygon_test_handles_triangle() {
        let tri = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)];
        assert!(point_in_polygon((2.0, 2.0), &tri));
        assert!(!point_in_polygon((8.0, 8.0), &tri));
    }
}
