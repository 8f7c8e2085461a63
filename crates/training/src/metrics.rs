use burn::tensor::backend::Backend;
use data_contracts::shapes::ShapeClass;
use models::EdgeNet;
use std::fmt;

use crate::dataset::{collate, ShapeSample};

/// Running classification and box statistics over an evaluation set.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    num_classes: usize,
    /// Row-major `[truth][predicted]` counts.
    confusion: Vec<u64>,
    box_sq_err: f64,
    box_values: u64,
    iou_sum: f64,
    samples: u64,
}

impl EvalReport {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            confusion: vec![0; num_classes * num_classes],
            box_sq_err: 0.0,
            box_values: 0,
            iou_sum: 0.0,
            samples: 0,
        }
    }

    /// Records one prediction. Class indices outside the matrix count as misses.
    pub fn update(&mut self, predicted: usize, truth: usize, pred_box: &[f32], true_box: &[f32]) {
        self.samples += 1;
        if predicted < self.num_classes && truth < self.num_classes {
            self.confusion[truth * self.num_classes + predicted] += 1;
        }
        for (p, t) in pred_box.iter().zip(true_box) {
            self.box_sq_err += ((p - t) as f64).powi(2);
            self.box_values += 1;
        }
        if let (Ok(p), Ok(t)) = (
            <[f32; 4]>::try_from(pred_box),
            <[f32; 4]>::try_from(true_box),
        ) {
            self.iou_sum += iou_xyxy(p, t) as f64;
        }
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Count of samples of class `truth` predicted as `predicted`; 0 for indices outside the matrix.
    pub fn confusion(&self, truth: usize, predicted: usize) -> u64 {
        if truth >= self.num_classes || predicted >= self.num_classes {
            return 0;
        }
        self.confusion[truth * self.num_classes + predicted]
    }

    pub fn accuracy(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        let correct: u64 = (0..self.num_classes).map(|c| self.confusion(c, c)).sum();
        correct as f64 / self.samples as f64
    }

    pub fn class_accuracy(&self, class: usize) -> f64 {
        if class >= self.num_classes {
            return 0.0;
        }
        let row = &self.confusion[class * self.num_classes..(class + 1) * self.num_classes];
        let total: u64 = row.iter().sum();
        if total == 0 {
            0.0
        } else {
            row[class] as f64 / total as f64
        }
    }

    pub fn mean_box_mse(&self) -> f64 {
        if self.box_values == 0 {
            0.0
        } else {
            self.box_sq_err / self.box_values as f64
        }
    }

    pub fn mean_iou(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.iou_sum / self.samples as f64
        }
    }
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "samples={} accuracy={:.3} box_mse={:.3} mean_iou={:.3}",
            self.samples,
            self.accuracy(),
            self.mean_box_mse(),
            self.mean_iou()
        )?;
        for class in 0..self.num_classes {
            let name = ShapeClass::from_index(class)
                .map(ShapeClass::name)
                .unwrap_or("class");
            write!(f, "  {name:>9} ({class}):")?;
            for predicted in 0..self.num_classes {
                write!(f, " {:>5}", self.confusion(class, predicted))?;
            }
            writeln!(f, "   acc={:.3}", self.class_accuracy(class))?;
        }
        Ok(())
    }
}

/// Runs `model` over `samples` in batches and accumulates an [`EvalReport`].
pub fn evaluate<B: Backend>(
    model: &EdgeNet<B>,
    samples: &[ShapeSample],
    batch_size: usize,
    device: &B::Device,
) -> anyhow::Result<EvalReport> {
    let num_classes = model.classification_tower().outputs();
    let mut report = EvalReport::new(num_classes);
    for chunk in samples.chunks(batch_size.max(1)) {
        let batch = collate::<B>(chunk, device)?;
        let detection = model.detect(batch.images);
        let logits = detection
            .classes
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("failed to read class logits: {e:?}"))?;
        let boxes = detection
            .boxes
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("failed to read boxes: {e:?}"))?;
        let box_width = boxes.len() / chunk.len();

        for (i, sample) in chunk.iter().enumerate() {
            let row = &logits[i * num_classes..(i + 1) * num_classes];
            report.update(
                argmax(row),
                sample.record.class.index(),
                &boxes[i * box_width..(i + 1) * box_width],
                &sample.record.bbox_px,
            );
        }
    }
    Ok(report)
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}

/// Intersection over union of two `[x0, y0, x1, y1]` boxes with inclusive pixel corners.
///
/// A box covers `x1 - x0 + 1` columns, so `[5, 5, 5, 5]` is one pixel. Corner order is normalized.
pub fn iou_xyxy(a: [f32; 4], b: [f32; 4]) -> f32 {
    let ax0 = a[0].min(a[2]);
    let ay0 = a[1].min(a[3]);
    let ax1 = a[0].max(a[2]);
    let ay1 = a[1].max(a[3]);
    let bx0 = b[0].min(b[2]);
    let by0 = b[1].min(b[3]);
    let bx1 = b[0].max(b[2]);
    let by1 = b[1].max(b[3]);

    let inter_w = (ax1.min(bx1) - ax0.max(bx0) + 1.0).max(0.0);
    let inter_h = (ay1.min(by1) - ay0.max(by0) + 1.0).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = (ax1 - ax0 + 1.0) * (ay1 - ay0 + 1.0);
    let area_b = (bx1 - bx0 + 1.0) * (by1 - by0 + 1.0);
    let denom = area_a + area_b - inter_area;
    if denom <= 0.0 {
        0.0
    } else {
        inter_area / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = [0.0, 0.0, 3.0, 3.0];
        assert!((iou_xyxy(a, a) - 1.0).abs() < 1e-6);
        assert_eq!(iou_xyxy(a, [4.0, 4.0, 8.0, 8.0]), 0.0);
        // Two of four columns shared: 8 / (16 + 16 - 8).
        assert!((iou_xyxy(a, [2.0, 0.0, 5.0, 3.0]) - 1.0 / 3.0).abs() < 1e-6);
        // Swapped corners are normalized.
        assert!((iou_xyxy(a, [3.0, 3.0, 0.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_counts_corner_pixels() {
        let pixel = [5.0, 5.0, 5.0, 5.0];
        assert_eq!(iou_xyxy(pixel, pixel), 1.0);
        let column = [3.0, 0.0, 3.0, 9.0];
        assert_eq!(iou_xyxy(column, column), 1.0);
        // 2x2 boxes sharing the single pixel (1, 1): 1 / (4 + 4 - 1).
        let shared = iou_xyxy([0.0, 0.0, 1.0, 1.0], [1.0, 1.0, 2.0, 2.0]);
        assert!((shared - 1.0 / 7.0).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_classes_read_as_empty() {
        let mut report = EvalReport::new(2);
        report.update(5, 1, &[], &[]);
        assert_eq!(report.samples(), 1);
        assert_eq!(report.confusion(5, 1), 0);
        assert_eq!(report.confusion(1, 5), 0);
        assert_eq!(report.class_accuracy(7), 0.0);
        assert_eq!(report.class_accuracy(1), 0.0);
    }

    #[test]
    fn report_accumulates_confusion_and_errors() {
        let mut report = EvalReport::new(3);
        report.update(0, 0, &[0.0, 0.0, 2.0, 2.0], &[0.0, 0.0, 2.0, 2.0]);
        report.update(2, 1, &[1.0, 1.0, 3.0, 3.0], &[0.0, 0.0, 2.0, 2.0]);
        report.update(1, 1, &[0.0, 0.0, 2.0, 2.0], &[0.0, 0.0, 2.0, 2.0]);

        assert_eq!(report.samples(), 3);
        assert_eq!(report.confusion(1, 2), 1);
        assert!((report.accuracy() - 2.0 / 3.0).abs() < 1e-9);
        assert!((report.class_accuracy(1) - 0.5).abs() < 1e-9);
        assert_eq!(report.class_accuracy(2), 0.0);
        // One box off by 1 in all four coordinates, over 12 values.
        assert!((report.mean_box_mse() - 4.0 / 12.0).abs() < 1e-9);
        assert!(report.to_string().contains("rectangle"));
    }

    #[test]
    fn empty_report_is_zero() {
        let report = EvalReport::new(5);
        assert_eq!(report.accuracy(), 0.0);
        assert_eq!(report.mean_box_mse(), 0.0);
        assert_eq!(report.mean_iou(), 0.0);
    }

    #[test]
    fn argmax_picks_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, -1.0]), 1);
        assert_eq!(argmax(&[-3.0]), 0);
    }
}
