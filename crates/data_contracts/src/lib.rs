//! Shared data contracts for shape-detection datasets: class labels and bounding boxes.

pub mod shapes;

pub use shapes::{ShapeClass, ShapeRecord, ValidationError};
