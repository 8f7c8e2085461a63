// Kept alone in its own test binary: backend seeding is global, so a concurrent test drawing
// random numbers between seed and init would break the comparison.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use models::EdgeNetConfig;

type B = NdArray<f32>;

fn seeded_outputs(seed: u64, images: &Tensor<B, 4>) -> (Vec<f32>, Vec<f32>) {
    let device = Default::default();
    B::seed(seed);
    let model = EdgeNetConfig::small(3, 5, 4).init::<B>(&device);
    let detection = model.detect(images.clone());
    (
        detection.classes.into_data().to_vec::<f32>().unwrap(),
        detection.boxes.into_data().to_vec::<f32>().unwrap(),
    )
}

#[test]
fn seeded_models_are_bit_identical() {
    let device = Default::default();
    let values: Vec<f32> = (0..2 * 3 * 32 * 32)
        .map(|i| ((i * 37) % 101) as f32 / 100.0)
        .collect();
    let images = Tensor::<B, 4>::from_data(TensorData::new(values, [2, 3, 32, 32]), &device);

    let (classes_a, boxes_a) = seeded_outputs(7, &images);
    let (classes_b, boxes_b) = seeded_outputs(7, &images);
    assert_eq!(classes_a, classes_b);
    assert_eq!(boxes_a, boxes_b);

    let (classes_c, _) = seeded_outputs(8, &images);
    assert_ne!(classes_a, classes_c);
}
