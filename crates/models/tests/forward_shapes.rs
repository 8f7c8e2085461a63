use burn::module::Module;
use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use models::{ChannelSplit, EdgeNetConfig, EdgeNetOutput, HeadMode, TowerConfig};

type B = NdArray<f32>;

fn device() -> <B as burn::tensor::backend::Backend>::Device {
    Default::default()
}

fn tiny(num_classes: usize, num_reg_outputs: usize) -> EdgeNetConfig {
    let mut cfg = EdgeNetConfig::small(3, num_classes, num_reg_outputs);
    cfg.classification = cfg.classification.with_base_width(2).with_head_hidden(vec![16, 8]);
    cfg.regression = cfg.regression.with_base_width(2).with_head_hidden(vec![16, 8]);
    cfg
}

#[test]
fn detect_returns_class_and_box_shapes() {
    let model = tiny(5, 4).init::<B>(&device());
    let images = Tensor::<B, 4>::random(
        [2, 3, 32, 32],
        burn::tensor::Distribution::Uniform(0.0, 1.0),
        &device(),
    );

    let detection = model.detect(images.clone());
    assert_eq!(detection.classes.dims(), [2, 5]);
    assert_eq!(detection.boxes.dims(), [2, 4]);

    let detection = model
        .forward(images)
        .into_detection()
        .expect("detect mode returns a detection");
    assert_eq!(detection.classes.dims(), [2, 5]);
    assert_eq!(detection.boxes.dims(), [2, 4]);
}

#[test]
fn feature_map_mode_returns_final_conv_maps() {
    let model = tiny(5, 4)
        .with_mode(HeadMode::FeatureMaps)
        .init::<B>(&device());
    let images = Tensor::<B, 4>::zeros([3, 3, 32, 32], &device());
    match model.forward(images) {
        EdgeNetOutput::FeatureMaps {
            classification,
            regression,
        } => {
            // 16 * base_width channels, 32 / 2^4 spatial.
            assert_eq!(classification.dims(), [3, 32, 2, 2]);
            assert_eq!(regression.dims(), [3, 32, 2, 2]);
        }
        EdgeNetOutput::Detection(_) => panic!("feature-map mode returned a detection"),
    }
}

#[test]
fn heads_are_independent() {
    let images = Tensor::<B, 4>::zeros([2, 3, 32, 32], &device());

    let wider_boxes = tiny(5, 6).init::<B>(&device()).detect(images.clone());
    assert_eq!(wider_boxes.classes.dims(), [2, 5]);
    assert_eq!(wider_boxes.boxes.dims(), [2, 6]);

    let more_classes = tiny(9, 4).init::<B>(&device()).detect(images.clone());
    assert_eq!(more_classes.classes.dims(), [2, 9]);
    assert_eq!(more_classes.boxes.dims(), [2, 4]);

    let mut cfg = tiny(5, 4);
    cfg.regression = cfg.regression.with_head_hidden(vec![24, 12, 6]);
    let reshaped = cfg.init::<B>(&device()).detect(images);
    assert_eq!(reshaped.classes.dims(), [2, 5]);
    assert_eq!(reshaped.boxes.dims(), [2, 4]);
}

#[test]
fn towers_own_every_parameter() {
    let model = tiny(5, 4).init::<B>(&device());
    let towers =
        model.classification_tower().num_params() + model.regression_tower().num_params();
    assert!(towers > 0);
    assert_eq!(model.num_params(), towers);
    assert_eq!(model.filter_bank().num_params(), 0);
}

#[test]
fn adaptive_pooling_accepts_other_image_sizes() {
    let model = tiny(5, 4).init::<B>(&device());
    let images = Tensor::<B, 4>::zeros([1, 3, 48, 64], &device());
    let detection = model.detect(images);
    assert_eq!(detection.classes.dims(), [1, 5]);
    assert_eq!(detection.boxes.dims(), [1, 4]);
}

#[test]
fn grayscale_input_works_with_replicated_split() {
    let mut cfg = tiny(5, 4);
    cfg.in_channels = 1;
    let model = cfg.init::<B>(&device());
    let detection = model.detect(Tensor::<B, 4>::zeros([2, 1, 32, 32], &device()));
    assert_eq!(detection.classes.dims(), [2, 5]);
}

#[test]
fn per_channel_split_produces_detections() {
    let model = tiny(5, 4)
        .with_split(ChannelSplit::PerChannel)
        .init::<B>(&device());
    let detection = model.detect(Tensor::<B, 4>::ones([2, 3, 32, 32], &device()));
    assert_eq!(detection.boxes.dims(), [2, 4]);
}

#[test]
#[should_panic]
fn per_channel_split_rejects_grayscale_config() {
    let mut cfg = tiny(5, 4).with_split(ChannelSplit::PerChannel);
    cfg.in_channels = 1;
    let _ = cfg.init::<B>(&device());
}

#[test]
#[should_panic(expected = "at least one output")]
fn zero_class_head_is_rejected() {
    let _ = tiny(0, 4).init::<B>(&device());
}

#[test]
#[should_panic(expected = "base_width must be positive")]
fn zero_width_tower_is_rejected() {
    let mut cfg = tiny(5, 4);
    cfg.regression = cfg.regression.with_base_width(0);
    let _ = cfg.init::<B>(&device());
}

#[test]
fn regression_tower_can_skip_a_pool() {
    let mut cfg = tiny(5, 4).with_mode(HeadMode::FeatureMaps);
    cfg.regression = cfg.regression.with_pooled_blocks(vec![3, 5, 7]);
    let model = cfg.init::<B>(&device());
    let EdgeNetOutput::FeatureMaps {
        classification,
        regression,
    } = model.forward(Tensor::<B, 4>::zeros([1, 3, 32, 32], &device()))
    else {
        panic!("expected feature maps");
    };
    assert_eq!(classification.dims(), [1, 32, 2, 2]);
    assert_eq!(regression.dims(), [1, 32, 4, 4]);
}

#[test]
fn tower_config_defaults_match_full_model() {
    let cfg = EdgeNetConfig::new(3, 5, 4);
    assert_eq!(cfg.classification, TowerConfig::classification());
    assert_eq!(cfg.regression, TowerConfig::regression());
}

#[test]
#[ignore = "allocates the full-width model (~1.9 GB of weights)"]
fn full_width_model_shapes() {
    let model = EdgeNetConfig::new(3, 5, 4).init::<B>(&device());
    let detection = model.detect(Tensor::<B, 4>::zeros([1, 3, 32, 32], &device()));
    assert_eq!(detection.classes.dims(), [1, 5]);
    assert_eq!(detection.boxes.dims(), [1, 4]);
}
