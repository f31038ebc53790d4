//! Burn model architectures for play classification.
//!
//! `TransferClassifier` is the trainable network: a convolutional backbone
//! treated as a frozen feature extractor, global average pooling, and a
//! small dense head that is the only part receiving gradient updates.

use burn::module::{Ignored, Module};
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::activation::{relu, sigmoid, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::path::Path;

/// Channel widths of the backbone stages. Each stage halves the spatial
/// resolution, so the pooled feature vector has `BACKBONE_STAGES.last()`
/// channels regardless of input size.
const BACKBONE_STAGES: [usize; 5] = [32, 64, 128, 256, 512];

/// Activation applied to the two head logits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputActivation {
    /// Softmax over the two columns; rows sum to one.
    #[default]
    Softmax,
    /// Independent per-column sigmoid.
    Sigmoid,
}

#[derive(Debug, Clone)]
pub struct TransferClassifierConfig {
    pub hidden: usize,
    pub dropout: f64,
    pub activation: OutputActivation,
    /// Seeds parameter initialization for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for TransferClassifierConfig {
    fn default() -> Self {
        Self {
            hidden: 512,
            dropout: 0.5,
            activation: OutputActivation::Softmax,
            seed: None,
        }
    }
}

/// Strided conv stack used as the feature extractor.
#[derive(Debug, Module)]
pub struct Backbone<B: Backend> {
    stages: Vec<Conv2d<B>>,
}

impl<B: Backend> Backbone<B> {
    fn new(device: &B::Device) -> Self {
        let mut stages = Vec::with_capacity(BACKBONE_STAGES.len());
        let mut channels_in = 3;
        for &channels_out in &BACKBONE_STAGES {
            stages.push(
                Conv2dConfig::new([channels_in, channels_out], [3, 3])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
            );
            channels_in = channels_out;
        }
        Self { stages }
    }

    pub fn feature_channels() -> usize {
        BACKBONE_STAGES[BACKBONE_STAGES.len() - 1]
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input;
        for stage in &self.stages {
            x = relu(stage.forward(x));
        }
        x
    }
}

/// Backbone plus dense head. The backbone's output is detached in
/// `forward`, so only the head trains.
#[derive(Debug, Module)]
pub struct TransferClassifier<B: Backend> {
    backbone: Backbone<B>,
    pool: AdaptiveAvgPool2d,
    fc1: nn::Linear<B>,
    dropout: nn::Dropout,
    fc2: nn::Linear<B>,
    activation: Ignored<OutputActivation>,
}

impl<B: Backend> TransferClassifier<B> {
    pub fn new(cfg: TransferClassifierConfig, device: &B::Device) -> Self {
        if let Some(seed) = cfg.seed {
            B::seed(seed);
        }
        let backbone = Backbone::new(device);
        let pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc1 = nn::LinearConfig::new(Backbone::<B>::feature_channels(), cfg.hidden).init(device);
        let dropout = nn::DropoutConfig::new(cfg.dropout).init();
        let fc2 = nn::LinearConfig::new(cfg.hidden, 2).init(device);
        Self {
            backbone,
            pool,
            fc1,
            dropout,
            fc2,
            activation: Ignored(cfg.activation),
        }
    }

    /// Replaces the randomly initialized backbone with pretrained weights
    /// from a checkpoint, leaving the head untouched.
    pub fn with_pretrained_backbone(
        self,
        path: &Path,
        device: &B::Device,
    ) -> Result<Self, RecorderError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let backbone = self.backbone.load_file(path, &recorder, device)?;
        Ok(Self { backbone, ..self })
    }

    pub fn backbone(&self) -> &Backbone<B> {
        &self.backbone
    }

    pub fn activation(&self) -> OutputActivation {
        self.activation.0
    }

    /// `[batch, 3, h, w]` to `[batch, 2]` class scores.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        // Detaching here is what freezes the backbone: no gradient flows
        // below this point.
        let features = self.backbone.forward(input).detach();
        let pooled = self.pool.forward(features);
        let [batch, channels, _, _] = pooled.dims();
        let flat = pooled.reshape([batch, channels]);
        let x = self.dropout.forward(relu(self.fc1.forward(flat)));
        let logits = self.fc2.forward(x);
        match self.activation.0 {
            OutputActivation::Softmax => softmax(logits, 1),
            OutputActivation::Sigmoid => sigmoid(logits),
        }
    }
}

pub mod prelude {
    pub use super::{Backbone, OutputActivation, TransferClassifier, TransferClassifierConfig};
}

#[cfg(test)]
mod tests {
    use super::*;

    type B = burn_ndarray::NdArray<f32>;

    #[test]
    fn forward_shape_is_batch_by_two() {
        let device = Default::default();
        let model = TransferClassifier::<B>::new(TransferClassifierConfig::default(), &device);
        // Global average pooling makes the head input-size agnostic; a
        // small input keeps the test fast.
        let input = Tensor::<B, 4>::zeros([3, 3, 64, 64], &device);
        let out = model.forward(input);
        assert_eq!(out.dims(), [3, 2]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = TransferClassifier::<B>::new(TransferClassifierConfig::default(), &device);
        let input = Tensor::<B, 4>::ones([2, 3, 64, 64], &device);
        let rows = model.forward(input).into_data().to_vec::<f32>().unwrap();
        for pair in rows.chunks_exact(2) {
            assert!((pair[0] + pair[1] - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn sigmoid_outputs_stay_in_unit_range() {
        let device = Default::default();
        let model = TransferClassifier::<B>::new(
            TransferClassifierConfig {
                activation: OutputActivation::Sigmoid,
                ..TransferClassifierConfig::default()
            },
            &device,
        );
        let input = Tensor::<B, 4>::ones([2, 3, 64, 64], &device);
        let values = model.forward(input).into_data().to_vec::<f32>().unwrap();
        for v in values {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn seeded_init_is_reproducible() {
        let device = Default::default();
        let cfg = TransferClassifierConfig {
            seed: Some(17),
            ..TransferClassifierConfig::default()
        };
        let a = TransferClassifier::<B>::new(cfg.clone(), &device);
        let b = TransferClassifier::<B>::new(cfg, &device);
        let input = Tensor::<B, 4>::ones([1, 3, 64, 64], &device);
        let oa = a.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
        let ob = b.forward(input).into_data().to_vec::<f32>().unwrap();
        assert_eq!(oa, ob);
    }

    #[test]
    fn pretrained_backbone_roundtrips_through_a_checkpoint() {
        let device = Default::default();
        let donor = TransferClassifier::<B>::new(
            TransferClassifierConfig {
                seed: Some(3),
                ..TransferClassifierConfig::default()
            },
            &device,
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backbone.bin");
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        donor
            .backbone()
            .clone()
            .save_file(&path, &recorder)
            .unwrap();

        let fresh = TransferClassifier::<B>::new(
            TransferClassifierConfig {
                seed: Some(99),
                ..TransferClassifierConfig::default()
            },
            &device,
        );
        let loaded = fresh.with_pretrained_backbone(&path, &device).unwrap();

        let input = Tensor::<B, 4>::ones([1, 3, 32, 32], &device);
        let donor_features = donor
            .backbone()
            .forward(input.clone())
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        let loaded_features = loaded
            .backbone()
            .forward(input)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(donor_features, loaded_features);
    }
}
