//! Batching samples into backend tensors for training and evaluation.

use crate::aug::{mean_center, AugmentConfig, TransformPipeline};
use crate::split::EncodedLabels;
use crate::types::{DatasetError, DatasetResult, LabeledDataset, PlaySample, CHANNELS};
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Batching policy. Augmentation applies only when a config is present;
/// evaluation iterators leave it `None`.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    pub augment: Option<AugmentConfig>,
    pub seed: u64,
}

impl BatchConfig {
    pub fn evaluation(batch_size: usize) -> Self {
        Self {
            batch_size,
            shuffle: false,
            augment: None,
            seed: 0,
        }
    }
}

/// One batch of mean-centered images and their two-column targets.
#[derive(Debug, Clone)]
pub struct BurnBatch<B: Backend> {
    /// `[batch, 3, height, width]`
    pub images: Tensor<B, 4>,
    /// `[batch, 2]`
    pub targets: Tensor<B, 2>,
}

/// Iterates a dataset in batches, reshuffling per epoch when configured.
///
/// Augmentation and mean-centering both happen here, at materialization
/// time, so the underlying samples stay pristine across epochs.
pub struct BatchIter<'a> {
    samples: &'a [PlaySample],
    rows: &'a [[f32; 2]],
    config: BatchConfig,
    pipeline: Option<TransformPipeline>,
    order: Vec<usize>,
    cursor: usize,
    epoch: u64,
}

impl<'a> BatchIter<'a> {
    pub fn new(
        dataset: &'a LabeledDataset,
        labels: &'a EncodedLabels,
        config: BatchConfig,
    ) -> DatasetResult<Self> {
        if dataset.len() != labels.len() {
            return Err(DatasetError::LabelInconsistency(format!(
                "{} samples but {} label rows",
                dataset.len(),
                labels.len()
            )));
        }
        if config.batch_size == 0 {
            return Err(DatasetError::LabelInconsistency(
                "batch_size must be nonzero".to_string(),
            ));
        }
        let pipeline = config.augment.map(TransformPipeline::new);
        let mut iter = Self {
            samples: dataset.samples(),
            rows: &labels.rows,
            config,
            pipeline,
            order: Vec::new(),
            cursor: 0,
            epoch: 0,
        };
        iter.reset(0);
        Ok(iter)
    }

    /// Rewinds to the start of `epoch`, reshuffling if configured.
    pub fn reset(&mut self, epoch: u64) {
        self.epoch = epoch;
        self.cursor = 0;
        self.order = (0..self.samples.len()).collect();
        if self.config.shuffle {
            let mut rng =
                StdRng::seed_from_u64(self.config.seed ^ epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15));
            self.order.shuffle(&mut rng);
        }
    }

    pub fn batches_per_epoch(&self) -> usize {
        self.samples.len().div_ceil(self.config.batch_size)
    }

    /// Materializes the next batch, or `None` at end of epoch. The last
    /// batch of an epoch may be short.
    pub fn next_batch<B: Backend>(&mut self, device: &B::Device) -> Option<BurnBatch<B>> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.config.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;

        let first = &self.samples[indices[0]];
        let (width, height) = (first.width, first.height);
        let elems = CHANNELS * (width * height) as usize;

        let mut pixels = Vec::with_capacity(indices.len() * elems);
        let mut targets = Vec::with_capacity(indices.len() * 2);
        for &i in indices {
            let sample = &self.samples[i];
            let mut chw = match &self.pipeline {
                Some(pipeline) => {
                    pipeline.augment(&sample.image_chw, width, height, i as u64, self.epoch)
                }
                None => sample.image_chw.clone(),
            };
            mean_center(&mut chw, width, height);
            pixels.extend_from_slice(&chw);
            targets.extend_from_slice(&self.rows[i]);
        }

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), device).reshape([
            indices.len(),
            CHANNELS,
            height as usize,
            width as usize,
        ]);
        let targets =
            Tensor::<B, 1>::from_floats(targets.as_slice(), device).reshape([indices.len(), 2]);
        Some(BurnBatch { images, targets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::{encode_labels, LabelCodec};

    type B = burn_ndarray::NdArray<f32>;

    fn tiny_dataset() -> (LabeledDataset, EncodedLabels) {
        let mut ds = LabeledDataset::default();
        for i in 0..5 {
            let label = if i % 2 == 0 { "dunk" } else { "jumpshot" };
            ds.push(PlaySample {
                image_chw: vec![i as f32; 3 * 4 * 4],
                width: 4,
                height: 4,
                label: label.to_string(),
            });
        }
        let codec = LabelCodec::fit(&ds, &["dunk", "jumpshot"]).unwrap();
        let labels = encode_labels(&codec, &ds).unwrap();
        (ds, labels)
    }

    #[test]
    fn batches_cover_the_dataset_with_a_short_tail() {
        let (ds, labels) = tiny_dataset();
        let mut iter = BatchIter::new(&ds, &labels, BatchConfig::evaluation(2)).unwrap();
        assert_eq!(iter.batches_per_epoch(), 3);

        let device = Default::default();
        let mut sizes = Vec::new();
        while let Some(batch) = iter.next_batch::<B>(&device) {
            let [n, c, h, w] = batch.images.dims();
            assert_eq!([c, h, w], [3, 4, 4]);
            assert_eq!(batch.targets.dims(), [n, 2]);
            sizes.push(n);
        }
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn unshuffled_batches_preserve_pairing() {
        let (ds, labels) = tiny_dataset();
        let mut iter = BatchIter::new(&ds, &labels, BatchConfig::evaluation(5)).unwrap();
        let device = Default::default();
        let batch = iter.next_batch::<B>(&device).unwrap();
        let targets = batch.targets.into_data().to_vec::<f32>().unwrap();
        // Even indices are dunk -> [0, 1]; odd are jumpshot -> [1, 0].
        assert_eq!(targets, vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn shuffle_reorders_between_epochs_but_is_seed_stable() {
        let mut ds = LabeledDataset::default();
        for i in 0..16 {
            let label = if i % 2 == 0 { "dunk" } else { "jumpshot" };
            ds.push(PlaySample {
                image_chw: vec![i as f32; 3 * 4 * 4],
                width: 4,
                height: 4,
                label: label.to_string(),
            });
        }
        let codec = LabelCodec::fit(&ds, &["dunk", "jumpshot"]).unwrap();
        let labels = encode_labels(&codec, &ds).unwrap();
        let config = BatchConfig {
            batch_size: 16,
            shuffle: true,
            augment: None,
            seed: 17,
        };
        let mut a = BatchIter::new(&ds, &labels, config.clone()).unwrap();
        let mut b = BatchIter::new(&ds, &labels, config).unwrap();
        let device = Default::default();

        let ta = a
            .next_batch::<B>(&device)
            .unwrap()
            .targets
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        let tb = b
            .next_batch::<B>(&device)
            .unwrap()
            .targets
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(ta, tb);

        a.reset(1);
        b.reset(2);
        let next_a = a
            .next_batch::<B>(&device)
            .unwrap()
            .images
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        let next_b = b
            .next_batch::<B>(&device)
            .unwrap()
            .images
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_ne!(next_a, next_b);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let (ds, mut labels) = tiny_dataset();
        labels.rows.pop();
        assert!(matches!(
            BatchIter::new(&ds, &labels, BatchConfig::evaluation(2)),
            Err(DatasetError::LabelInconsistency(_))
        ));
    }

    #[test]
    fn images_are_mean_centered() {
        let mut ds = LabeledDataset::default();
        ds.push(PlaySample {
            image_chw: vec![123.68; 16].into_iter()
                .chain(vec![116.779; 16])
                .chain(vec![103.939; 16])
                .collect(),
            width: 4,
            height: 4,
            label: "dunk".to_string(),
        });
        ds.push(PlaySample {
            image_chw: vec![0.0; 48],
            width: 4,
            height: 4,
            label: "jumpshot".to_string(),
        });
        let codec = LabelCodec::fit(&ds, &["dunk", "jumpshot"]).unwrap();
        let labels = encode_labels(&codec, &ds).unwrap();
        let mut iter = BatchIter::new(&ds, &labels, BatchConfig::evaluation(1)).unwrap();
        let device = Default::default();
        let batch = iter.next_batch::<B>(&device).unwrap();
        let pixels = batch.images.into_data().to_vec::<f32>().unwrap();
        for v in pixels {
            assert!(v.abs() < 1e-3);
        }
    }
}
