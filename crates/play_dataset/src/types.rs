//! Core types and error definitions for the play dataset pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Canonical input size the normalizer produces and the classifier expects.
pub const TARGET_WIDTH: u32 = 240;
pub const TARGET_HEIGHT: u32 = 240;
pub const CHANNELS: usize = 3;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("shape mismatch at sample {index}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        index: usize,
        expected: [usize; 3],
        found: [usize; 3],
    },
    #[error("label inconsistency: {0}")]
    LabelInconsistency(String),
    #[error("dataset contains no samples")]
    EmptyDataset,
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

/// A normalized image paired with its class label.
///
/// Pixels are f32 on the 0-255 scale in CHW layout; mean-centering happens
/// later, at batch time, so train and validation share the same centering.
#[derive(Debug, Clone)]
pub struct PlaySample {
    pub image_chw: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub label: String,
}

impl PlaySample {
    pub fn shape(&self) -> [usize; 3] {
        [CHANNELS, self.height as usize, self.width as usize]
    }
}

/// Images and labels as a single ordered container. Every reindexing
/// operation (shuffle, split) moves whole samples, so an image can never be
/// separated from its label.
#[derive(Debug, Clone, Default)]
pub struct LabeledDataset {
    samples: Vec<PlaySample>,
}

impl LabeledDataset {
    pub fn new(samples: Vec<PlaySample>) -> Self {
        Self { samples }
    }

    pub fn push(&mut self, sample: PlaySample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[PlaySample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<PlaySample> {
        self.samples
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(|s| s.label.as_str())
    }

    /// Per-class sample counts, in sorted label order.
    pub fn class_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.label.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// What the normalizer did with the files it saw.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadSummary {
    pub loaded: usize,
    pub dropped_grayscale: usize,
    pub converted_alpha: usize,
    pub per_label: BTreeMap<String, usize>,
}
