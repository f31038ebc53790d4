//! Labeled image dataset pipeline for the play classifier.
//!
//! From a class-keyed directory of images this crate produces normalized
//! 240x240 CHW samples, stratified train/validation splits with two-column
//! binary labels, reusable on-disk snapshots, and augmented batch tensors
//! ready for a burn backend.

pub mod aug;
pub mod batch;
pub mod normalize;
pub mod split;
pub mod stack;
pub mod types;

pub use aug::{mean_center, AugmentConfig, FillMode, TransformPipeline, IMAGENET_MEAN};
pub use batch::{BatchConfig, BatchIter, BurnBatch};
pub use normalize::load_labeled_images;
pub use split::{encode_labels, stratified_split, EncodedLabels, LabelCodec, Split};
pub use stack::{ImageStack, SnapshotManifest};
pub use types::{
    DatasetError, DatasetResult, LabeledDataset, LoadSummary, PlaySample, CHANNELS, TARGET_HEIGHT,
    TARGET_WIDTH,
};
