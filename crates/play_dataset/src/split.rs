//! Label binarization, stratified train/validation splitting, and the
//! two-column complementary label encoding the classifier trains against.

use crate::types::{DatasetError, DatasetResult, LabeledDataset};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Maps exactly two class labels to a binary indicator column.
///
/// Classes are sorted alphabetically; the indicator is 1.0 for the second
/// class. The expanded row is `[indicator, 1 - indicator]`, so the argmax
/// convention is: column 0 wins -> second class, column 1 wins -> first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCodec {
    classes: [String; 2],
}

impl LabelCodec {
    /// Fits the codec against the dataset's observed labels, rejecting any
    /// divergence from the configured target set before splitting happens.
    pub fn fit(dataset: &LabeledDataset, target_labels: &[&str]) -> DatasetResult<Self> {
        if target_labels.len() != 2 {
            return Err(DatasetError::LabelInconsistency(format!(
                "expected exactly 2 target classes, got {}",
                target_labels.len()
            )));
        }
        let mut classes = [target_labels[0].to_string(), target_labels[1].to_string()];
        classes.sort();
        if classes[0] == classes[1] {
            return Err(DatasetError::LabelInconsistency(format!(
                "duplicate target class {:?}",
                classes[0]
            )));
        }

        let counts = dataset.class_counts();
        for observed in counts.keys() {
            if !classes.iter().any(|c| c == observed) {
                return Err(DatasetError::LabelInconsistency(format!(
                    "label {observed:?} present in images but absent from target set"
                )));
            }
        }
        for class in &classes {
            if !counts.contains_key(class) {
                return Err(DatasetError::LabelInconsistency(format!(
                    "target class {class:?} has no images"
                )));
            }
        }
        Ok(Self { classes })
    }

    pub fn classes(&self) -> &[String; 2] {
        &self.classes
    }

    /// Binary indicator for a label: 1.0 for the second (alphabetically
    /// later) class, 0.0 for the first.
    pub fn indicator(&self, label: &str) -> DatasetResult<f32> {
        if label == self.classes[1] {
            Ok(1.0)
        } else if label == self.classes[0] {
            Ok(0.0)
        } else {
            Err(DatasetError::LabelInconsistency(format!(
                "unknown label {label:?}"
            )))
        }
    }

    /// Expands a label into the complementary two-column row.
    pub fn encode_row(&self, label: &str) -> DatasetResult<[f32; 2]> {
        let indicator = self.indicator(label)?;
        Ok([indicator, 1.0 - indicator])
    }

    /// Class index (into `classes`) for an encoded or predicted row, taken
    /// as the argmax over the two columns. Ties resolve to column 0.
    pub fn class_of_row(&self, row: &[f32; 2]) -> usize {
        if row[0] >= row[1] {
            1
        } else {
            0
        }
    }
}

/// Two-column complementary label rows, parallel to a dataset's samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedLabels {
    pub rows: Vec<[f32; 2]>,
}

impl EncodedLabels {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Encodes every label of `dataset` in sample order.
pub fn encode_labels(codec: &LabelCodec, dataset: &LabeledDataset) -> DatasetResult<EncodedLabels> {
    let mut rows = Vec::with_capacity(dataset.len());
    for label in dataset.labels() {
        rows.push(codec.encode_row(label)?);
    }
    Ok(EncodedLabels { rows })
}

/// A stratified train/validation partition.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: LabeledDataset,
    pub val: LabeledDataset,
}

/// Splits `dataset` into train/validation partitions, stratified per class
/// so each side preserves the overall class ratio. Deterministic for a
/// fixed seed. Samples move whole, so image/label pairing survives.
pub fn stratified_split(
    dataset: LabeledDataset,
    val_ratio: f32,
    seed: u64,
) -> DatasetResult<Split> {
    if dataset.is_empty() {
        return Err(DatasetError::EmptyDataset);
    }
    if !(0.0..1.0).contains(&val_ratio) {
        return Err(DatasetError::LabelInconsistency(format!(
            "val_ratio {val_ratio} outside [0, 1)"
        )));
    }

    // Group sample indices by class, in sorted label order so the grouping
    // itself is deterministic.
    let mut by_class: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, sample) in dataset.samples().iter().enumerate() {
        by_class.entry(sample.label.clone()).or_default().push(i);
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut val_indices = vec![false; dataset.len()];
    for indices in by_class.values() {
        let mut shuffled = indices.clone();
        shuffled.shuffle(&mut rng);
        let val_count = (shuffled.len() as f32 * val_ratio).round() as usize;
        for &i in shuffled.iter().take(val_count) {
            val_indices[i] = true;
        }
    }

    let mut train = LabeledDataset::default();
    let mut val = LabeledDataset::default();
    for (i, sample) in dataset.into_samples().into_iter().enumerate() {
        if val_indices[i] {
            val.push(sample);
        } else {
            train.push(sample);
        }
    }
    Ok(Split { train, val })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlaySample;

    fn sample(label: &str, value: f32) -> PlaySample {
        PlaySample {
            image_chw: vec![value; 3 * 4 * 4],
            width: 4,
            height: 4,
            label: label.to_string(),
        }
    }

    fn dataset(dunks: usize, jumpshots: usize) -> LabeledDataset {
        let mut ds = LabeledDataset::default();
        for i in 0..dunks {
            ds.push(sample("dunk", i as f32));
        }
        for i in 0..jumpshots {
            ds.push(sample("jumpshot", 100.0 + i as f32));
        }
        ds
    }

    #[test]
    fn codec_sorts_classes_and_flags_unknown_labels() {
        let ds = dataset(2, 2);
        let codec = LabelCodec::fit(&ds, &["jumpshot", "dunk"]).unwrap();
        assert_eq!(codec.classes(), &["dunk".to_string(), "jumpshot".to_string()]);
        assert_eq!(codec.indicator("dunk").unwrap(), 0.0);
        assert_eq!(codec.indicator("jumpshot").unwrap(), 1.0);
        assert!(codec.indicator("three").is_err());
    }

    #[test]
    fn codec_rejects_observed_label_outside_target_set() {
        let mut ds = dataset(2, 2);
        ds.push(sample("three", 0.0));
        assert!(matches!(
            LabelCodec::fit(&ds, &["dunk", "jumpshot"]),
            Err(DatasetError::LabelInconsistency(_))
        ));
    }

    #[test]
    fn encoded_rows_sum_to_one() {
        let ds = dataset(3, 5);
        let codec = LabelCodec::fit(&ds, &["dunk", "jumpshot"]).unwrap();
        let encoded = encode_labels(&codec, &ds).unwrap();
        assert_eq!(encoded.len(), 8);
        for row in &encoded.rows {
            assert_eq!(row[0] + row[1], 1.0);
        }
    }

    #[test]
    fn row_roundtrip_through_argmax() {
        let ds = dataset(1, 1);
        let codec = LabelCodec::fit(&ds, &["dunk", "jumpshot"]).unwrap();
        let dunk = codec.encode_row("dunk").unwrap();
        let jump = codec.encode_row("jumpshot").unwrap();
        assert_eq!(codec.classes()[codec.class_of_row(&dunk)], "dunk");
        assert_eq!(codec.classes()[codec.class_of_row(&jump)], "jumpshot");
    }

    #[test]
    fn split_is_deterministic_for_a_fixed_seed() {
        let ds = dataset(20, 20);
        let a = stratified_split(ds.clone(), 0.2, 17).unwrap();
        let b = stratified_split(ds, 0.2, 17).unwrap();
        let labels = |d: &LabeledDataset| d.labels().map(String::from).collect::<Vec<_>>();
        let values = |d: &LabeledDataset| {
            d.samples().iter().map(|s| s.image_chw[0]).collect::<Vec<_>>()
        };
        assert_eq!(labels(&a.train), labels(&b.train));
        assert_eq!(labels(&a.val), labels(&b.val));
        assert_eq!(values(&a.train), values(&b.train));
        assert_eq!(values(&a.val), values(&b.val));
    }

    #[test]
    fn split_preserves_class_ratio_and_disjointness() {
        let ds = dataset(30, 10);
        let split = stratified_split(ds, 0.2, 42).unwrap();
        assert_eq!(split.train.len() + split.val.len(), 40);

        // 30/10 at 20% val -> 6 dunks + 2 jumpshots held out.
        let val_counts = split.val.class_counts();
        assert_eq!(val_counts["dunk"], 6);
        assert_eq!(val_counts["jumpshot"], 2);
        let train_counts = split.train.class_counts();
        assert_eq!(train_counts["dunk"], 24);
        assert_eq!(train_counts["jumpshot"], 8);

        // Pixel payloads were unique per sample, so disjointness is
        // checkable through them.
        let mut seen: Vec<f32> = split
            .train
            .samples()
            .iter()
            .chain(split.val.samples())
            .map(|s| s.image_chw[0])
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        seen.dedup();
        assert_eq!(seen.len(), 40);
    }

    #[test]
    fn pairing_survives_the_split() {
        // Dunk payloads < 100, jumpshot payloads >= 100; any desync between
        // image and label would break this.
        let ds = dataset(10, 10);
        let split = stratified_split(ds, 0.3, 7).unwrap();
        for sample in split.train.samples().iter().chain(split.val.samples()) {
            if sample.label == "dunk" {
                assert!(sample.image_chw[0] < 100.0);
            } else {
                assert!(sample.image_chw[0] >= 100.0);
            }
        }
    }
}
