//! Stacking normalized images into one tensor, with snapshot persistence.
//!
//! A snapshot is a binary f32 shard (`PSS1` header, little-endian) plus a
//! JSON manifest carrying the shape, the label column, and a SHA-256
//! checksum, so a run can reuse assembled data without re-extracting.

use crate::types::{DatasetError, DatasetResult, LabeledDataset, PlaySample, CHANNELS};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::fs;
use std::path::Path;

const SNAPSHOT_MAGIC: &[u8; 4] = b"PSS1";
const SNAPSHOT_VERSION: u32 = 1;
const HEADER_LEN: usize = 32;

/// All images of a dataset stacked along a new leading axis, parallel to
/// the label column. Shape: `[samples, 3, height, width]`.
#[derive(Debug, Clone)]
pub struct ImageStack {
    pub data: Vec<f32>,
    pub samples: usize,
    pub width: u32,
    pub height: u32,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub name: String,
    pub samples: usize,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub labels: Vec<String>,
    /// Hex-encoded SHA-256 of the binary shard.
    pub checksum_sha256: String,
    pub created_at_ms: u64,
}

impl ImageStack {
    /// Stacks every sample into one contiguous buffer. The first sample
    /// fixes the expected shape; any deviation is a `ShapeMismatch` naming
    /// the offending index, caught here rather than at fitting time.
    pub fn from_dataset(dataset: &LabeledDataset) -> DatasetResult<Self> {
        let first = dataset.samples().first().ok_or(DatasetError::EmptyDataset)?;
        let expected = first.shape();
        let elems = expected.iter().product::<usize>();

        let mut data = Vec::with_capacity(dataset.len() * elems);
        let mut labels = Vec::with_capacity(dataset.len());
        for (index, sample) in dataset.samples().iter().enumerate() {
            let found = sample.shape();
            if found != expected || sample.image_chw.len() != elems {
                return Err(DatasetError::ShapeMismatch {
                    index,
                    expected,
                    found,
                });
            }
            data.extend_from_slice(&sample.image_chw);
            labels.push(sample.label.clone());
        }

        Ok(Self {
            data,
            samples: dataset.len(),
            width: first.width,
            height: first.height,
            labels,
        })
    }

    /// Unpacks the stack back into per-sample form, so a saved snapshot can
    /// feed splitting and batching without re-reading the image tree.
    pub fn into_dataset(self) -> LabeledDataset {
        let elems = CHANNELS * self.width as usize * self.height as usize;
        let mut dataset = LabeledDataset::default();
        for (i, label) in self.labels.into_iter().enumerate() {
            dataset.push(PlaySample {
                image_chw: self.data[i * elems..(i + 1) * elems].to_vec(),
                width: self.width,
                height: self.height,
                label,
            });
        }
        dataset
    }

    pub fn shape(&self) -> [usize; 4] {
        [
            self.samples,
            CHANNELS,
            self.height as usize,
            self.width as usize,
        ]
    }

    /// Writes `{name}.bin` and `{name}.json` under `dir`.
    pub fn save(&self, dir: &Path, name: &str) -> DatasetResult<SnapshotManifest> {
        fs::create_dir_all(dir).map_err(|e| DatasetError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(SNAPSHOT_MAGIC);
        bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&self.width.to_le_bytes());
        bytes.extend_from_slice(&self.height.to_le_bytes());
        bytes.extend_from_slice(&(CHANNELS as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.samples as u64).to_le_bytes());
        bytes.extend_from_slice(&[0u8; HEADER_LEN - 28]);
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let bin_path = dir.join(format!("{name}.bin"));
        fs::write(&bin_path, &bytes).map_err(|e| DatasetError::Io {
            path: bin_path.clone(),
            source: e,
        })?;

        let checksum = format!("{:x}", sha2::Sha256::digest(&bytes));
        let created_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let manifest = SnapshotManifest {
            name: name.to_string(),
            samples: self.samples,
            width: self.width,
            height: self.height,
            channels: CHANNELS as u32,
            labels: self.labels.clone(),
            checksum_sha256: checksum,
            created_at_ms,
        };

        let json_path = dir.join(format!("{name}.json"));
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| DatasetError::Snapshot(e.to_string()))?;
        fs::write(&json_path, json).map_err(|e| DatasetError::Io {
            path: json_path,
            source: e,
        })?;

        Ok(manifest)
    }

    /// Reads a snapshot back, verifying the header and checksum.
    pub fn load(dir: &Path, name: &str) -> DatasetResult<Self> {
        let json_path = dir.join(format!("{name}.json"));
        let raw = fs::read(&json_path).map_err(|e| DatasetError::Io {
            path: json_path.clone(),
            source: e,
        })?;
        let manifest: SnapshotManifest =
            serde_json::from_slice(&raw).map_err(|e| DatasetError::Json {
                path: json_path,
                source: e,
            })?;

        let bin_path = dir.join(format!("{name}.bin"));
        let bytes = fs::read(&bin_path).map_err(|e| DatasetError::Io {
            path: bin_path.clone(),
            source: e,
        })?;

        let checksum = format!("{:x}", sha2::Sha256::digest(&bytes));
        if checksum != manifest.checksum_sha256 {
            return Err(DatasetError::Snapshot(format!(
                "checksum mismatch for {}",
                bin_path.display()
            )));
        }
        if bytes.len() < HEADER_LEN || &bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(DatasetError::Snapshot(format!(
                "bad snapshot header in {}",
                bin_path.display()
            )));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap_or_default());
        if version != SNAPSHOT_VERSION {
            return Err(DatasetError::Snapshot(format!(
                "unsupported snapshot version {version} in {}",
                bin_path.display()
            )));
        }

        let width = u32::from_le_bytes(bytes[8..12].try_into().unwrap_or_default());
        let height = u32::from_le_bytes(bytes[12..16].try_into().unwrap_or_default());
        let samples = u64::from_le_bytes(bytes[20..28].try_into().unwrap_or_default()) as usize;
        let elems = samples * CHANNELS * width as usize * height as usize;
        if bytes.len() != HEADER_LEN + elems * 4 {
            return Err(DatasetError::Snapshot(format!(
                "snapshot {} truncated: expected {} data bytes, found {}",
                bin_path.display(),
                elems * 4,
                bytes.len() - HEADER_LEN
            )));
        }
        if manifest.labels.len() != samples {
            return Err(DatasetError::Snapshot(format!(
                "snapshot {} has {} labels for {} samples",
                bin_path.display(),
                manifest.labels.len(),
                samples
            )));
        }

        let mut data = Vec::with_capacity(elems);
        for chunk in bytes[HEADER_LEN..].chunks_exact(4) {
            let mut arr = [0u8; 4];
            arr.copy_from_slice(chunk);
            data.push(f32::from_le_bytes(arr));
        }

        Ok(Self {
            data,
            samples,
            width,
            height,
            labels: manifest.labels,
        })
    }
}
