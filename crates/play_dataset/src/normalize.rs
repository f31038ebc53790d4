//! Loading and normalizing labeled images from a class-keyed directory tree.
//!
//! The tree layout is `root/{label}/*`: each immediate subdirectory named
//! after a target class holds that class's images. Every image is decoded,
//! channel-dispatched, resized to 240x240, and converted to CHW f32.

use crate::types::{
    DatasetError, DatasetResult, LabeledDataset, LoadSummary, PlaySample, TARGET_HEIGHT,
    TARGET_WIDTH,
};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, RgbImage};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

enum Normalized {
    /// 3-channel image, resized and converted. The flag records whether it
    /// arrived with an alpha channel.
    Image { chw: Vec<f32>, had_alpha: bool },
    /// Single-channel input, excluded from the dataset by policy.
    DroppedGrayscale,
}

/// Loads every image under `root/{label}` for each target label, in the
/// label order given and sorted file order within a label.
///
/// Channel policy: grayscale inputs are dropped (counted in the summary,
/// never silently), RGBA inputs are composited onto an opaque white
/// background, RGB passes through. Unreadable files are fatal.
pub fn load_labeled_images(
    root: &Path,
    target_labels: &[&str],
) -> DatasetResult<(LabeledDataset, LoadSummary)> {
    let mut dataset = LabeledDataset::default();
    let mut summary = LoadSummary::default();

    for label in target_labels {
        let dir = root.join(label);
        println!("loading from {}", dir.display());
        let paths = list_image_files(&dir)?;

        // Decode in parallel, then restore listing order.
        let mut decoded: Vec<(usize, DatasetResult<Normalized>)> = paths
            .par_iter()
            .enumerate()
            .map(|(i, path)| (i, normalize_file(path)))
            .collect();
        decoded.sort_by_key(|(i, _)| *i);

        for (i, result) in decoded {
            match result? {
                Normalized::Image { chw, had_alpha } => {
                    if had_alpha {
                        summary.converted_alpha += 1;
                    }
                    summary.loaded += 1;
                    *summary.per_label.entry((*label).to_string()).or_insert(0) += 1;
                    dataset.push(PlaySample {
                        image_chw: chw,
                        width: TARGET_WIDTH,
                        height: TARGET_HEIGHT,
                        label: (*label).to_string(),
                    });
                }
                Normalized::DroppedGrayscale => {
                    summary.dropped_grayscale += 1;
                    eprintln!(
                        "warning: dropping grayscale image {} (single channel)",
                        paths[i].display()
                    );
                }
            }
        }
    }

    Ok((dataset, summary))
}

fn list_image_files(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| DatasetError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

fn normalize_file(path: &Path) -> DatasetResult<Normalized> {
    let img = image::open(path).map_err(|e| DatasetError::Image {
        path: path.to_path_buf(),
        source: e,
    })?;
    let (rgb, had_alpha) = match img.color() {
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16 => {
            return Ok(Normalized::DroppedGrayscale);
        }
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => {
            (composite_on_white(&img), true)
        }
        _ => (img.to_rgb8(), false),
    };
    let resized = image::imageops::resize(&rgb, TARGET_WIDTH, TARGET_HEIGHT, FilterType::Triangle);
    Ok(Normalized::Image {
        chw: rgb_to_chw(&resized),
        had_alpha,
    })
}

/// Composites an alpha image onto an opaque white background, so partially
/// transparent pixels fade toward white instead of picking up garbage.
fn composite_on_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as f32 / 255.0;
        let mut blended = [0u8; 3];
        for (c, slot) in blended.iter_mut().enumerate() {
            let v = pixel[c] as f32 * alpha + 255.0 * (1.0 - alpha);
            *slot = v.round().clamp(0.0, 255.0) as u8;
        }
        out.put_pixel(x, y, image::Rgb(blended));
    }
    out
}

/// HWC u8 to CHW f32 on the 0-255 scale.
pub(crate) fn rgb_to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut chw = vec![0.0f32; plane * 3];
    for (x, y, pixel) in img.enumerate_pixels() {
        let base = (y * width + x) as usize;
        chw[base] = pixel[0] as f32;
        chw[plane + base] = pixel[1] as f32;
        chw[2 * plane + base] = pixel[2] as f32;
    }
    chw
}
