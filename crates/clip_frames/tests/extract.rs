//! Extraction contract tests using a synthetic frame source.

use clip_frames::{clear_frame_dir, extract_frames, ClipId, FrameError, FrameResult, FrameSource};
use image::RgbImage;
use std::fs;

/// Yields `remaining` solid-color 8x8 frames, then end-of-stream.
struct SyntheticSource {
    remaining: usize,
    emitted: u8,
}

impl SyntheticSource {
    fn new(frames: usize) -> Self {
        Self {
            remaining: frames,
            emitted: 0,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> FrameResult<Option<RgbImage>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        self.emitted = self.emitted.wrapping_add(7);
        let mut img = RgbImage::new(8, 8);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([self.emitted, 128, 64]);
        }
        Ok(Some(img))
    }
}

#[test]
fn thirty_frame_clip_yields_thirty_named_files() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let dest = tmp.path().join("temp_frames");
    fs::create_dir_all(&dest)?;

    // Leftovers from a prior run must be gone afterwards.
    fs::write(dest.join("dunk_9_frame_0.jpg"), b"stale")?;
    fs::write(dest.join("notes.txt"), b"stale")?;

    let clip = ClipId::new("dunk", 1);
    let mut source = SyntheticSource::new(30);
    let report = extract_frames(&mut source, &dest, &clip)?;
    assert_eq!(report.frames_written, 30);

    let mut names: Vec<String> = fs::read_dir(&dest)?
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 30, "stale files must not survive extraction");
    for i in 0..30 {
        let expected = format!("dunk_1_frame_{i}.jpg");
        assert!(
            names.contains(&expected),
            "missing expected frame file {expected}"
        );
    }
    Ok(())
}

#[test]
fn empty_clip_is_an_explicit_error() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let dest = tmp.path().join("temp_frames");
    let clip = ClipId::new("three", 4);
    let mut source = SyntheticSource::new(0);
    match extract_frames(&mut source, &dest, &clip) {
        Err(FrameError::EmptyClip { clip }) => assert_eq!(clip, "three_4"),
        other => panic!("expected EmptyClip, got {other:?}"),
    }
    Ok(())
}

#[test]
fn clear_frame_dir_removes_only_files() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path();
    fs::write(dir.join("a.jpg"), b"x")?;
    fs::write(dir.join("b.jpg"), b"y")?;
    fs::create_dir(dir.join("keep"))?;

    let removed = clear_frame_dir(dir)?;
    assert_eq!(removed, 2);
    assert!(dir.join("keep").is_dir());
    Ok(())
}

#[test]
fn frame_names_are_zero_based() {
    let clip = ClipId::new("dunk", 12);
    assert_eq!(clip.frame_file_name(0), "dunk_12_frame_0.jpg");
    assert_eq!(clip.frame_file_name(29), "dunk_12_frame_29.jpg");
}
