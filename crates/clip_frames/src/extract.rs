//! Clear-then-fill frame extraction into a working directory.

use crate::source::FrameSource;
use crate::{FrameError, FrameResult};
use std::fs;
use std::path::Path;

/// Identifies the clip being extracted; both parts appear in the output
/// file names so frames from different clips never collide.
#[derive(Debug, Clone)]
pub struct ClipId {
    pub class: String,
    pub number: u32,
}

impl ClipId {
    pub fn new(class: impl Into<String>, number: u32) -> Self {
        Self {
            class: class.into(),
            number,
        }
    }

    /// File name for a zero-based frame index: `{class}_{number}_frame_{index}.jpg`.
    pub fn frame_file_name(&self, index: usize) -> String {
        format!("{}_{}_frame_{}.jpg", self.class, self.number, index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    pub frames_written: usize,
}

/// Removes every regular file in `dir`, returning how many were deleted.
/// Subdirectories are left alone.
pub fn clear_frame_dir(dir: &Path) -> FrameResult<usize> {
    let entries = fs::read_dir(dir).map_err(|e| FrameError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut removed = 0usize;
    for entry in entries {
        let entry = entry.map_err(|e| FrameError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file() {
            fs::remove_file(&path).map_err(|e| FrameError::Io { path, source: e })?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Extracts every frame from `source` into `dest`, clearing prior files
/// first. Single-writer, non-idempotent: the previous run's frames are
/// deleted before the first new frame lands, so two concurrent extractions
/// into the same directory are unsafe.
///
/// A clip that decodes to zero frames is an [`FrameError::EmptyClip`] error
/// so callers can distinguish "unreadable clip" from "empty directory".
pub fn extract_frames(
    source: &mut dyn FrameSource,
    dest: &Path,
    clip: &ClipId,
) -> FrameResult<ExtractionReport> {
    fs::create_dir_all(dest).map_err(|e| FrameError::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;
    let removed = clear_frame_dir(dest)?;
    if removed > 0 {
        println!(
            "cleared {removed} leftover file(s) from {}",
            dest.display()
        );
    }

    let mut index = 0usize;
    while let Some(frame) = source.next_frame()? {
        let path = dest.join(clip.frame_file_name(index));
        frame
            .save(&path)
            .map_err(|e| FrameError::Image { path, source: e })?;
        index += 1;
    }

    if index == 0 {
        return Err(FrameError::EmptyClip {
            clip: format!("{}_{}", clip.class, clip.number),
        });
    }
    println!(
        "extracted {index} frame(s) from {}_{} into {}",
        clip.class,
        clip.number,
        dest.display()
    );
    Ok(ExtractionReport {
        frames_written: index,
    })
}

/// Opens `video` with the ffmpeg decoder and extracts its frames into `dest`.
#[cfg(feature = "ffmpeg")]
pub fn extract_clip_file(
    video: &Path,
    dest: &Path,
    clip: &ClipId,
) -> FrameResult<ExtractionReport> {
    let mut source = crate::source::FfmpegFrameSource::open(video)?;
    extract_frames(&mut source, dest, clip)
}
