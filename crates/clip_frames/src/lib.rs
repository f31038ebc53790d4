//! Frame extraction from broadcast video clips.
//!
//! Decodes a clip into sequentially numbered JPEG files that the dataset
//! normalizer later ingests. Decoding sits behind the [`FrameSource`] trait
//! so the extraction contract (clear-then-fill, naming, empty-clip
//! detection) is testable without a system ffmpeg install; the real decoder
//! lives behind the `ffmpeg` cargo feature.

pub mod extract;
pub mod source;

pub use extract::{clear_frame_dir, extract_frames, ClipId, ExtractionReport};
#[cfg(feature = "ffmpeg")]
pub use source::FfmpegFrameSource;
pub use source::FrameSource;

use std::path::PathBuf;
use thiserror::Error;

pub type FrameResult<T> = Result<T, FrameError>;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image encode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to open or decode video {path}: {msg}")]
    Decode { path: PathBuf, msg: String },
    #[error("clip {clip} decoded to zero frames")]
    EmptyClip { clip: String },
}
