//! Frame decoding sources.

use crate::FrameResult;
use image::RgbImage;

/// Sequential frame decoder. Yields frames in stream order until the
/// underlying container reports end-of-stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> FrameResult<Option<RgbImage>>;
}

#[cfg(feature = "ffmpeg")]
pub use ffmpeg_impl::FfmpegFrameSource;

#[cfg(feature = "ffmpeg")]
mod ffmpeg_impl {
    use super::FrameSource;
    use crate::{FrameError, FrameResult};
    use ffmpeg_next as ffmpeg;
    use image::RgbImage;
    use std::path::{Path, PathBuf};

    /// Decodes a video file through libav, converting every frame to RGB24.
    pub struct FfmpegFrameSource {
        path: PathBuf,
        input: ffmpeg::format::context::Input,
        decoder: ffmpeg::decoder::Video,
        scaler: ffmpeg::software::scaling::Context,
        stream_index: usize,
        eof_sent: bool,
    }

    impl FfmpegFrameSource {
        /// Opens the clip at `path`. An unreadable or non-video file is an
        /// explicit error, never an empty stream.
        pub fn open(path: &Path) -> FrameResult<Self> {
            let decode_err = |msg: String| FrameError::Decode {
                path: path.to_path_buf(),
                msg,
            };
            ffmpeg::init().map_err(|e| decode_err(format!("ffmpeg init failed: {e}")))?;
            let input = ffmpeg::format::input(&path)
                .map_err(|e| decode_err(format!("cannot open container: {e}")))?;
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| decode_err("no video stream".to_string()))?;
            let stream_index = stream.index();
            let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .map_err(|e| decode_err(format!("codec context: {e}")))?
                .decoder()
                .video()
                .map_err(|e| decode_err(format!("video decoder: {e}")))?;
            let scaler = ffmpeg::software::scaling::Context::get(
                decoder.format(),
                decoder.width(),
                decoder.height(),
                ffmpeg::format::Pixel::RGB24,
                decoder.width(),
                decoder.height(),
                ffmpeg::software::scaling::Flags::BILINEAR,
            )
            .map_err(|e| decode_err(format!("scaler: {e}")))?;
            Ok(Self {
                path: path.to_path_buf(),
                input,
                decoder,
                scaler,
                stream_index,
                eof_sent: false,
            })
        }

        fn frame_to_rgb(&mut self, decoded: &ffmpeg::frame::Video) -> FrameResult<RgbImage> {
            let mut rgb = ffmpeg::frame::Video::empty();
            self.scaler
                .run(decoded, &mut rgb)
                .map_err(|e| FrameError::Decode {
                    path: self.path.clone(),
                    msg: format!("scale to rgb: {e}"),
                })?;
            let width = rgb.width();
            let height = rgb.height();
            let stride = rgb.stride(0);
            let data = rgb.data(0);
            let mut buf = Vec::with_capacity((width * height * 3) as usize);
            for y in 0..height as usize {
                let row = &data[y * stride..y * stride + width as usize * 3];
                buf.extend_from_slice(row);
            }
            RgbImage::from_raw(width, height, buf).ok_or_else(|| FrameError::Decode {
                path: self.path.clone(),
                msg: "rgb frame buffer size mismatch".to_string(),
            })
        }
    }

    impl FrameSource for FfmpegFrameSource {
        fn next_frame(&mut self) -> FrameResult<Option<RgbImage>> {
            let mut decoded = ffmpeg::frame::Video::empty();
            loop {
                if self.decoder.receive_frame(&mut decoded).is_ok() {
                    return self.frame_to_rgb(&decoded).map(Some);
                }
                if self.eof_sent {
                    return Ok(None);
                }
                let next = {
                    let mut packets = self.input.packets();
                    packets.next().map(|(stream, packet)| (stream.index(), packet))
                };
                match next {
                    Some((index, packet)) if index == self.stream_index => {
                        self.decoder
                            .send_packet(&packet)
                            .map_err(|e| FrameError::Decode {
                                path: self.path.clone(),
                                msg: format!("send packet: {e}"),
                            })?;
                    }
                    Some(_) => continue,
                    None => {
                        // Flush the decoder so buffered frames drain out.
                        let _ = self.decoder.send_eof();
                        self.eof_sent = true;
                    }
                }
            }
        }
    }
}
