//! Training-time augmentation and mean-centering.
//!
//! Augmentation draws a random rotation, zoom, and shift per sample and
//! applies them as a single inverse affine map with nearest-neighbor
//! sampling, so the three transforms compose without intermediate resamples.
//! Out-of-bounds reads are resolved by the configured fill mode.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Per-channel dataset mean on the 0-255 scale (RGB order), subtracted from
/// every image at batch time.
pub const IMAGENET_MEAN: [f32; 3] = [123.68, 116.779, 103.939];

/// How source reads outside the image bounds are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    /// Zero fill.
    Constant,
    /// Clamp to the nearest edge pixel.
    Nearest,
    /// Mirror across the edge.
    Reflect,
    /// Tile the image.
    #[default]
    Wrap,
}

/// Random transform ranges. Each field bounds a uniform draw; a zeroed
/// config is the identity.
#[derive(Debug, Clone, Copy)]
pub struct AugmentConfig {
    /// Max rotation either way, in degrees.
    pub rotation_deg: f32,
    /// Zoom factor drawn from `[1 - zoom_range, 1 + zoom_range]`.
    pub zoom_range: f32,
    /// Max shift either way, as a fraction of width/height.
    pub shift_frac: f32,
    pub fill_mode: FillMode,
    /// Base seed; per-sample draws mix in the sample id and epoch so every
    /// sample sees a fresh transform each epoch, reproducibly.
    pub seed: Option<u64>,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            rotation_deg: 45.0,
            zoom_range: 0.25,
            shift_frac: 0.2,
            fill_mode: FillMode::Wrap,
            seed: None,
        }
    }
}

/// Applies the configured random transforms to CHW images.
#[derive(Debug, Clone)]
pub struct TransformPipeline {
    config: AugmentConfig,
    fallback_seed: u64,
}

impl TransformPipeline {
    pub fn new(config: AugmentConfig) -> Self {
        // When no seed is configured, fix one at construction so a pipeline
        // is still internally consistent across epochs.
        let fallback_seed = config.seed.unwrap_or_else(|| rand::rng().random());
        Self {
            config,
            fallback_seed,
        }
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    fn sample_rng(&self, sample_id: u64, epoch: u64) -> StdRng {
        let base = self.config.seed.unwrap_or(self.fallback_seed);
        // Odd multipliers keep sample and epoch contributions from aliasing.
        let mixed = base ^ sample_id.wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ epoch.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        StdRng::seed_from_u64(mixed)
    }

    /// Returns a transformed copy of a CHW image. `sample_id` and `epoch`
    /// select the random draw; the same triple always yields the same
    /// output.
    pub fn augment(
        &self,
        image_chw: &[f32],
        width: u32,
        height: u32,
        sample_id: u64,
        epoch: u64,
    ) -> Vec<f32> {
        let mut rng = self.sample_rng(sample_id, epoch);
        let c = &self.config;

        let angle = if c.rotation_deg > 0.0 {
            rng.random_range(-c.rotation_deg..=c.rotation_deg)
                .to_radians()
        } else {
            0.0
        };
        let zoom = if c.zoom_range > 0.0 {
            rng.random_range(1.0 - c.zoom_range..=1.0 + c.zoom_range)
        } else {
            1.0
        };
        let (dx, dy) = if c.shift_frac > 0.0 {
            (
                rng.random_range(-c.shift_frac..=c.shift_frac) * width as f32,
                rng.random_range(-c.shift_frac..=c.shift_frac) * height as f32,
            )
        } else {
            (0.0, 0.0)
        };

        apply_affine(image_chw, width, height, angle, zoom, dx, dy, c.fill_mode)
    }
}

/// Inverse-maps each output pixel through rotate(angle), scale(zoom), and
/// translate(dx, dy) about the image center, with nearest-neighbor reads.
#[allow(clippy::too_many_arguments)]
fn apply_affine(
    image_chw: &[f32],
    width: u32,
    height: u32,
    angle: f32,
    zoom: f32,
    dx: f32,
    dy: f32,
    fill: FillMode,
) -> Vec<f32> {
    let w = width as i64;
    let h = height as i64;
    let plane = (w * h) as usize;
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let (sin, cos) = angle.sin_cos();
    let inv_zoom = 1.0 / zoom.max(1e-6);

    let mut out = vec![0.0f32; image_chw.len()];
    for y in 0..h {
        for x in 0..w {
            // Undo the shift, then the zoom, then the rotation.
            let ox = x as f32 - dx - cx;
            let oy = y as f32 - dy - cy;
            let sx = (ox * cos + oy * sin) * inv_zoom + cx;
            let sy = (-ox * sin + oy * cos) * inv_zoom + cy;

            let src = resolve_source(sx.round() as i64, sy.round() as i64, w, h, fill);
            let dst = (y * w + x) as usize;
            match src {
                Some((ix, iy)) => {
                    let s = (iy * w + ix) as usize;
                    for ch in 0..3 {
                        out[ch * plane + dst] = image_chw[ch * plane + s];
                    }
                }
                None => {
                    for ch in 0..3 {
                        out[ch * plane + dst] = 0.0;
                    }
                }
            }
        }
    }
    out
}

/// Maps a possibly out-of-bounds source coordinate into the image, or
/// `None` for constant fill.
fn resolve_source(x: i64, y: i64, w: i64, h: i64, fill: FillMode) -> Option<(i64, i64)> {
    if (0..w).contains(&x) && (0..h).contains(&y) {
        return Some((x, y));
    }
    match fill {
        FillMode::Constant => None,
        FillMode::Nearest => Some((x.clamp(0, w - 1), y.clamp(0, h - 1))),
        FillMode::Wrap => Some((x.rem_euclid(w), y.rem_euclid(h))),
        FillMode::Reflect => Some((reflect(x, w), reflect(y, h))),
    }
}

/// Mirror reflection without edge repetition, period `2 * (n - 1)`.
fn reflect(v: i64, n: i64) -> i64 {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let m = v.rem_euclid(period);
    if m < n {
        m
    } else {
        period - m
    }
}

/// Subtracts the per-channel mean from a CHW image in place.
pub fn mean_center(image_chw: &mut [f32], width: u32, height: u32) {
    let plane = (width * height) as usize;
    for (ch, mean) in IMAGENET_MEAN.iter().enumerate() {
        for v in &mut image_chw[ch * plane..(ch + 1) * plane] {
            *v -= mean;
        }
    }
}
