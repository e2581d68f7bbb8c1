//! Inverting the watermark's alpha blend.
//!
//! The overlay is assumed to have been composited as
//! `watermarked = alpha * overlay + (1 - alpha) * original` with a uniform
//! pure-white overlay. Given the mask's per-pixel alpha the original channel
//! value is recovered algebraically.

use image::RgbaImage;

use crate::masks::TemplateMask;

/// Color the overlay was composited with (pure white on all channels).
pub const OVERLAY_VALUE: f64 = 255.0;
/// Below this blend strength there is nothing to invert.
const MIN_ALPHA: f64 = 0.02;
/// Above this the inversion divides by a near-zero remainder and amplifies
/// quantization noise beyond recovery; those pixels are left untouched.
const MAX_ALPHA: f64 = 0.98;

/// Convert a recovered channel value back to a byte.
///
/// Rounds half away from zero (`f64::round`), then saturates to [0, 255].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel_byte(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Remove the watermark by inverting the blend at `(pos_x, pos_y)`.
///
/// Mutates the R, G and B channels in place; the image's own alpha channel
/// is never touched. Mask pixels with effective alpha outside
/// [0.02, 0.98] are skipped. The caller must guarantee the mask window lies
/// fully inside the image.
pub fn remove_watermark(image: &mut RgbaImage, mask: &TemplateMask, pos_x: u32, pos_y: u32) {
    debug_assert!(
        pos_x + mask.width() <= image.width() && pos_y + mask.height() <= image.height()
    );

    for dy in 0..mask.height() {
        for dx in 0..mask.width() {
            let alpha = mask.blend_alpha(dx, dy);
            if !(MIN_ALPHA..=MAX_ALPHA).contains(&alpha) {
                continue;
            }
            let inv_alpha = 1.0 - alpha;

            let px = image.get_pixel_mut(pos_x + dx, pos_y + dy);
            for ch in 0..3 {
                let observed = f64::from(px[ch]);
                px[ch] = to_channel_byte((observed - OVERLAY_VALUE * alpha) / inv_alpha);
            }
        }
    }
}
