//! Template mask repository.
//!
//! Two fixed watermark templates (48x48 and 96x96) ship embedded in the
//! binary. Each is decoded exactly once, at engine construction, into its
//! effective-alpha field plus the Sobel gradient of that field, so detection
//! compares template and target window in the same representation. The loaded
//! set is immutable afterwards and safe for any number of concurrent readers.

use image::RgbaImage;

use crate::detection::sobel_magnitude;
use crate::error::{Error, Result};

/// Embedded 48x48 template (images with either dimension <= 1024).
static TEMPLATE_48_PNG: &[u8] = include_bytes!("../assets/template_48.png");
/// Embedded 96x96 template (images with both dimensions > 1024).
static TEMPLATE_96_PNG: &[u8] = include_bytes!("../assets/template_96.png");

/// Alpha channel above this fraction of full opacity means the mask was
/// authored as opaque grayscale; the red channel then carries the alpha
/// signal instead.
const SATURATED_ALPHA: f64 = 0.99;

/// A decoded watermark template: per-pixel blend strength and its gradient.
#[derive(Debug, Clone)]
pub struct TemplateMask {
    width: u32,
    height: u32,
    /// Effective alpha per pixel, scaled to 0-255 (the luminance range).
    effective_alpha: Vec<f64>,
    /// Sobel magnitude of `effective_alpha`.
    alpha_gradient: Vec<f64>,
}

impl TemplateMask {
    /// Build a mask from a decoded RGBA image.
    ///
    /// Per pixel, the effective alpha is the native alpha channel unless that
    /// channel is saturated (> 0.99), in which case the red channel is
    /// reinterpreted as the alpha signal. The result is scaled to 0-255.
    #[must_use]
    pub fn from_image(img: &RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let mut effective_alpha = Vec::with_capacity((width * height) as usize);
        for px in img.pixels() {
            let mut a = f64::from(px[3]) / 255.0;
            if a > SATURATED_ALPHA {
                a = f64::from(px[0]) / 255.0;
            }
            effective_alpha.push(a * 255.0);
        }
        let alpha_gradient = sobel_magnitude(&effective_alpha, width as usize, height as usize);
        Self {
            width,
            height,
            effective_alpha,
            alpha_gradient,
        }
    }

    fn decode(png_bytes: &[u8], expected: u32) -> Result<Self> {
        let img = image::load_from_memory(png_bytes)
            .map_err(Error::TemplateDecode)?
            .to_rgba8();
        let (width, height) = img.dimensions();
        if width != expected || height != expected {
            return Err(Error::TemplateDimensions {
                expected,
                width,
                height,
            });
        }
        Ok(Self::from_image(&img))
    }

    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Effective alpha field on the 0-255 scale, row-major.
    #[must_use]
    pub fn effective_alpha(&self) -> &[f64] {
        &self.effective_alpha
    }

    /// Sobel magnitude of the effective alpha field, row-major.
    #[must_use]
    pub fn alpha_gradient(&self) -> &[f64] {
        &self.alpha_gradient
    }

    /// Blend strength of one mask pixel, in [0, 1].
    #[must_use]
    pub fn blend_alpha(&self, x: u32, y: u32) -> f64 {
        self.effective_alpha[(y * self.width + x) as usize] / 255.0
    }
}

/// The immutable pair of templates the engine detects and removes with.
#[derive(Debug, Clone)]
pub struct MaskSet {
    small: TemplateMask,
    large: TemplateMask,
}

impl MaskSet {
    /// Decode both embedded templates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateDecode`] or [`Error::TemplateDimensions`] if
    /// either embedded PNG is unusable. This is fatal for the hosting
    /// process: without the templates nothing can be detected or removed.
    pub fn load() -> Result<Self> {
        Ok(Self {
            small: TemplateMask::decode(TEMPLATE_48_PNG, 48)?,
            large: TemplateMask::decode(TEMPLATE_96_PNG, 96)?,
        })
    }

    /// The 48x48 template.
    #[must_use]
    pub fn small(&self) -> &TemplateMask {
        &self.small
    }

    /// The 96x96 template.
    #[must_use]
    pub fn large(&self) -> &TemplateMask {
        &self.large
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn embedded_masks_load_with_expected_dimensions() {
        let set = MaskSet::load().unwrap();
        assert_eq!(set.small().width(), 48);
        assert_eq!(set.small().height(), 48);
        assert_eq!(set.small().effective_alpha().len(), 48 * 48);
        assert_eq!(set.small().alpha_gradient().len(), 48 * 48);
        assert_eq!(set.large().width(), 96);
        assert_eq!(set.large().height(), 96);
        assert_eq!(set.large().effective_alpha().len(), 96 * 96);
    }

    #[test]
    fn effective_alpha_stays_in_byte_range() {
        let set = MaskSet::load().unwrap();
        for mask in [set.small(), set.large()] {
            assert!(mask
                .effective_alpha()
                .iter()
                .all(|&a| (0.0..=255.0).contains(&a)));
        }
    }

    #[test]
    fn embedded_masks_carry_usable_texture() {
        // detection needs non-degenerate variance and edges in both templates
        let set = MaskSet::load().unwrap();
        for mask in [set.small(), set.large()] {
            let alpha = mask.effective_alpha();
            assert!(alpha.iter().any(|&a| a > 25.0));
            assert!(alpha.iter().any(|&a| a < 5.0));
            assert!(mask.alpha_gradient().iter().any(|&g| g > 0.0));
        }
    }

    #[test]
    fn native_alpha_channel_is_used_when_not_saturated() {
        let mut img = RgbaImage::new(4, 4);
        for (i, px) in img.pixels_mut().enumerate() {
            *px = Rgba([200, 200, 200, u8::try_from(i * 16).unwrap()]);
        }
        let mask = TemplateMask::from_image(&img);
        assert!((mask.effective_alpha()[0] - 0.0).abs() < 1e-9);
        assert!((mask.effective_alpha()[5] - 80.0).abs() < 1e-9);
        assert!((mask.blend_alpha(1, 1) - 80.0 / 255.0).abs() < 1e-9);
    }

    #[test]
    fn saturated_alpha_falls_back_to_red_channel() {
        // opaque grayscale authoring: alpha 255 everywhere, signal in red
        let mut img = RgbaImage::new(4, 4);
        for (i, px) in img.pixels_mut().enumerate() {
            let r = u8::try_from(i * 16).unwrap();
            *px = Rgba([r, 0, 0, 255]);
        }
        let mask = TemplateMask::from_image(&img);
        assert!((mask.effective_alpha()[3] - 48.0).abs() < 1e-9);
        assert!((mask.effective_alpha()[15] - 240.0).abs() < 1e-9);
    }

    #[test]
    fn alpha_gradient_matches_sobel_of_alpha_field() {
        let set = MaskSet::load().unwrap();
        let mask = set.small();
        let recomputed = sobel_magnitude(mask.effective_alpha(), 48, 48);
        assert_eq!(mask.alpha_gradient(), recomputed.as_slice());
    }
}
