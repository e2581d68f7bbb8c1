//! Watermark detection over a candidate placement.
//!
//! Confidence comes from a fixed-weight ensemble of three signals:
//! 1. **Luminance NCC** (50%): normalized cross-correlation between the window
//!    luminance and the template's effective-alpha field
//! 2. **Gradient NCC** (30%): edge signature matching via Sobel magnitudes
//! 3. **Local statistics** (20%): penalties for near-flat and near-white windows
//!
//! If the luminance correlation is already hopeless the gradient and
//! statistics stages are never computed.

use image::RgbaImage;
use log::debug;

/// Ensemble weight: luminance NCC.
const LUMINANCE_WEIGHT: f64 = 0.5;
/// Ensemble weight: gradient NCC.
const GRADIENT_WEIGHT: f64 = 0.3;
/// Ensemble weight: local statistics.
const STATS_WEIGHT: f64 = 0.2;
/// Early exit: luminance NCC below this skips the remaining stages.
const EARLY_EXIT_NCC: f64 = 0.15;
/// Windows with luminance variance below this are penalized as near-flat.
const MIN_VARIANCE: f64 = 50.0;
/// Windows with mean luminance above this are penalized as near-white.
const BRIGHT_MEAN: f64 = 240.0;
/// Slope of the near-white penalty: score reaches 0 at mean 255.
const BRIGHT_FALLOFF: f64 = 15.0;

/// Outcome of a detection pass at one placement.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Confidence on the 0-100 scale. On the early-exit path this is the raw
    /// luminance NCC times 100 and may be negative; the ensemble path clamps
    /// to [0, 100].
    pub confidence: f64,
    /// Luminance NCC against the template's effective alpha.
    pub luminance_score: f64,
    /// Gradient NCC against the template's alpha gradient (0 on early exit).
    pub gradient_score: f64,
    /// Local statistics score in [0, 1] (0 on early exit).
    pub stats_score: f64,
    /// Whether the luminance stage short-circuited the ensemble.
    pub early_exit: bool,
}

/// Extract the luminance field of a `w`x`h` window anchored at `(x, y)`.
///
/// Luminance is `0.299*R + 0.587*G + 0.114*B` over 0-255 channel values,
/// emitted in row-major order. The caller must guarantee the window lies
/// fully inside the image; there is no clipping here.
#[must_use]
pub fn extract_luminance(image: &RgbaImage, x: u32, y: u32, w: u32, h: u32) -> Vec<f64> {
    debug_assert!(x + w <= image.width() && y + h <= image.height());
    let mut luma = Vec::with_capacity((w * h) as usize);
    for dy in 0..h {
        for dx in 0..w {
            let px = image.get_pixel(x + dx, y + dy);
            luma.push(0.299 * f64::from(px[0]) + 0.587 * f64::from(px[1]) + 0.114 * f64::from(px[2]));
        }
    }
    luma
}

/// Sobel gradient magnitude of a row-major field.
///
/// Standard 3x3 kernels, interior pixels only. The 3x3 neighborhood is
/// undefined on the first and last row and column, so the border stays 0.
#[must_use]
pub fn sobel_magnitude(field: &[f64], width: usize, height: usize) -> Vec<f64> {
    let mut grad = vec![0.0_f64; field.len()];
    if width < 3 || height < 3 {
        return grad;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let i = y * width + x;
            let gx = (field[i - width + 1] + 2.0 * field[i + 1] + field[i + width + 1])
                - (field[i - width - 1] + 2.0 * field[i - 1] + field[i + width - 1]);
            let gy = (field[i + width - 1] + 2.0 * field[i + width] + field[i + width + 1])
                - (field[i - width - 1] + 2.0 * field[i - width] + field[i - width + 1]);
            grad[i] = gx.hypot(gy);
        }
    }

    grad
}

/// Pearson-style normalized cross-correlation of two equal-length slices.
///
/// Returns 0 for mismatched lengths and for degenerate constant inputs
/// (zero variance); both are "no correlation" data outcomes, not errors.
/// The result is nominally in [-1, 1] and is not clamped.
#[must_use]
pub fn ncc(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = a.len() as f64;

    let (mut sum_a, mut sum_b, mut sum_aa, mut sum_bb, mut sum_ab) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (&va, &vb) in a.iter().zip(b) {
        sum_a += va;
        sum_b += vb;
        sum_aa += va * va;
        sum_bb += vb * vb;
        sum_ab += va * vb;
    }

    let numerator = sum_ab - sum_a * sum_b / n;
    let denominator = ((sum_aa - sum_a * sum_a / n) * (sum_bb - sum_b * sum_b / n)).sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Score the window's first and second luminance moments.
///
/// Near-flat windows (variance < 50) and near-white windows (mean > 240) get
/// scaled down: a real watermark imprints texture, and on a blown-out white
/// region a white overlay is invisible and correlation is unreliable.
fn local_stats_score(luma: &[f64]) -> f64 {
    if luma.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = luma.len() as f64;

    let (mut sum, mut sum_sq) = (0.0, 0.0);
    for &v in luma {
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / n;
    let variance = sum_sq / n - mean * mean;

    let variance_score = if variance < MIN_VARIANCE {
        variance / MIN_VARIANCE
    } else {
        1.0
    };
    let mean_score = if mean > BRIGHT_MEAN {
        ((255.0 - mean) / BRIGHT_FALLOFF).max(0.0)
    } else {
        1.0
    };
    variance_score * mean_score
}

/// Detect the watermark at a given placement.
///
/// `template_alpha` and `template_gradient` are the mask's effective-alpha
/// field (0-255 scale) and its Sobel magnitude, both of length `w * h`.
/// The caller must guarantee the window lies fully inside the image.
#[must_use]
pub fn detect_watermark(
    image: &RgbaImage,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    template_alpha: &[f64],
    template_gradient: &[f64],
) -> Detection {
    let luma = extract_luminance(image, x, y, w, h);

    let s1 = ncc(&luma, template_alpha);
    if s1 < EARLY_EXIT_NCC {
        debug!("luminance NCC {s1:.3} below {EARLY_EXIT_NCC}, skipping remaining stages");
        return Detection {
            confidence: s1 * 100.0,
            luminance_score: s1,
            gradient_score: 0.0,
            stats_score: 0.0,
            early_exit: true,
        };
    }

    let grad = sobel_magnitude(&luma, w as usize, h as usize);
    let s2 = ncc(&grad, template_gradient);
    let s3 = local_stats_score(&luma);

    let score =
        (LUMINANCE_WEIGHT * s1 + GRADIENT_WEIGHT * s2 + STATS_WEIGHT * s3).clamp(0.0, 1.0);
    debug!("detection at ({x}, {y}): luminance={s1:.3} gradient={s2:.3} stats={s3:.3}");

    Detection {
        confidence: score * 100.0,
        luminance_score: s1,
        gradient_score: s2,
        stats_score: s3,
        early_exit: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn ncc_of_a_signal_with_itself_is_one() {
        let a = vec![12.0, 130.0, 7.0, 220.0, 64.0, 99.0];
        let score = ncc(&a, &a);
        assert!((score - 1.0).abs() < 1e-12, "expected ~1.0, got {score}");
    }

    #[test]
    fn ncc_is_symmetric() {
        let a = vec![3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        let b = vec![2.0, 7.0, 1.0, 8.0, 2.0, 8.0, 1.0, 8.0];
        assert!((ncc(&a, &b) - ncc(&b, &a)).abs() < 1e-12);
    }

    #[test]
    fn ncc_of_inverted_signal_is_negative_one() {
        let a = vec![10.0, 50.0, 90.0, 30.0, 70.0];
        let b: Vec<f64> = a.iter().map(|v| 255.0 - v).collect();
        let score = ncc(&a, &b);
        assert!((score + 1.0).abs() < 1e-12, "expected ~-1.0, got {score}");
    }

    #[test]
    fn ncc_of_mismatched_lengths_is_exactly_zero() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 2.0];
        assert_eq!(ncc(&a, &b), 0.0);
        assert_eq!(ncc(&[], &a), 0.0);
    }

    #[test]
    fn ncc_of_constant_field_is_zero() {
        let constant = vec![42.0; 64];
        let varying: Vec<f64> = (0..64).map(f64::from).collect();
        assert_eq!(ncc(&constant, &varying), 0.0);
        assert_eq!(ncc(&varying, &constant), 0.0);
        assert_eq!(ncc(&constant, &constant), 0.0);
    }

    #[test]
    fn sobel_border_is_zero_for_any_interior_content() {
        let mut field = vec![0.0_f64; 12 * 9];
        for (i, v) in field.iter_mut().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            {
                *v = ((i * 37) % 251) as f64;
            }
        }
        let grad = sobel_magnitude(&field, 12, 9);
        for x in 0..12 {
            assert_eq!(grad[x], 0.0);
            assert_eq!(grad[8 * 12 + x], 0.0);
        }
        for y in 0..9 {
            assert_eq!(grad[y * 12], 0.0);
            assert_eq!(grad[y * 12 + 11], 0.0);
        }
    }

    #[test]
    fn sobel_is_zero_on_flat_field() {
        let field = vec![128.0_f64; 10 * 10];
        let grad = sobel_magnitude(&field, 10, 10);
        assert!(grad.iter().all(|&g| g.abs() < 1e-12));
    }

    #[test]
    fn sobel_responds_to_vertical_edge() {
        let mut field = vec![0.0_f64; 10 * 10];
        for y in 0..10 {
            for x in 5..10 {
                field[y * 10 + x] = 255.0;
            }
        }
        let grad = sobel_magnitude(&field, 10, 10);
        assert!(grad[5 * 10 + 5] > 100.0);
    }

    #[test]
    fn luminance_uses_rec601_weights() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 255, 0, 7]));
        let luma = extract_luminance(&img, 0, 0, 2, 1);
        assert!((luma[0] - 0.299 * 255.0).abs() < 1e-9);
        // image alpha plays no part in luminance
        assert!((luma[1] - 0.587 * 255.0).abs() < 1e-9);
    }

    #[test]
    fn stats_score_penalizes_flat_window() {
        let flat = vec![100.0; 48 * 48];
        assert_eq!(local_stats_score(&flat), 0.0);
    }

    #[test]
    fn stats_score_penalizes_near_white_window() {
        // alternate 245/255: mean 250, variance 25
        let luma: Vec<f64> = (0..48 * 48)
            .map(|i| if i % 2 == 0 { 245.0 } else { 255.0 })
            .collect();
        let score = local_stats_score(&luma);
        let expected = (25.0 / 50.0) * (5.0 / 15.0);
        assert!((score - expected).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn stats_score_is_one_for_textured_midtone_window() {
        let luma: Vec<f64> = (0..48 * 48).map(|i| f64::from(i % 128) + 32.0).collect();
        assert!((local_stats_score(&luma) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn early_exit_on_flat_window_reports_zero_confidence() {
        let img = RgbaImage::new(64, 64); // all black
        let template: Vec<f64> = (0..48 * 48).map(|i| f64::from(i % 97)).collect();
        let gradient = sobel_magnitude(&template, 48, 48);
        let det = detect_watermark(&img, 8, 8, 48, 48, &template, &gradient);
        assert!(det.early_exit);
        assert_eq!(det.confidence, 0.0);
        assert_eq!(det.gradient_score, 0.0);
        assert_eq!(det.stats_score, 0.0);
    }

    #[test]
    fn early_exit_confidence_can_be_negative() {
        // window luminance ramps left to right, template ramps the other way
        let mut img = RgbaImage::new(16, 16);
        for y in 0..16 {
            for x in 0..16 {
                let v = u8::try_from(x * 16).unwrap();
                img.put_pixel(x, y, Rgba([v, v, v, 255]));
            }
        }
        let template: Vec<f64> = (0..16 * 16).map(|i| f64::from(15 - (i % 16)) * 16.0).collect();
        let gradient = sobel_magnitude(&template, 16, 16);
        let det = detect_watermark(&img, 0, 0, 16, 16, &template, &gradient);
        assert!(det.early_exit);
        assert!(det.confidence < -50.0, "got {}", det.confidence);
    }

    #[test]
    fn matching_window_scores_high_and_in_range() {
        // paint the template pattern directly into the image
        let template: Vec<f64> = (0..48 * 48)
            .map(|i| f64::from((i % 48) * 4) / 2.0 + f64::from(i / 48))
            .collect();
        let mut img = RgbaImage::new(48, 48);
        for y in 0..48u32 {
            for x in 0..48u32 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let v = template[(y * 48 + x) as usize].round() as u8;
                img.put_pixel(x, y, Rgba([v, v, v, 255]));
            }
        }
        let gradient = sobel_magnitude(&template, 48, 48);
        let det = detect_watermark(&img, 0, 0, 48, 48, &template, &gradient);
        assert!(!det.early_exit);
        assert!(det.confidence > 60.0, "got {}", det.confidence);
        assert!(det.confidence <= 100.0);
    }
}
