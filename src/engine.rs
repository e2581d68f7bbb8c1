//! Orchestration: template selection, placement resolution, and the
//! detect-then-invert pipeline over in-memory images, files and directories.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbaImage};
use log::debug;

use crate::blending;
use crate::detection;
use crate::error::{Error, Result};
use crate::masks::{MaskSet, TemplateMask};

/// Default confidence threshold on the 0-100 scale.
pub const DEFAULT_THRESHOLD: f64 = 25.0;

/// Template size class, chosen from the image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateSize {
    /// 48x48 template, 32px inset (images where either dimension <= 1024).
    Small,
    /// 96x96 template, 64px inset (images where both dimensions > 1024).
    Large,
}

impl TemplateSize {
    /// Pick the size class for an image: large iff both dimensions exceed
    /// 1024px.
    #[must_use]
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        if width > 1024 && height > 1024 {
            Self::Large
        } else {
            Self::Small
        }
    }

    /// Side length of the square template in pixels.
    #[must_use]
    pub fn side(self) -> u32 {
        match self {
            Self::Small => 48,
            Self::Large => 96,
        }
    }

    /// Bottom-right inset used by the automatic placement heuristic.
    #[must_use]
    pub fn margin(self) -> u32 {
        match self {
            Self::Small => 32,
            Self::Large => 64,
        }
    }
}

/// Resolved watermark box inside the target image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Top-left x offset.
    pub x: u32,
    /// Top-left y offset.
    pub y: u32,
    /// Box width (always a template side length).
    pub width: u32,
    /// Box height (always a template side length).
    pub height: u32,
}

/// What the pipeline did with an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The blend was inverted in place.
    Removed,
    /// Detect-only mode found the watermark above the threshold.
    Detected,
    /// Confidence fell below the threshold; the image was left untouched.
    SkippedLowConfidence,
    /// The automatic placement fell outside the image; detection was never
    /// attempted.
    SkippedNoPlacement,
}

impl Status {
    /// Stable machine-readable name, used by report serialization.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Removed => "removed",
            Self::Detected => "detected",
            Self::SkippedLowConfidence => "skipped_low_confidence",
            Self::SkippedNoPlacement => "skipped_no_placement",
        }
    }

    /// Whether this status left the image untouched for lack of a watermark.
    #[must_use]
    pub fn is_skip(self) -> bool {
        matches!(self, Self::SkippedLowConfidence | Self::SkippedNoPlacement)
    }
}

/// Options controlling the processing pipeline.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProcessOptions {
    /// Report detection only; never mutate the image.
    pub detect_only: bool,
    /// Skip detection and remove unconditionally at the automatic placement.
    pub force: bool,
    /// Confidence threshold on the 0-100 scale.
    pub threshold: f64,
    /// Manual `(x, y)` placement override. Trusted: detection is bypassed and
    /// confidence reported as 100.
    pub manual_position: Option<(u32, u32)>,
    /// Force a template size instead of choosing by image dimensions.
    pub force_size: Option<TemplateSize>,
    /// Enable verbose per-file output in the CLI.
    pub verbose: bool,
    /// Suppress non-error output in the CLI.
    pub quiet: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            detect_only: false,
            force: false,
            threshold: DEFAULT_THRESHOLD,
            manual_position: None,
            force_size: None,
            verbose: false,
            quiet: false,
        }
    }
}

/// Outcome of processing one in-memory image.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// What happened.
    pub status: Status,
    /// Confidence on the 0-100 scale. 100 for trusted manual placements,
    /// 0 when no automatic placement existed or detection was forced off.
    pub confidence: f64,
    /// The resolved watermark box. Offsets are 0 when no valid automatic
    /// placement existed.
    pub placement: Placement,
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the input file.
    pub path: PathBuf,
    /// Whether the file was handled without error (skips count as success).
    pub success: bool,
    /// Pipeline outcome, absent when the file could not be loaded or saved.
    pub outcome: Option<Outcome>,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    /// Whether the image was left untouched for lack of a watermark.
    #[must_use]
    pub fn skipped(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.status.is_skip())
    }

    /// Reported confidence, 0 when no outcome exists.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.outcome.as_ref().map_or(0.0, |o| o.confidence)
    }
}

/// The watermark engine holding the immutable template masks.
///
/// Create once with [`Engine::new()`] and share by reference across any
/// number of concurrent operations; nothing in it is mutated after
/// construction.
pub struct Engine {
    masks: MaskSet,
}

impl Engine {
    /// Decode the embedded templates and build an engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateDecode`] or [`Error::TemplateDimensions`]
    /// when an embedded template is unusable; the hosting process should
    /// treat that as fatal.
    pub fn new() -> Result<Self> {
        Ok(Self {
            masks: MaskSet::load()?,
        })
    }

    /// The template mask for a size class.
    #[must_use]
    pub fn template(&self, size: TemplateSize) -> &TemplateMask {
        match size {
            TemplateSize::Small => self.masks.small(),
            TemplateSize::Large => self.masks.large(),
        }
    }

    /// Run the full pipeline on an in-memory image.
    ///
    /// Resolves the placement (manual override or bottom-right heuristic),
    /// detects unless the placement is trusted, and inverts the blend in
    /// place when the confidence clears `opts.threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlacementOutOfBounds`] when a manual placement does
    /// not fit the image. Everything else is a data outcome in [`Outcome`].
    pub fn process_image(&self, image: &mut RgbaImage, opts: &ProcessOptions) -> Result<Outcome> {
        let (img_w, img_h) = image.dimensions();
        let size = opts
            .force_size
            .unwrap_or_else(|| TemplateSize::for_dimensions(img_w, img_h));
        let mask = self.template(size);
        let side = size.side();

        if let Some((x, y)) = opts.manual_position {
            let fits = x.checked_add(side).is_some_and(|x2| x2 <= img_w)
                && y.checked_add(side).is_some_and(|y2| y2 <= img_h);
            if !fits {
                return Err(Error::PlacementOutOfBounds {
                    x,
                    y,
                    size: side,
                    width: img_w,
                    height: img_h,
                });
            }
            debug!("manual placement at ({x}, {y}), detection bypassed");
            let placement = Placement {
                x,
                y,
                width: side,
                height: side,
            };
            if opts.detect_only {
                return Ok(Outcome {
                    status: Status::Detected,
                    confidence: 100.0,
                    placement,
                });
            }
            blending::remove_watermark(image, mask, x, y);
            return Ok(Outcome {
                status: Status::Removed,
                confidence: 100.0,
                placement,
            });
        }

        // Bottom-right heuristic. A negative offset means the image cannot
        // hold the template at its inset; detection is not attempted.
        let inset = side + size.margin();
        let (Some(x), Some(y)) = (img_w.checked_sub(inset), img_h.checked_sub(inset)) else {
            debug!("{img_w}x{img_h} image too small for {side}x{side} template, no placement");
            return Ok(Outcome {
                status: Status::SkippedNoPlacement,
                confidence: 0.0,
                placement: Placement {
                    x: 0,
                    y: 0,
                    width: side,
                    height: side,
                },
            });
        };
        let placement = Placement {
            x,
            y,
            width: side,
            height: side,
        };

        if opts.force && !opts.detect_only {
            blending::remove_watermark(image, mask, x, y);
            return Ok(Outcome {
                status: Status::Removed,
                confidence: 0.0,
                placement,
            });
        }

        let detection = detection::detect_watermark(
            image,
            x,
            y,
            side,
            side,
            mask.effective_alpha(),
            mask.alpha_gradient(),
        );
        let confidence = detection.confidence;

        if confidence < opts.threshold {
            return Ok(Outcome {
                status: Status::SkippedLowConfidence,
                confidence,
                placement,
            });
        }
        if opts.detect_only {
            return Ok(Outcome {
                status: Status::Detected,
                confidence,
                placement,
            });
        }

        blending::remove_watermark(image, mask, x, y);
        Ok(Outcome {
            status: Status::Removed,
            confidence,
            placement,
        })
    }

    /// Process a single image file: load, run the pipeline, save.
    ///
    /// In detect-only mode nothing is written; the result only reports.
    #[must_use]
    pub fn process_file(&self, input: &Path, output: &Path, opts: &ProcessOptions) -> ProcessResult {
        let mut result = ProcessResult {
            path: input.to_path_buf(),
            success: false,
            outcome: None,
            message: String::new(),
        };

        let dyn_img = match image::open(input) {
            Ok(img) => img,
            Err(e) => {
                result.message = format!("failed to load: {e}");
                return result;
            }
        };
        let mut img = dyn_img.to_rgba8();

        let outcome = match self.process_image(&mut img, opts) {
            Ok(o) => o,
            Err(e) => {
                result.message = e.to_string();
                return result;
            }
        };

        result.message = match outcome.status {
            Status::Removed => "watermark removed".to_string(),
            Status::Detected => {
                format!("watermark detected ({:.0}%)", outcome.confidence)
            }
            Status::SkippedLowConfidence => format!(
                "no watermark detected ({:.0}% < {:.0}%)",
                outcome.confidence, opts.threshold
            ),
            Status::SkippedNoPlacement => format!(
                "image too small ({}x{}) for {}x{} template",
                img.width(),
                img.height(),
                outcome.placement.width,
                outcome.placement.height
            ),
        };

        let modified = outcome.status == Status::Removed;
        result.outcome = Some(outcome);

        if !modified {
            result.success = true;
            return result;
        }

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    result.message = format!("failed to create output directory: {e}");
                    return result;
                }
            }
        }

        match save_image(&img, output) {
            Ok(()) => result.success = true,
            Err(e) => result.message = format!("failed to save: {e}"),
        }
        result
    }

    /// Process all supported images in a directory.
    ///
    /// Uses parallel iteration when the `cli` feature is enabled (via rayon);
    /// the engine is shared read-only across the workers.
    ///
    /// # Panics
    ///
    /// Panics if a directory entry has no filename (not possible for regular
    /// files).
    #[must_use]
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        opts: &ProcessOptions,
    ) -> Vec<ProcessResult> {
        let entries: Vec<_> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .filter(|e| is_supported_image(e.path().as_path()))
                .collect(),
            Err(e) => {
                return vec![ProcessResult {
                    path: input_dir.to_path_buf(),
                    success: false,
                    outcome: None,
                    message: format!("failed to read directory: {e}"),
                }];
            }
        };

        if !output_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(output_dir) {
                return vec![ProcessResult {
                    path: output_dir.to_path_buf(),
                    success: false,
                    outcome: None,
                    message: format!("failed to create output directory: {e}"),
                }];
            }
        }

        let handle_entry = |entry: &std::fs::DirEntry| {
            let input_path = entry.path();
            let filename = input_path.file_name().unwrap();
            let output_path = output_dir.join(filename);
            self.process_file(&input_path, &output_path, opts)
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            entries.par_iter().map(handle_entry).collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            entries.iter().map(handle_entry).collect()
        }
    }
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Save an RGBA image with format-specific handling.
///
/// JPEG cannot carry alpha, so the buffer is flattened to RGB first.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbaImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let file = std::fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            encoder.encode_image(&rgb)?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            img.save(path)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Generate a default output path from an input path.
///
/// Example: `"photo.jpg"` becomes `"photo_cleaned.jpg"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_cleaned.{ext}"))
}
