//! Error types for the unblend crate.

/// Errors that can occur during watermark detection and removal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to decode an embedded template mask PNG. Fatal at startup:
    /// there is no fallback mask to detect or remove with.
    #[error("failed to decode template mask PNG: {0}")]
    TemplateDecode(image::ImageError),

    /// An embedded template mask decoded to the wrong dimensions.
    #[error("template mask is {width}x{height}, expected {expected}x{expected}")]
    TemplateDimensions {
        /// Expected side length of the square mask.
        expected: u32,
        /// Actual decoded width.
        width: u32,
        /// Actual decoded height.
        height: u32,
    },

    /// A manual placement would put the mask window outside the image.
    #[error(
        "manual placement ({x}, {y}) puts the {size}x{size} mask outside the {width}x{height} image"
    )]
    PlacementOutOfBounds {
        /// Requested top-left x offset.
        x: u32,
        /// Requested top-left y offset.
        y: u32,
        /// Side length of the mask window.
        size: u32,
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let unsupported = Error::UnsupportedFormat("tiff".to_string());
        assert!(unsupported.to_string().contains("tiff"));

        let bad_dims = Error::TemplateDimensions {
            expected: 48,
            width: 10,
            height: 20,
        };
        let msg = bad_dims.to_string();
        assert!(msg.contains("10x20"));
        assert!(msg.contains("48x48"));

        let oob = Error::PlacementOutOfBounds {
            x: 180,
            y: 190,
            size: 48,
            width: 200,
            height: 200,
        };
        let msg = oob.to_string();
        assert!(msg.contains("(180, 190)"));
        assert!(msg.contains("48x48"));
    }
}
