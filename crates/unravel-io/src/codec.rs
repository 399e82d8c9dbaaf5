//! Lossless image decode and BMP encode.
//!
//! Every image is converted to 8-bit RGB on the way in, and written as a
//! 24-bit BMP on the way out, so byte values survive a round trip.

use std::path::Path;

use image::{ExtendedColorType, ImageFormat};
use unravel_pipeline::PixelBuffer;

use crate::IoError;

/// Decode an image file into an RGB [`PixelBuffer`].
///
/// The format is taken from the file extension. Alpha and extra channels
/// are dropped; grayscale is expanded to RGB.
///
/// # Errors
///
/// Returns [`IoError::Image`] if the file cannot be opened or decoded,
/// or [`IoError::Buffer`] if the decoder's output is not a whole RGB
/// image.
pub fn decode(path: &Path) -> Result<PixelBuffer, IoError> {
    let rgb = image::open(path)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    log::debug!("decoded {} ({width}x{height})", path.display());
    Ok(PixelBuffer::from_raw(width, height, rgb.into_raw())?)
}

/// Encode `image` as a 24-bit BMP at `path`, replacing any existing file.
///
/// # Errors
///
/// Returns [`IoError::Image`] if encoding or writing fails.
pub fn encode(image: &PixelBuffer, path: &Path) -> Result<(), IoError> {
    image::save_buffer_with_format(
        path,
        image.as_bytes(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
        ImageFormat::Bmp,
    )?;
    log::debug!("wrote {}", path.display());
    Ok(())
}
