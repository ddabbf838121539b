//! Input image checks run before a file is submitted.

use std::io::Cursor;
use std::path::Path;

use crate::error::CoreError;

/// MIME types the edit workflow accepts.
pub const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Maximum upload size in bytes (10 MiB).
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Guess the MIME type from a file extension.
///
/// Only extensions of [`SUPPORTED_IMAGE_TYPES`] are recognised.
pub fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

/// Reject unsupported formats and oversized files.
pub fn validate_image_file(mime_type: &str, size: usize) -> Result<(), CoreError> {
    if !SUPPORTED_IMAGE_TYPES.contains(&mime_type) {
        return Err(CoreError::Validation(format!(
            "Unsupported image type '{mime_type}'. Must be one of: {}",
            SUPPORTED_IMAGE_TYPES.join(", ")
        )));
    }
    if size == 0 {
        return Err(CoreError::Validation("Image file is empty".to_string()));
    }
    if size > MAX_IMAGE_SIZE {
        return Err(CoreError::Validation(format!(
            "Image is {size} bytes, the limit is {MAX_IMAGE_SIZE} bytes (10 MB)"
        )));
    }
    Ok(())
}

/// Read `(width, height)` from the image header without decoding pixels.
///
/// Returns `None` when the format cannot be recognised.
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ::image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
