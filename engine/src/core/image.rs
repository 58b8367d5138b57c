use crate::error::{EngineError, Result};
use image::{ImageReader, RgbaImage};
use std::path::Path;

/// File extensions the bundled decoder can turn into pixels.
///
/// HEIC/HEIF is not among them; those files are fingerprinted on the device
/// that captured them.
pub const DECODABLE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp",
];

pub fn is_decodable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| DECODABLE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode an image file into RGBA pixels. The caller owns the result and
/// lends it to `PixelBuffer::from_rgba`.
pub fn load_rgba(path: &Path) -> Result<RgbaImage> {
    if !is_decodable(path) {
        return Err(EngineError::invalid_image(format!(
            "unsupported file type: {}",
            path.display()
        )));
    }

    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    log::debug!(
        "decoded {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(image.into_rgba8())
}
