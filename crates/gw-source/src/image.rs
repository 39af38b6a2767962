use std::path::Path;

use anyhow::{Context, Result};
use gw_core::frame::PixelBuffer;
use image::RgbaImage;

use crate::error::SourceError;

/// Convertit une image décodée en [`PixelBuffer`].
///
/// # Errors
/// Returns an error if the buffer length disagrees with its dimensions.
pub fn from_rgba_image(img: RgbaImage) -> Result<PixelBuffer, SourceError> {
    let (w, h) = img.dimensions();
    Ok(PixelBuffer::from_raw(w, h, img.into_raw())?)
}

/// Décode une image fixe (première frame pour les formats animés).
///
/// # Errors
/// Returns [`SourceError::Decode`] if the bytes are not a supported image.
///
/// # Example
/// ```
/// use gw_source::image::decode_image;
/// assert!(decode_image(b"not an image").is_err());
/// ```
pub fn decode_image(bytes: &[u8]) -> Result<PixelBuffer, SourceError> {
    let img = image::load_from_memory(bytes)?;
    from_rgba_image(img.to_rgba8())
}

/// Charge une image depuis le disque.
///
/// # Errors
/// Returns an error if the file cannot be read or decoded.
///
/// # Example
/// ```no_run
/// use gw_source::image::load_image;
/// let buf = load_image(std::path::Path::new("test.png")).unwrap();
/// ```
pub fn load_image(path: &Path) -> Result<PixelBuffer> {
    let img = image::open(path)
        .with_context(|| format!("Impossible de charger {}", path.display()))?;
    from_rgba_image(img.to_rgba8())
        .with_context(|| format!("Image invalide : {}", path.display()))
}
