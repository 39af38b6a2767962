use anyhow::{Context, Result};
use fast_image_resize::images::Image;
use fast_image_resize::{PixelType, ResizeAlg, ResizeOptions, Resizer as FirResizer};
use gw_core::frame::PixelBuffer;

/// Dimensions de la grille de glyphes pour une source `width × height`.
///
/// `columns` colonnes, et `max(1, floor(columns * h / w * 0.5))` lignes :
/// le facteur 0.5 compense le ratio hauteur/largeur d'une cellule.
///
/// # Example
/// ```
/// use gw_source::resize::grid_dimensions;
/// assert_eq!(grid_dimensions(100, 50, 100), (100, 25));
/// assert_eq!(grid_dimensions(1000, 1, 10), (10, 1));
/// ```
#[must_use]
pub fn grid_dimensions(width: u32, height: u32, columns: u32) -> (u32, u32) {
    let columns = columns.max(1);
    if width == 0 {
        return (columns, 1);
    }
    let rows = (f64::from(columns) * f64::from(height) / f64::from(width) * 0.5).floor();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rows = rows as u32;
    (columns, rows.max(1))
}

/// Resizer réutilisable wrappant `fast_image_resize`, en plus proche voisin.
///
/// Le canal alpha est recopié tel quel, sans prémultiplication.
///
/// # Example
/// ```
/// use gw_source::resize::Resizer;
/// use gw_core::frame::PixelBuffer;
/// let mut r = Resizer::new();
/// let out = r.resize(&PixelBuffer::new(8, 8), 4, 2).unwrap();
/// assert_eq!((out.width(), out.height()), (4, 2));
/// ```
pub struct Resizer {
    inner: FirResizer,
    options: ResizeOptions,
    /// Copie de la source : l'API exige `&mut` sur l'image d'entrée.
    src_buf: Vec<u8>,
}

impl Resizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: FirResizer::new(),
            options: ResizeOptions::new()
                .resize_alg(ResizeAlg::Nearest)
                .use_alpha(false),
            src_buf: Vec::new(),
        }
    }

    /// Redimensionne `src` en `width × height`.
    ///
    /// # Errors
    /// Returns an error if either dimension is zero or the resize fails.
    pub fn resize(&mut self, src: &PixelBuffer, width: u32, height: u32) -> Result<PixelBuffer> {
        if src.width() == width && src.height() == height {
            return Ok(src.clone());
        }
        anyhow::ensure!(
            src.width() > 0 && src.height() > 0 && width > 0 && height > 0,
            "Dimensions invalides : {}x{} -> {width}x{height}",
            src.width(),
            src.height()
        );

        self.src_buf.clear();
        self.src_buf.extend_from_slice(src.data());
        let src_image =
            Image::from_slice_u8(src.width(), src.height(), &mut self.src_buf, PixelType::U8x4)
                .context("Invalid source dimensions")?;

        let mut dst = PixelBuffer::new(width, height);
        let mut dst_image = Image::from_slice_u8(width, height, dst.data_mut(), PixelType::U8x4)
            .context("Invalid destination dimensions")?;

        self.inner
            .resize(&src_image, &mut dst_image, Some(&self.options))
            .context("Resize failed")?;

        Ok(dst)
    }

    /// Redimensionne `src` sur la grille de `columns` colonnes.
    ///
    /// # Errors
    /// Returns an error if the source is empty or the resize fails.
    pub fn resize_to_grid(&mut self, src: &PixelBuffer, columns: u32) -> Result<PixelBuffer> {
        let (w, h) = grid_dimensions(src.width(), src.height(), columns);
        self.resize(src, w, h)
    }
}

impl Default for Resizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_keeps_half_aspect() {
        assert_eq!(grid_dimensions(640, 480, 80), (80, 30));
        assert_eq!(grid_dimensions(10, 10, 0), (1, 1));
        assert_eq!(grid_dimensions(0, 10, 5), (5, 1));
    }

    #[test]
    fn solid_colour_survives_downscale() {
        let src = PixelBuffer::filled(40, 20, [12, 34, 56, 78]);
        let out = Resizer::new().resize_to_grid(&src, 10).unwrap();
        assert_eq!((out.width(), out.height()), (10, 2));
        assert!(out.data().chunks_exact(4).all(|p| p == [12, 34, 56, 78]));
    }

    #[test]
    fn zero_target_is_rejected() {
        let src = PixelBuffer::filled(4, 4, [0, 0, 0, 255]);
        assert!(Resizer::new().resize(&src, 0, 3).is_err());
    }
}
