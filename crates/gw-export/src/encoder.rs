use std::path::Path;

use anyhow::{Context, Result};
use gw_core::cancel::CancellationToken;
use gw_core::config::ExportSettings;
use gw_core::frame::AsciiFrame;
use gw_core::traits::ProgressSink;

use crate::apng::{ApngOptions, encode_apng};
use crate::error::{CodecError, ExportError};
use crate::gif::{GifOptions, encode_gif};
use crate::raster::RasterFrames;
use crate::rasterizer::{RasterOptions, Rasterizer};

/// Chaîne d'export raster : frames ASCII → pixels → GIF ou APNG.
///
/// # Example
/// ```
/// use gw_core::cancel::CancellationToken;
/// use gw_core::config::ExportSettings;
/// use gw_core::frame::AsciiFrame;
/// use gw_core::traits::NoProgress;
/// use gw_export::RasterEncoder;
///
/// let encoder = RasterEncoder::new(&ExportSettings::default(), 50).unwrap();
/// let ascii = "<span style=\"color: rgb(0, 255, 0)\">@</span>\n".to_string();
/// let gif = encoder
///     .encode_gif(&[AsciiFrame::new(ascii, 100)], &mut NoProgress, &CancellationToken::new())
///     .unwrap();
/// assert_eq!(&gif[..6], b"GIF89a");
/// ```
pub struct RasterEncoder {
    settings: ExportSettings,
    rasterizer: Rasterizer,
}

impl RasterEncoder {
    /// Construit l'encodeur ; charge la police de `settings.font_path`
    /// si elle est renseignée.
    ///
    /// # Errors
    /// Returns an error if the font file cannot be read or parsed.
    pub fn new(settings: &ExportSettings, cache_capacity: usize) -> Result<Self> {
        let options = RasterOptions::from_settings(settings);
        let rasterizer = match &settings.font_path {
            Some(path) => load_font(path, options, cache_capacity)?,
            None => Rasterizer::with_cache(options, cache_capacity),
        };
        Ok(Self {
            settings: settings.clone(),
            rasterizer,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    #[must_use]
    pub fn rasterizer(&self) -> &Rasterizer {
        &self.rasterizer
    }

    #[must_use]
    pub fn gif_options(&self) -> GifOptions {
        GifOptions::from(&self.settings)
    }

    #[must_use]
    pub fn apng_options(&self) -> ApngOptions {
        ApngOptions::from(&self.settings)
    }

    /// Rasterise les frames sur un canevas commun.
    ///
    /// # Errors
    /// Returns a validation [`CodecError`] when no frame has any glyph.
    pub fn rasterize(&self, frames: &[AsciiFrame]) -> Result<RasterFrames, CodecError> {
        self.rasterizer.render_frames(frames)
    }

    /// Rasterise puis encode en GIF.
    ///
    /// # Errors
    /// See [`encode_gif`].
    pub fn encode_gif(
        &self,
        frames: &[AsciiFrame],
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ExportError> {
        let raster = self.rasterize(frames)?;
        encode_gif(&raster, &self.gif_options(), progress, cancel)
    }

    /// Rasterise puis encode en APNG.
    ///
    /// # Errors
    /// See [`encode_apng`].
    pub fn encode_apng(
        &self,
        frames: &[AsciiFrame],
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ExportError> {
        let raster = self.rasterize(frames)?;
        encode_apng(&raster, &self.apng_options(), progress, cancel)
    }

    /// Vide le cache de parsing (pression mémoire).
    pub fn clear_cache(&self) {
        self.rasterizer.clear_cache();
    }
}

fn load_font(path: &Path, options: RasterOptions, capacity: usize) -> Result<Rasterizer> {
    let data = std::fs::read(path)
        .with_context(|| format!("Impossible de lire la police {}", path.display()))?;
    Rasterizer::with_font(options, &data, capacity)
        .with_context(|| format!("Police invalide : {}", path.display()))
}
