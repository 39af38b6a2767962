//! Encodage GIF89a des frames rasterisées.

use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};

use ::gif::{DisposalMethod, Encoder, Frame, Repeat};
use gw_core::cancel::CancellationToken;
use gw_core::config::ExportSettings;
use gw_core::traits::{Progress, ProgressSink};
use serde::{Deserialize, Serialize};

use crate::error::{CodecContext, CodecError, ExportError};
use crate::quantize::{IndexedFrame, quantize_gif_frames};
use crate::raster::RasterFrames;

/// Au-delà, la quantification multi-thread est jugée instable.
pub const MEMORY_THRESHOLD_MB: f64 = 150.0;
/// Délai minimal d'une frame GIF exportée.
pub const MIN_DELAY_MS: u32 = 20;

/// Paramètres de l'encodeur GIF.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GifOptions {
    /// Budget de couleurs [2, 256].
    pub colors: u16,
    /// Qualité [60, 90].
    pub quality: u8,
    /// Nombre de boucles. ≤ 0 = infini.
    pub repeat: i32,
    /// Réserver un index transparent si une frame en a besoin.
    pub transparent: bool,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self::from(&ExportSettings::default())
    }
}

impl From<&ExportSettings> for GifOptions {
    fn from(s: &ExportSettings) -> Self {
        Self {
            colors: s.gif_colors,
            quality: s.gif_quality,
            repeat: s.repeat,
            transparent: s.transparent_background,
        }
    }
}

/// Boucle GIF pour un nombre de répétitions (≤ 0 = infini).
#[must_use]
pub fn repeat_mode(repeat: i32) -> Repeat {
    if repeat <= 0 {
        Repeat::Infinite
    } else {
        Repeat::Finite(u16::try_from(repeat).unwrap_or(u16::MAX))
    }
}

/// Délai GIF en centisecondes, plancher de 20 ms.
///
/// # Example
/// ```
/// use gw_export::gif::delay_cs;
/// assert_eq!(delay_cs(0), 2);
/// assert_eq!(delay_cs(16), 2);
/// assert_eq!(delay_cs(125), 13);
/// ```
#[must_use]
pub fn delay_cs(delay_ms: u32) -> u16 {
    let cs = (delay_ms.max(MIN_DELAY_MS) + 5) / 10;
    u16::try_from(cs).unwrap_or(u16::MAX)
}

/// Encode `frames` en GIF animé.
///
/// Chaque frame est validée, quantifiée (sur le pool rayon tant que
/// l'estimation mémoire reste sous [`MEMORY_THRESHOLD_MB`]) puis écrite
/// avec disposal `Background`. Une panique du codec est capturée et
/// classée comme les autres erreurs.
///
/// # Errors
/// Returns [`ExportError::Cancelled`] if `cancel` fires between frames,
/// and [`ExportError::Codec`] for validation or encoder failures.
pub fn encode_gif(
    frames: &RasterFrames,
    options: &GifOptions,
    progress: &mut dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ExportError> {
    let quality = options.quality.clamp(60, 90);
    let context = CodecContext::new("GIF Export", frames.len(), frames.width, frames.height)
        .with_quality(quality);
    log::info!(
        "Export GIF : {} frames {}x{}, qualité {quality}, ~{:.2} MB",
        frames.len(),
        frames.width,
        frames.height,
        frames.estimated_memory_mb()
    );

    if cancel.is_cancelled() {
        return Err(ExportError::Cancelled);
    }
    frames.validate(&context)?;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        encode_validated(frames, options, quality, &context, &mut *progress, cancel)
    }));
    let bytes = match outcome {
        Ok(result) => result?,
        Err(payload) => return Err(CodecError::from_panic(payload.as_ref(), context).into()),
    };

    let total = u32::try_from(frames.len()).unwrap_or(u32::MAX);
    progress.report(Progress::frames(100.0, total, total));
    Ok(bytes)
}

fn encode_validated(
    frames: &RasterFrames,
    options: &GifOptions,
    quality: u8,
    context: &CodecContext,
    progress: &mut dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ExportError> {
    let colors = usize::from(options.colors.clamp(2, 256));
    let parallel = frames.estimated_memory_mb() <= MEMORY_THRESHOLD_MB;
    if !parallel {
        log::warn!("Mémoire estimée élevée, quantification mono-thread");
    }

    progress.tick();
    let indexed = quantize_gif_frames(&frames.frames, colors, quality, options.transparent, parallel);
    progress.tick();
    if cancel.is_cancelled() {
        return Err(ExportError::Cancelled);
    }

    let codec = |e: ::gif::EncodingError| CodecError::classify(e.to_string(), context.clone());
    #[allow(clippy::cast_possible_truncation)]
    let (w, h) = (frames.width as u16, frames.height as u16);

    let mut out = Vec::new();
    {
        let mut encoder = Encoder::new(&mut out, w, h, &[]).map_err(codec)?;
        encoder.set_repeat(repeat_mode(options.repeat)).map_err(codec)?;
        for (i, frame) in indexed.iter().enumerate() {
            progress.tick();
            if cancel.is_cancelled() {
                return Err(ExportError::Cancelled);
            }
            encoder
                .write_frame(&gif_frame(frame, w, h, frames.delay(i)))
                .map_err(codec)?;
            if i % 8 == 7 {
                std::thread::yield_now();
            }
        }
    }
    log::info!("GIF encodé : {} octets", out.len());
    Ok(out)
}

fn gif_frame(frame: &IndexedFrame, width: u16, height: u16, delay_ms: u32) -> Frame<'_> {
    Frame {
        width,
        height,
        delay: delay_cs(delay_ms),
        dispose: DisposalMethod::Background,
        transparent: frame.transparent,
        palette: Some(frame.palette.clone()),
        buffer: Cow::Borrowed(&frame.indices),
        ..Frame::default()
    }
}
