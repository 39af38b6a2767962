//! Encodage APNG des frames rasterisées.

use std::panic::{self, AssertUnwindSafe};

use gw_core::cancel::CancellationToken;
use gw_core::config::ExportSettings;
use gw_core::traits::{Progress, ProgressSink};
use serde::{Deserialize, Serialize};

use crate::error::{CodecContext, CodecError, ExportError};
use crate::quantize::{Palette, sample_factor};
use crate::raster::RasterFrames;

/// Délai minimal d'une frame APNG exportée.
pub const MIN_DELAY_MS: u32 = 16;
/// Part de la progression consacrée à la préparation des frames.
const PREPARE_SHARE: f32 = 85.0;
/// Qualité NeuQuant utilisée pour la palette APNG.
const PALETTE_QUALITY: u8 = 90;
/// Nombre maximal de frames lues pour apprendre la palette commune.
const PALETTE_SAMPLE_FRAMES: usize = 16;

/// Paramètres de l'encodeur APNG.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApngOptions {
    /// 0 = RGBA sans perte, sinon palette de [1, 256] couleurs.
    pub colors: u16,
    /// Nombre de boucles. ≤ 0 = infini.
    pub repeat: i32,
}

impl From<&ExportSettings> for ApngOptions {
    fn from(s: &ExportSettings) -> Self {
        Self {
            colors: s.apng_colors,
            repeat: s.repeat,
        }
    }
}

/// Délai APNG en millisecondes, plancher de 16 ms.
#[must_use]
pub fn frame_delay_ms(delay_ms: u32) -> u16 {
    u16::try_from(delay_ms.max(MIN_DELAY_MS)).unwrap_or(u16::MAX)
}

/// Encode `frames` en APNG (PNG simple pour une frame unique).
///
/// Avancement : 0, puis un point par tranche d'environ un dixième des
/// frames jusqu'à 85, puis 85 une fois la préparation finie et 100 à la
/// fin de l'encodage.
///
/// # Errors
/// Returns [`ExportError::Cancelled`] if `cancel` fires between chunks,
/// and [`ExportError::Codec`] for validation or encoder failures.
pub fn encode_apng(
    frames: &RasterFrames,
    options: &ApngOptions,
    progress: &mut dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ExportError> {
    let context = CodecContext::new("APNG Export", frames.len(), frames.width, frames.height);
    if cancel.is_cancelled() {
        return Err(ExportError::Cancelled);
    }
    frames.validate(&context)?;

    let total = u32::try_from(frames.len()).unwrap_or(u32::MAX);
    progress.report(Progress::frames(0.0, 0, total));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        encode_validated(frames, options, &context, &mut *progress, cancel)
    }));
    let bytes = match outcome {
        Ok(result) => result?,
        Err(payload) => return Err(CodecError::from_panic(payload.as_ref(), context).into()),
    };

    progress.report(Progress::frames(100.0, total, total));
    Ok(bytes)
}

/// Frames prêtes à écrire : RGBA brut ou indices dans une palette commune.
enum Prepared {
    Rgba,
    Indexed { palette: Palette, frames: Vec<Vec<u8>> },
}

fn encode_validated(
    frames: &RasterFrames,
    options: &ApngOptions,
    context: &CodecContext,
    progress: &mut dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ExportError> {
    let n = frames.len();
    let total = u32::try_from(n).unwrap_or(u32::MAX);
    let colors = usize::from(options.colors.min(256));

    let palette = (colors > 0).then(|| {
        Palette::build(&palette_sample(frames), colors, sample_factor(PALETTE_QUALITY))
    });

    let chunk = (n / 10).max(1);
    let mut indexed = Vec::with_capacity(if palette.is_some() { n } else { 0 });
    for start in (0..n).step_by(chunk) {
        progress.tick();
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        #[allow(clippy::cast_precision_loss)]
        let percent = (start as f32 / n as f32 * PREPARE_SHARE).min(PREPARE_SHARE);
        progress.report(Progress::frames(
            percent,
            u32::try_from(start).unwrap_or(total),
            total,
        ));
        if let Some(palette) = &palette {
            let end = (start + chunk).min(n);
            indexed.extend(frames.frames[start..end].iter().map(|f| palette.map(f)));
        }
        std::thread::yield_now();
    }
    progress.tick();
    if cancel.is_cancelled() {
        return Err(ExportError::Cancelled);
    }
    progress.report(Progress::frames(PREPARE_SHARE, total, total));

    let prepared = match palette {
        Some(palette) => Prepared::Indexed {
            palette,
            frames: indexed,
        },
        None => Prepared::Rgba,
    };
    write_png(frames, &prepared, options.repeat)
        .map_err(|e| CodecError::classify(e.to_string(), context.clone()).into())
}

/// Pixels d'au plus [`PALETTE_SAMPLE_FRAMES`] frames réparties sur toute
/// l'animation, première frame comprise. Les couleurs absentes de
/// l'échantillon sont rabattues sur l'entrée la plus proche.
fn palette_sample(frames: &RasterFrames) -> Vec<u8> {
    let stride = frames.len().div_ceil(PALETTE_SAMPLE_FRAMES).max(1);
    let picked = frames.len().div_ceil(stride);
    let mut sample = Vec::with_capacity(frames.frame_len() * picked);
    for frame in frames.frames.iter().step_by(stride) {
        sample.extend_from_slice(frame);
    }
    sample
}

fn write_png(
    frames: &RasterFrames,
    prepared: &Prepared,
    repeat: i32,
) -> Result<Vec<u8>, png::EncodingError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, frames.width, frames.height);
        encoder.set_depth(png::BitDepth::Eight);
        match prepared {
            Prepared::Rgba => encoder.set_color(png::ColorType::Rgba),
            Prepared::Indexed { palette, .. } => {
                encoder.set_color(png::ColorType::Indexed);
                encoder.set_palette(palette.rgb());
                encoder.set_trns(palette.alpha());
            }
        }
        if frames.len() > 1 {
            let plays = u32::try_from(repeat).unwrap_or(0);
            let count = u32::try_from(frames.len()).unwrap_or(u32::MAX);
            encoder.set_animated(count, plays)?;
        }

        let mut writer = encoder.write_header()?;
        for i in 0..frames.len() {
            if frames.len() > 1 {
                writer.set_frame_delay(frame_delay_ms(frames.delay(i)), 1000)?;
            }
            match prepared {
                Prepared::Rgba => writer.write_image_data(&frames.frames[i])?,
                Prepared::Indexed { frames: indexed, .. } => {
                    writer.write_image_data(&indexed[i])?;
                }
            }
        }
        writer.finish()?;
    }
    log::info!("APNG encodé : {} octets", out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::AnimationDecoder;
    use image::codecs::png::PngDecoder;

    use super::*;
    use gw_core::traits::NoProgress;

    fn solid(n: usize, rgba: [u8; 4]) -> RasterFrames {
        let mut frames = RasterFrames::new(4, 3);
        for i in 0..n {
            frames.push(rgba.repeat(12), 40 + u32::try_from(i).unwrap());
        }
        frames
    }

    fn decode(bytes: &[u8]) -> Vec<image::Frame> {
        let decoder = PngDecoder::new(Cursor::new(bytes)).unwrap();
        decoder.apng().unwrap().into_frames().collect_frames().unwrap()
    }

    #[test]
    fn lossless_round_trip_keeps_colour_and_delays() {
        let frames = solid(3, [10, 200, 30, 255]);
        let bytes = encode_apng(
            &frames,
            &ApngOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();
        let decoded = decode(&bytes);
        assert_eq!(decoded.len(), 3);
        for (i, frame) in decoded.iter().enumerate() {
            let (num, den) = frame.delay().numer_denom_ms();
            assert_eq!(num / den, 40 + u32::try_from(i).unwrap());
            assert!(frame.buffer().pixels().all(|p| p.0 == [10, 200, 30, 255]));
        }
    }

    #[test]
    fn palette_round_trip_keeps_solid_colour() {
        let frames = solid(2, [90, 80, 70, 255]);
        let options = ApngOptions {
            colors: 16,
            repeat: 0,
        };
        let bytes =
            encode_apng(&frames, &options, &mut NoProgress, &CancellationToken::new()).unwrap();
        for frame in decode(&bytes) {
            assert!(frame.buffer().pixels().all(|p| p.0 == [90, 80, 70, 255]));
        }
    }

    #[test]
    fn palette_sample_is_bounded_and_spread() {
        let mut frames = RasterFrames::new(1, 1);
        for i in 0..40u8 {
            frames.push(vec![i, 0, 0, 255], 40);
        }
        let sample = palette_sample(&frames);
        assert!(sample.len() / 4 <= PALETTE_SAMPLE_FRAMES);
        let reds: Vec<u8> = sample.chunks_exact(4).map(|p| p[0]).collect();
        assert_eq!(reds.first(), Some(&0));
        assert!(reds.last().is_some_and(|&r| r >= 36));
    }

    #[test]
    fn sampled_palette_covers_alternating_frames() {
        let mut frames = RasterFrames::new(4, 3);
        for i in 0..40 {
            let rgba = if i % 2 == 0 { [250, 0, 0, 255] } else { [0, 0, 250, 255] };
            frames.push(rgba.repeat(12), 40);
        }
        let options = ApngOptions {
            colors: 4,
            repeat: 0,
        };
        let bytes =
            encode_apng(&frames, &options, &mut NoProgress, &CancellationToken::new()).unwrap();
        let decoded = decode(&bytes);
        assert_eq!(decoded.len(), 40);
        for (i, frame) in decoded.iter().enumerate() {
            let expected = if i % 2 == 0 { [250, 0, 0, 255] } else { [0, 0, 250, 255] };
            assert!(frame.buffer().pixels().all(|p| p.0 == expected));
        }
    }

    #[test]
    fn single_frame_is_a_plain_png() {
        let bytes = encode_apng(
            &solid(1, [1, 2, 3, 255]),
            &ApngOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(!bytes.windows(4).any(|w| w == b"acTL"));
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(0, 0).0, [1, 2, 3, 255]);
    }

    #[test]
    fn progress_is_chunked_and_monotonic() {
        let frames = solid(25, [0, 0, 0, 255]);
        let mut seen = Vec::new();
        let mut sink = |p: Progress| seen.push(p.percent);
        encode_apng(&frames, &ApngOptions::default(), &mut sink, &CancellationToken::new())
            .unwrap();
        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&100.0));
        assert!(seen.contains(&85.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.len() <= 16);
    }
}
