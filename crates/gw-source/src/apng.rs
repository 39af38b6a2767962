//! Décodage des PNG animés via le décodeur APNG de `image`.

use std::io::Cursor;

use gw_core::frame::{AnimationSequence, Frame};
use image::AnimationDecoder;
use image::codecs::png::PngDecoder;

use crate::error::SourceError;
use crate::image::from_rgba_image;

/// Délai minimal d'une frame APNG, en millisecondes.
pub const MIN_DELAY_MS: u32 = 16;
/// Délai appliqué quand le fichier n'en précise pas.
pub const DEFAULT_DELAY_MS: u32 = 100;

/// Normalise un délai APNG : 0 devient 100 ms, sinon au moins 16 ms.
///
/// # Example
/// ```
/// use gw_source::apng::normalize_delay;
/// assert_eq!(normalize_delay(0), 100);
/// assert_eq!(normalize_delay(5), 16);
/// assert_eq!(normalize_delay(40), 40);
/// ```
#[must_use]
pub fn normalize_delay(raw_ms: u32) -> u32 {
    if raw_ms > 0 {
        raw_ms.max(MIN_DELAY_MS)
    } else {
        DEFAULT_DELAY_MS
    }
}

/// Décode toutes les frames d'un APNG, déjà composées pleine taille.
///
/// # Errors
/// Returns [`SourceError::Decode`] if the container or any frame is corrupt.
pub fn decode_apng(bytes: &[u8]) -> Result<AnimationSequence, SourceError> {
    let decoder = PngDecoder::new(Cursor::new(bytes))?;
    let frames = decoder.apng()?.into_frames().collect_frames()?;

    let mut sequence: Option<AnimationSequence> = None;
    for frame in frames {
        let (numer, denom) = frame.delay().numer_denom_ms();
        let raw = if denom == 0 { 0 } else { numer / denom };
        let buffer = from_rgba_image(frame.into_buffer())?;
        let seq = sequence
            .get_or_insert_with(|| AnimationSequence::new(buffer.width(), buffer.height()));
        seq.push(Frame::new(buffer, normalize_delay(raw)))?;
    }

    let sequence = sequence.unwrap_or_default();
    log::debug!(
        "APNG {}x{} : {} frames décodées",
        sequence.width(),
        sequence.height(),
        sequence.len()
    );
    Ok(sequence)
}
