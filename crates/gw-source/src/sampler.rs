//! Échantillonnage de secours quand le décodage précis échoue.

use std::io::Cursor;

use gw_core::frame::{AnimationSequence, Frame};
use image::AnimationDecoder;
use image::codecs::gif::GifDecoder;

use crate::image::{decode_image, from_rgba_image};

/// Nombre maximal de frames échantillonnées.
pub const SAMPLE_LIMIT: usize = 15;
/// Délai fixe des frames échantillonnées.
pub const SAMPLE_DELAY_MS: u32 = 100;

/// Échantillonne jusqu'à [`SAMPLE_LIMIT`] frames d'un GIF, à 100 ms chacune.
///
/// Si aucune frame n'est lisible, retombe sur l'image fixe ; si même
/// celle-ci échoue, retourne une séquence vide. Ne propage jamais d'erreur.
///
/// # Example
/// ```
/// use gw_source::sampler::sample_gif;
/// assert!(sample_gif(b"garbage").is_empty());
/// ```
#[must_use]
pub fn sample_gif(bytes: &[u8]) -> AnimationSequence {
    let sampled = sample_animated(bytes);
    if !sampled.is_empty() {
        log::debug!("Échantillonnage : {} frames", sampled.len());
        return sampled;
    }
    still_or_empty(bytes)
}

fn sample_animated(bytes: &[u8]) -> AnimationSequence {
    let frames = match GifDecoder::new(Cursor::new(bytes)) {
        Ok(decoder) => decoder.into_frames(),
        Err(e) => {
            log::debug!("Échantillonnage impossible : {e}");
            return AnimationSequence::default();
        }
    };

    let mut sequence: Option<AnimationSequence> = None;
    for frame in frames.take(SAMPLE_LIMIT) {
        let Ok(frame) = frame else { break };
        let Ok(buffer) = from_rgba_image(frame.into_buffer()) else {
            break;
        };
        let seq = sequence
            .get_or_insert_with(|| AnimationSequence::new(buffer.width(), buffer.height()));
        if seq.push(Frame::new(buffer, SAMPLE_DELAY_MS)).is_err() {
            break;
        }
    }
    sequence.unwrap_or_default()
}

/// Première image seule à 100 ms, ou séquence vide.
#[must_use]
pub fn still_or_empty(bytes: &[u8]) -> AnimationSequence {
    match decode_image(bytes) {
        Ok(buffer) => AnimationSequence::single(buffer, SAMPLE_DELAY_MS),
        Err(e) => {
            log::warn!("Image illisible : {e}");
            AnimationSequence::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gif::tests::two_frame_gif;

    #[test]
    fn sampled_frames_use_fixed_delay() {
        let bytes = two_frame_gif(::gif::DisposalMethod::Keep, 0);
        let seq = sample_gif(&bytes);
        assert_eq!(seq.len(), 2);
        assert!(seq.frames().iter().all(|f| f.delay_ms == SAMPLE_DELAY_MS));
    }
}
