//! Points d'entrée de l'extraction : octets bruts → [`AnimationSequence`].

use std::path::Path;

use anyhow::{Context, Result};
use gw_core::frame::AnimationSequence;

use crate::apng::decode_apng;
use crate::detect::{AnimationKind, detect};
use crate::error::SourceError;
use crate::gif::decode_gif;
use crate::image::decode_image;
use crate::sampler::{SAMPLE_DELAY_MS, sample_gif, still_or_empty};

/// Décode une source quelconque selon sa signature.
///
/// # Errors
/// Returns [`SourceError::Empty`] for zero-length input, the GIF/APNG
/// extraction errors for animated inputs, and [`SourceError::Decode`]
/// for unreadable still images.
///
/// # Example
/// ```
/// use gw_source::extract;
/// let err = extract(&[]).unwrap_err();
/// assert_eq!(err.to_string(), "Invalid or empty image file");
/// ```
pub fn extract(bytes: &[u8]) -> Result<AnimationSequence, SourceError> {
    if bytes.is_empty() {
        return Err(SourceError::Empty { format: "image" });
    }
    match detect(bytes) {
        AnimationKind::Gif => extract_gif(bytes),
        AnimationKind::Apng => extract_apng(bytes),
        AnimationKind::Still => {
            let buffer = decode_image(bytes)?;
            Ok(AnimationSequence::single(buffer, SAMPLE_DELAY_MS))
        }
    }
}

/// Extrait les frames d'un GIF : décodage précis, puis échantillonnage.
///
/// # Errors
/// Returns [`SourceError::Empty`] for zero-length input and
/// [`SourceError::NoFrames`] when both decode paths yield nothing.
pub fn extract_gif(bytes: &[u8]) -> Result<AnimationSequence, SourceError> {
    if bytes.is_empty() {
        return Err(SourceError::Empty { format: "GIF" });
    }
    match decode_gif(bytes) {
        Ok(seq) if !seq.is_empty() => return Ok(seq),
        Ok(_) => log::warn!("GIF sans frame décodable, échantillonnage de secours"),
        Err(e) => log::warn!("Décodage GIF précis échoué ({e}), échantillonnage de secours"),
    }
    let sampled = sample_gif(bytes);
    if sampled.is_empty() {
        return Err(SourceError::NoFrames { format: "GIF" });
    }
    Ok(sampled)
}

/// Extrait les frames d'un APNG ; un échec retombe sur une frame fixe.
///
/// # Errors
/// Returns [`SourceError::Empty`] for zero-length input and
/// [`SourceError::NoFrames`] when neither path yields a frame.
pub fn extract_apng(bytes: &[u8]) -> Result<AnimationSequence, SourceError> {
    if bytes.is_empty() {
        return Err(SourceError::Empty { format: "APNG" });
    }
    match decode_apng(bytes) {
        Ok(seq) if !seq.is_empty() => return Ok(seq),
        Ok(_) => log::warn!("APNG sans frame, repli sur l'image fixe"),
        Err(e) => log::warn!("Décodage APNG échoué ({e}), repli sur l'image fixe"),
    }
    let still = still_or_empty(bytes);
    if still.is_empty() {
        return Err(SourceError::NoFrames { format: "APNG" });
    }
    Ok(still)
}

/// Lit un fichier et l'extrait.
///
/// # Errors
/// Returns an error if the file cannot be read or decoded.
///
/// # Example
/// ```no_run
/// use gw_source::extract::load_sequence;
/// let seq = load_sequence(std::path::Path::new("anim.gif")).unwrap();
/// ```
pub fn load_sequence(path: &Path) -> Result<AnimationSequence> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Impossible de lire {}", path.display()))?;
    extract(&bytes).with_context(|| format!("Impossible de décoder {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apng::tests::two_frame_apng;
    use crate::gif::tests::two_frame_gif;

    #[test]
    fn empty_inputs_are_rejected_per_format() {
        assert_eq!(
            extract_gif(&[]).unwrap_err().to_string(),
            "Invalid or empty GIF file"
        );
        assert_eq!(
            extract_apng(&[]).unwrap_err().to_string(),
            "Invalid or empty APNG file"
        );
    }

    #[test]
    fn corrupt_gif_has_no_frames() {
        let err = extract_gif(b"GIF89a,,garbage").unwrap_err();
        assert_eq!(err.to_string(), "No frames found in GIF file");
    }

    #[test]
    fn corrupt_apng_has_no_frames() {
        let err = extract_apng(b"\x89PNG\r\n\x1a\nacTL").unwrap_err();
        assert_eq!(err.to_string(), "No frames found in APNG file");
    }

    #[test]
    fn detection_routes_to_the_precise_decoders() {
        let gif = extract(&two_frame_gif(::gif::DisposalMethod::Keep, 3)).unwrap();
        assert!(gif.is_animated());
        assert_eq!(gif.frames()[0].delay_ms, 30);

        let apng = extract(&two_frame_apng(50)).unwrap();
        assert!(apng.is_animated());
        assert_eq!(apng.frames()[0].delay_ms, 50);
    }

    #[test]
    fn still_png_is_a_single_frame() {
        let mut bytes = Vec::new();
        {
            let mut enc = png::Encoder::new(&mut bytes, 3, 1);
            enc.set_color(png::ColorType::Rgba);
            enc.set_depth(png::BitDepth::Eight);
            let mut w = enc.write_header().unwrap();
            w.write_image_data(&[7u8; 12]).unwrap();
        }
        let seq = extract(&bytes).unwrap();
        assert_eq!((seq.len(), seq.width(), seq.height()), (1, 3, 1));
        assert!(!seq.is_animated());
    }
}
