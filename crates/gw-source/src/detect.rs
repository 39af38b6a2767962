//! Détection du type d'animation à partir des octets bruts.

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const GIF_IMAGE_SEPARATOR: u8 = 0x2C;

/// Nature d'une source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationKind {
    Gif,
    Apng,
    /// Image fixe, ou format non animé.
    Still,
}

impl AnimationKind {
    #[must_use]
    pub fn is_animated(self) -> bool {
        !matches!(self, Self::Still)
    }
}

/// Heuristique sur la signature du fichier.
///
/// Un GIF est animé s'il contient plus d'un séparateur d'image (`0x2C`).
/// L'heuristique peut compter des octets `0x2C` dans les données
/// compressées : un faux positif retombe sur le décodage d'une seule frame.
///
/// # Example
/// ```
/// use gw_source::detect::{detect, AnimationKind};
/// assert_eq!(detect(b"GIF89a,,"), AnimationKind::Gif);
/// assert_eq!(detect(b"GIF89a,"), AnimationKind::Still);
/// assert_eq!(detect(&[]), AnimationKind::Still);
/// ```
#[must_use]
pub fn detect(bytes: &[u8]) -> AnimationKind {
    if is_gif(bytes) {
        let separators = bytes[6..]
            .iter()
            .filter(|&&b| b == GIF_IMAGE_SEPARATOR)
            .count();
        if separators > 1 {
            return AnimationKind::Gif;
        }
    } else if is_png(bytes) && bytes[8..].windows(4).any(|w| w == b"acTL") {
        return AnimationKind::Apng;
    }
    AnimationKind::Still
}

#[inline]
fn is_gif(bytes: &[u8]) -> bool {
    bytes.len() >= 6 && (&bytes[..6] == b"GIF89a" || &bytes[..6] == b"GIF87a")
}

#[inline]
fn is_png(bytes: &[u8]) -> bool {
    bytes.len() >= 8 && bytes[..8] == PNG_SIGNATURE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_needs_actl_chunk() {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(b"\0\0\0\x0dIHDR");
        assert_eq!(detect(&bytes), AnimationKind::Still);
        bytes.extend_from_slice(b"\0\0\0\x08acTL");
        assert_eq!(detect(&bytes), AnimationKind::Apng);
    }

    #[test]
    fn truncated_headers_are_still() {
        assert_eq!(detect(b"GIF8"), AnimationKind::Still);
        assert_eq!(detect(&PNG_SIGNATURE[..4]), AnimationKind::Still);
        assert_eq!(detect(b"GIF88a,,,"), AnimationKind::Still);
        assert_eq!(detect(b"GIF87a,,,"), AnimationKind::Gif);
    }
}
