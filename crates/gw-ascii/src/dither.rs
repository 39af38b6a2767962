//! Hooks de tramage.
//!
//! Les méthodes sont nommées et routées mais aucune n'est implémentée :
//! chacune laisse le buffer intact. Le mapping des glyphes ne doit donc
//! jamais supposer qu'un tramage a modifié l'image.

use gw_core::config::DitheringMethod;
use gw_core::frame::PixelBuffer;

/// Applique la méthode de tramage demandée.
///
/// # Example
/// ```
/// use gw_ascii::dither::apply_dithering;
/// use gw_core::config::DitheringMethod;
/// use gw_core::frame::PixelBuffer;
///
/// let src = PixelBuffer::filled(3, 3, [10, 20, 30, 255]);
/// let out = apply_dithering(src.clone(), DitheringMethod::FloydSteinberg);
/// assert_eq!(out, src);
/// ```
#[must_use]
pub fn apply_dithering(buffer: PixelBuffer, method: DitheringMethod) -> PixelBuffer {
    match method {
        DitheringMethod::None => buffer,
        DitheringMethod::FloydSteinberg => floyd_steinberg(buffer),
        DitheringMethod::Atkinson => atkinson(buffer),
        DitheringMethod::Ordered => ordered(buffer),
        DitheringMethod::JarvisJudiceNinke => jarvis_judice_ninke(buffer),
    }
}

fn floyd_steinberg(buffer: PixelBuffer) -> PixelBuffer {
    log::trace!("Floyd-Steinberg : passthrough");
    buffer
}

fn atkinson(buffer: PixelBuffer) -> PixelBuffer {
    log::trace!("Atkinson : passthrough");
    buffer
}

fn ordered(buffer: PixelBuffer) -> PixelBuffer {
    log::trace!("Ordered : passthrough");
    buffer
}

fn jarvis_judice_ninke(buffer: PixelBuffer) -> PixelBuffer {
    log::trace!("Jarvis-Judice-Ninke : passthrough");
    buffer
}
