use gw_core::frame::PixelBuffer;
use gw_core::gradient::Gradient;

use crate::filters::FilteredFrame;
use crate::markup::push_span;

/// Mappe la luma de chaque pixel sur un glyphe du gradient et émet le
/// markup colorisé, une ligne par rangée.
///
/// Les espaces sont remplacés par le second glyphe du gradient avec une
/// probabilité `1 - space_density`. Le tirage passe par un générateur
/// interne, semable pour des sorties reproductibles.
///
/// # Example
/// ```
/// use gw_ascii::glyph::GlyphMapper;
/// use gw_core::frame::PixelBuffer;
/// use gw_core::gradient::Gradient;
///
/// let buf = PixelBuffer::filled(2, 1, [255, 255, 255, 255]);
/// let mut mapper = GlyphMapper::new(Gradient::new(" .:#@"), 1.0);
/// assert_eq!(mapper.glyphs(&buf), "@@\n");
/// ```
pub struct GlyphMapper {
    gradient: Gradient,
    space_density: f32,
    rng: fastrand::Rng,
}

impl GlyphMapper {
    #[must_use]
    pub fn new(gradient: Gradient, space_density: f32) -> Self {
        Self {
            gradient,
            space_density,
            rng: fastrand::Rng::new(),
        }
    }

    /// Fixe la graine du tirage des espaces.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    #[must_use]
    pub fn gradient(&self) -> &Gradient {
        &self.gradient
    }

    /// Glyphe du pixel (x, y) de `tone`, jitter des espaces compris.
    #[inline]
    fn pick(&mut self, tone: &PixelBuffer, x: u32, y: u32) -> char {
        let ch = self.gradient.glyph_for_luma(tone.luma(x, y));
        if ch == ' ' && self.space_density < 1.0 && self.rng.f32() > self.space_density {
            return self.gradient.space_fallback();
        }
        ch
    }

    /// Markup colorisé : glyphes tirés de `tone`, couleurs de `colors`.
    ///
    /// Les deux buffers doivent avoir les mêmes dimensions ; sinon les
    /// couleurs hors limites sont noires.
    #[must_use]
    pub fn rasterize(&mut self, tone: &PixelBuffer, colors: &PixelBuffer) -> String {
        let (w, h) = (tone.width(), tone.height());
        let mut out = String::with_capacity(w as usize * h as usize * 44);
        for y in 0..h {
            for x in 0..w {
                let ch = self.pick(tone, x, y);
                let (r, g, b, _) = colors.pixel(x, y);
                push_span(&mut out, ch, (r, g, b));
            }
            out.push('\n');
        }
        out
    }

    /// Markup colorisé d'une frame filtrée (couleurs d'avant seuillage).
    #[must_use]
    pub fn rasterize_frame(&mut self, frame: &FilteredFrame) -> String {
        self.rasterize(&frame.tone, frame.color_source())
    }

    /// Glyphes seuls, sans markup.
    #[must_use]
    pub fn glyphs(&mut self, tone: &PixelBuffer) -> String {
        let (w, h) = (tone.width(), tone.height());
        let mut out = String::with_capacity((w as usize + 1) * h as usize);
        for y in 0..h {
            for x in 0..w {
                out.push(self.pick(tone, x, y));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{TokenGrid, strip_tags};

    fn scenario() -> PixelBuffer {
        let mut buf = PixelBuffer::new(2, 2);
        buf.set_pixel(0, 0, [255, 0, 0, 255]);
        buf.set_pixel(1, 0, [0, 255, 0, 255]);
        buf.set_pixel(0, 1, [0, 0, 255, 255]);
        buf.set_pixel(1, 1, [128, 128, 128, 255]);
        buf
    }

    #[test]
    fn two_by_two_scenario_is_deterministic() {
        let buf = scenario();
        let mut mapper = GlyphMapper::new(Gradient::new(" .:-=+*#%@"), 1.0);
        let text = mapper.rasterize(&buf, &buf);
        assert_eq!(strip_tags(&text), ":+\n.=\n");
        assert_eq!(mapper.rasterize(&buf, &buf), text);

        let grid = TokenGrid::parse(&text);
        assert_eq!(grid.lines[0][0].rgb, Some((255, 0, 0)));
        assert_eq!(grid.lines[1][1].rgb, Some((128, 128, 128)));
    }

    #[test]
    fn zero_density_replaces_every_space() {
        let black = PixelBuffer::filled(4, 3, [0, 0, 0, 255]);
        let mut mapper = GlyphMapper::new(Gradient::new(" .:"), 0.0).with_seed(7);
        assert_eq!(mapper.glyphs(&black), "....\n....\n....\n");
    }

    #[test]
    fn seeded_jitter_is_reproducible() {
        let black = PixelBuffer::filled(16, 4, [0, 0, 0, 255]);
        let a = GlyphMapper::new(Gradient::new(" x"), 0.5).with_seed(42).glyphs(&black);
        let b = GlyphMapper::new(Gradient::new(" x"), 0.5).with_seed(42).glyphs(&black);
        assert_eq!(a, b);
        assert!(a.chars().all(|c| matches!(c, ' ' | 'x' | '\n')));
    }
}
