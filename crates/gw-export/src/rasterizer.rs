use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use ab_glyph::{Font, FontRef, PxScale, point};
use gw_ascii::markup::TokenGrid;
use gw_core::color::parse_hex_color;
use gw_core::config::ExportSettings;
use gw_core::frame::AsciiFrame;
use rayon::prelude::*;

use crate::cache::{DEFAULT_CAPACITY, RenderCache};
use crate::error::{CodecContext, CodecError};
use crate::raster::RasterFrames;

/// Métrique et couleurs de la rasterisation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterOptions {
    /// Largeur d'une cellule en pixels.
    pub cell_width: u32,
    /// Hauteur d'une cellule en pixels.
    pub cell_height: u32,
    /// Taille de police en pixels.
    pub font_px: f32,
    /// `None` = fond transparent.
    pub background: Option<[u8; 4]>,
    /// Couleur des glyphes sans couleur lisible.
    pub foreground: (u8, u8, u8),
}

impl RasterOptions {
    /// Métrique `char_width × line_height` multipliée par `scale`.
    ///
    /// # Example
    /// ```
    /// use gw_core::config::ExportSettings;
    /// use gw_export::rasterizer::RasterOptions;
    /// let opts = RasterOptions::from_settings(&ExportSettings { scale: 2.0, ..Default::default() });
    /// assert_eq!((opts.cell_width, opts.cell_height), (12, 20));
    /// assert_eq!(opts.background, Some([0, 0, 0, 255]));
    /// ```
    #[must_use]
    pub fn from_settings(s: &ExportSettings) -> Self {
        let scale = s.scale.max(0.5);
        let background = (!s.transparent_background).then(|| {
            let (r, g, b) = parse_hex_color(&s.effective_background());
            [r, g, b, 255]
        });
        Self {
            cell_width: px(s.char_width * scale),
            cell_height: px(s.line_height * scale),
            font_px: s.font_size * scale,
            background,
            foreground: parse_hex_color(s.theme.foreground()),
        }
    }
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self::from_settings(&ExportSettings::default())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn px(v: f32) -> u32 {
    (v.round() as u32).max(1)
}

/// Re-rasterise les frames ASCII en pixels RGBA.
///
/// Les glyphes viennent d'une police chargée à l'exécution, précalculés
/// en masques alpha d'une cellule. Sans police, chaque glyphe non vide
/// est dessiné comme un bloc plein de sa couleur.
///
/// # Example
/// ```
/// use gw_core::frame::AsciiFrame;
/// use gw_export::rasterizer::{RasterOptions, Rasterizer};
///
/// let r = Rasterizer::blocks(RasterOptions::default());
/// let ascii = "<span style=\"color: rgb(255, 0, 0)\">#</span>\n";
/// let out = r.render_frames(&[AsciiFrame::new(ascii.into(), 100)]).unwrap();
/// assert_eq!((out.width, out.height), (6, 10));
/// assert_eq!(&out.frames[0][..4], &[255, 0, 0, 255]);
/// ```
pub struct Rasterizer {
    options: RasterOptions,
    /// Masque alpha par caractère (cell_width * cell_height).
    glyph_cache: HashMap<char, Vec<u8>>,
    /// Masque plein, pour le mode blocs et les glyphes absents de la police.
    solid: Vec<u8>,
    cache: Mutex<RenderCache>,
}

impl Rasterizer {
    /// Rasterizer en blocs pleins, sans police.
    #[must_use]
    pub fn blocks(options: RasterOptions) -> Self {
        Self::with_cache(options, DEFAULT_CAPACITY)
    }

    /// Rasterizer sans police avec un cache de `capacity` entrées.
    #[must_use]
    pub fn with_cache(options: RasterOptions, capacity: usize) -> Self {
        let cells = options.cell_width as usize * options.cell_height as usize;
        Self {
            options,
            glyph_cache: HashMap::new(),
            solid: vec![255; cells],
            cache: Mutex::new(RenderCache::new(capacity)),
        }
    }

    /// Précalcule les glyphes de `font_data` pour les plages utilisées par
    /// les gradients (ASCII, Latin-1, box drawing, blocs, braille).
    ///
    /// # Errors
    /// Retourne une erreur si la police fournie est invalide.
    pub fn with_font(
        options: RasterOptions,
        font_data: &[u8],
        capacity: usize,
    ) -> anyhow::Result<Self> {
        let font = FontRef::try_from_slice(font_data)?;
        let scale = PxScale::from(options.font_px.max(1.0));
        let mut rasterizer = Self::with_cache(options, capacity);

        rasterizer.cache_charset(&font, scale, 0x21..=0x7E);
        rasterizer.cache_charset(&font, scale, 0x00A1..=0x00FF);
        rasterizer.cache_charset(&font, scale, 0x2500..=0x257F);
        rasterizer.cache_charset(&font, scale, 0x2580..=0x259F);
        rasterizer.cache_charset(&font, scale, 0x2800..=0x28FF);

        log::debug!("Rasterizer : {} glyphes en cache", rasterizer.glyph_cache.len());
        Ok(rasterizer)
    }

    fn cache_charset(
        &mut self,
        font: &FontRef,
        scale: PxScale,
        range: std::ops::RangeInclusive<u32>,
    ) {
        let (cw, ch) = (self.options.cell_width, self.options.cell_height);
        let ascent_px = font.ascent_unscaled() * scale.y / font.height_unscaled();
        for codepoint in range {
            let Some(c) = char::from_u32(codepoint) else {
                continue;
            };
            // glyph_id 0 = .notdef : le glyphe retombe sur un bloc plein.
            let gid = font.glyph_id(c);
            if gid.0 == 0 {
                continue;
            }

            let mut mask = vec![0u8; cw as usize * ch as usize];
            let glyph = gid.with_scale_and_position(scale, point(0.0, ascent_px));
            if let Some(outline) = font.outline_glyph(glyph) {
                let bounds = outline.px_bounds();
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_possible_wrap,
                    clippy::cast_sign_loss
                )]
                outline.draw(|x, y, v| {
                    let px = (x as i32 + bounds.min.x as i32).max(0) as u32;
                    let py = (y as i32 + bounds.min.y as i32).max(0) as u32;
                    if px < cw && py < ch {
                        let idx = (py * cw + px) as usize;
                        mask[idx] = mask[idx].max((v * 255.0).round() as u8);
                    }
                });
            }
            self.glyph_cache.insert(c, mask);
        }
    }

    #[must_use]
    pub fn options(&self) -> &RasterOptions {
        &self.options
    }

    /// Dimensions en pixels d'une grille `cols × rows`.
    #[must_use]
    pub fn target_dimensions(&self, cols: usize, rows: usize) -> (u32, u32) {
        let cols = u32::try_from(cols).unwrap_or(u32::MAX);
        let rows = u32::try_from(rows).unwrap_or(u32::MAX);
        (
            cols.saturating_mul(self.options.cell_width),
            rows.saturating_mul(self.options.cell_height),
        )
    }

    /// Grille parsée de `ascii`, via le cache.
    pub fn parse(&self, ascii: &str) -> Arc<TokenGrid> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_parse(ascii)
    }

    /// Vide le cache de parsing.
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Dessine `grid` sur un canevas `width × height`, parallélisé par
    /// rangée de texte. Les espaces ne sont pas dessinés.
    #[must_use]
    pub fn render_grid(&self, grid: &TokenGrid, width: u32, height: u32) -> Vec<u8> {
        let fill = self.options.background.unwrap_or([0, 0, 0, 0]);
        let mut canvas = fill.repeat(width as usize * height as usize);
        if canvas.is_empty() {
            return canvas;
        }

        let (cw, ch) = (self.options.cell_width as usize, self.options.cell_height as usize);
        let stride = width as usize * 4;
        let band_size = stride * ch;

        canvas
            .par_chunks_mut(band_size)
            .zip(grid.lines.par_iter())
            .for_each(|(band, line)| {
                let band_rows = band.len() / stride;
                for (gx, token) in line.iter().enumerate() {
                    if token.ch == ' ' {
                        continue;
                    }
                    let x0 = gx * cw;
                    if x0 >= width as usize {
                        break;
                    }
                    let mask = self.glyph_cache.get(&token.ch).unwrap_or(&self.solid);
                    let (r, g, b) = token.rgb.unwrap_or(self.options.foreground);
                    let cols = cw.min(width as usize - x0);

                    for cy in 0..ch.min(band_rows) {
                        for cx in 0..cols {
                            let a = mask[cy * cw + cx];
                            if a == 0 {
                                continue;
                            }
                            let i = cy * stride + (x0 + cx) * 4;
                            blend(&mut band[i..i + 4], [r, g, b], a);
                        }
                    }
                }
            });
        canvas
    }

    /// Rasterise toutes les frames non vides sur un canevas commun, taillé
    /// pour la plus large et la plus haute.
    ///
    /// # Errors
    /// Returns a validation [`CodecError`] when no frame has any glyph.
    pub fn render_frames(&self, frames: &[AsciiFrame]) -> Result<RasterFrames, CodecError> {
        let grids: Vec<(Arc<TokenGrid>, u32)> = frames
            .iter()
            .filter(|f| !f.text.is_empty())
            .map(|f| (self.parse(&f.text), f.delay_ms))
            .filter(|(grid, _)| !grid.is_empty())
            .collect();

        let cols = grids.iter().map(|(g, _)| g.width()).max().unwrap_or(0);
        let rows = grids.iter().map(|(g, _)| g.height()).max().unwrap_or(0);
        let (width, height) = self.target_dimensions(cols, rows);
        if width == 0 || height == 0 {
            return Err(CodecError::validation(
                "invalid export: no renderable frames",
                CodecContext::new("Rasterize", frames.len(), 0, 0),
            ));
        }

        let mut out = RasterFrames::new(width, height);
        for (i, (grid, delay)) in grids.iter().enumerate() {
            out.push(self.render_grid(grid, width, height), *delay);
            if i % 8 == 7 {
                std::thread::yield_now();
            }
        }
        log::debug!("{} frames rasterisées en {width}x{height}", out.len());
        Ok(out)
    }
}

/// Composite `rgb` d'opacité `alpha` par-dessus le pixel `dst`.
#[inline]
fn blend(dst: &mut [u8], rgb: [u8; 3], alpha: u8) {
    if alpha == 255 {
        dst[..3].copy_from_slice(&rgb);
        dst[3] = 255;
        return;
    }
    let a = f32::from(alpha) / 255.0;
    let da = f32::from(dst[3]) / 255.0;
    let oa = a + da * (1.0 - a);
    for (d, &s) in dst[..3].iter_mut().zip(&rgb) {
        let v = (f32::from(s) * a + f32::from(*d) * da * (1.0 - a)) / oa;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            *d = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        dst[3] = (oa * 255.0).round() as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_ascii::markup::push_span;

    fn line(spans: &[(char, (u8, u8, u8))]) -> String {
        let mut out = String::new();
        for &(ch, rgb) in spans {
            push_span(&mut out, ch, rgb);
        }
        out.push('\n');
        out
    }

    #[test]
    fn canvas_fits_the_largest_frame() {
        let r = Rasterizer::blocks(RasterOptions::default());
        let small = line(&[('#', (255, 255, 255))]);
        let wide = line(&[('#', (1, 1, 1)), ('#', (2, 2, 2)), ('#', (3, 3, 3))]) + &small;
        let out = r
            .render_frames(&[
                AsciiFrame::new(small, 50),
                AsciiFrame::new(String::new(), 50),
                AsciiFrame::new(wide, 70),
            ])
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!((out.width, out.height), (18, 20));
        assert_eq!(out.delays, vec![50, 70]);
        // Hors de la première frame : fond du thème sombre.
        let i = (15 * 18 + 15) * 4;
        assert_eq!(&out.frames[0][i..i + 4], &[0, 0, 0, 255]);
    }

    #[test]
    fn spaces_show_background_and_transparency_is_kept() {
        let opts = RasterOptions {
            background: None,
            ..RasterOptions::default()
        };
        let r = Rasterizer::blocks(opts);
        let ascii = line(&[(' ', (9, 9, 9)), ('x', (9, 8, 7))]);
        let out = r.render_frames(&[AsciiFrame::new(ascii, 10)]).unwrap();
        let frame = &out.frames[0];
        assert_eq!(&frame[..4], &[0, 0, 0, 0]);
        let i = 6 * 4;
        assert_eq!(&frame[i..i + 4], &[9, 8, 7, 255]);
    }

    #[test]
    fn empty_input_is_a_validation_error() {
        let r = Rasterizer::blocks(RasterOptions::default());
        let err = r.render_frames(&[AsciiFrame::new("\n\n".into(), 10)]).unwrap_err();
        assert_eq!(err.kind, crate::error::CodecErrorKind::Validation);
    }

    #[test]
    fn repeated_frames_hit_the_cache() {
        let r = Rasterizer::blocks(RasterOptions::default());
        let ascii = line(&[('@', (0, 0, 0))]);
        let frames = vec![AsciiFrame::new(ascii, 10); 5];
        r.render_frames(&frames).unwrap();
        assert_eq!(r.cached_entries(), 1);
        r.clear_cache();
        assert_eq!(r.cached_entries(), 0);
    }

    #[test]
    fn half_alpha_blends_over_background() {
        let mut px = [0, 0, 0, 255];
        blend(&mut px, [255, 255, 255], 128);
        assert_eq!(px, [128, 128, 128, 255]);
    }

    #[test]
    fn invalid_font_is_rejected() {
        assert!(Rasterizer::with_font(RasterOptions::default(), b"nope", 4).is_err());
    }
}
