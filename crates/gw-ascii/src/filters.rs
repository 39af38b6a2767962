use gw_core::color::{clamp_channel, hsl_to_rgb, luma, rgb_to_hsl};
use gw_core::config::ControlState;
use gw_core::frame::PixelBuffer;

/// Matrice sépia standard (lignes R, G, B).
const SEPIA: [[f64; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

/// Résultat du pipeline : le buffer final (dont dérivent les glyphes) et,
/// si le seuillage a modifié l'image, l'instantané couleur d'avant seuillage.
#[derive(Clone, Debug)]
pub struct FilteredFrame {
    /// Buffer après toutes les étapes, seuillage compris.
    pub tone: PixelBuffer,
    /// Couleurs avant seuillage. `None` quand le seuillage est neutre.
    pub colors: Option<PixelBuffer>,
}

impl FilteredFrame {
    /// Buffer portant les couleurs des glyphes.
    #[must_use]
    pub fn color_source(&self) -> &PixelBuffer {
        self.colors.as_ref().unwrap_or(&self.tone)
    }
}

/// Chaîne de filtres à ordre fixe. Chaque étape est un no-op à sa valeur
/// neutre : un `ControlState` neutre laisse le buffer intact octet par octet.
///
/// # Example
/// ```
/// use gw_ascii::filters::FilterPipeline;
/// use gw_core::config::ControlState;
/// use gw_core::frame::PixelBuffer;
///
/// let controls = ControlState { brightness: 50.0, ..ControlState::default() };
/// let out = FilterPipeline::new(&controls).apply(PixelBuffer::filled(2, 2, [200, 100, 50, 255]));
/// assert_eq!(out.pixel(0, 0), (100, 50, 25, 255));
/// ```
pub struct FilterPipeline<'a> {
    controls: &'a ControlState,
}

impl<'a> FilterPipeline<'a> {
    #[must_use]
    pub fn new(controls: &'a ControlState) -> Self {
        Self { controls }
    }

    /// Applique toutes les étapes et retourne le buffer final.
    #[must_use]
    pub fn apply(&self, buffer: PixelBuffer) -> PixelBuffer {
        self.apply_split(buffer).tone
    }

    /// Applique toutes les étapes en conservant les couleurs d'avant seuillage.
    #[must_use]
    pub fn apply_split(&self, mut buffer: PixelBuffer) -> FilteredFrame {
        let c = self.controls;

        self.photometric(&mut buffer);

        if c.sharpness != 0.0 {
            buffer = sharpen(&buffer, f64::from(c.sharpness));
        }
        if c.edge_detection > 1.0 {
            buffer = sobel_edges(&buffer, f64::from(c.edge_detection));
        }

        if c.thresholding == 128 {
            return FilteredFrame {
                tone: buffer,
                colors: None,
            };
        }
        let colors = buffer.clone();
        threshold(&mut buffer, f64::from(c.thresholding));
        FilteredFrame {
            tone: buffer,
            colors: Some(colors),
        }
    }

    /// Étapes 1 à 7, en place. Le canal alpha n'est jamais modifié.
    fn photometric(&self, buffer: &mut PixelBuffer) {
        let c = self.controls;
        let brightness = c.brightness != 100.0;
        let contrast = c.contrast != 100.0;
        let saturation = c.saturation != 100.0;
        let hue = c.hue != 0.0;
        let grayscale = c.grayscale > 0.0;
        let sepia = c.sepia > 0.0;
        let invert = c.invert_colors > 0.0;

        if !(brightness || contrast || saturation || hue || grayscale || sepia || invert) {
            return;
        }

        let brightness_f = f64::from(c.brightness) / 100.0;
        let contrast_f = f64::from(c.contrast) / 100.0;
        let saturation_f = f64::from(c.saturation) / 100.0;
        let hue_shift = f64::from(c.hue) / 360.0;
        let gray_f = f64::from(c.grayscale) / 100.0;
        let sepia_f = f64::from(c.sepia) / 100.0;
        let invert_f = f64::from(c.invert_colors) / 100.0;

        for px in buffer.data_mut().chunks_exact_mut(4) {
            let mut r = f64::from(px[0]);
            let mut g = f64::from(px[1]);
            let mut b = f64::from(px[2]);

            if brightness {
                r *= brightness_f;
                g *= brightness_f;
                b *= brightness_f;
            }

            if contrast {
                r = ((r / 255.0 - 0.5) * contrast_f + 0.5) * 255.0;
                g = ((g / 255.0 - 0.5) * contrast_f + 0.5) * 255.0;
                b = ((b / 255.0 - 0.5) * contrast_f + 0.5) * 255.0;
            }

            if saturation || hue {
                let (h, s, l) = rgb_to_hsl(r, g, b);
                let s = if saturation { s * saturation_f } else { s };
                let h = if hue { (h + hue_shift).rem_euclid(1.0) } else { h };
                (r, g, b) = hsl_to_rgb(h, s, l);
            }

            if grayscale {
                let gray = 0.299 * r + 0.587 * g + 0.114 * b;
                r = r * (1.0 - gray_f) + gray * gray_f;
                g = g * (1.0 - gray_f) + gray * gray_f;
                b = b * (1.0 - gray_f) + gray * gray_f;
            }

            if sepia {
                let tr = SEPIA[0][0] * r + SEPIA[0][1] * g + SEPIA[0][2] * b;
                let tg = SEPIA[1][0] * r + SEPIA[1][1] * g + SEPIA[1][2] * b;
                let tb = SEPIA[2][0] * r + SEPIA[2][1] * g + SEPIA[2][2] * b;
                r = r * (1.0 - sepia_f) + tr * sepia_f;
                g = g * (1.0 - sepia_f) + tg * sepia_f;
                b = b * (1.0 - sepia_f) + tb * sepia_f;
            }

            if invert {
                r = r * (1.0 - invert_f) + (255.0 - r) * invert_f;
                g = g * (1.0 - invert_f) + (255.0 - g) * invert_f;
                b = b * (1.0 - invert_f) + (255.0 - b) * invert_f;
            }

            px[0] = clamp_channel(r);
            px[1] = clamp_channel(g);
            px[2] = clamp_channel(b);
        }
    }
}

/// Index RGBA du pixel (x, y).
#[inline(always)]
fn at(width: usize, x: usize, y: usize) -> usize {
    (y * width + x) * 4
}

/// Netteté 3×3 : centre `1 + 4f`, voisins directs `-f`, `f = amount / 10`.
/// Lit le buffer source, écrit dans une copie ; bordure inchangée.
#[must_use]
pub fn sharpen(src: &PixelBuffer, amount: f64) -> PixelBuffer {
    let (w, h) = (src.width() as usize, src.height() as usize);
    let mut out = src.clone();
    if w < 3 || h < 3 {
        return out;
    }
    let factor = amount / 10.0;
    let center_weight = 1.0 + 4.0 * factor;
    let data = src.data();
    let dst = out.data_mut();

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = at(w, x, y);
            let top = at(w, x, y - 1);
            let bottom = at(w, x, y + 1);
            let left = at(w, x - 1, y);
            let right = at(w, x + 1, y);
            for c in 0..3 {
                let neighbors = f64::from(data[top + c])
                    + f64::from(data[bottom + c])
                    + f64::from(data[left + c])
                    + f64::from(data[right + c]);
                let v = f64::from(data[idx + c]) * center_weight - neighbors * factor;
                dst[idx + c] = clamp_channel(v);
            }
        }
    }
    out
}

/// Sobel par canal : `c + |∇c| * (strength - 1) / 10`. Bordure inchangée.
#[must_use]
pub fn sobel_edges(src: &PixelBuffer, strength: f64) -> PixelBuffer {
    let (w, h) = (src.width() as usize, src.height() as usize);
    let mut out = src.clone();
    if w < 3 || h < 3 {
        return out;
    }
    let factor = (strength - 1.0) / 10.0;
    let data = src.data();
    let dst = out.data_mut();

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = at(w, x, y);
            let tl = at(w, x - 1, y - 1);
            let t = at(w, x, y - 1);
            let tr = at(w, x + 1, y - 1);
            let l = at(w, x - 1, y);
            let r = at(w, x + 1, y);
            let bl = at(w, x - 1, y + 1);
            let b = at(w, x, y + 1);
            let br = at(w, x + 1, y + 1);
            for c in 0..3 {
                let p = |i: usize| f64::from(data[i + c]);
                let gx = -p(tl) + p(tr) - 2.0 * p(l) + 2.0 * p(r) - p(bl) + p(br);
                let gy = -p(tl) - 2.0 * p(t) - p(tr) + p(bl) + 2.0 * p(b) + p(br);
                let magnitude = (gx * gx + gy * gy).sqrt();
                dst[idx + c] = clamp_channel(p(idx) + magnitude * factor);
            }
        }
    }
    out
}

/// Seuillage binaire sur la luma : `> t` → blanc, sinon noir, sur R, G et B.
pub fn threshold(buffer: &mut PixelBuffer, t: f64) {
    for px in buffer.data_mut().chunks_exact_mut(4) {
        let v = if luma(px[0], px[1], px[2]) > t { 255 } else { 0 };
        px[0] = v;
        px[1] = v;
        px[2] = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(w: u32, h: u32) -> PixelBuffer {
        let mut buf = PixelBuffer::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let v = ((x * 37 + y * 91) % 256) as u8;
                buf.set_pixel(x, y, [v, v.wrapping_mul(3), 255 - v, (x * 20) as u8]);
            }
        }
        buf
    }

    #[test]
    fn neutral_controls_are_identity() {
        let src = gradient_image(9, 7);
        let controls = ControlState::default();
        let filtered = FilterPipeline::new(&controls).apply_split(src.clone());
        assert_eq!(filtered.tone, src);
        assert!(filtered.colors.is_none());
    }

    #[test]
    fn contrast_formula() {
        let controls = ControlState {
            contrast: 150.0,
            ..ControlState::default()
        };
        let out = FilterPipeline::new(&controls).apply(PixelBuffer::filled(1, 1, [10, 100, 200, 255]));
        // ((c/255 - 0.5) * 1.5 + 0.5) * 255 = 1.5c - 63.75
        assert_eq!(out.pixel(0, 0), (0, 86, 236, 255));
    }

    #[test]
    fn hue_rotation_wraps() {
        let controls = ControlState {
            hue: 120.0,
            ..ControlState::default()
        };
        let out = FilterPipeline::new(&controls).apply(PixelBuffer::filled(1, 1, [255, 0, 0, 255]));
        assert_eq!(out.pixel(0, 0), (0, 255, 0, 255));
    }

    #[test]
    fn full_grayscale_and_invert() {
        let controls = ControlState {
            grayscale: 100.0,
            invert_colors: 100.0,
            ..ControlState::default()
        };
        let out = FilterPipeline::new(&controls).apply(PixelBuffer::filled(1, 1, [255, 0, 0, 77]));
        // luma 76.245 → inverted 178.755 → 179, alpha untouched
        assert_eq!(out.pixel(0, 0), (179, 179, 179, 77));
    }

    #[test]
    fn sharpen_leaves_border_and_flat_regions() {
        let src = PixelBuffer::filled(5, 5, [100, 100, 100, 255]);
        let out = sharpen(&src, 5.0);
        assert_eq!(out, src);

        let mut spike = src.clone();
        spike.set_pixel(2, 2, [120, 120, 120, 255]);
        let out = sharpen(&spike, 10.0);
        // center 120*5 - 400 = 200
        assert_eq!(out.pixel(2, 2).0, 200);
        // neighbor 100*5 - (120 + 300) = 80
        assert_eq!(out.pixel(2, 1).0, 80);
        assert_eq!(out.pixel(0, 0), (100, 100, 100, 255));
    }

    #[test]
    fn edges_brighten_transitions_only() {
        let mut src = PixelBuffer::filled(4, 3, [0, 0, 0, 255]);
        for y in 0..3 {
            src.set_pixel(2, y, [100, 100, 100, 255]);
            src.set_pixel(3, y, [100, 100, 100, 255]);
        }
        let out = sobel_edges(&src, 11.0);
        // x=1 : gx = 100 + 200 + 100 = 400, factor 1 → 0 + 400 → 255
        assert_eq!(out.pixel(1, 1).0, 255);
        // border column untouched
        assert_eq!(out.pixel(0, 1).0, 0);
        assert_eq!(out.pixel(3, 1).0, 100);
    }

    #[test]
    fn threshold_keeps_pre_threshold_colors() {
        let controls = ControlState {
            thresholding: 100,
            ..ControlState::default()
        };
        let src = PixelBuffer::filled(1, 1, [255, 0, 0, 255]);
        let filtered = FilterPipeline::new(&controls).apply_split(src.clone());
        assert_eq!(filtered.tone.pixel(0, 0), (0, 0, 0, 255));
        assert_eq!(filtered.color_source(), &src);
    }
}
