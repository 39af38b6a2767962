//! Quantification des frames RGBA en palettes indexées.

use std::collections::HashMap;

use color_quant::NeuQuant;
use rayon::prelude::*;

/// Sous ce seuil d'alpha, un pixel GIF prend l'index transparent.
pub const ALPHA_THRESHOLD: u8 = 128;

/// En dessous, NeuQuant n'a pas assez d'échantillons : palette par popularité.
const MIN_LEARN_PIXELS: usize = 2048;

/// Facteur d'échantillonnage NeuQuant pour une qualité [1, 100].
///
/// Plus la qualité est haute, plus le facteur est petit (plus de pixels
/// vus par le réseau).
///
/// # Example
/// ```
/// use gw_export::quantize::sample_factor;
/// assert_eq!(sample_factor(60), 11);
/// assert_eq!(sample_factor(90), 3);
/// ```
#[must_use]
pub fn sample_factor(quality: u8) -> i32 {
    1 + (100 - i32::from(quality.clamp(1, 100))) / 4
}

/// Palette d'au plus 256 couleurs RGBA.
///
/// Exacte quand l'image a moins de couleurs que le budget, sinon apprise
/// par NeuQuant.
pub struct Palette {
    colors: Vec<[u8; 4]>,
    exact: HashMap<[u8; 4], u8>,
    network: Option<NeuQuant>,
}

impl Palette {
    /// Construit une palette de `max_colors` entrées au plus pour `rgba`.
    ///
    /// # Example
    /// ```
    /// use gw_export::quantize::Palette;
    /// let rgba = [[9, 9, 9, 255], [1, 2, 3, 255], [9, 9, 9, 255]].concat();
    /// let palette = Palette::build(&rgba, 16, 10);
    /// assert_eq!(palette.len(), 2);
    /// assert_eq!(palette.map(&rgba), vec![0, 1, 0]);
    /// ```
    #[must_use]
    pub fn build(rgba: &[u8], max_colors: usize, sample_factor: i32) -> Self {
        let max_colors = max_colors.clamp(1, 256);
        let mut colors = Vec::new();
        let mut exact = HashMap::new();
        for px in rgba.chunks_exact(4) {
            let key = [px[0], px[1], px[2], px[3]];
            if exact.contains_key(&key) {
                continue;
            }
            if colors.len() == max_colors {
                return if rgba.len() / 4 < MIN_LEARN_PIXELS {
                    Self::popular(rgba, max_colors)
                } else {
                    Self::learn(rgba, max_colors, sample_factor)
                };
            }
            #[allow(clippy::cast_possible_truncation)]
            exact.insert(key, colors.len() as u8);
            colors.push(key);
        }
        Self {
            colors,
            exact,
            network: None,
        }
    }

    fn learn(rgba: &[u8], max_colors: usize, sample_factor: i32) -> Self {
        let network = NeuQuant::new(sample_factor.clamp(1, 30), max_colors, rgba);
        let colors = network
            .color_map_rgba()
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        Self {
            colors,
            exact: HashMap::new(),
            network: Some(network),
        }
    }

    /// Les `max_colors` couleurs les plus fréquentes ; les autres sont
    /// rabattues sur la plus proche.
    fn popular(rgba: &[u8], max_colors: usize) -> Self {
        let mut counts: HashMap<[u8; 4], usize> = HashMap::new();
        for px in rgba.chunks_exact(4) {
            *counts.entry([px[0], px[1], px[2], px[3]]).or_default() += 1;
        }
        let mut ranked: Vec<([u8; 4], usize)> = counts.into_iter().collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(max_colors);

        let colors: Vec<[u8; 4]> = ranked.into_iter().map(|(c, _)| c).collect();
        let mut exact = HashMap::with_capacity(rgba.len() / 4);
        for px in rgba.chunks_exact(4) {
            let key = [px[0], px[1], px[2], px[3]];
            exact.entry(key).or_insert_with(|| nearest(&colors, key));
        }
        Self {
            colors,
            exact,
            network: None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[must_use]
    pub fn colors(&self) -> &[[u8; 4]] {
        &self.colors
    }

    /// Index de la couleur la plus proche de `px`.
    #[inline]
    #[must_use]
    pub fn index_of(&self, px: [u8; 4]) -> u8 {
        if let Some(&i) = self.exact.get(&px) {
            return i;
        }
        #[allow(clippy::cast_possible_truncation)]
        match &self.network {
            Some(network) => network.index_of(&px) as u8,
            None => nearest(&self.colors, px),
        }
    }

    /// Indexe chaque pixel de `rgba`.
    #[must_use]
    pub fn map(&self, rgba: &[u8]) -> Vec<u8> {
        rgba.chunks_exact(4)
            .map(|px| self.index_of([px[0], px[1], px[2], px[3]]))
            .collect()
    }

    /// Triplets RGB concaténés (PLTE / table de couleurs GIF).
    #[must_use]
    pub fn rgb(&self) -> Vec<u8> {
        self.colors.iter().flat_map(|c| [c[0], c[1], c[2]]).collect()
    }

    /// Canal alpha de chaque entrée (tRNS).
    #[must_use]
    pub fn alpha(&self) -> Vec<u8> {
        self.colors.iter().map(|c| c[3]).collect()
    }
}

/// Index de l'entrée de `colors` la plus proche (distance euclidienne RGBA).
fn nearest(colors: &[[u8; 4]], px: [u8; 4]) -> u8 {
    let dist = |c: &[u8; 4]| -> u32 {
        c.iter()
            .zip(px)
            .map(|(&a, b)| {
                let d = i32::from(a) - i32::from(b);
                d.unsigned_abs() * d.unsigned_abs()
            })
            .sum()
    };
    #[allow(clippy::cast_possible_truncation)]
    colors
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| dist(c))
        .map_or(0, |(i, _)| i as u8)
}

/// Frame GIF indexée.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedFrame {
    /// Triplets RGB, 256 entrées au plus.
    pub palette: Vec<u8>,
    pub indices: Vec<u8>,
    pub transparent: Option<u8>,
}

/// Quantifie une frame pour le GIF.
///
/// Avec `reserve_transparent` et au moins un pixel d'alpha inférieur à
/// [`ALPHA_THRESHOLD`], le budget est réduit à 255 couleurs et un index
/// transparent est ajouté en fin de palette.
#[must_use]
pub fn quantize_gif_frame(
    rgba: &[u8],
    colors: usize,
    quality: u8,
    reserve_transparent: bool,
) -> IndexedFrame {
    let transparent =
        reserve_transparent && rgba.chunks_exact(4).any(|px| px[3] < ALPHA_THRESHOLD);

    let opaque: Vec<u8> = rgba
        .chunks_exact(4)
        .filter(|px| !transparent || px[3] >= ALPHA_THRESHOLD)
        .flat_map(|px| [px[0], px[1], px[2], 255])
        .collect();
    let budget = if transparent { colors.min(255) } else { colors };
    let palette = Palette::build(&opaque, budget, sample_factor(quality));

    #[allow(clippy::cast_possible_truncation)]
    let transparent_index = transparent.then(|| palette.len() as u8);
    let indices = rgba
        .chunks_exact(4)
        .map(|px| match transparent_index {
            Some(t) if px[3] < ALPHA_THRESHOLD => t,
            _ => palette.index_of([px[0], px[1], px[2], 255]),
        })
        .collect();

    let mut rgb = palette.rgb();
    if transparent {
        rgb.extend_from_slice(&[0, 0, 0]);
    }
    if rgb.is_empty() {
        rgb.extend_from_slice(&[0, 0, 0]);
    }
    IndexedFrame {
        palette: rgb,
        indices,
        transparent: transparent_index,
    }
}

/// Quantifie toutes les frames, sur le pool rayon si `parallel`.
#[must_use]
pub fn quantize_gif_frames(
    frames: &[Vec<u8>],
    colors: usize,
    quality: u8,
    reserve_transparent: bool,
    parallel: bool,
) -> Vec<IndexedFrame> {
    let one = |rgba: &Vec<u8>| quantize_gif_frame(rgba, colors, quality, reserve_transparent);
    if parallel {
        frames.par_iter().map(one).collect()
    } else {
        frames.iter().map(one).collect()
    }
}
