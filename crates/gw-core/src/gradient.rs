use crate::error::CoreError;

/// Gradient par défaut des `ControlState`.
pub const DEFAULT_GRADIENT: &str = "Standard";

/// Gradients nommés, ordonnés du plus sombre au plus clair.
pub const GRADIENTS: &[(&str, &str)] = &[
    (
        "Extended High",
        " .'`^\",:;Il!i><~+_-?][}{1)(|\\/tfjrxnuvczXYUJCLQ0OZmwqpdbkhao*#MW&8%B@$",
    ),
    ("Standard", " .:-=+*#%@"),
    ("Blocks", " ░▒▓█"),
    ("Simple", " .-+*#@"),
    (
        "Detailed",
        " .`-_':,;^=+/\"|)\\<>)iv%xclrs{*}I?!][1taeo7zjLunT#JCwfy325Fh9kP6qpdbEAmg04AGD@XROS8B&QNMW",
    ),
    ("Short Dense", " .:oO8@"),
    ("Binary", " .01"),
    ("Minimal", " .:=#"),
    ("Numbers", " 1234567890"),
    ("Letters", " abcdefghijklm"),
    ("donut.c", " .,-~:;=!*#$@"),
    ("Box Drawing", " ─│┌┐└┘├┤┬┴┼╔╗╚╝╠╣╦╩╬█"),
    ("ASCII Art", " .,;:clodxkO0KXNWM"),
    ("Braille", " ⠁⠃⠇⠋⠛⠿"),
    ("Kalmix Gradient", " kalmix.,:;iIl!+*%$@"),
];

/// Looks up a named gradient.
///
/// # Example
/// ```
/// use gw_core::gradient::lookup;
/// assert_eq!(lookup("Standard"), Some(" .:-=+*#%@"));
/// assert_eq!(lookup("nope"), None);
/// ```
#[must_use]
pub fn lookup(name: &str) -> Option<&'static str> {
    GRADIENTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, glyphs)| *glyphs)
}

/// Gradient décodé en `char`s, prêt pour le mapping luma → glyphe.
///
/// # Example
/// ```
/// use gw_core::gradient::Gradient;
/// let g = Gradient::new(" .:#@");
/// assert_eq!(g.glyph_for_luma(0.0), ' ');
/// assert_eq!(g.glyph_for_luma(255.0), '@');
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gradient {
    glyphs: Vec<char>,
}

impl Gradient {
    /// Builds a gradient from an ordered glyph string. An empty string
    /// degrades to a single space.
    #[must_use]
    pub fn new(glyphs: &str) -> Self {
        let glyphs: Vec<char> = glyphs.chars().collect();
        if glyphs.is_empty() {
            return Self { glyphs: vec![' '] };
        }
        Self { glyphs }
    }

    /// Gradient nommé.
    ///
    /// # Errors
    /// Retourne [`CoreError::UnknownGradient`] si le nom est absent de la table.
    pub fn named(name: &str) -> Result<Self, CoreError> {
        lookup(name)
            .map(Self::new)
            .ok_or_else(|| CoreError::UnknownGradient(name.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    #[must_use]
    pub fn glyphs(&self) -> &[char] {
        &self.glyphs
    }

    /// `floor(luma / 255 * (len - 1))`, borné à la longueur.
    #[inline(always)]
    #[must_use]
    pub fn index_for_luma(&self, luma: f64) -> usize {
        let max = self.glyphs.len() - 1;
        let idx = (luma / 255.0 * max as f64).floor();
        if idx <= 0.0 {
            0
        } else {
            (idx as usize).min(max)
        }
    }

    #[inline(always)]
    #[must_use]
    pub fn glyph_for_luma(&self, luma: f64) -> char {
        self.glyphs[self.index_for_luma(luma)]
    }

    /// Glyphe de remplacement des espaces : le second glyphe, sinon `'.'`.
    #[must_use]
    pub fn space_fallback(&self) -> char {
        self.glyphs.get(1).copied().unwrap_or('.')
    }
}
