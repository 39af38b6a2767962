//! Format texte des frames ASCII colorisées.
//!
//! Chaque glyphe est émis comme `<span style="color: rgb(r, g, b)">c</span>`,
//! chaque rangée se termine par `\n`. `<`, `>` et `&` sont échappés en entités.

use gw_core::color::{parse_hex_color, parse_rgb, rgb_string};

const SPAN_OPEN: &str = "<span style=\"color: ";
const SPAN_MID: &str = "\">";
const SPAN_CLOSE: &str = "</span>";

/// Forme échappée d'un glyphe, s'il en a une.
#[inline]
#[must_use]
pub fn escape_glyph(ch: char) -> Option<&'static str> {
    match ch {
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '&' => Some("&amp;"),
        _ => None,
    }
}

/// Ajoute un span coloré à `out`.
///
/// # Example
/// ```
/// use gw_ascii::markup::push_span;
/// let mut out = String::new();
/// push_span(&mut out, '<', (1, 2, 3));
/// assert_eq!(out, "<span style=\"color: rgb(1, 2, 3)\">&lt;</span>");
/// ```
pub fn push_span(out: &mut String, ch: char, rgb: (u8, u8, u8)) {
    out.push_str(SPAN_OPEN);
    out.push_str(&rgb_string(rgb.0, rgb.1, rgb.2));
    out.push_str(SPAN_MID);
    match escape_glyph(ch) {
        Some(entity) => out.push_str(entity),
        None => out.push(ch),
    }
    out.push_str(SPAN_CLOSE);
}

/// Décode les entités produites par [`escape_glyph`] (plus `&quot;`).
#[must_use]
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// Supprime toutes les balises (`<[^>]+>`) puis décode les entités.
///
/// # Example
/// ```
/// use gw_ascii::markup::strip_tags;
/// let text = "<span style=\"color: rgb(0, 0, 0)\">&amp;</span>\n";
/// assert_eq!(strip_tags(text), "&\n");
/// ```
#[must_use]
pub fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len() / 8);
    let mut rest = text;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('>') {
            // `<>` is not a tag for `<[^>]+>`.
            Some(0) => {
                out.push_str("<>");
                rest = &after[1..];
            }
            Some(close) => rest = &after[close + 1..],
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    decode_entities(&out)
}

/// Un glyphe et sa couleur CSS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlyphToken {
    pub ch: char,
    /// Couleur telle qu'écrite dans le markup.
    pub color: String,
    /// Couleur décodée (`rgb(...)` ou hexadécimal), si reconnue.
    pub rgb: Option<(u8, u8, u8)>,
}

impl GlyphToken {
    #[must_use]
    pub fn new(ch: char, color: &str) -> Self {
        let rgb = parse_rgb(color).or_else(|| {
            color
                .trim()
                .starts_with('#')
                .then(|| parse_hex_color(color))
        });
        Self {
            ch,
            color: color.to_string(),
            rgb,
        }
    }
}

/// Grille de tokens issue du parsing d'une frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenGrid {
    /// Une entrée par ligne contenant au moins un span.
    pub lines: Vec<Vec<GlyphToken>>,
}

impl TokenGrid {
    /// Parse le markup d'une frame. Les lignes sans span sont ignorées.
    ///
    /// # Example
    /// ```
    /// use gw_ascii::markup::{push_span, TokenGrid};
    /// let mut text = String::new();
    /// push_span(&mut text, '#', (255, 0, 0));
    /// push_span(&mut text, ' ', (0, 0, 0));
    /// text.push('\n');
    /// text.push('\n');
    /// let grid = TokenGrid::parse(&text);
    /// assert_eq!(grid.height(), 1);
    /// assert_eq!(grid.width(), 2);
    /// assert_eq!(grid.lines[0][0].rgb, Some((255, 0, 0)));
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let lines = text
            .split('\n')
            .map(parse_line)
            .filter(|tokens| !tokens.is_empty())
            .collect();
        Self { lines }
    }

    /// Longueur de la plus longue ligne, en glyphes.
    #[must_use]
    pub fn width(&self) -> usize {
        self.lines.iter().map(Vec::len).max().unwrap_or(0)
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Texte brut de la grille, une ligne par rangée.
    #[must_use]
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.extend(line.iter().map(|t| t.ch));
            out.push('\n');
        }
        out
    }
}

fn parse_line(line: &str) -> Vec<GlyphToken> {
    let mut tokens = Vec::new();
    let mut rest = line;
    while let Some(start) = rest.find(SPAN_OPEN) {
        rest = &rest[start + SPAN_OPEN.len()..];
        let Some(mid) = rest.find(SPAN_MID) else {
            break;
        };
        let color = &rest[..mid];
        rest = &rest[mid + SPAN_MID.len()..];
        let Some(close) = rest.find(SPAN_CLOSE) else {
            break;
        };
        let content = decode_entities(&rest[..close]);
        rest = &rest[close + SPAN_CLOSE.len()..];

        let mut chars = content.chars();
        let ch = chars.next().unwrap_or(' ');
        if chars.next().is_some() {
            // Un span ne porte qu'un glyphe.
            continue;
        }
        tokens.push(GlyphToken::new(ch, color));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_multi_glyph_spans_and_keeps_order() {
        let text = "<span style=\"color: rgb(1, 2, 3)\">a</span>\
                    <span style=\"color: rgb(4, 5, 6)\">bc</span>\
                    <span style=\"color: #ff0000\">&gt;</span>";
        let grid = TokenGrid::parse(text);
        assert_eq!(grid.lines.len(), 1);
        let line = &grid.lines[0];
        assert_eq!(line.len(), 2);
        assert_eq!(line[0].ch, 'a');
        assert_eq!(line[1].ch, '>');
        assert_eq!(line[1].rgb, Some((255, 0, 0)));
    }

    #[test]
    fn strip_tags_handles_unclosed_markup() {
        assert_eq!(strip_tags("a<b"), "a<b");
        assert_eq!(strip_tags("<i>x</i>y"), "xy");
    }

    #[test]
    fn plain_text_matches_strip_tags() {
        let mut text = String::new();
        for ch in ['&', '<', ' '] {
            push_span(&mut text, ch, (9, 9, 9));
        }
        text.push('\n');
        assert_eq!(TokenGrid::parse(&text).plain_text(), strip_tags(&text));
    }
}
