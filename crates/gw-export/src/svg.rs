//! Snapshot vectoriel d'une frame ASCII.

use std::fmt::Write as _;

use gw_ascii::markup::TokenGrid;
use gw_core::color::rgb_string;
use gw_core::config::{ExportSettings, Theme};

const FONT_FAMILY: &str = "'Inconsolata', monospace";

/// Paramètres du rendu SVG.
#[derive(Clone, Debug, PartialEq)]
pub struct SvgOptions {
    pub theme: Theme,
    pub transparent_background: bool,
    /// Fond explicite ; sinon celui du thème.
    pub background_color: Option<String>,
    pub char_width: f32,
    pub line_height: f32,
    pub font_size: f32,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self::from(&ExportSettings::default())
    }
}

impl From<&ExportSettings> for SvgOptions {
    fn from(s: &ExportSettings) -> Self {
        Self {
            theme: s.theme,
            transparent_background: s.transparent_background,
            background_color: s.background_color.clone(),
            char_width: s.char_width,
            line_height: s.line_height,
            font_size: s.font_size,
        }
    }
}

/// Document SVG et ses dimensions logiques.
#[derive(Clone, Debug, PartialEq)]
pub struct SvgDocument {
    pub svg: String,
    pub width: f32,
    pub height: f32,
}

/// Échappe un glyphe pour le contenu d'un élément `<text>`.
#[must_use]
pub fn escape_for_svg(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Construit le SVG d'une frame. `None` si le texte ne contient aucun glyphe.
///
/// Un élément `<text>` par glyphe non blanc, positionné sur la grille
/// `char_width × line_height`.
///
/// # Example
/// ```
/// use gw_export::svg::{build_svg, SvgOptions};
/// let ascii = "<span style=\"color: rgb(255, 0, 0)\">&lt;</span>\n";
/// let doc = build_svg(ascii, &SvgOptions::default()).unwrap();
/// assert_eq!((doc.width, doc.height), (6.0, 10.0));
/// assert!(doc.svg.contains("fill=\"rgb(255, 0, 0)\">&lt;</text>"));
/// assert!(doc.svg.contains("<rect width=\"6\" height=\"10\" fill=\"#000000\"/>"));
/// ```
#[must_use]
pub fn build_svg(ascii: &str, options: &SvgOptions) -> Option<SvgDocument> {
    let grid = TokenGrid::parse(ascii);
    if grid.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let (cols, rows) = (grid.width() as f32, grid.height() as f32);
    let width = (options.char_width * cols).max(1.0);
    let height = (options.line_height * rows).max(1.0);

    let mut svg = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = write!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" \
         viewBox=\"0 0 {width} {height}\" shape-rendering=\"crispEdges\">"
    );
    if !options.transparent_background {
        let fill = options
            .background_color
            .as_deref()
            .unwrap_or_else(|| options.theme.background());
        let _ = write!(
            svg,
            "\n<rect width=\"{width}\" height=\"{height}\" fill=\"{fill}\"/>"
        );
    }
    let _ = write!(
        svg,
        "\n<style>\ntext {{\n\tfont-family: {FONT_FAMILY};\n\tfont-size: {}px;\n\t\
         font-weight: 400;\n\twhite-space: pre;\n}}\n</style>",
        options.font_size
    );

    let default_fill = options.theme.foreground();
    for (row, line) in grid.lines.iter().enumerate() {
        for (column, token) in line.iter().enumerate() {
            if token.ch == ' ' {
                continue;
            }
            let fill = token
                .rgb
                .map_or_else(|| default_fill.to_string(), |(r, g, b)| rgb_string(r, g, b));
            #[allow(clippy::cast_precision_loss)]
            let (x, y) = (
                column as f32 * options.char_width,
                row as f32 * options.line_height,
            );
            let _ = write!(
                svg,
                "\n<text x=\"{x}\" y=\"{y}\" dominant-baseline=\"hanging\" fill=\"{fill}\">{}</text>",
                escape_for_svg(token.ch.encode_utf8(&mut [0; 4]))
            );
        }
    }
    svg.push_str("\n</svg>");

    Some(SvgDocument { svg, width, height })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_ascii::markup::push_span;

    #[test]
    fn spaces_are_skipped_and_positions_follow_the_grid() {
        let mut ascii = String::new();
        push_span(&mut ascii, 'a', (1, 2, 3));
        push_span(&mut ascii, ' ', (1, 2, 3));
        push_span(&mut ascii, 'b', (4, 5, 6));
        ascii.push('\n');
        push_span(&mut ascii, '"', (7, 8, 9));
        ascii.push('\n');

        let doc = build_svg(&ascii, &SvgOptions::default()).unwrap();
        assert_eq!(doc.svg.matches("<text ").count(), 3);
        assert!(doc.svg.contains("<text x=\"12\" y=\"0\""));
        assert!(doc.svg.contains("<text x=\"0\" y=\"10\""));
        assert!(doc.svg.contains("&quot;</text>"));
        assert!(doc.svg.ends_with("\n</svg>"));
    }

    #[test]
    fn transparent_background_has_no_rect() {
        let opts = SvgOptions {
            transparent_background: true,
            ..SvgOptions::default()
        };
        let doc = build_svg("<span style=\"color: red\">x</span>", &opts).unwrap();
        assert!(!doc.svg.contains("<rect"));
        assert!(doc.svg.contains("fill=\"#f6f6f6\">x</text>"));
    }

    #[test]
    fn plain_text_has_no_document() {
        assert!(build_svg("no markup here\n", &SvgOptions::default()).is_none());
    }
}
