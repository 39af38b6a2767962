/// Pixel → glyph conversion: photometric and spatial filters, dithering
/// hooks, luminance-to-glyph mapping and the colorized markup format.

pub mod dither;
pub mod filters;
pub mod glyph;
pub mod markup;

pub use filters::{FilterPipeline, FilteredFrame};
pub use glyph::GlyphMapper;
pub use markup::{GlyphToken, TokenGrid};
