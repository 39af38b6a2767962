/// Exports des frames ASCII : re-rasterisation en pixels, encodage GIF et
/// APNG, snapshots SVG et texte, format JSON compact.

pub mod apng;
pub mod cache;
pub mod encoder;
pub mod error;
pub mod gif;
pub mod json;
pub mod quantize;
pub mod raster;
pub mod rasterizer;
pub mod svg;
pub mod text;

pub use cache::RenderCache;
pub use encoder::RasterEncoder;
pub use error::{CodecContext, CodecError, CodecErrorKind, ExportError};
pub use raster::RasterFrames;
pub use rasterizer::Rasterizer;
