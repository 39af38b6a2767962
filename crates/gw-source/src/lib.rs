/// Décodage des sources : images fixes, GIF et APNG animés, et
/// redimensionnement vers la grille de glyphes.

pub mod apng;
pub mod detect;
pub mod error;
pub mod extract;
pub mod gif;
pub mod image;
pub mod resize;
pub mod sampler;

pub use detect::{AnimationKind, detect};
pub use error::SourceError;
pub use extract::{extract, extract_apng, extract_gif};
pub use resize::{Resizer, grid_dimensions};
