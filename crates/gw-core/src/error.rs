use thiserror::Error;

/// Errors originating from the core module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid configuration value or structure.
    #[error("Configuration invalide : {0}")]
    Config(String),

    /// Invalid width/height dimensions.
    #[error("Dimensions invalides : {width}×{height}")]
    InvalidDimensions {
        /// Width value.
        width: u32,
        /// Height value.
        height: u32,
    },

    /// RGBA byte length does not match `width * height * 4`.
    #[error("Taille de buffer invalide : {actual} bytes, attendu {expected}")]
    BufferSize {
        /// Expected byte length.
        expected: usize,
        /// Byte length actually provided.
        actual: usize,
    },

    /// A frame pushed into a sequence does not share its dimensions.
    #[error("Frame {actual_width}×{actual_height} incompatible avec la séquence {width}×{height}")]
    FrameMismatch {
        /// Sequence width.
        width: u32,
        /// Sequence height.
        height: u32,
        /// Offending frame width.
        actual_width: u32,
        /// Offending frame height.
        actual_height: u32,
    },

    /// Gradient name not present in the built-in table.
    #[error("Gradient inconnu : {0}")]
    UnknownGradient(String),
}
