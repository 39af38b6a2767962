use gw_core::error::CoreError;
use thiserror::Error;

/// Errors raised while turning source bytes into frames.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Zero-length or unreadable container.
    #[error("Invalid or empty {format} file")]
    Empty {
        /// "GIF", "APNG" or "image".
        format: &'static str,
    },

    /// Every decode path produced zero frames.
    #[error("No frames found in {format} file")]
    NoFrames {
        /// "GIF" or "APNG".
        format: &'static str,
    },

    /// The bytes could not be decoded as an image at all.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<image::ImageError> for SourceError {
    fn from(e: image::ImageError) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<::gif::DecodingError> for SourceError {
    fn from(e: ::gif::DecodingError) -> Self {
        Self::Decode(e.to_string())
    }
}
