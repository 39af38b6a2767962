use serde::{Deserialize, Serialize};

use crate::error::{CodecContext, CodecError, estimate_memory_mb};

/// Frames RGBA prêtes à encoder, toutes en `width × height`.
///
/// C'est la charge utile des requêtes d'export : la taille de chaque
/// frame est validée avant tout encodage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterFrames {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<Vec<u8>>,
    /// Délai de chaque frame, en millisecondes.
    pub delays: Vec<u32>,
}

impl RasterFrames {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frames: Vec::new(),
            delays: Vec::new(),
        }
    }

    pub fn push(&mut self, rgba: Vec<u8>, delay_ms: u32) {
        self.frames.push(rgba);
        self.delays.push(delay_ms);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Taille attendue d'une frame, en octets.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    #[must_use]
    pub fn estimated_memory_mb(&self) -> f64 {
        estimate_memory_mb(self.len(), self.width, self.height)
    }

    /// Délai de la frame `i`, 0 si absent.
    #[must_use]
    pub fn delay(&self, i: usize) -> u32 {
        self.delays.get(i).copied().unwrap_or(0)
    }

    /// Vérifie dimensions et tailles de frames.
    ///
    /// # Errors
    /// Returns a validation [`CodecError`] for empty input, zero or
    /// oversized dimensions, or the first frame whose length differs
    /// from `width * height * 4`.
    ///
    /// # Example
    /// ```
    /// use gw_export::raster::RasterFrames;
    /// use gw_export::error::CodecContext;
    /// let mut frames = RasterFrames::new(2, 2);
    /// frames.push(vec![0; 16], 100);
    /// frames.push(vec![0; 15], 100);
    /// let err = frames.validate(&CodecContext::default()).unwrap_err();
    /// assert_eq!(err.message, "Frame 1 has invalid size (15 bytes, expected 16)");
    /// ```
    pub fn validate(&self, context: &CodecContext) -> Result<(), CodecError> {
        if self.is_empty() {
            return Err(CodecError::validation(
                "invalid export: no frames",
                context.clone(),
            ));
        }
        if self.width == 0 || self.height == 0 || self.width > 0xFFFF || self.height > 0xFFFF {
            return Err(CodecError::validation(
                format!("invalid dimensions {}x{}", self.width, self.height),
                context.clone(),
            ));
        }
        let expected = self.frame_len();
        for (i, frame) in self.frames.iter().enumerate() {
            if frame.len() != expected {
                return Err(CodecError::validation(
                    format!(
                        "Frame {i} has invalid size ({} bytes, expected {expected})",
                        frame.len()
                    ),
                    context.clone(),
                ));
            }
        }
        Ok(())
    }
}

/// Vrai si un pixel au moins n'est pas opaque.
#[must_use]
pub fn has_transparent_pixels(rgba: &[u8]) -> bool {
    rgba.chunks_exact(4).any(|px| px[3] < 255)
}
