//! Taxonomie des échecs d'encodage.

use std::any::Any;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Catégorie d'un échec d'encodage, déduite du texte de l'erreur.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecErrorKind {
    /// Panique ou état impossible dans le codec.
    Unreachable,
    OutOfMemory,
    Timeout,
    /// Entrée rejetée avant encodage.
    Validation,
    Unknown,
}

impl CodecErrorKind {
    /// Classe un message par mots-clés, dans cet ordre de priorité :
    /// `unreachable`, `memory`, `timeout`/`timed out`, `invalid`/`validation`.
    ///
    /// # Example
    /// ```
    /// use gw_export::error::CodecErrorKind;
    /// assert_eq!(CodecErrorKind::classify("out of memory"), CodecErrorKind::OutOfMemory);
    /// assert_eq!(CodecErrorKind::classify("Invalid frame"), CodecErrorKind::Validation);
    /// assert_eq!(CodecErrorKind::classify("boom"), CodecErrorKind::Unknown);
    /// ```
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let msg = message.to_lowercase();
        if msg.contains("unreachable") {
            Self::Unreachable
        } else if msg.contains("memory") {
            Self::OutOfMemory
        } else if msg.contains("timeout") || msg.contains("timed out") {
            Self::Timeout
        } else if msg.contains("invalid") || msg.contains("validation") {
            Self::Validation
        } else {
            Self::Unknown
        }
    }
}

/// Paramètres de l'export au moment de l'échec.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CodecContext {
    pub frame_count: Option<usize>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
    pub estimated_memory_mb: Option<f64>,
    pub operation: Option<String>,
}

impl CodecContext {
    /// Contexte d'un export de `frame_count` frames `width × height`.
    #[must_use]
    pub fn new(operation: &str, frame_count: usize, width: u32, height: u32) -> Self {
        Self {
            frame_count: Some(frame_count),
            width: Some(width),
            height: Some(height),
            quality: None,
            estimated_memory_mb: Some(estimate_memory_mb(frame_count, width, height)),
            operation: Some(operation.to_string()),
        }
    }

    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }
}

/// Mémoire brute des frames RGBA, en MiB.
///
/// # Example
/// ```
/// use gw_export::error::estimate_memory_mb;
/// assert_eq!(estimate_memory_mb(4, 512, 512), 4.0);
/// ```
#[must_use]
pub fn estimate_memory_mb(frame_count: usize, width: u32, height: u32) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let frames = frame_count as f64;
    frames * f64::from(width) * f64::from(height) * 4.0 / (1024.0 * 1024.0)
}

/// Échec d'encodage classé et contextualisé.
#[derive(Error, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct CodecError {
    pub kind: CodecErrorKind,
    pub message: String,
    pub context: CodecContext,
    /// Millisecondes depuis l'epoch Unix.
    pub timestamp: i64,
}

impl CodecError {
    /// Classe `message` et l'horodate.
    #[must_use]
    pub fn classify(message: impl Into<String>, context: CodecContext) -> Self {
        let message = message.into();
        Self {
            kind: CodecErrorKind::classify(&message),
            message,
            context,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Erreur de validation d'entrée, quel que soit son texte.
    #[must_use]
    pub fn validation(message: impl Into<String>, context: CodecContext) -> Self {
        Self {
            kind: CodecErrorKind::Validation,
            ..Self::classify(message, context)
        }
    }

    /// Panique capturée dans un codec.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send), context: CodecContext) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        Self {
            kind: CodecErrorKind::Unreachable,
            ..Self::classify(format!("unreachable: {detail}"), context)
        }
    }

    /// Pistes de remédiation, selon la catégorie et le contexte.
    #[must_use]
    pub fn suggestions(&self) -> Vec<String> {
        let ctx = &self.context;
        let mut out = Vec::new();
        let frames = ctx.frame_count.filter(|&n| n > 0);
        let dims = ctx.width.zip(ctx.height).filter(|&(w, h)| w > 0 && h > 0);
        match self.kind {
            CodecErrorKind::Unreachable => {
                if let Some(n) = frames {
                    out.push(format!("reduce frame count (currently {n})"));
                }
                if let Some((w, h)) = dims {
                    out.push(format!("reduce character count (currently {w}×{h})"));
                }
                if let Some(q) = ctx.quality.filter(|&q| q > 0) {
                    out.push(format!("lower quality setting (currently {q})"));
                }
            }
            CodecErrorKind::OutOfMemory | CodecErrorKind::Timeout => {
                if let Some(n) = frames {
                    out.push(format!("reduce frame count (currently {n})"));
                }
                if let Some((w, h)) = dims {
                    out.push(format!("reduce dimensions (currently {w}×{h})"));
                }
            }
            CodecErrorKind::Validation | CodecErrorKind::Unknown => {}
        }
        out
    }

    /// Message lisible, suivi des suggestions (`\n\nTry: a, b.`).
    ///
    /// # Example
    /// ```
    /// use gw_export::error::{CodecContext, CodecError};
    /// let err = CodecError::classify("wasm unreachable", CodecContext::new("GIF Export", 3, 80, 40));
    /// assert_eq!(
    ///     err.user_message(),
    ///     "GIF encoding failed: The animation is too complex for the encoder.\n\n\
    ///      Try: reduce frame count (currently 3), reduce character count (currently 80×40)."
    /// );
    /// ```
    #[must_use]
    pub fn user_message(&self) -> String {
        let mut message = match self.kind {
            CodecErrorKind::Unreachable => {
                "GIF encoding failed: The animation is too complex for the encoder.".to_string()
            }
            CodecErrorKind::OutOfMemory => {
                "Out of memory: The animation requires too much memory to encode.".to_string()
            }
            CodecErrorKind::Timeout => {
                "Encoding timed out: The operation took too long.".to_string()
            }
            CodecErrorKind::Validation | CodecErrorKind::Unknown => self.message.clone(),
        };
        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            let _ = write!(message, "\n\nTry: {}.", suggestions.join(", "));
        }
        message
    }
}

/// Issue d'un export interrompu.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Le jeton d'annulation a été déclenché entre deux frames.
    #[error("Export annulé")]
    Cancelled,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panics_are_unreachable() {
        let payload: Box<dyn Any + Send> = Box::new("index out of bounds");
        let err = CodecError::from_panic(payload.as_ref(), CodecContext::default());
        assert_eq!(err.kind, CodecErrorKind::Unreachable);
        assert!(err.message.contains("index out of bounds"));
    }

    #[test]
    fn memory_wins_over_timeout() {
        assert_eq!(
            CodecErrorKind::classify("memory allocation timed out"),
            CodecErrorKind::OutOfMemory
        );
        assert_eq!(CodecErrorKind::classify("Timed out"), CodecErrorKind::Timeout);
    }

    #[test]
    fn validation_keeps_raw_message() {
        let ctx = CodecContext::new("GIF Export", 2, 10, 10).with_quality(70);
        let err = CodecError::validation("Frame 1 has invalid size", ctx);
        assert_eq!(err.user_message(), "Frame 1 has invalid size");
    }

    #[test]
    fn out_of_memory_suggests_smaller_dimensions() {
        let ctx = CodecContext::new("APNG Export", 500, 1920, 1080);
        let err = CodecError::classify("memory allocation failed", ctx);
        assert!(err.user_message().starts_with("Out of memory"));
        assert!(err.user_message().ends_with("reduce dimensions (currently 1920×1080)."));
    }

    #[test]
    fn serializes_for_the_wire() {
        let err = CodecError::classify("timeout", CodecContext::default());
        let json = serde_json::to_string(&err).unwrap();
        let back: CodecError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, CodecErrorKind::Timeout);
    }
}
