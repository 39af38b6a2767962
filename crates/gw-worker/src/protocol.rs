//! Messages échangés entre l'orchestrateur et l'exécuteur.
//!
//! Forme sur le fil : `{"id": "...", "type": "...", "payload": {...}}`.
//! Toute requête porte un identifiant unique ; toute réponse reprend
//! l'identifiant de la requête qui l'a produite.

use std::fmt;

use gw_core::config::ControlState;
use gw_core::frame::{AnimationSequence, AsciiFrame, PixelBuffer};
use gw_core::traits::Progress;
use gw_export::apng::ApngOptions;
use gw_export::error::CodecError;
use gw_export::gif::GifOptions;
use gw_export::raster::RasterFrames;
use serde::{Deserialize, Serialize};

/// Identifiant d'une requête, de la forme `req_{n}_{epoch_ms}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Identifiant du `seq`-ième envoi, horodaté maintenant.
    ///
    /// # Example
    /// ```
    /// use gw_worker::protocol::RequestId;
    /// let id = RequestId::next(7);
    /// assert!(id.as_str().starts_with("req_7_"));
    /// ```
    #[must_use]
    pub fn next(seq: u64) -> Self {
        Self(format!("req_{seq}_{}", chrono::Utc::now().timestamp_millis()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Une requête adressée à l'exécuteur.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    #[serde(flatten)]
    pub payload: RequestPayload,
}

/// Types de requêtes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RequestPayload {
    /// Image fixe → texte colorisé.
    ConvertImage {
        image: PixelBuffer,
        controls: ControlState,
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Séquence décodée → frames ASCII.
    ConvertAnimation {
        sequence: AnimationSequence,
        controls: ControlState,
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Frames RGBA → GIF.
    ExportGif {
        frames: RasterFrames,
        options: GifOptions,
    },
    /// Frames RGBA → APNG.
    ExportApng {
        frames: RasterFrames,
        options: ApngOptions,
    },
    /// Annule une requête précise, ou toutes si `target` est absent.
    Cancel {
        #[serde(default)]
        target: Option<RequestId>,
    },
}

impl RequestPayload {
    /// Nom du type, pour les logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConvertImage { .. } => "ConvertImage",
            Self::ConvertAnimation { .. } => "ConvertAnimation",
            Self::ExportGif { .. } => "ExportGif",
            Self::ExportApng { .. } => "ExportApng",
            Self::Cancel { .. } => "Cancel",
        }
    }
}

/// Une réponse de l'exécuteur.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl Response {
    #[must_use]
    pub fn new(id: RequestId, payload: ResponsePayload) -> Self {
        Self { id, payload }
    }
}

/// Types de réponses.
///
/// `Complete` et `Error` sont finales. `Progress` est informative.
/// `StructuredError` précède toujours un `Error` pour la même requête.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ResponsePayload {
    Complete(JobOutput),
    Error { message: String },
    Progress(Progress),
    StructuredError(CodecError),
}

impl ResponsePayload {
    /// Vrai pour les réponses qui résolvent la requête.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

/// Résultat d'un job réussi.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum JobOutput {
    /// Texte colorisé d'une image fixe.
    Ascii { text: String },
    /// Frames ASCII d'une animation.
    Animation { frames: Vec<AsciiFrame> },
    /// Fichier encodé.
    Encoded { bytes: Vec<u8>, mime: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_shape_has_id_type_payload() {
        let req = Request {
            id: RequestId::from("req_1_0"),
            payload: RequestPayload::Cancel { target: None },
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["id"], "req_1_0");
        assert_eq!(value["type"], "Cancel");
        assert!(value["payload"].is_object());

        let back: Request = serde_json::from_value(value).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn response_wire_shape() {
        let resp = Response::new(
            RequestId::from("req_2_0"),
            ResponsePayload::Error {
                message: "boom".to_string(),
            },
        );
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["type"], "Error");
        assert_eq!(value["payload"]["message"], "boom");
        assert!(resp.payload.is_final());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = r#"{"id":"x","type":"Explode","payload":{}}"#;
        assert!(serde_json::from_str::<Request>(raw).is_err());
    }

    #[test]
    fn ids_are_distinct_per_sequence_number() {
        assert_ne!(RequestId::next(1), RequestId::next(2));
    }
}
