//! Format JSON compact des animations ASCII.
//!
//! ```text
//! { "v": "1.0.0", "n": nom, "m": { "f": frames, "d": durée ms, "t": RFC 3339 },
//!   "p": { clé: "#rrggbb" }, "d": délai commun?, "fr": [...] }
//! ```
//!
//! Les couleurs sont dédupliquées dans une palette globale à clés d'un
//! caractère (`a-z`, `A-Z`, `0-9`) ; chaque span devient `<s c="k">c</s>`.
//! Au-delà de 62 couleurs, les suivantes restent en hexadécimal.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use gw_ascii::markup::{TokenGrid, escape_glyph};
use gw_core::color::rgb_to_hex;
use gw_core::frame::AsciiFrame;
use serde::{Deserialize, Serialize};

/// Version du format.
pub const FORMAT_VERSION: &str = "1.0.0";
const PALETTE_KEYS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationMeta {
    /// Nombre de frames.
    pub f: usize,
    /// Durée totale en millisecondes.
    pub d: u64,
    /// Horodatage de l'export.
    pub t: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedFrame {
    pub c: String,
    pub d: u32,
}

/// Frames : contenu seul si tous les délais sont égaux, sinon avec délai.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameList {
    Uniform(Vec<String>),
    Timed(Vec<TimedFrame>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationJson {
    pub v: String,
    pub n: String,
    pub m: AnimationMeta,
    pub p: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<u32>,
    pub fr: FrameList,
}

/// Délai commun à toutes les frames, s'il existe.
#[must_use]
pub fn common_delay(frames: &[AsciiFrame]) -> Option<u32> {
    let first = frames.first()?.delay_ms;
    frames.iter().all(|f| f.delay_ms == first).then_some(first)
}

/// Palette globale couleur hex → clé, dans l'ordre d'apparition.
struct PaletteBuilder {
    keys: HashMap<String, char>,
}

impl PaletteBuilder {
    fn new() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    /// Clé de `hex`, ou `hex` lui-même si la palette est pleine.
    fn key(&mut self, hex: String) -> String {
        if let Some(&k) = self.keys.get(&hex) {
            return k.to_string();
        }
        match PALETTE_KEYS.get(self.keys.len()) {
            Some(&k) => {
                let k = char::from(k);
                self.keys.insert(hex, k);
                k.to_string()
            }
            None => hex,
        }
    }

    fn into_map(self) -> BTreeMap<String, String> {
        self.keys
            .into_iter()
            .map(|(hex, k)| (k.to_string(), hex))
            .collect()
    }
}

fn compact_frame(ascii: &str, palette: &mut PaletteBuilder) -> String {
    let mut lines = Vec::new();
    for raw in ascii.split('\n') {
        let mut line = String::new();
        for token in TokenGrid::parse(raw).lines.into_iter().flatten() {
            let color = match token.rgb {
                Some((r, g, b)) => palette.key(rgb_to_hex(r, g, b)),
                None => token.color.clone(),
            };
            line.push_str("<s c=\"");
            line.push_str(&color);
            line.push_str("\">");
            match escape_glyph(token.ch) {
                Some(entity) => line.push_str(entity),
                None => line.push(token.ch),
            }
            line.push_str("</s>");
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Construit le document JSON compact de `frames`.
///
/// # Example
/// ```
/// use gw_core::frame::AsciiFrame;
/// use gw_export::json::{build_animation_json, FrameList};
///
/// let a = "<span style=\"color: rgb(255, 0, 0)\">#</span>\n".to_string();
/// let doc = build_animation_json(&[AsciiFrame::new(a.clone(), 80), AsciiFrame::new(a, 80)], "cat");
/// assert_eq!(doc.d, Some(80));
/// assert_eq!(doc.m.d, 160);
/// assert_eq!(doc.p["a"], "#ff0000");
/// assert_eq!(doc.fr, FrameList::Uniform(vec!["<s c=\"a\">#</s>\n".into(); 2]));
/// ```
#[must_use]
pub fn build_animation_json(frames: &[AsciiFrame], name: &str) -> AnimationJson {
    let mut palette = PaletteBuilder::new();
    let contents: Vec<String> = frames
        .iter()
        .map(|f| compact_frame(&f.text, &mut palette))
        .collect();

    let delay = common_delay(frames);
    let fr = if delay.is_some() {
        FrameList::Uniform(contents)
    } else {
        FrameList::Timed(
            contents
                .into_iter()
                .zip(frames)
                .map(|(c, f)| TimedFrame { c, d: f.delay_ms })
                .collect(),
        )
    };

    AnimationJson {
        v: FORMAT_VERSION.to_string(),
        n: name.to_string(),
        m: AnimationMeta {
            f: frames.len(),
            d: frames.iter().map(|f| u64::from(f.delay_ms)).sum(),
            t: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        },
        p: palette.into_map(),
        d: delay,
        fr,
    }
}

/// Sérialise le document, compressé en gzip si demandé.
///
/// # Errors
/// Returns an error if serialization or compression fails.
pub fn to_bytes(doc: &AnimationJson, gzip: bool) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(doc).context("Sérialisation JSON impossible")?;
    if !gzip {
        return Ok(json);
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .context("Compression gzip impossible")?;
    encoder.finish().context("Compression gzip impossible")
}
