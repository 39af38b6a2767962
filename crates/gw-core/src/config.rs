use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::color::sanitize_hex_color;
use crate::error::CoreError;
use crate::gradient::{DEFAULT_GRADIENT, Gradient, lookup};

/// Paramètres d'une conversion, figés pour la durée d'une requête.
///
/// Chaque filtre a une valeur neutre qui le désactive.
///
/// # Example
/// ```
/// use gw_core::config::ControlState;
/// let controls = ControlState::default();
/// assert_eq!(controls.characters, 100);
/// assert!(controls.is_neutral());
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ControlState {
    // === Grille ===
    /// Nombre de colonnes de glyphes (≥ 1).
    pub characters: u32,

    // === Photométrie (pourcentages, 100 = neutre) ===
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    /// Rotation de teinte en degrés, modulo 360.
    pub hue: f32,
    /// Mélanges [0, 100], 0 = neutre.
    pub grayscale: f32,
    pub sepia: f32,
    pub invert_colors: f32,
    /// Seuil binaire [0, 255]. 128 = désactivé.
    pub thresholding: u8,

    // === Noyaux spatiaux ===
    /// Force de netteté signée. 0 = désactivé.
    pub sharpness: f32,
    /// Force Sobel. ≤ 1 = désactivé.
    pub edge_detection: f32,

    // === Glyphes ===
    /// Probabilité [0, 1] de conserver un glyphe espace.
    pub space_density: f32,
    /// Nom d'un gradient de la table intégrée.
    pub selected_gradient: String,
    pub dithering_method: DitheringMethod,

    // === Animation ===
    /// Nombre maximal de frames conservées (≥ 1).
    pub animation_frame_limit: u32,
    /// Ne garde qu'une frame source sur N (≥ 1).
    pub animation_frame_skip: u32,
    /// Multiplicateur de vitesse (≥ 0.1).
    pub animation_playback_speed: f32,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            characters: 100,
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            hue: 0.0,
            grayscale: 0.0,
            sepia: 0.0,
            invert_colors: 0.0,
            thresholding: 128,
            sharpness: 0.0,
            edge_detection: 1.0,
            space_density: 1.0,
            selected_gradient: DEFAULT_GRADIENT.to_string(),
            dithering_method: DitheringMethod::None,
            animation_frame_limit: 150,
            animation_frame_skip: 1,
            animation_playback_speed: 1.0,
        }
    }
}

impl ControlState {
    /// Clamp all numeric fields to their valid ranges.
    /// Called after TOML deserialization and CLI overrides.
    pub fn clamp_all(&mut self) {
        self.characters = self.characters.clamp(1, 2000);
        self.brightness = non_negative(self.brightness, 100.0);
        self.contrast = non_negative(self.contrast, 100.0);
        self.saturation = non_negative(self.saturation, 100.0);
        self.hue = if self.hue.is_finite() {
            self.hue.rem_euclid(360.0)
        } else {
            0.0
        };
        self.grayscale = percent(self.grayscale);
        self.sepia = percent(self.sepia);
        self.invert_colors = percent(self.invert_colors);
        self.sharpness = finite_or(self.sharpness, 0.0).clamp(-20.0, 20.0);
        self.edge_detection = finite_or(self.edge_detection, 1.0).clamp(0.0, 20.0);
        self.space_density = finite_or(self.space_density, 1.0).clamp(0.0, 1.0);
        self.animation_frame_limit = self.animation_frame_limit.max(1);
        self.animation_frame_skip = self.animation_frame_skip.max(1);
        self.animation_playback_speed = finite_or(self.animation_playback_speed, 1.0).max(0.1);
        if lookup(&self.selected_gradient).is_none() {
            log::warn!(
                "Gradient inconnu '{}', utilisation de '{DEFAULT_GRADIENT}'.",
                self.selected_gradient
            );
            self.selected_gradient = DEFAULT_GRADIENT.to_string();
        }
    }

    /// Resolves `selected_gradient`.
    ///
    /// # Errors
    /// Retourne [`CoreError::UnknownGradient`] si le nom est inconnu.
    pub fn gradient(&self) -> Result<Gradient, CoreError> {
        Gradient::named(&self.selected_gradient)
    }

    /// True when every photometric and spatial filter sits at its neutral value.
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        #[allow(clippy::float_cmp)]
        let photometric = self.brightness == 100.0
            && self.contrast == 100.0
            && self.saturation == 100.0
            && self.hue == 0.0
            && self.grayscale <= 0.0
            && self.sepia <= 0.0
            && self.invert_colors <= 0.0;
        #[allow(clippy::float_cmp)]
        let spatial = self.sharpness == 0.0 && self.edge_detection <= 1.0;
        photometric && spatial && self.thresholding == 128
    }
}

fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() { v } else { fallback }
}

fn non_negative(v: f32, fallback: f32) -> f32 {
    finite_or(v, fallback).max(0.0)
}

fn percent(v: f32) -> f32 {
    finite_or(v, 0.0).clamp(0.0, 100.0)
}

/// Hooks de tramage. Aucun n'est implémenté : tous laissent l'image intacte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum DitheringMethod {
    #[default]
    None,
    FloydSteinberg,
    Atkinson,
    Ordered,
    JarvisJudiceNinke,
}

/// Thème des exports vectoriels et rasterisés.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Theme {
    /// Texte clair sur fond noir.
    #[default]
    Dark,
    /// Texte noir sur fond clair.
    Light,
}

impl Theme {
    /// Couleur de fond par défaut du thème.
    #[must_use]
    pub fn background(self) -> &'static str {
        match self {
            Self::Dark => "#000000",
            Self::Light => "#F6F6F6",
        }
    }

    /// Couleur de texte des glyphes sans couleur propre.
    #[must_use]
    pub fn foreground(self) -> &'static str {
        match self {
            Self::Dark => "#f6f6f6",
            Self::Light => "#000000",
        }
    }
}

/// Réglages d'export (GIF, APNG, SVG, JSON).
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExportSettings {
    /// Budget de couleurs GIF [2, 256].
    pub gif_colors: u16,
    /// Qualité GIF [60, 90].
    pub gif_quality: u8,
    /// Nombre de boucles. ≤ 0 = infini.
    pub repeat: i32,
    /// Réserver un index transparent (GIF) ou laisser le fond transparent.
    pub transparent_background: bool,
    /// Couleurs APNG. 0 = sans perte, sinon [1, 256].
    pub apng_colors: u16,
    pub theme: Theme,
    /// Couleur de fond explicite (`#RRGGBB`). `None` = couleur du thème.
    pub background_color: Option<String>,
    /// Police TrueType/OpenType pour la rasterisation. `None` = blocs pleins.
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    /// Largeur de cellule en pixels à l'échelle 1.
    pub char_width: f32,
    /// Hauteur de ligne en pixels à l'échelle 1.
    pub line_height: f32,
    /// Facteur d'échelle de la rasterisation (≥ 0.5).
    pub scale: f32,
    /// Compresser l'export JSON en gzip.
    pub json_gzip: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            gif_colors: 128,
            gif_quality: 60,
            repeat: 0,
            transparent_background: false,
            apng_colors: 0,
            theme: Theme::Dark,
            background_color: None,
            font_path: None,
            font_size: 10.0,
            char_width: 6.0,
            line_height: 10.0,
            scale: 1.0,
            json_gzip: false,
        }
    }
}

impl ExportSettings {
    pub fn clamp_all(&mut self) {
        self.gif_colors = self.gif_colors.clamp(2, 256);
        self.gif_quality = self.gif_quality.clamp(60, 90);
        self.repeat = self.repeat.max(-1);
        self.apng_colors = self.apng_colors.min(256);
        self.font_size = finite_or(self.font_size, 10.0).clamp(4.0, 96.0);
        self.char_width = finite_or(self.char_width, 6.0).clamp(1.0, 96.0);
        self.line_height = finite_or(self.line_height, 10.0).clamp(1.0, 96.0);
        self.scale = finite_or(self.scale, 1.0).clamp(0.5, 8.0);
        let fallback = self.theme.background();
        if let Some(bg) = self.background_color.as_mut() {
            *bg = sanitize_hex_color(bg, fallback);
        }
    }

    /// Fond effectif : couleur explicite, sinon celle du thème.
    #[must_use]
    pub fn effective_background(&self) -> String {
        self.background_color
            .clone()
            .unwrap_or_else(|| self.theme.background().to_string())
    }
}

/// Réglages de l'orchestrateur.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkerSettings {
    /// Délai maximal d'une requête, en millisecondes.
    pub timeout_ms: u64,
    /// Conservé pour les appelants ; les échecs d'encodage ne sont jamais rejoués.
    pub max_retries: u32,
    /// Relayer les notifications d'avancement.
    pub enable_progress: bool,
    /// Capacité du cache de parsing du rasterizer.
    pub cache_capacity: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            max_retries: 3,
            enable_progress: true,
            cache_capacity: 50,
        }
    }
}

impl WorkerSettings {
    pub fn clamp_all(&mut self) {
        self.timeout_ms = self.timeout_ms.max(1);
        self.cache_capacity = self.cache_capacity.max(1);
    }
}

/// Configuration complète de l'application.
///
/// # Example
/// ```
/// use gw_core::config::AppConfig;
/// let config = AppConfig::default();
/// assert_eq!(config.worker.timeout_ms, 300_000);
/// assert_eq!(config.export.gif_colors, 128);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    pub controls: ControlState,
    pub export: ExportSettings,
    pub worker: WorkerSettings,
}

impl AppConfig {
    pub fn clamp_all(&mut self) {
        self.controls.clamp_all();
        self.export.clamp_all();
        self.worker.clamp_all();
    }
}

/// Structure TOML intermédiaire, toutes sections optionnelles.
#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    controls: Option<ControlsSection>,
    animation: Option<AnimationSection>,
    export: Option<ExportSection>,
    worker: Option<WorkerSection>,
}

#[derive(Deserialize)]
struct ControlsSection {
    characters: Option<u32>,
    brightness: Option<f32>,
    contrast: Option<f32>,
    saturation: Option<f32>,
    hue: Option<f32>,
    grayscale: Option<f32>,
    sepia: Option<f32>,
    invert_colors: Option<f32>,
    thresholding: Option<u8>,
    sharpness: Option<f32>,
    edge_detection: Option<f32>,
    space_density: Option<f32>,
    gradient: Option<String>,
    dithering_method: Option<DitheringMethod>,
}

#[derive(Deserialize)]
struct AnimationSection {
    frame_limit: Option<u32>,
    frame_skip: Option<u32>,
    playback_speed: Option<f32>,
}

#[derive(Deserialize)]
struct ExportSection {
    gif_colors: Option<u16>,
    gif_quality: Option<u8>,
    repeat: Option<i32>,
    transparent_background: Option<bool>,
    apng_colors: Option<u16>,
    theme: Option<Theme>,
    background_color: Option<String>,
    font_path: Option<PathBuf>,
    font_size: Option<f32>,
    char_width: Option<f32>,
    line_height: Option<f32>,
    scale: Option<f32>,
    json_gzip: Option<bool>,
}

#[derive(Deserialize)]
struct WorkerSection {
    timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    enable_progress: Option<bool>,
    cache_capacity: Option<usize>,
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

/// Parse un document TOML et le fusionne avec les valeurs par défaut.
///
/// # Errors
/// Returns an error if the document is not valid TOML or has unknown sections.
///
/// # Example
/// ```
/// use gw_core::config::parse_config;
/// let config = parse_config("[controls]\ncharacters = 40\n").unwrap();
/// assert_eq!(config.controls.characters, 40);
/// assert_eq!(config.controls.brightness, 100.0);
/// ```
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let file: ConfigFile = toml::from_str(content).context("Erreur de parsing TOML")?;
    let mut config = AppConfig::default();

    if let Some(c) = file.controls {
        let t = &mut config.controls;
        merge(&mut t.characters, c.characters);
        merge(&mut t.brightness, c.brightness);
        merge(&mut t.contrast, c.contrast);
        merge(&mut t.saturation, c.saturation);
        merge(&mut t.hue, c.hue);
        merge(&mut t.grayscale, c.grayscale);
        merge(&mut t.sepia, c.sepia);
        merge(&mut t.invert_colors, c.invert_colors);
        merge(&mut t.thresholding, c.thresholding);
        merge(&mut t.sharpness, c.sharpness);
        merge(&mut t.edge_detection, c.edge_detection);
        merge(&mut t.space_density, c.space_density);
        merge(&mut t.selected_gradient, c.gradient);
        merge(&mut t.dithering_method, c.dithering_method);
    }
    if let Some(a) = file.animation {
        let t = &mut config.controls;
        merge(&mut t.animation_frame_limit, a.frame_limit);
        merge(&mut t.animation_frame_skip, a.frame_skip);
        merge(&mut t.animation_playback_speed, a.playback_speed);
    }
    if let Some(e) = file.export {
        let t = &mut config.export;
        merge(&mut t.gif_colors, e.gif_colors);
        merge(&mut t.gif_quality, e.gif_quality);
        merge(&mut t.repeat, e.repeat);
        merge(&mut t.transparent_background, e.transparent_background);
        merge(&mut t.apng_colors, e.apng_colors);
        merge(&mut t.theme, e.theme);
        if e.background_color.is_some() {
            t.background_color = e.background_color;
        }
        if e.font_path.is_some() {
            t.font_path = e.font_path;
        }
        merge(&mut t.font_size, e.font_size);
        merge(&mut t.char_width, e.char_width);
        merge(&mut t.line_height, e.line_height);
        merge(&mut t.scale, e.scale);
        merge(&mut t.json_gzip, e.json_gzip);
    }
    if let Some(w) = file.worker {
        let t = &mut config.worker;
        merge(&mut t.timeout_ms, w.timeout_ms);
        merge(&mut t.max_retries, w.max_retries);
        merge(&mut t.enable_progress, w.enable_progress);
        merge(&mut t.cache_capacity, w.cache_capacity);
    }

    config.clamp_all();
    Ok(config)
}

/// Charge un fichier TOML et fusionne avec les valeurs par défaut.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
///
/// # Example
/// ```no_run
/// use gw_core::config::load_config;
/// use std::path::Path;
/// let config = load_config(Path::new("glyphweave.toml")).unwrap();
/// ```
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Configuration invalide dans {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_overrides_defaults_and_clamps() {
        let toml = r##"
[controls]
hue = -90.0
grayscale = 250.0
gradient = "Blocks"

[animation]
frame_skip = 0
playback_speed = 0.0

[export]
gif_colors = 999
gif_quality = 10
background_color = "abc"
"##;
        let config = parse_config(toml).unwrap();
        assert!((config.controls.hue - 270.0).abs() < f32::EPSILON);
        assert!((config.controls.grayscale - 100.0).abs() < f32::EPSILON);
        assert_eq!(config.controls.selected_gradient, "Blocks");
        assert_eq!(config.controls.animation_frame_skip, 1);
        assert!((config.controls.animation_playback_speed - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.export.gif_colors, 256);
        assert_eq!(config.export.gif_quality, 60);
        assert_eq!(config.export.background_color.as_deref(), Some("#AABBCC"));
        assert_eq!(config.worker, WorkerSettings::default());
    }

    #[test]
    fn unknown_gradient_falls_back_to_default() {
        let config = parse_config("[controls]\ngradient = \"Nope\"\n").unwrap();
        assert_eq!(config.controls.selected_gradient, DEFAULT_GRADIENT);
    }

    #[test]
    fn unknown_section_is_rejected() {
        assert!(parse_config("[audio]\nsmoothing = 1.0\n").is_err());
    }

    #[test]
    fn load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\ntimeout_ms = 1500").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.worker.timeout_ms, 1500);
        assert!(load_config(Path::new("/definitely/missing.toml")).is_err());
    }

    #[test]
    fn shipped_file_matches_defaults() {
        let config = parse_config(include_str!("../../../glyphweave.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn default_controls_are_neutral() {
        let mut controls = ControlState::default();
        assert!(controls.is_neutral());
        controls.thresholding = 100;
        assert!(!controls.is_neutral());
    }
}
