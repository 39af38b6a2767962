use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use gw_core::config::AppConfig;

/// glyphweave : images et animations GIF/APNG en ASCII colorisé.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Source : PNG, JPEG, BMP, GIF ou APNG.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Fichier de configuration TOML. Défaut : glyphweave.toml.
    #[arg(short, long, default_value = "glyphweave.toml")]
    pub config: PathBuf,

    /// Gradient nommé (ex : "Standard", "Blocks", "Braille").
    #[arg(long)]
    pub gradient: Option<String>,

    /// Nombre de colonnes de glyphes.
    #[arg(long)]
    pub characters: Option<u32>,

    /// Format d'export.
    #[arg(long, value_enum, default_value_t = ExportFormat::Txt)]
    pub export: ExportFormat,

    /// Fichier de sortie. Défaut : `<source>-ascii.<ext>` dans le dossier courant.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Police TrueType/OpenType pour les exports GIF/APNG.
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Nombre maximal de frames converties.
    #[arg(long)]
    pub frame_limit: Option<u32>,

    /// Ne garder qu'une frame source sur N.
    #[arg(long)]
    pub frame_skip: Option<u32>,

    /// Multiplicateur de vitesse de lecture.
    #[arg(long)]
    pub speed: Option<f32>,

    /// Graine du tirage des espaces, pour une sortie reproductible.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Niveau de log : error, warn, info, debug, trace.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

/// Formats d'export disponibles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Txt,
    Svg,
    Json,
    Gif,
    Apng,
}

impl ExportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Svg => "svg",
            Self::Json => "json",
            Self::Gif => "gif",
            Self::Apng => "png",
        }
    }
}

impl Cli {
    /// Applique les overrides CLI sur la configuration chargée.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(ref name) = self.gradient {
            config.controls.selected_gradient.clone_from(name);
        }
        if let Some(n) = self.characters {
            config.controls.characters = n;
        }
        if let Some(n) = self.frame_limit {
            config.controls.animation_frame_limit = n;
        }
        if let Some(n) = self.frame_skip {
            config.controls.animation_frame_skip = n;
        }
        if let Some(speed) = self.speed {
            config.controls.animation_playback_speed = speed;
        }
        if let Some(ref font) = self.font {
            config.export.font_path = Some(font.clone());
        }
        let gz_output = self
            .output
            .as_ref()
            .and_then(|p| p.extension())
            .is_some_and(|e| e.eq_ignore_ascii_case("gz"));
        if self.export == ExportFormat::Json && gz_output {
            config.export.json_gzip = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "glyphweave",
            "--input",
            "cat.gif",
            "--gradient",
            "Blocks",
            "--characters",
            "40",
            "--frame-limit",
            "3",
            "--speed",
            "2",
            "--export",
            "json",
            "--output",
            "cat.json.gz",
        ]);
        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.controls.selected_gradient, "Blocks");
        assert_eq!(config.controls.characters, 40);
        assert_eq!(config.controls.animation_frame_limit, 3);
        assert!((config.controls.animation_playback_speed - 2.0).abs() < f32::EPSILON);
        assert!(config.export.json_gzip);
    }

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["glyphweave", "-i", "a.png"]);
        assert_eq!(cli.export, ExportFormat::Txt);
        assert_eq!(cli.log_level, "warn");
        assert_eq!(ExportFormat::Apng.extension(), "png");
    }
}
