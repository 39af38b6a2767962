//! Conversion d'un fichier source et écriture de l'export demandé.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gw_core::config::AppConfig;
use gw_core::frame::{AnimationSequence, AsciiFrame};
use gw_core::traits::{Progress, ProgressSink};
use gw_export::encoder::RasterEncoder;
use gw_export::json::{build_animation_json, to_bytes};
use gw_export::svg::{SvgOptions, build_svg};
use gw_export::text::{export_basename, to_plain_text};
use gw_worker::{JobControl, Orchestrator, Pipeline, RequestOptions};

use crate::cli::{Cli, ExportFormat};

/// Nom de base utilisé quand la source n'a pas de nom exploitable.
const DEFAULT_BASENAME: &str = "ascii-art";
/// Délai d'une image fixe exportée comme animation d'une frame.
const STILL_DELAY_MS: u32 = 100;

/// Chemin de sortie par défaut : `<source>-ascii.<ext>` dans le dossier courant.
#[must_use]
pub fn default_output(input: &Path, format: ExportFormat) -> PathBuf {
    let name = input.file_name().and_then(|n| n.to_str());
    let base = export_basename(name, DEFAULT_BASENAME);
    PathBuf::from(format!("{base}.{}", format.extension()))
}

/// Exécute la conversion complète et retourne le chemin écrit.
///
/// # Errors
/// Retourne une erreur si la source est illisible, si la conversion ou
/// l'encodage échoue, ou si l'écriture du fichier échoue.
pub fn run(cli: &Cli, mut config: AppConfig) -> Result<PathBuf> {
    cli.apply_overrides(&mut config);
    config.clamp_all();

    let sequence = gw_source::extract::load_sequence(&cli.input)?;
    log::info!(
        "Étape 1/3 : {} frame(s) {}x{} décodée(s).",
        sequence.len(),
        sequence.width(),
        sequence.height()
    );

    let orchestrator =
        Orchestrator::spawn(config.worker.clone()).context("Impossible de démarrer le worker")?;
    let frames = convert(&orchestrator, sequence, &config, cli.seed)?;
    log::info!("Étape 2/3 : {} frame(s) ASCII.", frames.len());

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.input, cli.export));
    let name = cli
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_BASENAME);
    let data = export(&orchestrator, &frames, cli.export, &config, name)?;
    std::fs::write(&output, data)
        .with_context(|| format!("Impossible d'écrire {}", output.display()))?;
    log::info!("Étape 3/3 : export écrit dans {}.", output.display());
    Ok(output)
}

fn log_progress(progress: Progress) {
    match (progress.current_frame, progress.total_frames) {
        (Some(current), Some(total)) => {
            log::info!("Progress : {:.0}% ({current}/{total})", progress.percent);
        }
        _ => log::info!("Progress : {:.0}%", progress.percent),
    }
}

/// Contrôle d'une conversion exécutée sur le thread appelant : avancement
/// dans les logs, jamais d'annulation.
struct InlineControl;

impl ProgressSink for InlineControl {
    fn report(&mut self, progress: Progress) {
        log_progress(progress);
    }
}

impl JobControl for InlineControl {
    fn checkpoint(&mut self) -> bool {
        false
    }
}

/// Convertit la séquence via l'orchestrateur : une frame pour une image
/// fixe, toutes les frames retenues pour une animation.
///
/// Si l'exécuteur est indisponible, la conversion est reprise une fois sur
/// le thread appelant avant de remonter l'erreur.
///
/// # Errors
/// Returns the worker's error if the conversion fails, or the inline
/// conversion's error if the executor failed and the retry fails too.
pub fn convert(
    orchestrator: &Orchestrator,
    sequence: AnimationSequence,
    config: &AppConfig,
    seed: Option<u64>,
) -> Result<Vec<AsciiFrame>> {
    let mut controls = config.controls.clone();
    controls.clamp_all();

    if sequence.is_animated() {
        let options = RequestOptions::default().on_progress(log_progress);
        let result =
            orchestrator.convert_animation(sequence.clone(), &controls, seed, options);
        return match result {
            Ok(frames) => Ok(frames),
            Err(e) if e.is_executor_failure() => {
                log::warn!("Worker en échec ({e}), repli sur le thread principal.");
                let frames = Pipeline::new().convert_animation(
                    &sequence,
                    &controls,
                    seed,
                    &mut InlineControl,
                )?;
                Ok(frames)
            }
            Err(e) => Err(e.into()),
        };
    }

    let frame = sequence
        .into_frames()
        .into_iter()
        .next()
        .context("Aucune frame à convertir")?;
    let text = match orchestrator.convert_image(frame.buffer.clone(), &controls, seed) {
        Ok(text) => text,
        Err(e) if e.is_executor_failure() => {
            log::warn!("Worker en échec ({e}), repli sur le thread principal.");
            Pipeline::new().convert_image(&frame.buffer, &controls, seed)?
        }
        Err(e) => return Err(e.into()),
    };
    Ok(vec![AsciiFrame::new(text, STILL_DELAY_MS)])
}

/// Sérialise les frames dans le format demandé.
///
/// Texte et SVG sont des instantanés de la première frame.
///
/// # Errors
/// Returns an error if there is nothing to export or if encoding fails.
pub fn export(
    orchestrator: &Orchestrator,
    frames: &[AsciiFrame],
    format: ExportFormat,
    config: &AppConfig,
    name: &str,
) -> Result<Vec<u8>> {
    let first = frames.first().context("Aucune frame à exporter")?;
    match format {
        ExportFormat::Txt => Ok(to_plain_text(&first.text).into_bytes()),
        ExportFormat::Svg => {
            let doc = build_svg(&first.text, &SvgOptions::from(&config.export))
                .context("Frame vide : rien à exporter en SVG")?;
            Ok(doc.svg.into_bytes())
        }
        ExportFormat::Json => {
            let doc = build_animation_json(frames, name);
            to_bytes(&doc, config.export.json_gzip)
        }
        ExportFormat::Gif | ExportFormat::Apng => {
            let encoder = RasterEncoder::new(&config.export, config.worker.cache_capacity)?;
            let raster = encoder.rasterize(frames)?;
            log::info!(
                "Rasterisation : {} frame(s) {}x{}",
                raster.len(),
                raster.width,
                raster.height
            );
            let options = RequestOptions::default()
                .on_progress(log_progress)
                .on_codec_error(|e| log::error!("Erreur codec ({:?}) : {}", e.kind, e.message));
            let bytes = if format == ExportFormat::Gif {
                orchestrator.export_gif(raster, encoder.gif_options(), options)?
            } else {
                orchestrator.export_apng(raster, encoder.apng_options(), options)?
            };
            Ok(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use gw_core::config::WorkerSettings;
    use gw_core::frame::PixelBuffer;
    use gw_worker::{JobContext, JobFailure, JobOutput, RequestPayload};

    use super::*;

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let img = image::RgbaImage::from_fn(16, 8, |x, _| {
            if x < 8 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([200, 30, 30, 255])
            }
        });
        img.save(&path).unwrap();
        path
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("glyphweave").chain(args.iter().copied()))
    }

    #[test]
    fn default_output_uses_sanitized_stem() {
        assert_eq!(
            default_output(Path::new("/tmp/My Cat.gif"), ExportFormat::Gif),
            PathBuf::from("My_Cat-ascii.gif")
        );
    }

    #[test]
    fn txt_export_of_still_image() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "still.png");
        let output = dir.path().join("out.txt");
        let cli = cli(&[
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--characters",
            "8",
            "--seed",
            "1",
        ]);

        let written = run(&cli, AppConfig::default()).unwrap();
        assert_eq!(written, output);
        let text = std::fs::read_to_string(&output).unwrap();
        // 16x8 sur 8 colonnes → 2 lignes.
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|l| l.chars().count() == 8));
    }

    #[test]
    fn gif_and_json_exports_of_still_image() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "still.png");
        for (format, file) in [("gif", "out.gif"), ("json", "out.json"), ("svg", "out.svg")] {
            let output = dir.path().join(file);
            let cli = cli(&[
                "-i",
                input.to_str().unwrap(),
                "-o",
                output.to_str().unwrap(),
                "--export",
                format,
                "--characters",
                "8",
            ]);
            run(&cli, AppConfig::default()).unwrap();
            let bytes = std::fs::read(&output).unwrap();
            match format {
                "gif" => assert!(bytes.starts_with(b"GIF89a")),
                "json" => assert!(bytes.starts_with(b"{")),
                _ => assert!(bytes.starts_with(b"<?xml")),
            }
        }
    }

    #[test]
    fn missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(&["-i", dir.path().join("nope.png").to_str().unwrap()]);
        assert!(run(&cli, AppConfig::default()).is_err());
    }

    #[test]
    fn export_requires_a_frame() {
        let orchestrator = Orchestrator::spawn(WorkerSettings::default()).unwrap();
        let result = export(
            &orchestrator,
            &[],
            ExportFormat::Txt,
            &AppConfig::default(),
            "x",
        );
        assert!(result.is_err());
    }

    #[test]
    fn animated_sequence_converts_every_frame() {
        let orchestrator = Orchestrator::spawn(WorkerSettings::default()).unwrap();
        let mut seq = AnimationSequence::new(4, 4);
        for v in [0u8, 128, 255] {
            seq.push(gw_core::frame::Frame::new(PixelBuffer::filled(4, 4, [v, v, v, 255]), 50))
                .unwrap();
        }
        let mut config = AppConfig::default();
        config.controls.characters = 4;
        let frames = convert(&orchestrator, seq, &config, Some(2)).unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.delay_ms == 50));
    }

    #[test]
    fn executor_failure_falls_back_to_calling_thread() {
        let orchestrator = Orchestrator::with_handler(WorkerSettings::default(), || {
            Box::new(
                |_: RequestPayload, _: &mut JobContext<'_>| -> Result<JobOutput, JobFailure> {
                    panic!("exécuteur hors service")
                },
            )
        })
        .unwrap();
        let mut config = AppConfig::default();
        config.controls.characters = 4;

        let mut seq = AnimationSequence::new(4, 4);
        for v in [0u8, 255] {
            seq.push(gw_core::frame::Frame::new(PixelBuffer::filled(4, 4, [v, v, v, 255]), 40))
                .unwrap();
        }
        let frames = convert(&orchestrator, seq, &config, Some(5)).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(!orchestrator.is_initialized());

        // Exécuteur déjà tombé : NotInitialized, même repli.
        let mut still = AnimationSequence::new(4, 4);
        still
            .push(gw_core::frame::Frame::new(PixelBuffer::filled(4, 4, [255, 255, 255, 255]), 0))
            .unwrap();
        let frames = convert(&orchestrator, still, &config, Some(5)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].delay_ms, STILL_DELAY_MS);
        assert!(frames[0].text.contains("<span"));
    }

    #[test]
    fn job_failure_is_not_retried_inline() {
        let orchestrator = Orchestrator::with_handler(WorkerSettings::default(), || {
            Box::new(
                |_: RequestPayload, _: &mut JobContext<'_>| -> Result<JobOutput, JobFailure> {
                    Err(JobFailure::Failed("refusé".to_string()))
                },
            )
        })
        .unwrap();
        let mut still = AnimationSequence::new(2, 2);
        still
            .push(gw_core::frame::Frame::new(PixelBuffer::filled(2, 2, [9, 9, 9, 255]), 0))
            .unwrap();
        let err = convert(&orchestrator, still, &AppConfig::default(), None).unwrap_err();
        assert_eq!(err.to_string(), "refusé");
    }
}
