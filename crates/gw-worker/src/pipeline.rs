//! Conversion pixels → ASCII exécutée sur le thread exécuteur.
//!
//! Étapes par frame : redimensionnement plus proche voisin sur la grille,
//! filtres, tramage, mapping des glyphes.

use anyhow::Result;
use gw_ascii::dither::apply_dithering;
use gw_ascii::filters::FilterPipeline;
use gw_ascii::glyph::GlyphMapper;
use gw_core::config::ControlState;
use gw_core::frame::{AnimationSequence, AsciiFrame, PixelBuffer};
use gw_core::traits::Progress;
use gw_source::resize::Resizer;

use crate::executor::{JobContext, JobControl, JobFailure, JobHandler};
use crate::protocol::{JobOutput, RequestPayload};

/// Délai minimal d'une frame ASCII.
pub const MIN_FRAME_DELAY_MS: u32 = 16;
/// Délai de la frame de repli.
pub const FALLBACK_DELAY_MS: u32 = 100;
/// Une notification d'avancement toutes les N frames conservées.
const PROGRESS_EVERY: usize = 5;

/// Délai ajusté à la vitesse de lecture : `max(16, round(delay / speed))`.
///
/// # Example
/// ```
/// use gw_worker::pipeline::playback_delay;
/// assert_eq!(playback_delay(100, 8.0), 16);
/// assert_eq!(playback_delay(100, 0.5), 200);
/// assert_eq!(playback_delay(100, 0.0), 1000);
/// ```
#[must_use]
pub fn playback_delay(delay_ms: u32, speed: f32) -> u32 {
    let speed = if speed.is_finite() { speed.max(0.1) } else { 1.0 };
    let adjusted = (f64::from(delay_ms) / f64::from(speed)).round();
    (adjusted.min(f64::from(u32::MAX)) as u32).max(MIN_FRAME_DELAY_MS)
}

/// Handler par défaut de l'exécuteur.
pub struct Pipeline {
    resizer: Resizer,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
        }
    }

    fn mapper(controls: &ControlState, seed: Option<u64>) -> Result<GlyphMapper> {
        let mapper = GlyphMapper::new(controls.gradient()?, controls.space_density);
        Ok(match seed {
            Some(seed) => mapper.with_seed(seed),
            None => mapper,
        })
    }

    fn render(
        &mut self,
        buffer: &PixelBuffer,
        controls: &ControlState,
        mapper: &mut GlyphMapper,
    ) -> Result<String> {
        let grid = self.resizer.resize_to_grid(buffer, controls.characters)?;
        let mut filtered = FilterPipeline::new(controls).apply_split(grid);
        filtered.tone = apply_dithering(filtered.tone, controls.dithering_method);
        Ok(mapper.rasterize_frame(&filtered))
    }

    /// Convertit une image fixe en texte colorisé.
    ///
    /// # Errors
    /// Returns an error if the image is empty or the gradient is unknown.
    pub fn convert_image(
        &mut self,
        image: &PixelBuffer,
        controls: &ControlState,
        seed: Option<u64>,
    ) -> Result<String> {
        let mut mapper = Self::mapper(controls, seed)?;
        self.render(image, controls, &mut mapper)
    }

    /// Convertit une séquence en frames ASCII.
    ///
    /// Garde une frame source sur `animation_frame_skip`, au plus
    /// `animation_frame_limit`, et ajuste chaque délai à la vitesse de
    /// lecture. `control` est consulté avant chaque frame.
    ///
    /// # Errors
    /// Returns [`JobFailure::Cancelled`] when `control` reports a
    /// cancellation, and [`JobFailure::Failed`] for an empty sequence or a
    /// conversion error.
    pub fn convert_animation(
        &mut self,
        sequence: &AnimationSequence,
        controls: &ControlState,
        seed: Option<u64>,
        control: &mut dyn JobControl,
    ) -> Result<Vec<AsciiFrame>, JobFailure> {
        let total = sequence.len();
        if total == 0 {
            return Err(JobFailure::Failed("No frames to convert".to_string()));
        }
        let limit = (controls.animation_frame_limit as usize).clamp(1, total);
        let skip = (controls.animation_frame_skip as usize).max(1);
        let speed = controls.animation_playback_speed;
        log::info!(
            "Animation : {total} frames source, limite {limit}, skip {skip}, vitesse {speed}"
        );

        let mut mapper = Self::mapper(controls, seed)?;
        let mut frames = Vec::with_capacity(limit);
        for (i, frame) in sequence.frames().iter().enumerate() {
            if control.checkpoint() {
                return Err(JobFailure::Cancelled);
            }
            if frames.len() >= limit {
                break;
            }
            if i % skip != 0 {
                continue;
            }

            let text = self.render(&frame.buffer, controls, &mut mapper)?;
            frames.push(AsciiFrame::new(text, playback_delay(frame.delay_ms, speed)));

            let kept = frames.len();
            if kept % PROGRESS_EVERY == 0 {
                let percent = kept as f32 / limit as f32 * 100.0;
                control.report(Progress::frames(percent, kept as u32, limit as u32));
            }
        }

        if frames.is_empty()
            && let Some(first) = sequence.frames().first()
        {
            log::warn!("Aucune frame conservée, repli sur la première frame.");
            let text = self.render(&first.buffer, controls, &mut mapper)?;
            frames.push(AsciiFrame::new(text, FALLBACK_DELAY_MS));
        }
        Ok(frames)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl JobHandler for Pipeline {
    fn run(
        &mut self,
        payload: RequestPayload,
        ctx: &mut JobContext<'_>,
    ) -> Result<JobOutput, JobFailure> {
        match payload {
            RequestPayload::ConvertImage {
                image,
                mut controls,
                seed,
            } => {
                controls.clamp_all();
                let text = self.convert_image(&image, &controls, seed)?;
                if ctx.checkpoint() {
                    return Err(JobFailure::Cancelled);
                }
                Ok(JobOutput::Ascii { text })
            }
            RequestPayload::ConvertAnimation {
                sequence,
                mut controls,
                seed,
            } => {
                controls.clamp_all();
                let frames = self.convert_animation(&sequence, &controls, seed, ctx)?;
                Ok(JobOutput::Animation { frames })
            }
            RequestPayload::ExportGif { frames, options } => {
                let token = ctx.token().clone();
                let bytes = gw_export::gif::encode_gif(&frames, &options, ctx, &token)?;
                Ok(JobOutput::Encoded {
                    bytes,
                    mime: "image/gif".to_string(),
                })
            }
            RequestPayload::ExportApng { frames, options } => {
                let token = ctx.token().clone();
                let bytes = gw_export::apng::encode_apng(&frames, &options, ctx, &token)?;
                Ok(JobOutput::Encoded {
                    bytes,
                    mime: "image/apng".to_string(),
                })
            }
            RequestPayload::Cancel { .. } => {
                Err(JobFailure::Failed("Unknown message type".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use gw_ascii::markup::strip_tags;
    use gw_core::frame::Frame;
    use gw_core::traits::ProgressSink;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        progress: Vec<Progress>,
        checks: usize,
        cancel_after: Option<usize>,
    }

    impl ProgressSink for Recorder {
        fn report(&mut self, progress: Progress) {
            self.progress.push(progress);
        }
    }

    impl JobControl for Recorder {
        fn checkpoint(&mut self) -> bool {
            self.checks += 1;
            self.cancel_after.is_some_and(|n| self.checks > n)
        }
    }

    fn sequence(n: usize, delay_ms: u32) -> AnimationSequence {
        let mut seq = AnimationSequence::new(4, 4);
        for i in 0..n {
            let v = (i % 256) as u8;
            seq.push(Frame::new(PixelBuffer::filled(4, 4, [v, v, v, 255]), delay_ms))
                .unwrap();
        }
        seq
    }

    fn controls(limit: u32, skip: u32, speed: f32) -> ControlState {
        ControlState {
            characters: 4,
            animation_frame_limit: limit,
            animation_frame_skip: skip,
            animation_playback_speed: speed,
            ..ControlState::default()
        }
    }

    #[test]
    fn limit_one_yields_single_frame() {
        let mut pipeline = Pipeline::new();
        let mut rec = Recorder::default();
        let frames = pipeline
            .convert_animation(&sequence(10, 100), &controls(1, 1, 1.0), Some(1), &mut rec)
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].delay_ms, 100);
    }

    #[test]
    fn speed_up_floors_delay_and_caps_frame_count() {
        let mut pipeline = Pipeline::new();
        let mut rec = Recorder::default();
        let frames = pipeline
            .convert_animation(&sequence(500, 100), &controls(150, 1, 8.0), None, &mut rec)
            .unwrap();
        assert_eq!(frames.len(), 150);
        assert!(frames.iter().all(|f| f.delay_ms == 16));

        assert_eq!(rec.progress.len(), 30);
        let last = rec.progress.last().unwrap();
        assert!((last.percent - 100.0).abs() < f32::EPSILON);
        assert_eq!(last.current_frame, Some(150));
        assert_eq!(last.total_frames, Some(150));
        assert!(rec.progress.windows(2).all(|w| w[0].percent <= w[1].percent));
    }

    #[test]
    fn skip_keeps_every_nth_source_frame() {
        let mut pipeline = Pipeline::new();
        let mut rec = Recorder::default();
        let frames = pipeline
            .convert_animation(&sequence(10, 50), &controls(150, 3, 1.0), None, &mut rec)
            .unwrap();
        // 0, 3, 6, 9
        assert_eq!(frames.len(), 4);
        assert!(rec.progress.is_empty());
    }

    #[test]
    fn cancellation_stops_between_frames() {
        let mut pipeline = Pipeline::new();
        let mut rec = Recorder {
            cancel_after: Some(3),
            ..Recorder::default()
        };
        let result =
            pipeline.convert_animation(&sequence(20, 100), &controls(150, 1, 1.0), None, &mut rec);
        assert!(matches!(result, Err(JobFailure::Cancelled)));
        assert_eq!(rec.checks, 4);
    }

    #[test]
    fn empty_sequence_fails() {
        let mut pipeline = Pipeline::new();
        let mut rec = Recorder::default();
        let result = pipeline.convert_animation(
            &AnimationSequence::new(4, 4),
            &ControlState::default(),
            None,
            &mut rec,
        );
        assert!(matches!(result, Err(JobFailure::Failed(_))));
    }

    #[test]
    fn white_image_maps_to_densest_glyph() {
        let controls = ControlState {
            characters: 3,
            ..ControlState::default()
        };
        let densest = *controls.gradient().unwrap().glyphs().last().unwrap();
        let text = Pipeline::new()
            .convert_image(&PixelBuffer::filled(6, 6, [255, 255, 255, 255]), &controls, Some(3))
            .unwrap();
        let plain = strip_tags(&text);
        let expected: String = std::iter::repeat_n(densest, 3).chain(['\n']).collect();
        assert_eq!(plain, expected);
    }
}
