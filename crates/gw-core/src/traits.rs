use serde::{Deserialize, Serialize};

/// Avancement d'un job long (conversion d'animation, export).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Pourcentage [0, 100].
    pub percent: f32,
    /// Frame courante, si pertinente.
    pub current_frame: Option<u32>,
    /// Nombre total de frames, si connu.
    pub total_frames: Option<u32>,
}

impl Progress {
    /// Progress without frame counters.
    #[must_use]
    pub fn percent(percent: f32) -> Self {
        Self {
            percent,
            current_frame: None,
            total_frames: None,
        }
    }

    /// Progress with frame counters.
    #[must_use]
    pub fn frames(percent: f32, current: u32, total: u32) -> Self {
        Self {
            percent,
            current_frame: Some(current),
            total_frames: Some(total),
        }
    }
}

/// Reçoit les notifications d'avancement d'un job.
///
/// Implémenté par l'exécuteur (qui les relaie sur son canal de réponses)
/// et par toute closure `FnMut(Progress)`.
///
/// # Example
/// ```
/// use gw_core::traits::{Progress, ProgressSink};
///
/// let mut seen = Vec::new();
/// {
///     let mut sink = |p: Progress| seen.push(p.percent);
///     sink.report(Progress::percent(50.0));
/// }
/// assert_eq!(seen, vec![50.0]);
/// ```
pub trait ProgressSink {
    /// Publie un point d'avancement. Ne doit pas bloquer.
    fn report(&mut self, progress: Progress);

    /// Point de contrôle sans avancement, appelé par les encodeurs entre
    /// deux frames. Le récepteur peut y traiter ses messages en attente.
    fn tick(&mut self) {}
}

impl<F: FnMut(Progress)> ProgressSink for F {
    fn report(&mut self, progress: Progress) {
        self(progress);
    }
}

/// Sink qui ignore tout.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _progress: Progress) {}
}
