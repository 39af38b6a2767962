//! Orchestrateur requête/réponse au-dessus du thread exécuteur.
//!
//! Chaque requête reçoit un identifiant et une entrée dans la table des
//! requêtes en attente. Un thread de dispatch lit les réponses de
//! l'exécuteur et résout l'entrée correspondante ; l'appelant attend le
//! résultat avec [`Orchestrator::wait`], borné par un timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use gw_core::cancel::CancellationToken;
use gw_core::config::{ControlState, WorkerSettings};
use gw_core::frame::{AnimationSequence, AsciiFrame, PixelBuffer};
use gw_core::traits::Progress;
use gw_export::apng::ApngOptions;
use gw_export::error::CodecError;
use gw_export::gif::GifOptions;
use gw_export::raster::RasterFrames;

use crate::error::WorkerError;
use crate::executor::{self, Inbound, JobHandler};
use crate::pipeline::Pipeline;
use crate::protocol::{JobOutput, Request, RequestId, RequestPayload, Response, ResponsePayload};

/// Intervalle de vérification du jeton et du délai pendant l'attente.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

type ProgressCallback = Box<dyn FnMut(Progress) + Send>;
type CodecErrorCallback = Box<dyn FnMut(&CodecError) + Send>;
type HandlerFactory = Arc<dyn Fn() -> Box<dyn JobHandler> + Send + Sync>;
type Outcome = Result<JobOutput, WorkerError>;

/// Options d'une requête.
///
/// Les callbacks s'exécutent sur le thread de dispatch.
#[derive(Default)]
pub struct RequestOptions {
    /// Délai maximal. `None` = `WorkerSettings::timeout_ms`.
    pub timeout: Option<Duration>,
    /// Jeton fourni par l'appelant. `None` = jeton neuf.
    pub token: Option<CancellationToken>,
    pub on_progress: Option<ProgressCallback>,
    pub on_codec_error: Option<CodecErrorCallback>,
}

impl RequestOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    #[must_use]
    pub fn on_progress(mut self, f: impl FnMut(Progress) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_codec_error(mut self, f: impl FnMut(&CodecError) + Send + 'static) -> Self {
        self.on_codec_error = Some(Box::new(f));
        self
    }
}

/// Requête soumise, à passer à [`Orchestrator::wait`].
pub struct Ticket {
    id: RequestId,
    outcome: Receiver<Outcome>,
    token: CancellationToken,
    deadline: Instant,
}

impl Ticket {
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

struct Pending {
    resolve: Sender<Outcome>,
    token: CancellationToken,
    on_progress: Option<ProgressCallback>,
    on_codec_error: Option<CodecErrorCallback>,
}

impl Pending {
    fn settle(self, outcome: Outcome) {
        if outcome.is_err() {
            self.token.cancel();
        }
        // Le ticket a pu être abandonné par l'appelant.
        let _ = self.resolve.send(outcome);
    }
}

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<RequestId, Pending>>,
    initialized: AtomicBool,
    terminating: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self, id: &RequestId) -> Option<Pending> {
        self.lock().remove(id)
    }

    /// Rejette les entrées dont le jeton a été annulé hors de `wait` :
    /// l'exécuteur ne répond jamais pour un job annulé.
    fn prune_cancelled(&self) {
        let cancelled: Vec<Pending> = {
            let mut pending = self.lock();
            let ids: Vec<RequestId> = pending
                .iter()
                .filter(|(_, p)| p.token.is_cancelled())
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };
        if !cancelled.is_empty() {
            log::debug!("{} requête(s) annulée(s) retirée(s).", cancelled.len());
        }
        for pending in cancelled {
            pending.settle(Err(WorkerError::Cancelled));
        }
    }

    fn reject_all(&self, err: &WorkerError) {
        let drained: Vec<Pending> = self.lock().drain().map(|(_, p)| p).collect();
        if !drained.is_empty() {
            log::debug!("{} requête(s) rejetée(s) : {err}", drained.len());
        }
        for pending in drained {
            pending.settle(Err(err.clone()));
        }
    }
}

/// Orchestrateur des conversions et exports hors thread appelant.
///
/// # Example
/// ```no_run
/// use gw_core::config::{ControlState, WorkerSettings};
/// use gw_core::frame::PixelBuffer;
/// use gw_worker::Orchestrator;
///
/// let orchestrator = Orchestrator::spawn(WorkerSettings::default()).unwrap();
/// let image = PixelBuffer::filled(8, 8, [255, 255, 255, 255]);
/// let text = orchestrator.convert_image(image, &ControlState::default(), None).unwrap();
/// assert!(text.contains("<span"));
/// ```
pub struct Orchestrator {
    settings: WorkerSettings,
    factory: HandlerFactory,
    shared: Arc<Shared>,
    inbox: Option<Sender<Inbound>>,
    executor: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
    seq: AtomicU64,
}

impl Orchestrator {
    /// Démarre un orchestrateur avec le [`Pipeline`] par défaut.
    ///
    /// # Errors
    /// Returns [`WorkerError::Executor`] if a thread cannot be spawned.
    pub fn spawn(settings: WorkerSettings) -> Result<Self, WorkerError> {
        Self::with_handler(settings, || Box::new(Pipeline::new()))
    }

    /// Démarre un orchestrateur dont l'exécuteur utilise `factory()`.
    /// La fabrique est rappelée à chaque [`Orchestrator::initialize`].
    ///
    /// # Errors
    /// Returns [`WorkerError::Executor`] if a thread cannot be spawned.
    pub fn with_handler<F>(settings: WorkerSettings, factory: F) -> Result<Self, WorkerError>
    where
        F: Fn() -> Box<dyn JobHandler> + Send + Sync + 'static,
    {
        let mut orchestrator = Self {
            settings,
            factory: Arc::new(factory),
            shared: Arc::new(Shared::default()),
            inbox: None,
            executor: None,
            dispatcher: None,
            seq: AtomicU64::new(0),
        };
        orchestrator.initialize()?;
        Ok(orchestrator)
    }

    #[must_use]
    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    /// Nombre de requêtes en attente de réponse. Les requêtes dont le
    /// jeton a été annulé sont rejetées au passage.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.prune_cancelled();
        self.shared.lock().len()
    }

    /// (Re)démarre l'exécuteur et le dispatch. Sans effet si déjà initialisé.
    ///
    /// # Errors
    /// Returns [`WorkerError::Executor`] if a thread cannot be spawned.
    pub fn initialize(&mut self) -> Result<(), WorkerError> {
        if self.is_initialized() {
            return Ok(());
        }
        self.join_threads();

        let (in_tx, in_rx) = flume::unbounded();
        let (out_tx, out_rx) = flume::unbounded();
        self.shared.terminating.store(false, Ordering::Release);

        let executor =
            executor::spawn(in_rx, out_tx, self.settings.enable_progress, (self.factory)())
                .map_err(|e| WorkerError::Executor(format!("{e:#}")))?;
        let shared = Arc::clone(&self.shared);
        let dispatcher = thread::Builder::new()
            .name("gw-dispatcher".to_string())
            .spawn(move || dispatch(&out_rx, &shared))
            .map_err(|e| WorkerError::Executor(format!("Impossible de spawner le dispatch : {e}")))?;

        self.inbox = Some(in_tx);
        self.executor = Some(executor);
        self.dispatcher = Some(dispatcher);
        self.shared.initialized.store(true, Ordering::Release);
        log::info!("Orchestrateur initialisé.");
        Ok(())
    }

    fn next_id(&self) -> RequestId {
        RequestId::next(self.seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Soumet une requête sans attendre sa réponse.
    ///
    /// Les annulations passent par [`Orchestrator::cancel`] : un payload
    /// `Cancel` est refusé ici.
    ///
    /// # Errors
    /// Returns [`WorkerError::NotInitialized`] before initialization or
    /// after an executor failure, and [`WorkerError::Executor`] if the
    /// executor channel is closed.
    pub fn submit(
        &self,
        payload: RequestPayload,
        options: RequestOptions,
    ) -> Result<Ticket, WorkerError> {
        if matches!(payload, RequestPayload::Cancel { .. }) {
            return Err(WorkerError::Job(
                "Cancel requests go through Orchestrator::cancel".to_string(),
            ));
        }
        let inbox = match &self.inbox {
            Some(inbox) if self.is_initialized() => inbox,
            _ => return Err(WorkerError::NotInitialized),
        };

        let id = self.next_id();
        let token = options.token.unwrap_or_default();
        let timeout = options
            .timeout
            .unwrap_or(Duration::from_millis(self.settings.timeout_ms));
        let (resolve, outcome) = flume::bounded(1);
        log::debug!("Requête {id} ({}) soumise.", payload.kind());

        self.shared.prune_cancelled();
        self.shared.lock().insert(
            id.clone(),
            Pending {
                resolve,
                token: token.clone(),
                on_progress: options.on_progress,
                on_codec_error: options.on_codec_error,
            },
        );

        let request = Request {
            id: id.clone(),
            payload,
        };
        if inbox
            .send(Inbound::Request {
                request,
                token: token.clone(),
            })
            .is_err()
        {
            self.shared.take(&id);
            self.shared.initialized.store(false, Ordering::Release);
            return Err(WorkerError::Executor("executor channel closed".to_string()));
        }

        Ok(Ticket {
            id,
            outcome,
            token,
            deadline: Instant::now() + timeout,
        })
    }

    /// Attend la résolution d'une requête.
    ///
    /// # Errors
    /// Returns [`WorkerError::Timeout`] when the deadline passes,
    /// [`WorkerError::Cancelled`] when the request or its token is
    /// cancelled, and the executor's failure otherwise.
    pub fn wait(&self, ticket: Ticket) -> Result<JobOutput, WorkerError> {
        loop {
            let now = Instant::now();
            if now >= ticket.deadline {
                if let Some(pending) = self.shared.take(&ticket.id) {
                    log::warn!("Requête {} : timeout.", ticket.id);
                    pending.token.cancel();
                }
                // Une réponse finale arrivée juste avant l'échéance l'emporte.
                return ticket.outcome.try_recv().unwrap_or(Err(WorkerError::Timeout));
            }

            match ticket.outcome.recv_timeout((ticket.deadline - now).min(POLL_INTERVAL)) {
                Ok(outcome) => return outcome,
                Err(RecvTimeoutError::Timeout) => {
                    if ticket.token.is_cancelled() {
                        self.cancel(Some(&ticket.id));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(WorkerError::Executor("request dropped".to_string()));
                }
            }
        }
    }

    /// Soumet et attend.
    ///
    /// # Errors
    /// See [`Orchestrator::submit`] and [`Orchestrator::wait`].
    pub fn run(
        &self,
        payload: RequestPayload,
        options: RequestOptions,
    ) -> Result<JobOutput, WorkerError> {
        let ticket = self.submit(payload, options)?;
        self.wait(ticket)
    }

    /// Annule une requête, ou toutes les requêtes en attente si `target`
    /// est `None`. Les requêtes annulées sont rejetées immédiatement.
    pub fn cancel(&self, target: Option<&RequestId>) {
        let cancelled: Vec<Pending> = {
            let mut pending = self.shared.lock();
            match target {
                Some(id) => pending.remove(id).into_iter().collect(),
                None => pending.drain().map(|(_, p)| p).collect(),
            }
        };
        for pending in cancelled {
            pending.settle(Err(WorkerError::Cancelled));
        }

        if let Some(inbox) = &self.inbox {
            let request = Request {
                id: self.next_id(),
                payload: RequestPayload::Cancel {
                    target: target.cloned(),
                },
            };
            let _ = inbox.send(Inbound::Request {
                request,
                token: CancellationToken::new(),
            });
        }
    }

    /// Poste un message JSON brut sur le canal de l'exécuteur.
    /// Un message invalide ou d'un type inconnu est ignoré par l'exécuteur.
    ///
    /// # Errors
    /// Returns [`WorkerError::NotInitialized`] if the executor is not running.
    pub fn post_raw(&self, bytes: impl Into<Vec<u8>>) -> Result<(), WorkerError> {
        match &self.inbox {
            Some(inbox) if self.is_initialized() => inbox
                .send(Inbound::Raw(bytes.into()))
                .map_err(|_| WorkerError::Executor("executor channel closed".to_string())),
            _ => Err(WorkerError::NotInitialized),
        }
    }

    /// Rejette toutes les requêtes en attente et arrête les threads.
    pub fn terminate(&mut self) {
        self.shared.terminating.store(true, Ordering::Release);
        self.shared.initialized.store(false, Ordering::Release);
        self.shared.reject_all(&WorkerError::Terminated);
        if let Some(inbox) = self.inbox.take() {
            let _ = inbox.send(Inbound::Shutdown);
        }
        self.join_threads();
        log::info!("Orchestrateur arrêté.");
    }

    fn join_threads(&mut self) {
        self.inbox = None;
        if let Some(handle) = self.executor.take()
            && handle.join().is_err()
        {
            log::error!("Le thread exécuteur a paniqué.");
        }
        if let Some(handle) = self.dispatcher.take()
            && handle.join().is_err()
        {
            log::error!("Le thread de dispatch a paniqué.");
        }
    }

    // === Raccourcis typés ===

    /// Convertit une image fixe en texte colorisé.
    ///
    /// # Errors
    /// See [`Orchestrator::run`].
    pub fn convert_image(
        &self,
        image: PixelBuffer,
        controls: &ControlState,
        seed: Option<u64>,
    ) -> Result<String, WorkerError> {
        let payload = RequestPayload::ConvertImage {
            image,
            controls: controls.clone(),
            seed,
        };
        match self.run(payload, RequestOptions::default())? {
            JobOutput::Ascii { text } => Ok(text),
            _ => Err(WorkerError::UnexpectedOutput("Ascii")),
        }
    }

    /// Convertit une séquence en frames ASCII.
    ///
    /// # Errors
    /// See [`Orchestrator::run`].
    pub fn convert_animation(
        &self,
        sequence: AnimationSequence,
        controls: &ControlState,
        seed: Option<u64>,
        options: RequestOptions,
    ) -> Result<Vec<AsciiFrame>, WorkerError> {
        let payload = RequestPayload::ConvertAnimation {
            sequence,
            controls: controls.clone(),
            seed,
        };
        match self.run(payload, options)? {
            JobOutput::Animation { frames } => Ok(frames),
            _ => Err(WorkerError::UnexpectedOutput("Animation")),
        }
    }

    /// Encode des frames RGBA en GIF.
    ///
    /// # Errors
    /// See [`Orchestrator::run`].
    pub fn export_gif(
        &self,
        frames: RasterFrames,
        gif: GifOptions,
        options: RequestOptions,
    ) -> Result<Vec<u8>, WorkerError> {
        self.export(RequestPayload::ExportGif { frames, options: gif }, options)
    }

    /// Encode des frames RGBA en APNG.
    ///
    /// # Errors
    /// See [`Orchestrator::run`].
    pub fn export_apng(
        &self,
        frames: RasterFrames,
        apng: ApngOptions,
        options: RequestOptions,
    ) -> Result<Vec<u8>, WorkerError> {
        self.export(RequestPayload::ExportApng { frames, options: apng }, options)
    }

    fn export(
        &self,
        payload: RequestPayload,
        options: RequestOptions,
    ) -> Result<Vec<u8>, WorkerError> {
        match self.run(payload, options)? {
            JobOutput::Encoded { bytes, .. } => Ok(bytes),
            _ => Err(WorkerError::UnexpectedOutput("Encoded")),
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if self.inbox.is_some() || self.executor.is_some() || self.dispatcher.is_some() {
            self.terminate();
        }
    }
}

/// Boucle du thread de dispatch. Se termine quand l'exécuteur lâche son
/// canal de réponses ; hors arrêt demandé, c'est une défaillance.
fn dispatch(responses: &Receiver<Response>, shared: &Shared) {
    for response in responses.iter() {
        route(shared, response);
    }
    if shared.terminating.load(Ordering::Acquire) {
        return;
    }
    log::error!("Exécuteur arrêté de façon inattendue, requêtes en attente rejetées.");
    shared.initialized.store(false, Ordering::Release);
    shared.reject_all(&WorkerError::Executor(
        "executor stopped unexpectedly".to_string(),
    ));
}

fn route(shared: &Shared, response: Response) {
    shared.prune_cancelled();
    let Response { id, payload } = response;
    match payload {
        ResponsePayload::Progress(progress) => {
            let callback = shared
                .lock()
                .get_mut(&id)
                .and_then(|p| p.on_progress.take());
            if let Some(mut callback) = callback {
                callback(progress);
                if let Some(pending) = shared.lock().get_mut(&id) {
                    pending.on_progress = Some(callback);
                }
            }
        }
        ResponsePayload::StructuredError(err) => {
            let callback = shared
                .lock()
                .get_mut(&id)
                .and_then(|p| p.on_codec_error.take());
            if let Some(mut callback) = callback {
                callback(&err);
                if let Some(pending) = shared.lock().get_mut(&id) {
                    pending.on_codec_error = Some(callback);
                }
            }
        }
        ResponsePayload::Complete(output) => settle(shared, &id, Ok(output)),
        ResponsePayload::Error { message } => settle(shared, &id, Err(WorkerError::Job(message))),
    }
}

fn settle(shared: &Shared, id: &RequestId, outcome: Outcome) {
    match shared.take(id) {
        Some(pending) => pending.settle(outcome),
        None => log::debug!("Réponse pour une requête inconnue ou déjà résolue : {id}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use gw_core::frame::Frame;

    use super::*;
    use crate::executor::{JobContext, JobControl, JobFailure};

    fn settings() -> WorkerSettings {
        WorkerSettings {
            timeout_ms: 10_000,
            ..WorkerSettings::default()
        }
    }

    fn frames(n: usize) -> RasterFrames {
        let mut frames = RasterFrames::new(2, 2);
        for _ in 0..n {
            frames.push(vec![200; 16], 100);
        }
        frames
    }

    /// ExportGif attend l'annulation, ExportApng répond tout de suite.
    fn slow_or_quick(payload: RequestPayload, ctx: &mut JobContext<'_>) -> Result<JobOutput, JobFailure> {
        if let RequestPayload::ExportGif { .. } = payload {
            for _ in 0..2000 {
                if ctx.checkpoint() {
                    return Err(JobFailure::Cancelled);
                }
                thread::sleep(Duration::from_millis(5));
            }
        }
        Ok(JobOutput::Encoded {
            bytes: vec![1, 2, 3],
            mime: "test".to_string(),
        })
    }

    fn slow_orchestrator() -> Orchestrator {
        Orchestrator::with_handler(settings(), || Box::new(slow_or_quick)).unwrap()
    }

    fn slow() -> RequestPayload {
        RequestPayload::ExportGif {
            frames: frames(1),
            options: GifOptions::default(),
        }
    }

    fn quick() -> RequestPayload {
        RequestPayload::ExportApng {
            frames: frames(1),
            options: ApngOptions::default(),
        }
    }

    #[test]
    fn converts_image_end_to_end() {
        let orch = Orchestrator::spawn(settings()).unwrap();
        let controls = ControlState {
            characters: 4,
            ..ControlState::default()
        };
        let text = orch
            .convert_image(PixelBuffer::filled(8, 8, [255, 255, 255, 255]), &controls, Some(1))
            .unwrap();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(orch.pending_count(), 0);
    }

    #[test]
    fn progress_callback_sees_every_fifth_frame() {
        let orch = Orchestrator::spawn(settings()).unwrap();
        let mut seq = AnimationSequence::new(4, 4);
        for _ in 0..10 {
            seq.push(Frame::new(PixelBuffer::filled(4, 4, [9, 9, 9, 255]), 100))
                .unwrap();
        }
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = RequestOptions::default().on_progress(move |p| {
            sink.lock().unwrap().push(p.percent);
        });
        let controls = ControlState {
            characters: 4,
            animation_frame_limit: 10,
            ..ControlState::default()
        };

        let out = orch.convert_animation(seq, &controls, None, options).unwrap();
        assert_eq!(out.len(), 10);
        assert_eq!(*seen.lock().unwrap(), vec![50.0, 100.0]);
    }

    #[test]
    fn codec_errors_reach_callback_then_reject() {
        let orch = Orchestrator::spawn(settings()).unwrap();
        let mut bad = RasterFrames::new(2, 2);
        bad.push(vec![0; 5], 100);
        let seen = Arc::new(StdMutex::new(None));
        let sink = Arc::clone(&seen);
        let options = RequestOptions::default().on_codec_error(move |e| {
            *sink.lock().unwrap() = Some(e.kind);
        });

        let err = orch.export_gif(bad, GifOptions::default(), options).unwrap_err();
        let WorkerError::Job(message) = err else {
            panic!("expected a job error");
        };
        assert!(message.contains("Frame 0 has invalid size"));
        assert_eq!(
            *seen.lock().unwrap(),
            Some(gw_export::error::CodecErrorKind::Validation)
        );
    }

    #[test]
    fn cancel_before_progress_rejects() {
        let orch = slow_orchestrator();
        let ticket = orch.submit(slow(), RequestOptions::default()).unwrap();
        let id = ticket.id().clone();
        orch.cancel(Some(&id));
        assert_eq!(orch.wait(ticket), Err(WorkerError::Cancelled));
        assert_eq!(orch.pending_count(), 0);

        // L'exécuteur est libéré.
        assert!(orch.run(quick(), RequestOptions::default()).is_ok());
    }

    #[test]
    fn caller_token_cancels_while_waiting() {
        let orch = slow_orchestrator();
        let token = CancellationToken::new();
        let trigger = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            trigger.cancel();
        });
        let result = orch.run(slow(), RequestOptions::default().with_token(token));
        canceller.join().unwrap();
        assert_eq!(result, Err(WorkerError::Cancelled));
    }

    #[test]
    fn abandoned_cancelled_ticket_leaves_no_pending_entry() {
        let orch = slow_orchestrator();
        let token = CancellationToken::new();
        let ticket = orch
            .submit(slow(), RequestOptions::default().with_token(token.clone()))
            .unwrap();
        token.cancel();
        thread::sleep(Duration::from_millis(100));

        assert!(orch.run(quick(), RequestOptions::default()).is_ok());
        assert_eq!(orch.pending_count(), 0);
        assert_eq!(orch.wait(ticket), Err(WorkerError::Cancelled));
    }

    #[test]
    fn pending_count_drops_cancelled_tokens() {
        let orch = slow_orchestrator();
        let token = CancellationToken::new();
        let _ticket = orch
            .submit(slow(), RequestOptions::default().with_token(token.clone()))
            .unwrap();
        assert_eq!(orch.pending_count(), 1);
        token.cancel();
        assert_eq!(orch.pending_count(), 0);
    }

    #[test]
    fn timeout_is_local_and_frees_executor() {
        let orch = slow_orchestrator();
        let result = orch.run(
            slow(),
            RequestOptions::default().with_timeout(Duration::from_millis(50)),
        );
        assert_eq!(result, Err(WorkerError::Timeout));
        assert_eq!(result.unwrap_err().to_string(), "Conversion timeout");
        assert!(orch.run(quick(), RequestOptions::default()).is_ok());
    }

    #[test]
    fn executor_panic_rejects_and_requires_initialize() {
        let mut orch = Orchestrator::with_handler(settings(), || {
            Box::new(|payload: RequestPayload, _: &mut JobContext<'_>| -> Result<JobOutput, JobFailure> {
                if let RequestPayload::ExportGif { .. } = payload {
                    panic!("handler exploded");
                }
                Ok(JobOutput::Ascii {
                    text: "ok".to_string(),
                })
            })
        })
        .unwrap();

        let err = orch.run(slow(), RequestOptions::default()).unwrap_err();
        assert!(matches!(err, WorkerError::Executor(_)));
        assert!(err.to_string().starts_with("Worker error: "));
        assert!(!orch.is_initialized());
        assert_eq!(
            orch.submit(quick(), RequestOptions::default()).err(),
            Some(WorkerError::NotInitialized)
        );

        orch.initialize().unwrap();
        assert!(orch.is_initialized());
        assert!(orch.run(quick(), RequestOptions::default()).is_ok());
    }

    #[test]
    fn malformed_raw_messages_are_ignored() {
        let orch = slow_orchestrator();
        orch.post_raw(b"{oops".to_vec()).unwrap();
        orch.post_raw(r#"{"id":"x","type":"Nope","payload":{}}"#).unwrap();
        assert!(orch.is_initialized());
        assert!(orch.run(quick(), RequestOptions::default()).is_ok());
    }

    #[test]
    fn terminate_rejects_pending() {
        let mut orch = slow_orchestrator();
        let ticket = orch.submit(slow(), RequestOptions::default()).unwrap();
        orch.terminate();
        assert_eq!(orch.wait(ticket), Err(WorkerError::Terminated));
        assert_eq!(
            orch.submit(quick(), RequestOptions::default()).err(),
            Some(WorkerError::NotInitialized)
        );
    }

    #[test]
    fn cancel_payload_is_not_a_job() {
        let orch = slow_orchestrator();
        let result = orch.submit(RequestPayload::Cancel { target: None }, RequestOptions::default());
        assert!(matches!(result, Err(WorkerError::Job(_))));
        assert_eq!(orch.pending_count(), 0);
    }
}
