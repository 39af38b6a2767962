//! Thread exécuteur : un job à la fois, dans l'ordre d'arrivée.
//!
//! Les messages reçus pendant un job (annulations, nouvelles requêtes)
//! sont lus aux points de contrôle du job ; les requêtes sont mises en
//! file et traitées ensuite.

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use flume::{Receiver, Sender};
use gw_core::cancel::CancellationToken;
use gw_core::traits::{Progress, ProgressSink};
use gw_export::error::{CodecError, ExportError};
use thiserror::Error;

use crate::protocol::{JobOutput, Request, RequestId, RequestPayload, Response, ResponsePayload};

/// Message entrant de l'exécuteur.
pub(crate) enum Inbound {
    /// Requête typée, avec le jeton d'annulation du job.
    Request {
        request: Request,
        token: CancellationToken,
    },
    /// Requête sérialisée en JSON. Ignorée si elle ne se parse pas.
    Raw(Vec<u8>),
    /// Arrêt après le job courant.
    Shutdown,
}

/// Échec d'un job.
#[derive(Debug, Error)]
pub enum JobFailure {
    /// Le job a observé son jeton annulé. Aucune réponse n'est émise.
    #[error("Conversion cancelled")]
    Cancelled,
    /// Échec simple, relayé tel quel dans une réponse `Error`.
    #[error("{0}")]
    Failed(String),
    /// Échec d'encodage, relayé en `StructuredError` puis `Error`.
    #[error("{}", .0.user_message())]
    Codec(CodecError),
}

impl From<ExportError> for JobFailure {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Cancelled => Self::Cancelled,
            ExportError::Codec(codec) => Self::Codec(codec),
        }
    }
}

impl From<anyhow::Error> for JobFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }
}

/// Points de contrôle d'un job long : avancement et annulation.
pub trait JobControl: ProgressSink {
    /// Lit les messages en attente et indique si le job doit s'arrêter.
    fn checkpoint(&mut self) -> bool;
}

/// Traite le contenu d'une requête.
///
/// Implémenté par [`crate::pipeline::Pipeline`] et par toute closure de
/// même signature (utile pour injecter un comportement dans les tests).
pub trait JobHandler: Send {
    /// # Errors
    /// Returns a [`JobFailure`] describing how the job ended.
    fn run(
        &mut self,
        payload: RequestPayload,
        ctx: &mut JobContext<'_>,
    ) -> Result<JobOutput, JobFailure>;
}

impl<F> JobHandler for F
where
    F: FnMut(RequestPayload, &mut JobContext<'_>) -> Result<JobOutput, JobFailure> + Send,
{
    fn run(
        &mut self,
        payload: RequestPayload,
        ctx: &mut JobContext<'_>,
    ) -> Result<JobOutput, JobFailure> {
        self(payload, ctx)
    }
}

/// Contexte d'un job en cours : identifiant, jeton et canal de réponses.
pub struct JobContext<'a> {
    id: RequestId,
    token: CancellationToken,
    executor: &'a mut Executor,
}

impl JobContext<'_> {
    /// Traite les messages arrivés depuis le début du job : les annulations
    /// sont appliquées, les requêtes mises en file.
    fn drain_inbox(&mut self) {
        loop {
            match self.executor.inbox.try_recv() {
                Ok(msg) => {
                    if let Some(job) = self.executor.accept(msg, Some((&self.id, &self.token))) {
                        self.executor.backlog.push_back(job);
                    }
                }
                Err(flume::TryRecvError::Empty | flume::TryRecvError::Disconnected) => break,
            }
        }
    }

    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Jeton du job, à passer aux encodeurs.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl ProgressSink for JobContext<'_> {
    fn report(&mut self, progress: Progress) {
        if self.executor.enable_progress {
            self.executor
                .send(Response::new(self.id.clone(), ResponsePayload::Progress(progress)));
        }
    }

    /// Les encodeurs appellent `tick` entre deux frames : une annulation
    /// postée pendant l'encodage annule le jeton qu'ils surveillent.
    fn tick(&mut self) {
        self.drain_inbox();
    }
}

impl JobControl for JobContext<'_> {
    fn checkpoint(&mut self) -> bool {
        self.drain_inbox();
        self.token.is_cancelled()
    }
}

struct Queued {
    request: Request,
    token: CancellationToken,
}

pub(crate) struct Executor {
    inbox: Receiver<Inbound>,
    responses: Sender<Response>,
    backlog: VecDeque<Queued>,
    enable_progress: bool,
    shutdown: bool,
}

/// Démarre le thread `gw-executor`.
///
/// # Errors
/// Returns an error if the OS refuses to spawn the thread.
pub(crate) fn spawn(
    inbox: Receiver<Inbound>,
    responses: Sender<Response>,
    enable_progress: bool,
    mut handler: Box<dyn JobHandler>,
) -> Result<JoinHandle<()>> {
    let executor = Executor {
        inbox,
        responses,
        backlog: VecDeque::new(),
        enable_progress,
        shutdown: false,
    };
    thread::Builder::new()
        .name("gw-executor".to_string())
        .spawn(move || executor.run(handler.as_mut()))
        .context("Impossible de spawner le thread exécuteur")
}

impl Executor {
    fn run(mut self, handler: &mut dyn JobHandler) {
        log::info!("Exécuteur démarré.");
        while !self.shutdown {
            let job = match self.backlog.pop_front() {
                Some(job) => job,
                None => match self.inbox.recv() {
                    Ok(msg) => match self.accept(msg, None) {
                        Some(job) => job,
                        None => continue,
                    },
                    Err(flume::RecvError::Disconnected) => {
                        log::debug!("Exécuteur : canal fermé.");
                        break;
                    }
                },
            };
            self.execute(handler, job);
        }
        log::info!("Exécuteur : arrêt propre.");
    }

    /// Route un message entrant. Retourne le job à mettre en file, s'il y en a un.
    fn accept(
        &mut self,
        msg: Inbound,
        current: Option<(&RequestId, &CancellationToken)>,
    ) -> Option<Queued> {
        let (request, token) = match msg {
            Inbound::Request { request, token } => (request, token),
            Inbound::Raw(bytes) => match serde_json::from_slice::<Request>(&bytes) {
                Ok(request) => (request, CancellationToken::new()),
                Err(e) => {
                    log::debug!("Message ignoré : {e}");
                    return None;
                }
            },
            Inbound::Shutdown => {
                self.shutdown = true;
                if let Some((_, token)) = current {
                    token.cancel();
                }
                return None;
            }
        };

        if let RequestPayload::Cancel { target } = &request.payload {
            self.apply_cancel(target.as_ref(), current);
            return None;
        }
        log::debug!("Requête {} ({}) reçue.", request.id, request.payload.kind());
        Some(Queued { request, token })
    }

    fn apply_cancel(
        &self,
        target: Option<&RequestId>,
        current: Option<(&RequestId, &CancellationToken)>,
    ) {
        let matches = |id: &RequestId| target.is_none_or(|t| t == id);
        if let Some((id, token)) = current
            && matches(id)
        {
            log::debug!("Annulation du job courant {id}.");
            token.cancel();
        }
        for queued in self.backlog.iter().filter(|q| matches(&q.request.id)) {
            queued.token.cancel();
        }
    }

    fn execute(&mut self, handler: &mut dyn JobHandler, job: Queued) {
        let Queued { request, token } = job;
        let id = request.id;
        if token.is_cancelled() {
            log::debug!("Job {id} annulé avant démarrage.");
            return;
        }
        log::debug!("Job {id} ({}) démarré.", request.payload.kind());

        let result = {
            let mut ctx = JobContext {
                id: id.clone(),
                token: token.clone(),
                executor: self,
            };
            handler.run(request.payload, &mut ctx)
        };

        if token.is_cancelled() {
            log::debug!("Job {id} annulé, réponse supprimée.");
            return;
        }
        match result {
            Ok(output) => self.send(Response::new(id, ResponsePayload::Complete(output))),
            Err(JobFailure::Cancelled) => {}
            Err(JobFailure::Failed(message)) => {
                log::warn!("Job {id} en échec : {message}");
                self.send(Response::new(id, ResponsePayload::Error { message }));
            }
            Err(JobFailure::Codec(err)) => {
                log::warn!("Job {id} : erreur codec {:?} : {}", err.kind, err.message);
                let message = err.user_message();
                self.send(Response::new(id.clone(), ResponsePayload::StructuredError(err)));
                self.send(Response::new(id, ResponsePayload::Error { message }));
            }
        }
    }

    fn send(&self, response: Response) {
        if self.responses.send(response).is_err() {
            log::debug!("Exécuteur : plus de destinataire pour les réponses.");
        }
    }
}
