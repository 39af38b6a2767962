/// Exécution hors thread appelant : protocole de messages, exécuteur
/// single-flight et orchestrateur requête/réponse.
///
/// L'orchestrateur attribue un identifiant à chaque requête, garde une table
/// des requêtes en attente et résout chacune par exactement un succès ou un
/// échec (résultat, erreur de l'exécuteur, timeout, annulation, arrêt).

pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod pipeline;
pub mod protocol;

pub use error::WorkerError;
pub use executor::{JobContext, JobControl, JobFailure, JobHandler};
pub use orchestrator::{Orchestrator, RequestOptions, Ticket};
pub use pipeline::Pipeline;
pub use protocol::{JobOutput, Request, RequestId, RequestPayload, Response, ResponsePayload};
