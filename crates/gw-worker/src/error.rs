use thiserror::Error;

/// Issue d'une requête qui n'a pas abouti.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Le délai de la requête a expiré côté appelant.
    #[error("Conversion timeout")]
    Timeout,

    /// La requête a été annulée avant sa réponse finale.
    #[error("Conversion cancelled")]
    Cancelled,

    /// L'orchestrateur a été arrêté avec la requête en attente.
    #[error("Worker terminated")]
    Terminated,

    /// L'exécuteur s'est arrêté ou n'a pas pu démarrer.
    #[error("Worker error: {0}")]
    Executor(String),

    /// Soumission alors que l'exécuteur n'est pas initialisé.
    #[error("Worker not initialized")]
    NotInitialized,

    /// Échec rapporté par l'exécuteur pour ce job.
    #[error("{0}")]
    Job(String),

    /// Réponse d'un autre type que celui attendu par l'appelant.
    #[error("Unexpected response: expected {0}")]
    UnexpectedOutput(&'static str),
}

impl WorkerError {
    /// Vrai quand l'échec vient de l'exécuteur et non du job : le même
    /// travail peut alors être repris sur le thread appelant.
    #[must_use]
    pub fn is_executor_failure(&self) -> bool {
        matches!(
            self,
            Self::Executor(_) | Self::NotInitialized | Self::Terminated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_executor_failures_allow_inline_retry() {
        assert!(WorkerError::NotInitialized.is_executor_failure());
        assert!(WorkerError::Executor("x".into()).is_executor_failure());
        assert!(WorkerError::Terminated.is_executor_failure());
        assert!(!WorkerError::Timeout.is_executor_failure());
        assert!(!WorkerError::Cancelled.is_executor_failure());
        assert!(!WorkerError::Job("No frames to convert".into()).is_executor_failure());
    }
}
