/// Failures of a single engine operation. Nothing here is fatal to the
/// process; the IPC layer turns each variant into an error reply.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage stayed busy after {attempts} attempts")]
    Busy { attempts: u32 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadInput(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("text service: {0}")]
    Collaborator(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Storage(_) => "db_query_failed",
            EngineError::Busy { .. } => "db_busy",
            EngineError::NotFound(_) => "not_found",
            EngineError::BadInput(_) => "bad_params",
            EngineError::RateLimited(_) => "rate_limited",
            EngineError::InvalidTransition(_) => "invalid_transition",
            EngineError::Collaborator(_) => "collaborator_failed",
        }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        EngineError::BadInput(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }

    /// Busy/locked errors are the optimistic-conflict class: retried by
    /// `db::with_immediate_tx`, never surfaced while attempts remain.
    pub fn is_conflict(&self) -> bool {
        match self {
            EngineError::Storage(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
