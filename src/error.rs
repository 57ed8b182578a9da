use thiserror::Error;

/// Failure taxonomy surfaced by every engine operation.
///
/// Kinds are distinguishable so a transport layer can map them to status
/// codes without inspecting messages. Only `Storage` is retryable.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A mutation targeted the protected main branch
    #[error("{action} is prohibited in branch '{branch}'")]
    ProhibitedAction { action: String, branch: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// A lifecycle transition was attempted from an incompatible state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The storage collaborator could not complete the atomic unit.
    /// Nothing was written; the caller may retry after backoff.
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn prohibited(action: &str, branch: &str) -> Self {
        Self::ProhibitedAction {
            action: action.to_string(),
            branch: branch.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, id: &str) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// HTTP status the transport layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ProhibitedAction { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::InvalidState(_) => 409,
            Self::Storage(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
