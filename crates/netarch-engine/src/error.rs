use netarch_core::{CompletionError, Module};
use netarch_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("sign in first")]
    NotSignedIn,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    MissingInput(&'static str),

    #[error("no {module} history entry at index {index}")]
    InvalidHistoryIndex { module: Module, index: usize },

    #[error("delete mode is not enabled for {0}")]
    DeleteModeInactive(Module),

    #[error("there is no task to show a solution for")]
    NothingToReveal,

    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Stable machine-readable code for the UI surface.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotSignedIn => "NOT_SIGNED_IN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::MissingInput(_) => "MISSING_INPUT",
            Self::InvalidHistoryIndex { .. } => "INVALID_HISTORY_INDEX",
            Self::DeleteModeInactive(_) => "DELETE_MODE_INACTIVE",
            Self::NothingToReveal => "NOTHING_TO_REVEAL",
            Self::Completion(CompletionError::Cancelled) => "CANCELLED",
            Self::Completion(_) => "COMPLETION_FAILED",
            Self::Store(StoreError::Conflict(_)) => "CONFLICT",
            Self::Store(StoreError::NotFound(_)) => "NOT_FOUND",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Text suitable for showing to the student.
    pub fn user_message(&self) -> String {
        match self {
            Self::Completion(e) => e.user_message(),
            Self::Store(StoreError::Conflict(msg)) => msg.clone(),
            Self::Store(_) => "Saving or loading your history failed. Please try again.".into(),
            other => other.to_string(),
        }
    }
}
