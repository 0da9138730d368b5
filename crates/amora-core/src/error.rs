use thiserror::Error;

use amora_types::models::ChatRequestStatus;

/// Errors produced by the conversation & credit core.
///
/// Every operation returns exactly one of these or its success value; the
/// HTTP layer decides how each maps onto a status code.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing required fields or a self-targeting action.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Non-participant, blocked relation, or acting on someone else's request.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Chat request already {0}")]
    AlreadyProcessed(ChatRequestStatus),

    #[error("Insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits { balance: i64, required: i64 },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    pub(crate) fn blocked() -> Self {
        CoreError::Forbidden("blocked".to_string())
    }

    pub(crate) fn not_participant() -> Self {
        CoreError::Forbidden("not a participant of this conversation".to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
