//! Session engine error taxonomy

use crate::types::{GameKind, SessionStatus};

/// Result type for session engine operations
pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Session, content item or player is missing
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation attempted from a status that does not permit it.
    /// Controller operations swallow this and report "no change".
    #[error("invalid transition: cannot {action} while {status:?}")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
    },

    /// Player acting outside their team, turn, role or phase
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("insufficient content for {}: requested {requested}, available {available}", game.as_str())]
    InsufficientContent {
        game: GameKind,
        requested: usize,
        available: usize,
    },

    #[error("all balls have been drawn")]
    Exhausted,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SessionError {
    /// Stable code sent to clients in `ServerMessage::Error`
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "NOT_FOUND",
            SessionError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SessionError::Forbidden(_) => "FORBIDDEN",
            SessionError::InsufficientContent { .. } => "INSUFFICIENT_CONTENT",
            SessionError::Exhausted => "EXHAUSTED",
            SessionError::InvalidInput(_) => "INVALID_INPUT",
        }
    }

    pub fn session_not_found(id: &str) -> Self {
        SessionError::NotFound(format!("session {}", id))
    }
}
