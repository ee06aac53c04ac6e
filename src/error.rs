//! Domain errors raised by queue commands.
//!
//! Every variant is local and synchronous: the engine validates before it
//! mutates, so a command that returns one of these left the queue untouched.
//! Infrastructure failures (file I/O, SQL, config parsing) travel as
//! `anyhow::Error` instead and never reach this type.

use crate::entrant::{EntrantId, Status};

/// Rejection of a queue command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Bad input: empty name, non-positive tour length.
    Validation(String),
    /// No entrant with this id exists.
    NotFound { id: EntrantId },
    /// The requested status change is a no-op or not allowed from the current status.
    InvalidTransition {
        id: EntrantId,
        from: Status,
        to: Status,
    },
    /// A reorder request whose ids are not exactly the current waiting set.
    InvalidReorder(String),
}

impl QueueError {
    /// Short machine-readable tag, sent as the `kind` field of API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueError::Validation(_) => "validation",
            QueueError::NotFound { .. } => "not_found",
            QueueError::InvalidTransition { .. } => "invalid_transition",
            QueueError::InvalidReorder(_) => "invalid_reorder",
        }
    }
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Validation(msg) => write!(f, "validation failed: {}", msg),
            QueueError::NotFound { id } => write!(f, "entrant {} not found", id),
            QueueError::InvalidTransition { id, from, to } => {
                write!(f, "entrant {} cannot move from {} to {}", id, from, to)
            }
            QueueError::InvalidReorder(msg) => write!(f, "invalid reorder: {}", msg),
        }
    }
}

impl std::error::Error for QueueError {}
