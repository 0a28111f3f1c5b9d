//! Error types for object-core

use thiserror::Error;

use crate::engine::EngineError;
use crate::types::{MediaKind, ObjectId};

/// Result type for media object operations
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors raised by the store, the graph and the endpoint state machines
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The object does not exist, or exists under a different token
    #[error("Media object not found: {id}")]
    NotFound { id: ObjectId },

    /// The object exists but is the root of its tree
    #[error("Media object {id} has no parent")]
    NoParent { id: ObjectId },

    /// The object's current state or kind does not permit the operation
    #[error("Cannot {operation} on {kind} {id} in state {state}")]
    InvalidState {
        id: ObjectId,
        kind: MediaKind,
        operation: &'static str,
        state: String,
    },

    /// The media-processing engine reported a failure
    #[error("Media engine failure: {0}")]
    Engine(#[from] EngineError),
}

impl MediaError {
    /// Create a not found error
    pub fn not_found(id: ObjectId) -> Self {
        Self::NotFound { id }
    }

    /// Create a no parent error
    pub fn no_parent(id: ObjectId) -> Self {
        Self::NoParent { id }
    }

    /// Create an invalid state error
    pub fn invalid_state(
        id: ObjectId,
        kind: MediaKind,
        operation: &'static str,
        state: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            id,
            kind,
            operation,
            state: state.into(),
        }
    }

    /// Create an error for an operation the object's kind does not support
    pub fn unsupported(id: ObjectId, kind: MediaKind, operation: &'static str) -> Self {
        Self::invalid_state(id, kind, operation, "UNSUPPORTED")
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
