//! Caller-visible exception taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::MediaError;

/// Result type for facade operations
pub type ServiceResult<T> = Result<T, MediaServerException>;

/// Exceptions raised by the RPC-facing operations.
///
/// Each variant carries a stable numeric code and wire name.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MediaServerException {
    #[error("{message}")]
    MediaObjectNotFound { message: String },

    #[error("{message}")]
    NoParent { message: String },

    #[error("{message}")]
    InvalidState { message: String },

    #[error("{message}")]
    EngineFailure { message: String },
}

impl MediaServerException {
    pub fn code(&self) -> i32 {
        match self {
            Self::MediaObjectNotFound { .. } => 1,
            Self::NoParent { .. } => 2,
            Self::InvalidState { .. } => 3,
            Self::EngineFailure { .. } => 4,
        }
    }

    /// Wire name of the exception
    pub fn name(&self) -> &'static str {
        match self {
            Self::MediaObjectNotFound { .. } => "MediaObjectNotFoundException",
            Self::NoParent { .. } => "NoParentException",
            Self::InvalidState { .. } => "InvalidStateException",
            Self::EngineFailure { .. } => "EngineFailureException",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::MediaObjectNotFound { message }
            | Self::NoParent { message }
            | Self::InvalidState { message }
            | Self::EngineFailure { message } => message,
        }
    }
}

impl From<MediaError> for MediaServerException {
    fn from(error: MediaError) -> Self {
        let message = error.to_string();
        match error {
            MediaError::NotFound { .. } => Self::MediaObjectNotFound { message },
            MediaError::NoParent { .. } => Self::NoParent { message },
            MediaError::InvalidState { .. } => Self::InvalidState { message },
            MediaError::Engine(_) => Self::EngineFailure { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::types::{MediaKind, ObjectId};

    #[test]
    fn test_mapping_and_codes() {
        let cases = [
            (MediaError::not_found(ObjectId(1)), 1, "MediaObjectNotFoundException"),
            (MediaError::no_parent(ObjectId(1)), 2, "NoParentException"),
            (
                MediaError::invalid_state(ObjectId(1), MediaKind::RtpEndpoint, "processAnswer", "CREATED"),
                3,
                "InvalidStateException",
            ),
            (
                MediaError::from(EngineError::SdpSynthesis { reason: "boom".into() }),
                4,
                "EngineFailureException",
            ),
        ];

        for (error, code, name) in cases {
            let exception = MediaServerException::from(error);
            assert_eq!(exception.code(), code);
            assert_eq!(exception.name(), name);
        }
    }

    #[test]
    fn test_invalid_state_message_names_state() {
        let exception = MediaServerException::from(MediaError::invalid_state(
            ObjectId(9),
            MediaKind::WebRtcEndpoint,
            "processAnswer",
            "CREATED",
        ));
        assert_eq!(
            exception.message(),
            "Cannot processAnswer on WebRtcEndpoint 9 in state CREATED"
        );
    }
}
