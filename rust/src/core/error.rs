use ringlet_media::{MediaAccessError, MediaSessionError, NegotiationError};

use crate::state::EndReason;

/// Failures that end a call. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Camera/microphone unavailable
    #[error(transparent)]
    MediaAccess(#[from] MediaAccessError),
    /// Offer/answer/candidate could not be produced or applied
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    /// Transport could not be built, or the media session is gone
    #[error("media session: {0}")]
    Media(String),
    /// The signaling sink refused the message
    #[error("signaling channel unavailable")]
    SignalingUnavailable,
    /// Signal could not be serialized
    #[error("encode call signal: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<MediaSessionError> for CallError {
    fn from(e: MediaSessionError) -> Self {
        match e {
            MediaSessionError::MediaAccess(e) => Self::MediaAccess(e),
            MediaSessionError::Negotiation(e) => Self::Negotiation(e),
            other => Self::Media(other.to_string()),
        }
    }
}

impl CallError {
    pub fn end_reason(&self) -> EndReason {
        match self {
            Self::MediaAccess(e) => EndReason::MediaAccess {
                message: e.to_string(),
            },
            Self::Negotiation(e) => EndReason::Negotiation {
                message: e.to_string(),
            },
            Self::Media(message) => EndReason::Negotiation {
                message: message.clone(),
            },
            Self::SignalingUnavailable => EndReason::SignalingFailed {
                message: self.to_string(),
            },
            Self::Encode(e) => EndReason::SignalingFailed {
                message: e.to_string(),
            },
        }
    }
}
