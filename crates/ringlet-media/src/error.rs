//! Media layer errors

use thiserror::Error;

/// The host could not hand out a capture device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaAccessError {
    /// The user or the OS refused access to the camera or microphone
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// No device matches the requested constraints
    #[error("no capture device available: {0}")]
    NoDevice(String),
}

/// A session description or candidate could not be produced or applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// Offer/answer requested before local media was attached
    #[error("local media is not attached")]
    LocalMediaMissing,
    /// Answer requested without a remote offer
    #[error("no remote offer to answer")]
    RemoteOfferMissing,
    /// Remote description could not be parsed or does not fit the transport
    #[error("malformed session description: {0}")]
    MalformedDescription(String),
    /// Candidate could not be parsed
    #[error("malformed candidate: {0}")]
    MalformedCandidate(String),
    /// Operation issued in a transport state that does not allow it
    #[error("invalid transport state: {0}")]
    InvalidState(String),
}

/// Media session error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaSessionError {
    /// Capture failure
    #[error(transparent)]
    MediaAccess(#[from] MediaAccessError),
    /// Negotiation failure
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    /// The host could not build a transport
    #[error("transport setup failed: {0}")]
    Transport(String),
    /// The session was already closed
    #[error("media session is closed")]
    Closed,
}
