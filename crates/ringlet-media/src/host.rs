use std::sync::Arc;

use crate::error::{MediaAccessError, MediaSessionError, NegotiationError};
use crate::negotiation::{IceCandidate, SessionDescription};
use crate::tracks::{CaptureConstraints, LocalCapture, MediaStream, TrackKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub ice_servers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// `Disconnected` and `Failed` end the call; nothing retries.
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A local candidate to trickle to the peer.
    LocalCandidate(IceCandidate),
    /// The peer's media became available.
    RemoteTrack(MediaStream),
    ConnectionStateChanged(ConnectionState),
}

/// Receives transport callbacks. Implementations must not block.
pub trait TransportEventSink: Send + Sync {
    fn emit(&self, event: TransportEvent);
}

/// Host platform media APIs (camera/microphone plus transport factory).
pub trait MediaHost: Send + Sync {
    /// May block while the platform prompts for permission.
    fn request_capture(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<LocalCapture, MediaAccessError>;

    /// Stops every track of the capture and frees the device.
    fn release_capture(&self, capture: LocalCapture);

    fn set_track_enabled(&self, capture: &LocalCapture, kind: TrackKind, enabled: bool);

    fn create_transport(
        &self,
        config: &TransportConfig,
        events: Arc<dyn TransportEventSink>,
    ) -> Result<Box<dyn PeerTransport>, MediaSessionError>;
}

/// One point-to-point media transport (an `RTCPeerConnection` on the web).
pub trait PeerTransport: Send {
    fn add_local_stream(&mut self, stream: &MediaStream) -> Result<(), NegotiationError>;
    fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError>;
    fn create_answer(&mut self) -> Result<SessionDescription, NegotiationError>;
    fn set_local_description(&mut self, desc: &SessionDescription)
        -> Result<(), NegotiationError>;
    fn set_remote_description(
        &mut self,
        desc: &SessionDescription,
    ) -> Result<(), NegotiationError>;
    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), NegotiationError>;
    fn close(&mut self);
}
