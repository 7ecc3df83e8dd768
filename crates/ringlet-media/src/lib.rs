//! Media layer for ringlet calls.
//!
//! Owns everything that touches the host's capture devices and the
//! point-to-point transport: the [`MediaSession`] controller, the
//! [`CandidateBuffer`] used before a remote description exists, and the
//! [`MediaHost`] / [`PeerTransport`] traits a platform implements.

pub mod candidates;
pub mod error;
pub mod host;
pub mod loopback;
pub mod negotiation;
pub mod session;
pub mod tracks;

pub use candidates::{Admission, CandidateBuffer};
pub use error::{MediaAccessError, MediaSessionError, NegotiationError};
pub use host::{
    ConnectionState, MediaHost, PeerTransport, TransportConfig, TransportEvent,
    TransportEventSink,
};
pub use loopback::{LoopbackHost, TransportProbe};
pub use negotiation::{IceCandidate, SdpType, SessionDescription};
pub use session::{CandidateDisposition, MediaSession};
pub use tracks::{CaptureConstraints, LocalCapture, MediaStream, TrackInfo, TrackKind};
