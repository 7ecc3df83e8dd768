use ringlet_media::{CaptureConstraints, MediaStream, TrackKind};
use serde::{Deserialize, Serialize};

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallMode {
    Audio,
    Video,
}

impl CallMode {
    pub fn capture_constraints(self) -> CaptureConstraints {
        match self {
            Self::Audio => CaptureConstraints::audio_only(),
            Self::Video => CaptureConstraints::audio_video(),
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, Self::Video)
    }
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallRole {
    Caller,
    Callee,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    Calling,
    Ringing,
    InCall,
}

/// Media path status as shown on the call screen.
#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaConnection {
    New,
    Connecting,
    Connected,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum EndReason {
    HungUp,
    RemoteHangup,
    Declined,
    DeclinedLocally,
    Busy,
    Unavailable,
    MediaAccess { message: String },
    Negotiation { message: String },
    TransportFailure,
    SignalingLost,
    SignalingFailed { message: String },
}

impl EndReason {
    /// Outcomes that are a normal answer from the other side rather than a
    /// failure on either end.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            Self::HungUp
                | Self::RemoteHangup
                | Self::Declined
                | Self::DeclinedLocally
                | Self::Busy
                | Self::Unavailable
        )
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::HungUp => "hung_up",
            Self::RemoteHangup => "remote_hangup",
            Self::Declined => "declined",
            Self::DeclinedLocally => "declined_locally",
            Self::Busy => "busy",
            Self::Unavailable => "unavailable",
            Self::MediaAccess { .. } => "media_access",
            Self::Negotiation { .. } => "negotiation",
            Self::TransportFailure => "transport_failure",
            Self::SignalingLost => "signaling_lost",
            Self::SignalingFailed { .. } => "signaling_failed",
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub stream_id: String,
    pub audio_tracks: u32,
    pub video_tracks: u32,
}

impl From<&MediaStream> for StreamInfo {
    fn from(stream: &MediaStream) -> Self {
        Self {
            stream_id: stream.id.clone(),
            audio_tracks: stream.count(TrackKind::Audio) as u32,
            video_tracks: stream.count(TrackKind::Video) as u32,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct CallSnapshot {
    pub call_id: String,
    pub session_id: String,
    pub role: CallRole,
    pub mode: CallMode,
    pub phase: CallPhase,
    pub accepted: bool,
    pub connection: MediaConnection,
    pub is_muted: bool,
    pub is_video_enabled: bool,
    pub peer_muted: bool,
    pub has_local_media: bool,
    pub has_remote_media: bool,
    pub started_at: Option<i64>,
}

impl CallSnapshot {
    pub fn is_live(&self) -> bool {
        !matches!(self.phase, CallPhase::Idle)
    }

    /// Status line for the call overlay.
    pub fn status_label(&self) -> &'static str {
        match (self.phase, self.connection) {
            (CallPhase::Idle, _) => "",
            (CallPhase::Calling, _) => "Calling...",
            (CallPhase::Ringing, _) if self.accepted => "Connecting...",
            (CallPhase::Ringing, _) => "Incoming call",
            (CallPhase::InCall, MediaConnection::Connected) => "",
            (CallPhase::InCall, _) => "Connecting...",
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct CallEndSummary {
    pub call_id: String,
    pub reason: EndReason,
    pub ended_at: i64,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct CallAppState {
    pub rev: u64,
    pub signaling_connected: bool,
    pub active_call: Option<CallSnapshot>,
    pub last_end: Option<CallEndSummary>,
    pub toast: Option<String>,
}

impl CallAppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            signaling_connected: true,
            active_call: None,
            last_end: None,
            toast: None,
        }
    }

    pub fn phase(&self) -> CallPhase {
        self.active_call
            .as_ref()
            .map(|c| c.phase)
            .unwrap_or(CallPhase::Idle)
    }
}

pub(crate) fn now_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}
