use ringlet_media::{LocalCapture, MediaAccessError, TransportEvent};

use crate::state::{CallSnapshot, EndReason, StreamInfo};
use crate::CallAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum CallUpdate {
    StateChanged {
        rev: u64,
        call: Option<CallSnapshot>,
    },
    LocalTrackAvailable {
        rev: u64,
        call_id: String,
        stream: StreamInfo,
    },
    RemoteTrackAvailable {
        rev: u64,
        call_id: String,
        stream: StreamInfo,
    },
    CallEnded {
        rev: u64,
        call_id: String,
        reason: EndReason,
    },
    ToastChanged {
        rev: u64,
        toast: Option<String>,
    },
}

impl CallUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            CallUpdate::StateChanged { rev, .. } => *rev,
            CallUpdate::LocalTrackAvailable { rev, .. } => *rev,
            CallUpdate::RemoteTrackAvailable { rev, .. } => *rev,
            CallUpdate::CallEnded { rev, .. } => *rev,
            CallUpdate::ToastChanged { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(CallAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Signaling channel
    SignalReceived {
        payload: String,
    },
    SignalingDisconnected,
    SignalingReconnected,

    // Async media results, tagged with the session generation that asked.
    LocalMediaAcquired {
        generation: u64,
        result: Result<LocalCapture, MediaAccessError>,
    },
    Transport {
        generation: u64,
        event: TransportEvent,
    },
}
