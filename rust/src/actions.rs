use crate::state::CallMode;

/// Local intents coming from the call UI.
#[derive(uniffi::Enum, Debug, Clone, PartialEq, Eq)]
pub enum CallAction {
    StartCall { chat_id: String, mode: CallMode },
    AcceptCall,
    DeclineCall,
    HangUp,
    SetMuted { muted: bool },
    SetVideoEnabled { enabled: bool },

    // UI
    ClearToast,
}

impl CallAction {
    /// Log-safe action tag.
    pub fn tag(&self) -> &'static str {
        match self {
            CallAction::StartCall { .. } => "StartCall",
            CallAction::AcceptCall => "AcceptCall",
            CallAction::DeclineCall => "DeclineCall",
            CallAction::HangUp => "HangUp",
            CallAction::SetMuted { .. } => "SetMuted",
            CallAction::SetVideoEnabled { .. } => "SetVideoEnabled",
            CallAction::ClearToast => "ClearToast",
        }
    }
}
