//! Call signaling envelopes.
//!
//! Shares the chat socket with ordinary chat traffic, so decoding answers
//! "is this a call signal at all" before "is it a valid one".

use ringlet_media::{IceCandidate, SessionDescription};
use serde::{Deserialize, Serialize};

use crate::state::CallMode;

pub const CALL_SIGNAL_TYPES: &[&str] = &[
    "call_invite",
    "call_accept",
    "call_decline",
    "call_busy",
    "call_unavailable",
    "call_hangup",
    "call_mute_state",
    "webrtc_offer",
    "webrtc_answer",
    "webrtc_ice",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CallSignal {
    #[serde(rename = "call_invite")]
    Invite {
        #[serde(rename = "chatId")]
        chat_id: String,
        mode: CallMode,
    },
    #[serde(rename = "call_accept")]
    Accept {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    #[serde(rename = "call_decline")]
    Decline {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    #[serde(rename = "call_busy")]
    Busy {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    #[serde(rename = "call_unavailable")]
    Unavailable {
        #[serde(rename = "chatId")]
        chat_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "call_hangup")]
    Hangup {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    #[serde(rename = "call_mute_state")]
    MuteState {
        #[serde(rename = "chatId")]
        chat_id: String,
        muted: bool,
    },
    #[serde(rename = "webrtc_offer")]
    Offer {
        #[serde(rename = "chatId")]
        chat_id: String,
        sdp: SessionDescription,
    },
    #[serde(rename = "webrtc_answer")]
    Answer {
        #[serde(rename = "chatId")]
        chat_id: String,
        sdp: SessionDescription,
    },
    #[serde(rename = "webrtc_ice")]
    Ice {
        #[serde(rename = "chatId")]
        chat_id: String,
        candidate: IceCandidate,
    },
}

impl CallSignal {
    pub fn chat_id(&self) -> &str {
        match self {
            CallSignal::Invite { chat_id, .. }
            | CallSignal::Accept { chat_id }
            | CallSignal::Decline { chat_id }
            | CallSignal::Busy { chat_id }
            | CallSignal::Unavailable { chat_id, .. }
            | CallSignal::Hangup { chat_id }
            | CallSignal::MuteState { chat_id, .. }
            | CallSignal::Offer { chat_id, .. }
            | CallSignal::Answer { chat_id, .. }
            | CallSignal::Ice { chat_id, .. } => chat_id,
        }
    }

    /// Wire `type` of the signal; also a log-safe tag.
    pub fn kind(&self) -> &'static str {
        match self {
            CallSignal::Invite { .. } => "call_invite",
            CallSignal::Accept { .. } => "call_accept",
            CallSignal::Decline { .. } => "call_decline",
            CallSignal::Busy { .. } => "call_busy",
            CallSignal::Unavailable { .. } => "call_unavailable",
            CallSignal::Hangup { .. } => "call_hangup",
            CallSignal::MuteState { .. } => "call_mute_state",
            CallSignal::Offer { .. } => "webrtc_offer",
            CallSignal::Answer { .. } => "webrtc_answer",
            CallSignal::Ice { .. } => "webrtc_ice",
        }
    }
}

#[derive(Deserialize)]
struct TypeProbe {
    #[serde(rename = "type")]
    message_type: Option<String>,
}

fn call_type_of(content: &str) -> Option<String> {
    let probe: TypeProbe = serde_json::from_str(content).ok()?;
    probe
        .message_type
        .filter(|t| CALL_SIGNAL_TYPES.contains(&t.as_str()))
}

/// Decodes a socket payload. `None` for chat traffic and for call signals
/// with a broken body (the latter are logged).
pub fn parse_call_signal(content: &str) -> Option<CallSignal> {
    let message_type = call_type_of(content)?;
    match serde_json::from_str::<CallSignal>(content) {
        Ok(signal) => Some(signal),
        Err(e) => {
            tracing::warn!(kind = %message_type, err = %e, "dropping malformed call signal");
            None
        }
    }
}

pub fn is_call_signal_payload(content: &str) -> bool {
    call_type_of(content).is_some()
}

pub fn build_call_signal_json(signal: &CallSignal) -> Result<String, serde_json::Error> {
    serde_json::to_string(signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_invite_from_relay() {
        let json = r#"{"type":"call_invite","chatId":"7","mode":"audio","fromId":"u-1"}"#;
        assert_eq!(
            parse_call_signal(json),
            Some(CallSignal::Invite {
                chat_id: "7".to_string(),
                mode: CallMode::Audio,
            })
        );
    }

    #[test]
    fn builds_offer_in_browser_shape() {
        let signal = CallSignal::Offer {
            chat_id: "c1".to_string(),
            sdp: SessionDescription::offer("v=0\r\n"),
        };
        let json = build_call_signal_json(&signal).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "webrtc_offer");
        assert_eq!(v["chatId"], "c1");
        assert_eq!(v["sdp"]["type"], "offer");
        assert_eq!(v["sdp"]["sdp"], "v=0\r\n");
    }

    #[test]
    fn parses_ice_with_browser_field_names() {
        let json = r#"{"type":"webrtc_ice","chatId":"c1","candidate":{"candidate":"candidate:1 1 udp 1 1.2.3.4 9 typ host","sdpMid":"0","sdpMLineIndex":0}}"#;
        match parse_call_signal(json) {
            Some(CallSignal::Ice { chat_id, candidate }) => {
                assert_eq!(chat_id, "c1");
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(candidate.sdp_mline_index, Some(0));
            }
            other => panic!("expected ice, got {other:?}"),
        }
    }

    #[test]
    fn unavailable_reason_is_optional() {
        let with = parse_call_signal(
            r#"{"type":"call_unavailable","chatId":"c1","reason":"offline"}"#,
        );
        assert_eq!(
            with,
            Some(CallSignal::Unavailable {
                chat_id: "c1".to_string(),
                reason: Some("offline".to_string()),
            })
        );
        let json = build_call_signal_json(&CallSignal::Unavailable {
            chat_id: "c1".to_string(),
            reason: None,
        })
        .unwrap();
        assert!(!json.contains("reason"));
    }

    #[test]
    fn ignores_chat_traffic() {
        let msg = r#"{"type":"new_message","chatId":"c1","text":"hi"}"#;
        assert!(parse_call_signal(msg).is_none());
        assert!(!is_call_signal_payload(msg));
        assert!(!is_call_signal_payload("not json"));
    }

    #[test]
    fn malformed_call_signal_is_dropped() {
        let msg = r#"{"type":"webrtc_offer","chatId":"c1"}"#;
        assert!(is_call_signal_payload(msg));
        assert!(parse_call_signal(msg).is_none());
    }

    #[test]
    fn kind_matches_wire_type() {
        let signal = CallSignal::MuteState {
            chat_id: "c".to_string(),
            muted: true,
        };
        let v: serde_json::Value =
            serde_json::from_str(&build_call_signal_json(&signal).unwrap()).unwrap();
        assert_eq!(v["type"], signal.kind());
        assert_eq!(signal.chat_id(), "c");
    }
}
