use serde::{Deserialize, Serialize};

use crate::error::NegotiationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Opaque session description, shaped like the browser's
/// `RTCSessionDescriptionInit` so it can cross the signaling channel as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Cheap structural check; the transport does the real parsing.
    pub fn validate(&self) -> Result<(), NegotiationError> {
        if self.sdp.trim().is_empty() {
            return Err(NegotiationError::MalformedDescription(
                "sdp body is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trickle ICE candidate in `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>, sdp_mid: Option<String>, index: Option<u16>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid,
            sdp_mline_index: index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_uses_browser_field_names() {
        let desc = SessionDescription::offer("v=0\r\n");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["sdp"], "v=0\r\n");
    }

    #[test]
    fn candidate_accepts_missing_optional_fields() {
        let c: IceCandidate =
            serde_json::from_str(r#"{"candidate":"candidate:1 1 udp 1 10.0.0.1 5000 typ host"}"#)
                .unwrap();
        assert_eq!(c.sdp_mid, None);
        assert_eq!(c.sdp_mline_index, None);

        let c: IceCandidate = serde_json::from_str(
            r#"{"candidate":"candidate:x","sdpMid":"0","sdpMLineIndex":1,"usernameFragment":"ab"}"#,
        )
        .unwrap();
        assert_eq!(c.sdp_mid.as_deref(), Some("0"));
        assert_eq!(c.sdp_mline_index, Some(1));
    }

    #[test]
    fn empty_description_is_rejected() {
        let desc = SessionDescription::answer("  ");
        assert!(matches!(
            desc.validate(),
            Err(NegotiationError::MalformedDescription(_))
        ));
    }
}
