//! In-process stand-in for the chat server's call relay.
//!
//! Forwards call signals between the two participants of a chat, stamping
//! `fromId`, and answers an invite to an offline peer with
//! `call_unavailable`. Used to wire two engines together without a socket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{SignalInbox, SignalingSink};

// Types the relay forwards. `call_unavailable` is server-originated only.
const RELAYED_TYPES: &[&str] = &[
    "call_invite",
    "call_accept",
    "call_decline",
    "call_busy",
    "call_hangup",
    "webrtc_offer",
    "webrtc_answer",
    "webrtc_ice",
    "call_mute_state",
];

#[derive(Default)]
struct HubState {
    chats: HashMap<String, [String; 2]>,
    online: HashMap<String, SignalInbox>,
}

#[derive(Clone, Default)]
pub struct SignalingHub {
    inner: Arc<Mutex<HubState>>,
}

impl SignalingHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut HubState) -> R) -> R {
        match self.inner.lock() {
            Ok(mut g) => f(&mut g),
            Err(poison) => f(&mut poison.into_inner()),
        }
    }

    pub fn create_chat(&self, chat_id: &str, a: &str, b: &str) {
        self.with_state(|s| {
            s.chats
                .insert(chat_id.to_string(), [a.to_string(), b.to_string()]);
        });
    }

    /// Outbound sink for `user_id`, to hand to that user's engine.
    pub fn endpoint(&self, user_id: &str) -> Arc<HubEndpoint> {
        Arc::new(HubEndpoint {
            hub: self.clone(),
            user_id: user_id.to_string(),
        })
    }

    pub fn go_online(&self, user_id: &str, inbox: SignalInbox) {
        tracing::debug!(user_id, "hub: online");
        inbox.reconnected();
        self.with_state(|s| {
            s.online.insert(user_id.to_string(), inbox);
        });
    }

    pub fn go_offline(&self, user_id: &str) {
        tracing::debug!(user_id, "hub: offline");
        if let Some(inbox) = self.with_state(|s| s.online.remove(user_id)) {
            inbox.disconnected();
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.with_state(|s| s.online.contains_key(user_id))
    }

    fn route(&self, from: &str, payload: &str) -> bool {
        let Ok(mut value) = serde_json::from_str::<serde_json::Value>(payload) else {
            tracing::warn!(from, "hub: dropping non-json payload");
            return self.is_online(from);
        };
        let message_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        let chat_id = value
            .get("chatId")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        self.with_state(|s| {
            let Some(sender) = s.online.get(from).cloned() else {
                return false;
            };
            if !RELAYED_TYPES.contains(&message_type.as_str()) || chat_id.is_empty() {
                return true;
            }
            let Some(participants) = s.chats.get(&chat_id) else {
                tracing::debug!(chat_id = %chat_id, "hub: unknown chat");
                return true;
            };
            if !participants.iter().any(|p| p == from) {
                tracing::debug!(chat_id = %chat_id, from, "hub: sender not in chat");
                return true;
            }
            let Some(other) = participants.iter().find(|p| p.as_str() != from) else {
                return true;
            };

            match s.online.get(other) {
                Some(inbox) => {
                    value["fromId"] = serde_json::Value::String(from.to_string());
                    inbox.deliver(value.to_string());
                }
                None if message_type == "call_invite" => {
                    let reply = serde_json::json!({
                        "type": "call_unavailable",
                        "chatId": chat_id,
                        "reason": "offline",
                    });
                    sender.deliver(reply.to_string());
                }
                None => {}
            }
            true
        })
    }
}

/// One user's connection to the hub.
pub struct HubEndpoint {
    hub: SignalingHub,
    user_id: String,
}

impl SignalingSink for HubEndpoint {
    fn send(&self, payload: String) -> bool {
        self.hub.route(&self.user_id, &payload)
    }

    fn is_connected(&self) -> bool {
        self.hub.is_online(&self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use flume::Receiver;

    use super::*;
    use crate::updates::{CoreMsg, InternalEvent};

    fn inbox() -> (SignalInbox, Receiver<CoreMsg>) {
        let (core_tx, core_rx) = flume::unbounded();
        (SignalInbox { core_tx }, core_rx)
    }

    fn payloads(rx: &Receiver<CoreMsg>) -> Vec<serde_json::Value> {
        rx.try_iter()
            .filter_map(|msg| match msg {
                CoreMsg::Internal(ev) => match *ev {
                    InternalEvent::SignalReceived { payload } => {
                        Some(serde_json::from_str(&payload).unwrap())
                    }
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    #[test]
    fn relays_to_the_other_participant_with_sender_id() {
        let hub = SignalingHub::new();
        hub.create_chat("c1", "alice", "bob");
        let (a, a_rx) = inbox();
        let (b, b_rx) = inbox();
        hub.go_online("alice", a);
        hub.go_online("bob", b);

        let alice = hub.endpoint("alice");
        assert!(alice.send(r#"{"type":"call_invite","chatId":"c1","mode":"audio"}"#.to_string()));

        let got = payloads(&b_rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["type"], "call_invite");
        assert_eq!(got[0]["fromId"], "alice");
        assert!(payloads(&a_rx).is_empty());
    }

    #[test]
    fn invite_to_offline_peer_bounces_unavailable() {
        let hub = SignalingHub::new();
        hub.create_chat("c1", "alice", "bob");
        let (a, a_rx) = inbox();
        hub.go_online("alice", a);

        hub.endpoint("alice")
            .send(r#"{"type":"call_invite","chatId":"c1","mode":"video"}"#.to_string());
        // Non-invite signals to an offline peer just vanish.
        hub.endpoint("alice")
            .send(r#"{"type":"call_hangup","chatId":"c1"}"#.to_string());

        let got = payloads(&a_rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["type"], "call_unavailable");
        assert_eq!(got[0]["chatId"], "c1");
        assert_eq!(got[0]["reason"], "offline");
    }

    #[test]
    fn drops_unknown_chats_and_outsiders() {
        let hub = SignalingHub::new();
        hub.create_chat("c1", "alice", "bob");
        let (b, b_rx) = inbox();
        let (m, _m_rx) = inbox();
        hub.go_online("bob", b);
        hub.go_online("mallory", m);

        let mallory = hub.endpoint("mallory");
        assert!(mallory.send(r#"{"type":"call_hangup","chatId":"c1"}"#.to_string()));
        assert!(mallory.send(r#"{"type":"call_hangup","chatId":"nope"}"#.to_string()));
        assert!(payloads(&b_rx).is_empty());
    }

    #[test]
    fn offline_endpoint_cannot_send() {
        let hub = SignalingHub::new();
        hub.create_chat("c1", "alice", "bob");
        let alice = hub.endpoint("alice");
        assert!(!alice.is_connected());
        assert!(!alice.send(r#"{"type":"call_hangup","chatId":"c1"}"#.to_string()));

        let (a, a_rx) = inbox();
        hub.go_online("alice", a);
        assert!(alice.is_connected());
        hub.go_offline("alice");
        assert!(!alice.is_connected());
        let events: Vec<_> = a_rx.try_iter().collect();
        assert!(matches!(
            events.last(),
            Some(CoreMsg::Internal(ev)) if matches!(**ev, InternalEvent::SignalingDisconnected)
        ));
    }
}
