use ringlet_media::{
    CandidateDisposition, ConnectionState, IceCandidate, LocalCapture, MediaAccessError,
    MediaSession, MediaSessionError, SessionDescription, TransportEvent,
};

use super::signaling::{build_call_signal_json, parse_call_signal, CallSignal};
use super::{CallCore, CallError};
use crate::state::{
    now_seconds, CallEndSummary, CallMode, CallPhase, CallRole, CallSnapshot, EndReason,
    MediaConnection, StreamInfo,
};
use crate::updates::CallUpdate;

/// What to do once local media is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterMedia {
    SendOffer,
    SendAnswer,
}

/// The one live call. Dropping it closes its media session.
#[derive(Debug)]
pub(super) struct CallSession {
    call_id: String,
    session_id: String,
    // Stamped on every async result so completions for a torn-down session
    // can be recognised.
    generation: u64,
    role: CallRole,
    mode: CallMode,
    phase: CallPhase,
    accepted: bool,

    media: Option<MediaSession>,
    capture_in_flight: bool,
    after_media: Option<AfterMedia>,
    deferred_offer: Option<SessionDescription>,

    connection: MediaConnection,
    is_muted: bool,
    video_enabled: bool,
    peer_muted: bool,
    has_remote_media: bool,
    started_at: Option<i64>,
}

impl CallSession {
    fn new(call_id: String, generation: u64, role: CallRole, mode: CallMode, phase: CallPhase) -> Self {
        Self {
            call_id,
            session_id: uuid::Uuid::new_v4().to_string(),
            generation,
            role,
            mode,
            phase,
            accepted: matches!(role, CallRole::Caller),
            media: None,
            capture_in_flight: false,
            after_media: None,
            deferred_offer: None,
            connection: MediaConnection::New,
            is_muted: false,
            video_enabled: mode.is_video(),
            peer_muted: false,
            has_remote_media: false,
            started_at: None,
        }
    }

    pub(super) fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            call_id: self.call_id.clone(),
            session_id: self.session_id.clone(),
            role: self.role,
            mode: self.mode,
            phase: self.phase,
            accepted: self.accepted,
            connection: self.connection,
            is_muted: self.is_muted,
            is_video_enabled: self.video_enabled,
            peer_muted: self.peer_muted,
            has_local_media: self.has_local_media(),
            has_remote_media: self.has_remote_media,
            started_at: self.started_at,
        }
    }

    pub(super) fn pending_candidates(&self) -> usize {
        self.media
            .as_ref()
            .map(MediaSession::pending_candidates)
            .unwrap_or(0)
    }

    fn has_local_media(&self) -> bool {
        self.media
            .as_ref()
            .map(MediaSession::has_local_media)
            .unwrap_or(false)
    }

    fn media_mut(&mut self) -> Result<&mut MediaSession, CallError> {
        self.media
            .as_mut()
            .ok_or_else(|| CallError::Media(MediaSessionError::Closed.to_string()))
    }
}

impl CallCore {
    fn send_signal(&self, signal: &CallSignal) -> Result<(), CallError> {
        let payload = build_call_signal_json(signal)?;
        if !self.signaling.send(payload) {
            return Err(CallError::SignalingUnavailable);
        }
        tracing::debug!(kind = signal.kind(), call_id = signal.chat_id(), "call signal sent");
        Ok(())
    }

    fn send_best_effort(&self, signal: CallSignal) {
        if let Err(e) = self.send_signal(&signal) {
            tracing::warn!(kind = signal.kind(), call_id = signal.chat_id(), err = %e, "call signal not sent");
        }
    }

    fn signaling_up(&self) -> bool {
        self.state.signaling_connected && self.signaling.is_connected()
    }

    fn active_call_id(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.call_id.clone())
    }

    /// Every path back to idle goes through here. Emits exactly one
    /// `CallEnded`.
    fn end_call(&mut self, reason: EndReason) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Some(mut media) = session.media.take() {
            media.close();
        }
        tracing::info!(
            call_id = %session.call_id,
            generation = session.generation,
            reason = reason.tag(),
            "call ended"
        );

        self.state.active_call = None;
        self.state.last_end = Some(CallEndSummary {
            call_id: session.call_id.clone(),
            reason: reason.clone(),
            ended_at: now_seconds(),
        });
        let call_id = session.call_id;
        self.emit(|rev| CallUpdate::CallEnded {
            rev,
            call_id,
            reason,
        });
        self.emit_call_state();
    }

    /// Ends the call because of `err`. `announce` sends a best-effort hangup
    /// first so the peer does not sit in a dead call.
    fn fail_call(&mut self, err: CallError, announce: bool) {
        let Some(call_id) = self.active_call_id() else {
            return;
        };
        tracing::error!(call_id = %call_id, err = %err, "call failed");
        if announce {
            self.send_best_effort(CallSignal::Hangup {
                chat_id: call_id.clone(),
            });
        }
        self.end_call(err.end_reason());
    }

    fn begin_session(&mut self, call_id: String, role: CallRole, mode: CallMode, phase: CallPhase) {
        let generation = self.media.next_generation();
        tracing::info!(call_id = %call_id, generation, ?role, ?mode, "call session created");
        self.session = Some(CallSession::new(call_id, generation, role, mode, phase));
        self.state.last_end = None;
        self.emit_call_state();
    }

    // ---- local intents ----

    pub(super) fn handle_start_call_action(&mut self, chat_id: &str, mode: CallMode) {
        let chat_id = chat_id.trim();
        if chat_id.is_empty() {
            self.toast("Chat not found");
            return;
        }
        if !self.signaling_up() {
            self.toast("Not connected");
            return;
        }
        if self.session.is_some() {
            self.toast("Already in a call");
            return;
        }

        self.begin_session(chat_id.to_string(), CallRole::Caller, mode, CallPhase::Calling);
        let invite = CallSignal::Invite {
            chat_id: chat_id.to_string(),
            mode,
        };
        if let Err(e) = self.send_signal(&invite) {
            self.fail_call(e, false);
        }
    }

    pub(super) fn handle_accept_call_action(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.phase != CallPhase::Ringing || session.accepted {
            return;
        }
        let accept = CallSignal::Accept {
            chat_id: session.call_id.clone(),
        };
        if let Err(e) = self.send_signal(&accept) {
            self.fail_call(e, false);
            return;
        }
        // The caller answers with an offer; media is acquired when it lands.
        if let Some(session) = self.session.as_mut() {
            session.accepted = true;
        }
        self.emit_call_state();
    }

    pub(super) fn handle_decline_call_action(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.phase != CallPhase::Ringing {
            return;
        }
        self.send_best_effort(CallSignal::Decline {
            chat_id: session.call_id.clone(),
        });
        self.end_call(EndReason::DeclinedLocally);
    }

    pub(super) fn handle_hang_up_action(&mut self) {
        let Some(call_id) = self.active_call_id() else {
            return;
        };
        self.send_best_effort(CallSignal::Hangup { chat_id: call_id });
        self.end_call(EndReason::HungUp);
    }

    pub(super) fn handle_set_muted_action(&mut self, muted: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase != CallPhase::InCall || session.is_muted == muted {
            return;
        }
        session.is_muted = muted;
        // Without a capture yet the flag is applied on attach.
        if let Some(media) = session.media.as_mut() {
            media.set_local_audio_enabled(!muted);
        }
        let chat_id = session.call_id.clone();
        self.send_best_effort(CallSignal::MuteState { chat_id, muted });
        self.emit_call_state();
    }

    pub(super) fn handle_set_video_enabled_action(&mut self, enabled: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase != CallPhase::InCall {
            return;
        }
        if !session.mode.is_video() {
            self.toast("Audio-only call");
            return;
        }
        if session.video_enabled == enabled {
            return;
        }
        session.video_enabled = enabled;
        if let Some(media) = session.media.as_mut() {
            media.set_local_video_enabled(enabled);
        }
        self.emit_call_state();
    }

    // ---- signaling channel ----

    pub(super) fn handle_signal_payload(&mut self, payload: &str) {
        let Some(signal) = parse_call_signal(payload) else {
            tracing::trace!("ignoring non-call payload");
            return;
        };
        self.handle_incoming_call_signal(signal);
    }

    pub(super) fn handle_signaling_disconnected(&mut self) {
        tracing::warn!(in_call = self.session.is_some(), "signaling channel disconnected");
        self.state.signaling_connected = false;
        if self.session.is_some() {
            // Nothing can be announced; the channel is what went away.
            self.end_call(EndReason::SignalingLost);
        } else {
            self.emit_call_state();
        }
    }

    pub(super) fn handle_signaling_reconnected(&mut self) {
        tracing::info!("signaling channel reconnected");
        self.state.signaling_connected = true;
        self.emit_call_state();
    }

    pub(super) fn handle_incoming_call_signal(&mut self, signal: CallSignal) {
        tracing::debug!(
            kind = signal.kind(),
            call_id = signal.chat_id(),
            phase = ?self.state.phase(),
            "call signal received"
        );
        let kind = signal.kind();
        match signal {
            CallSignal::Invite { chat_id, mode } => self.on_invite(chat_id, mode),
            CallSignal::Accept { chat_id } => {
                if self.live_phase(&chat_id, kind) == Some(CallPhase::Calling) {
                    self.on_remote_accept();
                }
            }
            CallSignal::Decline { chat_id } => self.on_remote_end(&chat_id, kind, EndReason::Declined),
            CallSignal::Busy { chat_id } => self.on_remote_end(&chat_id, kind, EndReason::Busy),
            CallSignal::Unavailable { chat_id, reason } => {
                tracing::info!(reason = reason.as_deref().unwrap_or(""), "peer unavailable");
                self.on_remote_end(&chat_id, kind, EndReason::Unavailable)
            }
            CallSignal::Hangup { chat_id } => {
                self.on_remote_end(&chat_id, kind, EndReason::RemoteHangup)
            }
            CallSignal::MuteState { chat_id, muted } => {
                if self.live_phase(&chat_id, kind).is_none() {
                    return;
                }
                if let Some(session) = self.session.as_mut() {
                    session.peer_muted = muted;
                }
                self.emit_call_state();
            }
            CallSignal::Offer { chat_id, sdp } => match self.live_phase(&chat_id, kind) {
                Some(CallPhase::Ringing | CallPhase::InCall) => self.on_remote_offer(sdp),
                // Kept as-is: an offer before our own accept->in-call step
                // is dropped. Revisit if glare handling is added.
                Some(phase) => tracing::debug!(?phase, "offer ignored"),
                None => {}
            },
            CallSignal::Answer { chat_id, sdp } => {
                if self.live_phase(&chat_id, kind).is_none() {
                    return;
                }
                if self.expecting_answer() {
                    self.on_remote_answer(sdp);
                } else {
                    tracing::debug!("stale answer ignored");
                }
            }
            CallSignal::Ice { chat_id, candidate } => match self.live_phase(&chat_id, kind) {
                Some(CallPhase::InCall) => self.on_remote_candidate(candidate),
                Some(phase) => tracing::debug!(?phase, "candidate for inactive session dropped"),
                None => {}
            },
        }
    }

    /// Phase of the active call if `chat_id` names it.
    fn live_phase(&self, chat_id: &str, kind: &'static str) -> Option<CallPhase> {
        let Some(session) = self.session.as_ref() else {
            tracing::debug!(kind, "no active call; dropping signal");
            return None;
        };
        if session.call_id != chat_id {
            tracing::debug!(kind, call_id = chat_id, "signal for another call; dropping");
            return None;
        }
        Some(session.phase)
    }

    fn expecting_answer(&self) -> bool {
        self.session
            .as_ref()
            .filter(|s| s.phase == CallPhase::InCall && s.role == CallRole::Caller)
            .and_then(|s| s.media.as_ref())
            .map(|m| m.local_description().is_some() && !m.has_remote_description())
            .unwrap_or(false)
    }

    fn on_invite(&mut self, chat_id: String, mode: CallMode) {
        if let Some(active) = self.session.as_ref() {
            tracing::info!(active = %active.call_id, incoming = %chat_id, "busy; rejecting invite");
            self.send_best_effort(CallSignal::Busy { chat_id });
            return;
        }
        self.begin_session(chat_id, CallRole::Callee, mode, CallPhase::Ringing);
    }

    // Decline, busy, unavailable and hangup all end the call from any phase.
    fn on_remote_end(&mut self, chat_id: &str, kind: &'static str, reason: EndReason) {
        if self.live_phase(chat_id, kind).is_some() {
            self.end_call(reason);
        }
    }

    fn on_remote_accept(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.phase = CallPhase::InCall;
        }
        if let Err(e) = self.ensure_media_session() {
            self.fail_call(e, true);
            return;
        }
        self.request_local_media(AfterMedia::SendOffer);
        self.emit_call_state();
    }

    fn on_remote_offer(&mut self, sdp: SessionDescription) {
        let duplicate = self.session.as_ref().is_some_and(|s| {
            s.deferred_offer.is_some()
                || s.media.as_ref().is_some_and(MediaSession::has_remote_description)
        });
        if duplicate {
            tracing::debug!("repeated offer ignored; renegotiation is not supported");
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.phase = CallPhase::InCall;
            session.accepted = true;
        }
        if let Err(e) = self.ensure_media_session() {
            self.fail_call(e, true);
            return;
        }
        let has_local = self
            .session
            .as_ref()
            .map(CallSession::has_local_media)
            .unwrap_or(false);
        if has_local {
            self.answer_offer(sdp);
        } else {
            if let Some(session) = self.session.as_mut() {
                session.deferred_offer = Some(sdp);
            }
            self.request_local_media(AfterMedia::SendAnswer);
        }
        self.emit_call_state();
    }

    fn on_remote_answer(&mut self, sdp: SessionDescription) {
        let applied = match self.session.as_mut() {
            Some(session) => session
                .media_mut()
                .and_then(|media| media.apply_remote_description(sdp).map_err(Into::into)),
            None => return,
        };
        match applied {
            Ok(replayed) => {
                tracing::debug!(replayed, "remote answer applied");
                self.emit_call_state();
            }
            Err(e) => self.fail_call(e, true),
        }
    }

    fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        let Some(media) = self.session.as_mut().and_then(|s| s.media.as_mut()) else {
            tracing::debug!("candidate arrived without media session; dropped");
            return;
        };
        match media.add_candidate(candidate) {
            Ok(CandidateDisposition::Applied) => tracing::trace!("remote candidate applied"),
            Ok(CandidateDisposition::Buffered) => tracing::trace!(
                pending = media.pending_candidates(),
                "remote candidate buffered"
            ),
            Err(e) => tracing::debug!(err = %e, "remote candidate dropped"),
        }
    }

    fn ensure_media_session(&mut self) -> Result<(), CallError> {
        let config = self.transport_config();
        let tx = self.core_sender.clone();
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if session.media.is_some() {
            return Ok(());
        }
        let media = self.media.open_session(session.generation, &config, tx)?;
        session.media = Some(media);
        Ok(())
    }

    fn request_local_media(&mut self, after: AfterMedia) {
        let tx = self.core_sender.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.after_media = Some(after);
        if session.capture_in_flight {
            return;
        }
        session.capture_in_flight = true;
        self.media
            .begin_capture(session.generation, session.mode.capture_constraints(), tx);
    }

    pub(super) fn handle_local_media_acquired(
        &mut self,
        generation: u64,
        result: Result<LocalCapture, MediaAccessError>,
    ) {
        let is_current = self
            .session
            .as_ref()
            .map(|s| s.generation == generation && s.media.is_some())
            .unwrap_or(false);
        if !is_current {
            if let Ok(capture) = result {
                tracing::info!(generation, "capture completed for a finished call; releasing");
                self.media.release_capture(capture);
            }
            return;
        }

        let capture = match result {
            Ok(capture) => capture,
            Err(e) => {
                self.fail_call(e.into(), true);
                return;
            }
        };

        let attached = match self.session.as_mut() {
            Some(session) => {
                session.capture_in_flight = false;
                let muted = session.is_muted;
                let video_off = session.mode.is_video() && !session.video_enabled;
                let after = session.after_media.take();
                let call_id = session.call_id.clone();
                session.media_mut().and_then(|media| {
                    let stream = media.attach_local_media(capture)?;
                    if muted {
                        media.set_local_audio_enabled(false);
                    }
                    if video_off {
                        media.set_local_video_enabled(false);
                    }
                    Ok((call_id, stream, after))
                })
            }
            None => return,
        };

        let (call_id, stream, after) = match attached {
            Ok(v) => v,
            Err(e) => {
                self.fail_call(e, true);
                return;
            }
        };
        let stream = StreamInfo::from(&stream);
        self.emit(|rev| CallUpdate::LocalTrackAvailable {
            rev,
            call_id,
            stream,
        });
        self.emit_call_state();

        match after {
            Some(AfterMedia::SendOffer) => self.send_offer(),
            Some(AfterMedia::SendAnswer) => {
                let offer = self.session.as_mut().and_then(|s| s.deferred_offer.take());
                if let Some(offer) = offer {
                    self.answer_offer(offer);
                }
            }
            None => {}
        }
    }

    fn send_offer(&mut self) {
        let created = match self.session.as_mut() {
            Some(session) => {
                let call_id = session.call_id.clone();
                session
                    .media_mut()
                    .and_then(|media| media.create_offer().map_err(Into::into))
                    .map(|sdp| CallSignal::Offer { chat_id: call_id, sdp })
            }
            None => return,
        };
        match created {
            Ok(offer) => {
                if let Err(e) = self.send_signal(&offer) {
                    self.fail_call(e, false);
                }
            }
            Err(e) => self.fail_call(e, true),
        }
    }

    fn answer_offer(&mut self, offer: SessionDescription) {
        let created = match self.session.as_mut() {
            Some(session) => {
                let call_id = session.call_id.clone();
                session
                    .media_mut()
                    .and_then(|media| {
                        media.apply_remote_description(offer)?;
                        Ok(media.create_answer()?)
                    })
                    .map(|sdp| CallSignal::Answer { chat_id: call_id, sdp })
            }
            None => return,
        };
        match created {
            Ok(answer) => {
                if let Err(e) = self.send_signal(&answer) {
                    self.fail_call(e, false);
                }
            }
            Err(e) => self.fail_call(e, true),
        }
    }

    // ---- transport callbacks ----

    pub(super) fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.generation != generation {
            tracing::trace!(generation, current = session.generation, "stale transport event");
            return;
        }

        match event {
            TransportEvent::LocalCandidate(candidate) => {
                let chat_id = session.call_id.clone();
                self.send_best_effort(CallSignal::Ice { chat_id, candidate });
            }
            TransportEvent::RemoteTrack(stream) => {
                session.has_remote_media = true;
                let call_id = session.call_id.clone();
                let stream = StreamInfo::from(&stream);
                self.emit(|rev| CallUpdate::RemoteTrackAvailable {
                    rev,
                    call_id,
                    stream,
                });
                self.emit_call_state();
            }
            TransportEvent::ConnectionStateChanged(state) => match state {
                ConnectionState::New | ConnectionState::Closed => {}
                ConnectionState::Connecting => {
                    if session.connection == MediaConnection::New {
                        session.connection = MediaConnection::Connecting;
                        self.emit_call_state();
                    }
                }
                ConnectionState::Connected => {
                    session.connection = MediaConnection::Connected;
                    session.started_at.get_or_insert_with(now_seconds);
                    tracing::info!(call_id = %session.call_id, "media connected");
                    self.emit_call_state();
                }
                ConnectionState::Disconnected | ConnectionState::Failed => {
                    self.on_transport_failure(state)
                }
            },
        }
    }

    fn on_transport_failure(&mut self, state: ConnectionState) {
        let Some(call_id) = self.active_call_id() else {
            return;
        };
        let announce = self.config.hangup_on_transport_failure() && self.signaling_up();
        tracing::warn!(call_id = %call_id, ?state, announce, "media transport lost");
        if announce {
            self.send_best_effort(CallSignal::Hangup { chat_id: call_id });
        }
        self.end_call(EndReason::TransportFailure);
    }
}
