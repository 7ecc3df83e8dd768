use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::candidates::{Admission, CandidateBuffer};
use crate::error::{MediaSessionError, NegotiationError};
use crate::host::{MediaHost, PeerTransport, TransportConfig, TransportEventSink};
use crate::negotiation::{IceCandidate, SdpType, SessionDescription};
use crate::tracks::{CaptureConstraints, LocalCapture, MediaStream, TrackKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    Applied,
    Buffered,
}

/// Media side of one call: the local capture, the transport, and the
/// candidates waiting for a remote description.
///
/// Both the capture and the transport are released by [`MediaSession::close`],
/// which also runs on drop, so no exit path can leak a device.
pub struct MediaSession {
    host: Arc<dyn MediaHost>,
    transport: Option<Box<dyn PeerTransport>>,
    capture: Option<LocalCapture>,
    candidates: CandidateBuffer,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    closed: bool,
}

impl Debug for MediaSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession")
            .field("has_transport", &self.transport.is_some())
            .field("capture", &self.capture)
            .field("pending_candidates", &self.candidates.len())
            .field("has_local_description", &self.local_description.is_some())
            .field("has_remote_description", &self.remote_description.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl MediaSession {
    pub fn open(
        host: Arc<dyn MediaHost>,
        config: &TransportConfig,
        events: Arc<dyn TransportEventSink>,
    ) -> Result<Self, MediaSessionError> {
        let transport = host.create_transport(config, events)?;
        Ok(Self {
            host,
            transport: Some(transport),
            capture: None,
            candidates: CandidateBuffer::new(),
            local_description: None,
            remote_description: None,
            closed: false,
        })
    }

    fn transport_mut(&mut self) -> Result<&mut Box<dyn PeerTransport>, MediaSessionError> {
        if self.closed {
            return Err(MediaSessionError::Closed);
        }
        self.transport.as_mut().ok_or(MediaSessionError::Closed)
    }

    /// Synchronous capture + attach. The call actor uses the split
    /// request/[`attach_local_media`](Self::attach_local_media) path instead so
    /// a slow permission prompt does not stall the event queue.
    pub fn acquire_local_media(
        &mut self,
        constraints: CaptureConstraints,
    ) -> Result<MediaStream, MediaSessionError> {
        if self.closed {
            return Err(MediaSessionError::Closed);
        }
        let capture = self.host.request_capture(constraints)?;
        self.attach_local_media(capture)
    }

    /// Takes ownership of `capture` and adds its tracks to the transport.
    /// On any failure the capture is handed straight back to the host.
    pub fn attach_local_media(
        &mut self,
        capture: LocalCapture,
    ) -> Result<MediaStream, MediaSessionError> {
        if self.closed {
            self.host.release_capture(capture);
            return Err(MediaSessionError::Closed);
        }
        if let Some(existing) = &self.capture {
            tracing::warn!(stream_id = %existing.stream().id, "local media already attached; releasing duplicate");
            let stream = existing.stream().clone();
            self.host.release_capture(capture);
            return Ok(stream);
        }

        let stream = capture.stream().clone();
        let attached = match self.transport_mut() {
            Ok(transport) => transport.add_local_stream(&stream).map_err(Into::into),
            Err(e) => Err(e),
        };
        if let Err(e) = attached {
            self.host.release_capture(capture);
            return Err(e);
        }
        self.capture = Some(capture);
        Ok(stream)
    }

    pub fn has_local_media(&self) -> bool {
        self.capture.is_some()
    }

    pub fn local_stream(&self) -> Option<&MediaStream> {
        self.capture.as_ref().map(LocalCapture::stream)
    }

    pub fn create_offer(&mut self) -> Result<SessionDescription, MediaSessionError> {
        self.create_local_description(SdpType::Offer)
    }

    pub fn create_answer(&mut self) -> Result<SessionDescription, MediaSessionError> {
        let has_remote_offer = matches!(
            self.remote_description.as_ref().map(|d| d.sdp_type),
            Some(SdpType::Offer)
        );
        if !has_remote_offer {
            return Err(NegotiationError::RemoteOfferMissing.into());
        }
        self.create_local_description(SdpType::Answer)
    }

    fn create_local_description(
        &mut self,
        sdp_type: SdpType,
    ) -> Result<SessionDescription, MediaSessionError> {
        if self.capture.is_none() {
            return Err(NegotiationError::LocalMediaMissing.into());
        }
        let transport = self.transport_mut()?;
        let desc = match sdp_type {
            SdpType::Offer => transport.create_offer()?,
            SdpType::Answer => transport.create_answer()?,
        };
        transport.set_local_description(&desc)?;
        self.local_description = Some(desc.clone());
        Ok(desc)
    }

    /// Applies the peer's description, then replays buffered candidates in
    /// receive order. Returns how many were replayed.
    pub fn apply_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<usize, MediaSessionError> {
        desc.validate()?;
        self.check_remote_type(desc.sdp_type)?;
        self.transport_mut()?.set_remote_description(&desc)?;
        self.remote_description = Some(desc);

        let pending = self.candidates.drain();
        let replayed = pending.len();
        for candidate in pending {
            self.apply_candidate(&candidate);
        }
        if replayed > 0 {
            tracing::debug!(replayed, "replayed buffered candidates");
        }
        Ok(replayed)
    }

    // Offer/answer only: the remote side offers first, or answers ours.
    fn check_remote_type(&self, remote: SdpType) -> Result<(), NegotiationError> {
        if self.remote_description.is_some() {
            return Err(NegotiationError::InvalidState(
                "remote description already set".to_string(),
            ));
        }
        let expected = match self.local_description.as_ref().map(|d| d.sdp_type) {
            None => SdpType::Offer,
            Some(SdpType::Offer) => SdpType::Answer,
            Some(SdpType::Answer) => {
                return Err(NegotiationError::InvalidState(
                    "local answer already sent".to_string(),
                ))
            }
        };
        if remote != expected {
            return Err(NegotiationError::InvalidState(format!(
                "expected remote {expected:?}, got {remote:?}"
            )));
        }
        Ok(())
    }

    pub fn add_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition, MediaSessionError> {
        if self.closed {
            return Err(MediaSessionError::Closed);
        }
        match self.candidates.add(candidate) {
            Admission::Forward(candidate) => {
                self.apply_candidate(&candidate);
                Ok(CandidateDisposition::Applied)
            }
            Admission::Buffered => Ok(CandidateDisposition::Buffered),
        }
    }

    // A single bad candidate is not fatal; the others may still connect.
    fn apply_candidate(&mut self, candidate: &IceCandidate) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if let Err(e) = transport.add_ice_candidate(candidate) {
            tracing::warn!(err = %e, candidate = %candidate.candidate, "add ice candidate failed");
        }
    }

    pub fn pending_candidates(&self) -> usize {
        self.candidates.len()
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_description.is_some()
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    /// Returns false when there is no audio track to toggle.
    pub fn set_local_audio_enabled(&mut self, enabled: bool) -> bool {
        self.set_track_enabled(TrackKind::Audio, enabled)
    }

    /// Returns false when there is no video track to toggle.
    pub fn set_local_video_enabled(&mut self, enabled: bool) -> bool {
        self.set_track_enabled(TrackKind::Video, enabled)
    }

    fn set_track_enabled(&mut self, kind: TrackKind, enabled: bool) -> bool {
        let Some(capture) = self.capture.as_mut() else {
            return false;
        };
        if !capture.set_enabled(kind, enabled) {
            return false;
        }
        self.host.set_track_enabled(capture, kind, enabled);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Idempotent. Returns true only for the call that actually released
    /// something.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        if let Some(capture) = self.capture.take() {
            self.host.release_capture(capture);
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.candidates.reset();
        self.local_description = None;
        self.remote_description = None;
        true
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::host::TransportEvent;
    use crate::loopback::LoopbackHost;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<TransportEvent>>,
    }

    impl TransportEventSink for RecordingSink {
        fn emit(&self, event: TransportEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn config() -> TransportConfig {
        TransportConfig {
            ice_servers: vec!["stun:stun.example.org:3478".to_string()],
        }
    }

    fn open(host: &LoopbackHost) -> (MediaSession, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let session = MediaSession::open(Arc::new(host.clone()), &config(), sink.clone())
            .expect("open media session");
        (session, sink)
    }

    fn cand(n: u32) -> IceCandidate {
        IceCandidate::new(
            format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000 typ host"),
            Some("0".to_string()),
            Some(0),
        )
    }

    #[test]
    fn offer_requires_local_media() {
        let host = LoopbackHost::new("alice");
        let (mut session, _) = open(&host);
        assert!(matches!(
            session.create_offer(),
            Err(MediaSessionError::Negotiation(
                NegotiationError::LocalMediaMissing
            ))
        ));

        session
            .acquire_local_media(CaptureConstraints::audio_only())
            .expect("capture");
        let offer = session.create_offer().expect("offer");
        assert_eq!(offer.sdp_type, SdpType::Offer);
        assert!(offer.sdp.contains("m=audio"));
        assert!(!offer.sdp.contains("m=video"));
    }

    #[test]
    fn answer_requires_remote_offer() {
        let host = LoopbackHost::new("bob");
        let (mut session, _) = open(&host);
        session
            .acquire_local_media(CaptureConstraints::audio_video())
            .expect("capture");
        assert!(matches!(
            session.create_answer(),
            Err(MediaSessionError::Negotiation(
                NegotiationError::RemoteOfferMissing
            ))
        ));
    }

    #[test]
    fn buffered_candidates_replay_in_order_once() {
        let host = LoopbackHost::new("bob");
        let (mut session, _) = open(&host);
        for n in 1..=3 {
            let d = session.add_candidate(cand(n)).expect("add");
            assert_eq!(d, CandidateDisposition::Buffered);
        }
        assert_eq!(session.pending_candidates(), 3);
        assert!(host.transport(0).expect("probe").applied_candidates.is_empty());

        let replayed = session
            .apply_remote_description(SessionDescription::offer(
                "v=0\r\ns=-\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n",
            ))
            .expect("apply");
        assert_eq!(replayed, 3);
        assert_eq!(session.pending_candidates(), 0);

        let d = session.add_candidate(cand(4)).expect("add after");
        assert_eq!(d, CandidateDisposition::Applied);

        let applied = host.transport(0).expect("probe").applied_candidates;
        assert_eq!(applied, vec![cand(1), cand(2), cand(3), cand(4)]);
    }

    #[test]
    fn malformed_remote_description_keeps_candidates_buffered() {
        let host = LoopbackHost::new("bob");
        let (mut session, _) = open(&host);
        session.add_candidate(cand(1)).expect("add");
        let err = session
            .apply_remote_description(SessionDescription::offer("garbage"))
            .expect_err("malformed");
        assert!(matches!(
            err,
            MediaSessionError::Negotiation(NegotiationError::MalformedDescription(_))
        ));
        assert_eq!(session.pending_candidates(), 1);
        assert!(!session.has_remote_description());
    }

    #[test]
    fn remote_description_must_complement_local() {
        let host = LoopbackHost::new("alice");
        let (mut session, _) = open(&host);
        session.add_candidate(cand(1)).expect("add");

        // Nothing sent yet: an answer is out of order.
        let err = session
            .apply_remote_description(SessionDescription::answer(
                "v=0\r\ns=-\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n",
            ))
            .expect_err("answer without offer");
        assert!(matches!(
            err,
            MediaSessionError::Negotiation(NegotiationError::InvalidState(_))
        ));

        session
            .acquire_local_media(CaptureConstraints::audio_only())
            .expect("capture");
        session.create_offer().expect("offer");

        // Glare-shaped reply to our offer.
        let err = session
            .apply_remote_description(SessionDescription::offer(
                "v=0\r\ns=-\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n",
            ))
            .expect_err("offer answering an offer");
        assert!(matches!(
            err,
            MediaSessionError::Negotiation(NegotiationError::InvalidState(_))
        ));
        assert!(!session.has_remote_description());
        assert_eq!(session.pending_candidates(), 1);
        assert!(host.transport(0).expect("probe").remote_description.is_none());

        session
            .apply_remote_description(SessionDescription::answer(
                "v=0\r\ns=-\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n",
            ))
            .expect("answer");
        assert_eq!(session.pending_candidates(), 0);
    }

    #[test]
    fn close_is_idempotent_and_releases_everything() {
        let host = LoopbackHost::new("alice");
        let (mut session, _) = open(&host);
        session
            .acquire_local_media(CaptureConstraints::audio_video())
            .expect("capture");
        session.add_candidate(cand(1)).expect("add");
        assert_eq!(host.live_captures(), 1);

        assert!(session.close());
        assert_eq!(host.live_captures(), 0);
        assert_eq!(host.captures_released(), 1);
        assert!(host.transport(0).expect("probe").closed);
        assert_eq!(session.pending_candidates(), 0);

        assert!(!session.close());
        assert_eq!(host.captures_released(), 1);
        assert_eq!(host.transports_closed(), 1);
    }

    #[test]
    fn drop_releases_capture() {
        let host = LoopbackHost::new("alice");
        {
            let (mut session, _) = open(&host);
            session
                .acquire_local_media(CaptureConstraints::audio_only())
                .expect("capture");
            assert_eq!(host.live_captures(), 1);
        }
        assert_eq!(host.live_captures(), 0);
    }

    #[test]
    fn attach_after_close_returns_capture_to_host() {
        let host = LoopbackHost::new("alice");
        let (mut session, _) = open(&host);
        session.close();
        let capture = host
            .request_capture(CaptureConstraints::audio_only())
            .expect("capture");
        assert_eq!(host.live_captures(), 1);
        assert!(matches!(
            session.attach_local_media(capture),
            Err(MediaSessionError::Closed)
        ));
        assert_eq!(host.live_captures(), 0);
    }

    #[test]
    fn mute_toggles_track_without_renegotiation() {
        let host = LoopbackHost::new("alice");
        let (mut session, _) = open(&host);
        session
            .acquire_local_media(CaptureConstraints::audio_only())
            .expect("capture");
        let offer_before = session.create_offer().expect("offer");

        assert!(session.set_local_audio_enabled(false));
        assert!(!session.set_local_video_enabled(false));
        assert_eq!(session.local_description(), Some(&offer_before));
        assert_eq!(host.track_toggles(), vec![(TrackKind::Audio, false)]);
    }

    #[test]
    fn capture_denied_surfaces_media_access_error() {
        let host = LoopbackHost::new("alice");
        host.deny_capture(true);
        let (mut session, _) = open(&host);
        let err = session
            .acquire_local_media(CaptureConstraints::audio_only())
            .expect_err("denied");
        assert!(matches!(err, MediaSessionError::MediaAccess(_)));
        assert!(!session.has_local_media());
        assert_eq!(host.live_captures(), 0);
    }

    #[test]
    fn local_description_trickles_candidates() {
        let host = LoopbackHost::new("alice");
        let (mut session, sink) = open(&host);
        session
            .acquire_local_media(CaptureConstraints::audio_only())
            .expect("capture");
        session.create_offer().expect("offer");
        let events = sink.events.lock().unwrap();
        let locals = events
            .iter()
            .filter(|e| matches!(e, TransportEvent::LocalCandidate(_)))
            .count();
        assert!(locals > 0);
    }
}
