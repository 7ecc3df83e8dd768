//! In-memory media host.
//!
//! Stands in for a browser or OS WebRTC stack: captures are bookkeeping
//! entries, descriptions are synthetic SDP, and every transport records what
//! was applied to it so tests can assert on ordering and release.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{MediaAccessError, MediaSessionError, NegotiationError};
use crate::host::{
    ConnectionState, MediaHost, PeerTransport, TransportConfig, TransportEvent,
    TransportEventSink,
};
use crate::negotiation::{IceCandidate, SdpType, SessionDescription};
use crate::tracks::{CaptureConstraints, LocalCapture, MediaStream, TrackInfo, TrackKind};

/// What one loopback transport saw over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportProbe {
    pub ice_servers: Vec<String>,
    pub local_streams: Vec<MediaStream>,
    pub local_description: Option<SessionDescription>,
    pub remote_description: Option<SessionDescription>,
    pub applied_candidates: Vec<IceCandidate>,
    pub closed: bool,
}

#[derive(Default)]
struct LoopbackState {
    deny_capture: bool,
    capture_delay: Duration,
    next_capture: u64,
    live_captures: HashSet<String>,
    captures_acquired: u64,
    captures_released: u64,
    track_toggles: Vec<(TrackKind, bool)>,
    probes: Vec<TransportProbe>,
    open_sinks: HashMap<usize, Arc<dyn TransportEventSink>>,
}

#[derive(Clone, Default)]
pub struct LoopbackHost {
    label: String,
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackHost {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        lock_state(&self.state)
    }

    /// Makes every following capture request fail with `PermissionDenied`.
    pub fn deny_capture(&self, deny: bool) {
        self.lock().deny_capture = deny;
    }

    /// Simulates a slow permission prompt.
    pub fn set_capture_delay(&self, delay: Duration) {
        self.lock().capture_delay = delay;
    }

    pub fn live_captures(&self) -> usize {
        self.lock().live_captures.len()
    }

    pub fn captures_acquired(&self) -> u64 {
        self.lock().captures_acquired
    }

    pub fn captures_released(&self) -> u64 {
        self.lock().captures_released
    }

    pub fn track_toggles(&self) -> Vec<(TrackKind, bool)> {
        self.lock().track_toggles.clone()
    }

    pub fn transport_count(&self) -> usize {
        self.lock().probes.len()
    }

    pub fn transports_closed(&self) -> usize {
        self.lock().probes.iter().filter(|p| p.closed).count()
    }

    pub fn transport(&self, index: usize) -> Option<TransportProbe> {
        self.lock().probes.get(index).cloned()
    }

    pub fn last_transport(&self) -> Option<TransportProbe> {
        self.lock().probes.last().cloned()
    }

    /// Reports `state` on every transport that is still open, the way a
    /// browser fires `connectionstatechange` when the path drops.
    pub fn report_connection_state(&self, state: ConnectionState) -> usize {
        let sinks: Vec<Arc<dyn TransportEventSink>> =
            self.lock().open_sinks.values().cloned().collect();
        for sink in &sinks {
            sink.emit(TransportEvent::ConnectionStateChanged(state));
        }
        sinks.len()
    }
}

fn lock_state(state: &Mutex<LoopbackState>) -> MutexGuard<'_, LoopbackState> {
    match state.lock() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}

impl MediaHost for LoopbackHost {
    fn request_capture(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<LocalCapture, MediaAccessError> {
        let delay = self.lock().capture_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.lock();
        if state.deny_capture {
            return Err(MediaAccessError::PermissionDenied(
                "camera/microphone access denied".to_string(),
            ));
        }
        if !constraints.audio && !constraints.video {
            return Err(MediaAccessError::NoDevice(
                "no track kinds requested".to_string(),
            ));
        }

        state.next_capture += 1;
        let n = state.next_capture;
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(TrackInfo {
                id: format!("{}-mic-{n}", self.label),
                kind: TrackKind::Audio,
            });
        }
        if constraints.video {
            tracks.push(TrackInfo {
                id: format!("{}-cam-{n}", self.label),
                kind: TrackKind::Video,
            });
        }
        let stream = MediaStream {
            id: format!("{}-local-{n}", self.label),
            tracks,
        };
        state.live_captures.insert(stream.id.clone());
        state.captures_acquired += 1;
        Ok(LocalCapture::new(stream))
    }

    fn release_capture(&self, capture: LocalCapture) {
        let mut state = self.lock();
        if state.live_captures.remove(&capture.stream().id) {
            state.captures_released += 1;
        }
    }

    fn set_track_enabled(&self, _capture: &LocalCapture, kind: TrackKind, enabled: bool) {
        self.lock().track_toggles.push((kind, enabled));
    }

    fn create_transport(
        &self,
        config: &TransportConfig,
        events: Arc<dyn TransportEventSink>,
    ) -> Result<Box<dyn PeerTransport>, MediaSessionError> {
        let index = {
            let mut state = self.lock();
            state.probes.push(TransportProbe {
                ice_servers: config.ice_servers.clone(),
                ..TransportProbe::default()
            });
            let index = state.probes.len() - 1;
            state.open_sinks.insert(index, events.clone());
            index
        };
        Ok(Box::new(LoopbackTransport {
            index,
            label: self.label.clone(),
            state: self.state.clone(),
            events,
            local_stream: None,
            has_local: false,
            has_remote: false,
            has_candidate: false,
            connected: false,
            closed: false,
        }))
    }
}

struct LoopbackTransport {
    index: usize,
    label: String,
    state: Arc<Mutex<LoopbackState>>,
    events: Arc<dyn TransportEventSink>,
    local_stream: Option<MediaStream>,
    has_local: bool,
    has_remote: bool,
    has_candidate: bool,
    connected: bool,
    closed: bool,
}

impl LoopbackTransport {
    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.closed {
            return Err(NegotiationError::InvalidState("transport closed".to_string()));
        }
        Ok(())
    }

    fn with_probe(&self, f: impl FnOnce(&mut TransportProbe)) {
        let mut state = lock_state(&self.state);
        if let Some(probe) = state.probes.get_mut(self.index) {
            f(probe);
        }
    }

    fn build_sdp(&self, sdp_type: SdpType) -> Result<SessionDescription, NegotiationError> {
        let Some(stream) = &self.local_stream else {
            return Err(NegotiationError::LocalMediaMissing);
        };
        let mut sdp = format!(
            "v=0\r\no=ringlet {} 2 IN IP4 127.0.0.1\r\ns={}\r\nt=0 0\r\n",
            self.index, self.label
        );
        for (mid, kind) in [TrackKind::Audio, TrackKind::Video]
            .into_iter()
            .filter(|k| stream.has_kind(*k))
            .enumerate()
        {
            let m_line = match kind {
                TrackKind::Audio => "m=audio 9 UDP/TLS/RTP/SAVPF 111",
                TrackKind::Video => "m=video 9 UDP/TLS/RTP/SAVPF 96",
            };
            sdp.push_str(&format!("{m_line}\r\na=mid:{mid}\r\na=sendrecv\r\n"));
        }
        Ok(SessionDescription { sdp_type, sdp })
    }

    fn maybe_connect(&mut self) {
        if self.connected || !(self.has_local && self.has_remote && self.has_candidate) {
            return;
        }
        self.connected = true;
        self.events
            .emit(TransportEvent::ConnectionStateChanged(ConnectionState::Connected));
    }
}

fn remote_tracks(sdp: &str, label: &str) -> Vec<TrackInfo> {
    sdp.lines()
        .filter_map(|line| {
            if line.starts_with("m=audio") {
                Some(TrackKind::Audio)
            } else if line.starts_with("m=video") {
                Some(TrackKind::Video)
            } else {
                None
            }
        })
        .enumerate()
        .map(|(i, kind)| TrackInfo {
            id: format!("{label}-remote-{i}"),
            kind,
        })
        .collect()
}

impl PeerTransport for LoopbackTransport {
    fn add_local_stream(&mut self, stream: &MediaStream) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        self.local_stream = Some(stream.clone());
        self.with_probe(|p| p.local_streams.push(stream.clone()));
        Ok(())
    }

    fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError> {
        self.ensure_open()?;
        self.build_sdp(SdpType::Offer)
    }

    fn create_answer(&mut self) -> Result<SessionDescription, NegotiationError> {
        self.ensure_open()?;
        if !self.has_remote {
            return Err(NegotiationError::RemoteOfferMissing);
        }
        self.build_sdp(SdpType::Answer)
    }

    fn set_local_description(
        &mut self,
        desc: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        self.with_probe(|p| p.local_description = Some(desc.clone()));
        let first = !self.has_local;
        self.has_local = true;
        if first {
            self.events
                .emit(TransportEvent::ConnectionStateChanged(ConnectionState::Connecting));
            for (n, typ) in ["host", "srflx"].into_iter().enumerate() {
                let candidate = IceCandidate::new(
                    format!(
                        "candidate:{} 1 udp 2122260223 127.0.0.1 {} typ {typ}",
                        n + 1,
                        50_000 + self.index * 10 + n
                    ),
                    Some("0".to_string()),
                    Some(0),
                );
                self.events.emit(TransportEvent::LocalCandidate(candidate));
            }
        }
        self.maybe_connect();
        Ok(())
    }

    fn set_remote_description(
        &mut self,
        desc: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        if !desc.sdp.starts_with("v=0") {
            return Err(NegotiationError::MalformedDescription(
                "missing v=0 line".to_string(),
            ));
        }
        self.with_probe(|p| p.remote_description = Some(desc.clone()));
        self.has_remote = true;

        let tracks = remote_tracks(&desc.sdp, &self.label);
        if !tracks.is_empty() {
            self.events.emit(TransportEvent::RemoteTrack(MediaStream {
                id: format!("{}-remote-{}", self.label, self.index),
                tracks,
            }));
        }
        self.maybe_connect();
        Ok(())
    }

    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        if !self.has_remote {
            return Err(NegotiationError::InvalidState(
                "remote description not set".to_string(),
            ));
        }
        if !candidate.candidate.starts_with("candidate:") {
            return Err(NegotiationError::MalformedCandidate(
                candidate.candidate.clone(),
            ));
        }
        self.with_probe(|p| p.applied_candidates.push(candidate.clone()));
        self.has_candidate = true;
        self.maybe_connect();
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = lock_state(&self.state);
        state.open_sinks.remove(&self.index);
        if let Some(probe) = state.probes.get_mut(self.index) {
            probe.closed = true;
        }
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<TransportEvent>>);

    impl TransportEventSink for Collect {
        fn emit(&self, event: TransportEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn config() -> TransportConfig {
        TransportConfig {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }

    #[test]
    fn two_transports_negotiate_and_connect() {
        let alice = LoopbackHost::new("alice");
        let bob = LoopbackHost::new("bob");
        let a_events = Arc::new(Collect::default());
        let b_events = Arc::new(Collect::default());
        let mut a = alice.create_transport(&config(), a_events.clone()).unwrap();
        let mut b = bob.create_transport(&config(), b_events.clone()).unwrap();

        let a_cap = alice
            .request_capture(CaptureConstraints::audio_video())
            .unwrap();
        let b_cap = bob.request_capture(CaptureConstraints::audio_video()).unwrap();
        a.add_local_stream(a_cap.stream()).unwrap();
        b.add_local_stream(b_cap.stream()).unwrap();

        let offer = a.create_offer().unwrap();
        a.set_local_description(&offer).unwrap();
        b.set_remote_description(&offer).unwrap();
        let answer = b.create_answer().unwrap();
        b.set_local_description(&answer).unwrap();
        a.set_remote_description(&answer).unwrap();

        let a_candidates: Vec<IceCandidate> = a_events
            .0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                TransportEvent::LocalCandidate(c) => Some(c.clone()),
                _ => None,
            })
            .collect();
        for c in &a_candidates {
            b.add_ice_candidate(c).unwrap();
        }

        let b_seen = b_events.0.lock().unwrap().clone();
        assert!(b_seen.contains(&TransportEvent::ConnectionStateChanged(
            ConnectionState::Connected
        )));
        assert!(b_seen.iter().any(|e| matches!(
            e,
            TransportEvent::RemoteTrack(s) if s.has_kind(TrackKind::Video)
        )));

        alice.release_capture(a_cap);
        bob.release_capture(b_cap);
        assert_eq!(alice.live_captures(), 0);
        assert_eq!(bob.live_captures(), 0);
    }

    #[test]
    fn candidate_before_remote_description_is_rejected() {
        let host = LoopbackHost::new("bob");
        let mut t = host
            .create_transport(&config(), Arc::new(Collect::default()))
            .unwrap();
        let err = t
            .add_ice_candidate(&IceCandidate::new("candidate:1", None, None))
            .unwrap_err();
        assert!(matches!(err, NegotiationError::InvalidState(_)));
    }

    #[test]
    fn report_connection_state_skips_closed_transports() {
        let host = LoopbackHost::new("alice");
        let events = Arc::new(Collect::default());
        let mut first = host.create_transport(&config(), events.clone()).unwrap();
        let _second = host.create_transport(&config(), events.clone()).unwrap();
        first.close();

        let reached = host.report_connection_state(ConnectionState::Failed);
        assert_eq!(reached, 1);
        assert_eq!(host.transports_closed(), 1);
        assert_eq!(host.transport(0).unwrap().ice_servers, config().ice_servers);
    }
}
