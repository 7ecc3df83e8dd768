#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// What to ask the host for; mirrors `getUserMedia` constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub audio: bool,
    pub video: bool,
}

impl CaptureConstraints {
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }

    pub fn audio_video() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub kind: TrackKind,
}

/// Description of a local or remote stream as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<TrackInfo>,
}

impl MediaStream {
    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }

    pub fn count(&self, kind: TrackKind) -> usize {
        self.tracks.iter().filter(|t| t.kind == kind).count()
    }
}

/// Handle to open capture devices.
///
/// Deliberately not `Clone`: a capture has exactly one owner, and giving it
/// back to [`crate::MediaHost::release_capture`] consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct LocalCapture {
    stream: MediaStream,
    audio_enabled: bool,
    video_enabled: bool,
}

impl LocalCapture {
    pub fn new(stream: MediaStream) -> Self {
        Self {
            stream,
            audio_enabled: true,
            video_enabled: true,
        }
    }

    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.stream.has_kind(kind)
    }

    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.has_track(kind) && self.audio_enabled,
            TrackKind::Video => self.has_track(kind) && self.video_enabled,
        }
    }

    pub(crate) fn set_enabled(&mut self, kind: TrackKind, enabled: bool) -> bool {
        if !self.has_track(kind) {
            return false;
        }
        match kind {
            TrackKind::Audio => self.audio_enabled = enabled,
            TrackKind::Video => self.video_enabled = enabled,
        }
        true
    }
}
