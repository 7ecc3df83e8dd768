use std::collections::VecDeque;

use crate::negotiation::IceCandidate;

/// What [`CandidateBuffer::add`] decided for a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Remote description is known; hand the candidate to the transport now.
    Forward(IceCandidate),
    /// Held until the remote description is applied.
    Buffered,
}

/// Remote candidates that arrived before the remote session description.
///
/// Candidates leave in receive order, each exactly once. Nothing is ever
/// dropped except by [`CandidateBuffer::reset`] at teardown.
#[derive(Debug, Clone, Default)]
pub struct CandidateBuffer {
    pending: VecDeque<IceCandidate>,
    remote_ready: bool,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, candidate: IceCandidate) -> Admission {
        if self.remote_ready {
            return Admission::Forward(candidate);
        }
        self.pending.push_back(candidate);
        Admission::Buffered
    }

    /// Marks the remote description as applied and hands back everything
    /// held so far. Later calls return an empty list.
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.remote_ready = true;
        self.pending.drain(..).collect()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.remote_ready = false;
    }

    pub fn is_remote_ready(&self) -> bool {
        self.remote_ready
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(n: u32) -> IceCandidate {
        IceCandidate::new(format!("candidate:{n}"), Some("0".to_string()), Some(0))
    }

    #[test]
    fn buffers_until_drained_then_forwards() {
        let mut buf = CandidateBuffer::new();
        assert_eq!(buf.add(cand(1)), Admission::Buffered);
        assert_eq!(buf.add(cand(2)), Admission::Buffered);
        assert_eq!(buf.add(cand(3)), Admission::Buffered);
        assert_eq!(buf.len(), 3);

        let drained = buf.drain();
        assert_eq!(drained, vec![cand(1), cand(2), cand(3)]);
        assert!(buf.is_empty());
        assert!(buf.is_remote_ready());

        assert_eq!(buf.add(cand(4)), Admission::Forward(cand(4)));
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn reset_clears_pending_and_readiness() {
        let mut buf = CandidateBuffer::new();
        buf.add(cand(1));
        buf.drain();
        buf.add(cand(2));
        buf.reset();
        assert!(buf.is_empty());
        assert!(!buf.is_remote_ready());
        assert_eq!(buf.add(cand(3)), Admission::Buffered);
    }
}
