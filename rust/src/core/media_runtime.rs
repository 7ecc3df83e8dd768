use std::sync::Arc;

use flume::Sender;
use ringlet_media::{
    CaptureConstraints, LocalCapture, MediaHost, MediaSession, MediaSessionError,
    TransportConfig, TransportEvent, TransportEventSink,
};

use crate::updates::{CoreMsg, InternalEvent};

/// Forwards transport callbacks into the actor queue, stamped with the
/// generation of the session that owns the transport.
struct CoreEventSink {
    generation: u64,
    tx: Sender<CoreMsg>,
}

impl TransportEventSink for CoreEventSink {
    fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send(CoreMsg::Internal(Box::new(InternalEvent::Transport {
            generation: self.generation,
            event,
        })));
    }
}

/// Bridges the call actor to the host's media stack. Anything that may block
/// (permission prompts) runs on the tokio blocking pool and reports back
/// through the core queue.
pub(super) struct MediaRuntime {
    host: Arc<dyn MediaHost>,
    runtime: tokio::runtime::Runtime,
    generation: u64,
}

impl MediaRuntime {
    pub(super) fn new(host: Arc<dyn MediaHost>) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(2)
            .thread_name("ringlet-media")
            .build()
            .expect("tokio runtime");
        Self {
            host,
            runtime,
            generation: 0,
        }
    }

    pub(super) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub(super) fn open_session(
        &self,
        generation: u64,
        config: &TransportConfig,
        tx: Sender<CoreMsg>,
    ) -> Result<MediaSession, MediaSessionError> {
        let sink = Arc::new(CoreEventSink { generation, tx });
        MediaSession::open(self.host.clone(), config, sink)
    }

    pub(super) fn begin_capture(
        &self,
        generation: u64,
        constraints: CaptureConstraints,
        tx: Sender<CoreMsg>,
    ) {
        let host = self.host.clone();
        self.runtime.spawn_blocking(move || {
            tracing::debug!(generation, ?constraints, "requesting local capture");
            let result = host.request_capture(constraints);
            let msg = CoreMsg::Internal(Box::new(InternalEvent::LocalMediaAcquired {
                generation,
                result,
            }));
            // Actor gone: nobody will release it for us.
            if let Err(flume::SendError(CoreMsg::Internal(ev))) = tx.send(msg) {
                if let InternalEvent::LocalMediaAcquired {
                    result: Ok(capture),
                    ..
                } = *ev
                {
                    host.release_capture(capture);
                }
            }
        });
    }

    pub(super) fn release_capture(&self, capture: LocalCapture) {
        self.host.release_capture(capture);
    }
}
