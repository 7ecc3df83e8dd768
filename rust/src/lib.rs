mod actions;
mod core;
mod logging;
mod signaling_hub;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::CallAction;
pub use crate::core::signaling::{
    build_call_signal_json, is_call_signal_payload, parse_call_signal, CallSignal,
    CALL_SIGNAL_TYPES,
};
pub use crate::core::CallError;
pub use ringlet_media as media;
pub use signaling_hub::{HubEndpoint, SignalingHub};
pub use state::*;
pub use updates::*;

/// Return the default `ringlet_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    crate::core::config::default_call_config_json()
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait CallReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: CallUpdate);
}

/// Outbound half of the chat's signaling channel. `send` returns false when
/// the payload could not be handed to the transport.
#[uniffi::export(callback_interface)]
pub trait SignalingSink: Send + Sync + 'static {
    fn send(&self, payload: String) -> bool;
    fn is_connected(&self) -> bool;
}

/// Inbound half of the signaling channel. Cheap to clone; every method
/// enqueues onto the call actor and returns immediately.
#[derive(Clone)]
pub struct SignalInbox {
    core_tx: Sender<CoreMsg>,
}

impl SignalInbox {
    pub fn deliver(&self, payload: String) {
        self.post(InternalEvent::SignalReceived { payload });
    }

    pub fn disconnected(&self) {
        self.post(InternalEvent::SignalingDisconnected);
    }

    pub fn reconnected(&self) {
        self.post(InternalEvent::SignalingReconnected);
    }

    fn post(&self, event: InternalEvent) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(event)));
    }
}

#[derive(uniffi::Object)]
pub struct CallEngine {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<CallUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<CallAppState>>,
}

impl CallEngine {
    /// Starts the call actor. The media host is supplied by the embedding
    /// app (or [`media::LoopbackHost`] in tests), so this is not exported
    /// over UniFFI.
    pub fn new(
        data_dir: String,
        signaling: Arc<dyn SignalingSink>,
        host: Arc<dyn media::MediaHost>,
    ) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "CallEngine::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(CallAppState::empty()));

        // Actor loop thread (single threaded "call actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::CallCore::new(
                update_tx,
                core_tx_for_core,
                &data_dir,
                shared_for_core,
                signaling,
                host,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    pub fn inbox(&self) -> SignalInbox {
        SignalInbox {
            core_tx: self.core_tx.clone(),
        }
    }
}

#[uniffi::export]
impl CallEngine {
    pub fn state(&self) -> CallAppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: CallAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn CallReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    pub fn receive_signal(&self, payload: String) {
        self.inbox().deliver(payload);
    }

    pub fn signaling_disconnected(&self) {
        self.inbox().disconnected();
    }

    pub fn signaling_reconnected(&self) {
        self.inbox().reconnected();
    }
}
