mod call_control;
pub(crate) mod config;
mod error;
mod media_runtime;
pub mod signaling;

use std::sync::{Arc, RwLock};

use flume::Sender;
use ringlet_media::MediaHost;

use crate::actions::CallAction;
use crate::state::CallAppState;
use crate::updates::{CallUpdate, CoreMsg, InternalEvent};
use crate::SignalingSink;

pub use error::CallError;

/// The call actor. Owns the single call session and is only ever touched
/// from one thread, which serialises UI intents, inbound signals and media
/// callbacks.
pub struct CallCore {
    pub state: CallAppState,
    rev: u64,

    update_sender: Sender<CallUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<CallAppState>>,

    config: config::CallConfig,
    signaling: Arc<dyn SignalingSink>,
    media: media_runtime::MediaRuntime,

    session: Option<call_control::CallSession>,
}

impl CallCore {
    pub fn new(
        update_sender: Sender<CallUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: &str,
        shared_state: Arc<RwLock<CallAppState>>,
        signaling: Arc<dyn SignalingSink>,
        host: Arc<dyn MediaHost>,
    ) -> Self {
        let config = config::load_call_config(data_dir);
        let mut state = CallAppState::empty();
        state.signaling_connected = signaling.is_connected();

        let this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            signaling,
            media: media_runtime::MediaRuntime::new(host),
            session: None,
        };

        // Ensure CallEngine::state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &CallAppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit(&mut self, make: impl FnOnce(u64) -> CallUpdate) {
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(make(rev));
    }

    fn emit_call_state(&mut self) {
        self.state.active_call = self.session.as_ref().map(|s| s.snapshot());
        let call = self.state.active_call.clone();
        self.emit(|rev| CallUpdate::StateChanged { rev, call });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        let toast = Some(msg.into());
        self.state.toast = toast.clone();
        self.emit(|rev| CallUpdate::ToastChanged { rev, toast });
    }

    /// Buffered remote candidates of the active session (0 when idle).
    pub fn pending_candidates(&self) -> usize {
        self.session
            .as_ref()
            .map(|s| s.pending_candidates())
            .unwrap_or(0)
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(event) => self.handle_internal(*event),
        }
    }

    fn handle_action(&mut self, action: CallAction) {
        match action {
            CallAction::StartCall { chat_id, mode } => {
                self.handle_start_call_action(&chat_id, mode)
            }
            CallAction::AcceptCall => self.handle_accept_call_action(),
            CallAction::DeclineCall => self.handle_decline_call_action(),
            CallAction::HangUp => self.handle_hang_up_action(),
            CallAction::SetMuted { muted } => self.handle_set_muted_action(muted),
            CallAction::SetVideoEnabled { enabled } => {
                self.handle_set_video_enabled_action(enabled)
            }
            CallAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit(|rev| CallUpdate::ToastChanged { rev, toast: None });
                }
            }
        }
    }

    fn handle_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::SignalReceived { payload } => self.handle_signal_payload(&payload),
            InternalEvent::SignalingDisconnected => self.handle_signaling_disconnected(),
            InternalEvent::SignalingReconnected => self.handle_signaling_reconnected(),
            InternalEvent::LocalMediaAcquired { generation, result } => {
                self.handle_local_media_acquired(generation, result)
            }
            InternalEvent::Transport { generation, event } => {
                self.handle_transport_event(generation, event)
            }
        }
    }
}
