//! Top-level call coordinator.
//!
//! Tracks at most one current session and at most one incoming-call
//! prompt, with the session taking precedence: while the user is in a
//! call, no new prompt is ever raised. Driven by periodic `refresh`
//! ticks from the app shell.

use std::sync::Arc;

use cove_call_core::{
    CallError, CallId, CallResult, CallType, CallView, ConversationId, UserId, UserProfile,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::orchestrator::CallOrchestrator;
use crate::rpc::SignalingApi;
use crate::rtc::{MediaDevices, PeerConnectionFactory, RemoteMedia};

/// An incoming ringing call surfaced to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPrompt {
    pub call_id: CallId,
    pub conversation_id: ConversationId,
    pub call_type: CallType,
    pub initiator: Option<UserProfile>,
}

impl CallPrompt {
    fn from_view(view: &CallView) -> Self {
        Self {
            call_id: view.call.id,
            conversation_id: view.call.conversation_id,
            call_type: view.call.call_type,
            initiator: view.initiator.clone(),
        }
    }
}

/// Snapshot of the current session for the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveCallState {
    pub call_id: CallId,
    pub conversation_id: ConversationId,
    pub call_type: CallType,
    pub is_initiator: bool,
    pub connected: bool,
}

/// What the app should render right now.
#[derive(Debug, Clone, PartialEq)]
pub enum CallState {
    Idle,
    Ringing(CallPrompt),
    InCall(ActiveCallState),
}

struct CallSession {
    call_id: CallId,
    conversation_id: ConversationId,
    call_type: CallType,
    is_initiator: bool,
    orchestrator: Arc<CallOrchestrator>,
}

pub struct CallCoordinator {
    local_user: UserId,
    signaling: Arc<dyn SignalingApi>,
    factory: Arc<dyn PeerConnectionFactory>,
    devices: Arc<dyn MediaDevices>,
    current: Mutex<Option<CallSession>>,
    prompt: Mutex<Option<CallPrompt>>,
}

impl CallCoordinator {
    pub fn new(
        local_user: UserId,
        signaling: Arc<dyn SignalingApi>,
        factory: Arc<dyn PeerConnectionFactory>,
        devices: Arc<dyn MediaDevices>,
    ) -> Self {
        Self {
            local_user,
            signaling,
            factory,
            devices,
            current: Mutex::new(None),
            prompt: Mutex::new(None),
        }
    }

    /// Place a call in a conversation and open offers to its members.
    /// `participants` is the conversation's membership as the app knows
    /// it; offers go out to everyone but the caller.
    pub async fn start_call(
        &self,
        conversation_id: ConversationId,
        participants: &[UserId],
        video: bool,
    ) -> CallResult<CallId> {
        if self.current.lock().is_some() {
            return Err(CallError::CallInProgress);
        }
        let call_id = self
            .signaling
            .initiate_call(conversation_id, self.local_user)
            .await?;
        let view = self
            .signaling
            .call_by_id(call_id)
            .await?
            .ok_or(CallError::CallNotFound)?;
        let orchestrator = Arc::new(CallOrchestrator::new(
            call_id,
            self.local_user,
            video,
            self.signaling.clone(),
            self.factory.clone(),
            self.devices.clone(),
        ));
        if let Err(err) = orchestrator.start(true, participants).await {
            // Media never came up; back out of the call entirely.
            orchestrator.cleanup().await;
            if let Err(leave_err) = self.signaling.leave_call(call_id, self.local_user).await {
                warn!(call = %call_id, error = %leave_err, "failed to back out of call");
            }
            return Err(err);
        }
        *self.current.lock() = Some(CallSession {
            call_id,
            conversation_id,
            call_type: view.call.call_type,
            is_initiator: true,
            orchestrator,
        });
        Ok(call_id)
    }

    /// Accept the raised prompt: join the call and wait for the
    /// initiator's stored offer to arrive through the mailbox.
    pub async fn answer(&self, video: bool) -> CallResult<CallId> {
        let Some(prompt) = self.prompt.lock().take() else {
            return Err(CallError::CallNotFound);
        };
        if self.current.lock().is_some() {
            return Err(CallError::CallInProgress);
        }
        self.signaling
            .join_call(prompt.call_id, self.local_user)
            .await?;
        let orchestrator = Arc::new(CallOrchestrator::new(
            prompt.call_id,
            self.local_user,
            video,
            self.signaling.clone(),
            self.factory.clone(),
            self.devices.clone(),
        ));
        if let Err(err) = orchestrator.start(false, &[]).await {
            orchestrator.cleanup().await;
            if let Err(leave_err) = self
                .signaling
                .leave_call(prompt.call_id, self.local_user)
                .await
            {
                warn!(call = %prompt.call_id, error = %leave_err, "failed to back out of call");
            }
            return Err(err);
        }
        // Pick up anything already queued, the offer included. A failed
        // poll here must not abandon the call we just joined; the next
        // refresh polls again.
        if let Err(err) = orchestrator.pump_mailbox().await {
            warn!(call = %prompt.call_id, error = %err, "initial mailbox poll failed");
        }
        *self.current.lock() = Some(CallSession {
            call_id: prompt.call_id,
            conversation_id: prompt.conversation_id,
            call_type: prompt.call_type,
            is_initiator: false,
            orchestrator,
        });
        Ok(prompt.call_id)
    }

    /// Dismiss the raised prompt. For a direct call this ends it for
    /// the caller too; for a group call the others keep ringing and a
    /// later refresh may legitimately re-raise it.
    pub async fn decline(&self) -> CallResult<()> {
        let Some(prompt) = self.prompt.lock().take() else {
            return Ok(());
        };
        self.signaling
            .decline_call(prompt.call_id, self.local_user)
            .await
    }

    /// Leave the current call and tear down all local state.
    pub async fn hang_up(&self) -> CallResult<()> {
        let Some(session) = self.current.lock().take() else {
            return Ok(());
        };
        session.orchestrator.cleanup().await;
        self.signaling
            .leave_call(session.call_id, self.local_user)
            .await
    }

    /// One poll tick: reconcile the current session with the server,
    /// drain the signal mailbox, then reconcile the incoming prompt.
    pub async fn refresh(&self) -> CallResult<()> {
        let orchestrator = {
            let guard = self.current.lock();
            guard
                .as_ref()
                .map(|session| (session.call_id, session.orchestrator.clone()))
        };
        if let Some((call_id, orchestrator)) = orchestrator {
            let live = matches!(
                self.signaling.call_by_id(call_id).await?,
                Some(view) if !view.call.is_ended()
            );
            if live {
                orchestrator.pump_mailbox().await?;
            } else {
                debug!(call = %call_id, "current call ended remotely");
                let session = self.current.lock().take();
                drop(session);
                orchestrator.cleanup().await;
            }
        }

        let incoming = self.signaling.incoming_calls(self.local_user).await?;
        let in_call = self.current.lock().is_some();
        let mut prompt = self.prompt.lock();
        if let Some(raised) = prompt.as_ref() {
            // The caller hung up or the call was answered elsewhere.
            if !incoming.iter().any(|view| view.call.id == raised.call_id) {
                debug!(call = %raised.call_id, "incoming call withdrawn");
                *prompt = None;
            }
        }
        if prompt.is_none() && !in_call {
            if let Some(view) = incoming.first() {
                debug!(call = %view.call.id, "raising incoming call prompt");
                *prompt = Some(CallPrompt::from_view(view));
            }
        }
        Ok(())
    }

    pub fn state(&self) -> CallState {
        if let Some(session) = self.current.lock().as_ref() {
            return CallState::InCall(ActiveCallState {
                call_id: session.call_id,
                conversation_id: session.conversation_id,
                call_type: session.call_type,
                is_initiator: session.is_initiator,
                connected: session.orchestrator.is_connected(),
            });
        }
        if let Some(prompt) = self.prompt.lock().clone() {
            return CallState::Ringing(prompt);
        }
        CallState::Idle
    }

    /// Remote media streams of the current call, one per peer whose
    /// tracks have arrived. Empty when not in a call.
    pub fn remote_streams(&self) -> Vec<(UserId, Arc<dyn RemoteMedia>)> {
        self.current
            .lock()
            .as_ref()
            .map(|session| session.orchestrator.remote_streams())
            .unwrap_or_default()
    }

    /// Returns whether the call is now muted; false when not in a call.
    pub fn toggle_mute(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map(|session| session.orchestrator.toggle_mute())
            .unwrap_or(false)
    }

    /// Returns whether video is now on; false when not in a call or
    /// the call is audio only.
    pub fn toggle_video(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map(|session| session.orchestrator.toggle_video())
            .unwrap_or(false)
    }
}
