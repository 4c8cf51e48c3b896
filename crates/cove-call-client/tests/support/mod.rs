//! In-memory fakes behind the client's capability traits.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cove_call_client::rtc::{
    ConnectionState, IceCandidate, LocalMedia, MediaDevices, PeerConnectionApi,
    PeerConnectionFactory, PeerEvent, RemoteMedia, SessionDescription,
};
use cove_call_client::SignalingApi;
use cove_call_core::{
    Call, CallError, CallId, CallResult, CallStatus, CallType, CallView, ConversationId, Signal,
    SignalId, SignalKind, UserId, UserProfile,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

fn profile(user_id: UserId) -> UserProfile {
    UserProfile {
        id: user_id,
        display_name: format!("user-{user_id}"),
        avatar_color: "#888888".into(),
    }
}

/// Server stand-in with the switchboard's lifecycle rules, enough of
/// them for client-side tests to be meaningful.
#[derive(Default)]
pub struct FakeSignaling {
    calls: Mutex<HashMap<CallId, Call>>,
    signals: Mutex<Vec<Signal>>,
    conversations: Mutex<HashMap<ConversationId, (bool, Vec<UserId>)>>,
    failing_signal_polls: AtomicUsize,
}

impl FakeSignaling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_conversation(
        &self,
        conversation_id: ConversationId,
        is_group: bool,
        participants: Vec<UserId>,
    ) {
        self.conversations
            .lock()
            .insert(conversation_id, (is_group, participants));
    }

    pub fn call(&self, call_id: CallId) -> Option<Call> {
        self.calls.lock().get(&call_id).cloned()
    }

    pub fn end_call(&self, call_id: CallId) {
        if let Some(call) = self.calls.lock().get_mut(&call_id) {
            call.status = CallStatus::Ended;
        }
    }

    /// All stored signals, regardless of recipient.
    pub fn stored_signals(&self) -> Vec<Signal> {
        self.signals.lock().clone()
    }

    /// Inject a raw signal as another client would have sent it.
    pub fn push_signal(&self, signal: Signal) {
        self.signals.lock().push(signal);
    }

    /// Make the next signals poll fail with a transport error.
    pub fn fail_next_signals_poll(&self) {
        self.failing_signal_polls.fetch_add(1, Ordering::SeqCst);
    }

    fn view(&self, call: &Call) -> CallView {
        CallView {
            call: call.clone(),
            participants: call.participants.iter().map(|id| profile(*id)).collect(),
            initiator: Some(profile(call.initiator_id)),
        }
    }
}

#[async_trait]
impl SignalingApi for FakeSignaling {
    async fn initiate_call(
        &self,
        conversation_id: ConversationId,
        initiator_id: UserId,
    ) -> CallResult<CallId> {
        let is_group = self
            .conversations
            .lock()
            .get(&conversation_id)
            .map(|(is_group, _)| *is_group)
            .ok_or(CallError::ConversationNotFound)?;
        let mut calls = self.calls.lock();
        if calls
            .values()
            .any(|call| call.conversation_id == conversation_id && !call.is_ended())
        {
            return Err(CallError::CallInProgress);
        }
        let call_type = if is_group {
            CallType::Group
        } else {
            CallType::Direct
        };
        let call = Call::new(conversation_id, initiator_id, call_type);
        let call_id = call.id;
        calls.insert(call_id, call);
        Ok(call_id)
    }

    async fn join_call(&self, call_id: CallId, user_id: UserId) -> CallResult<()> {
        let mut calls = self.calls.lock();
        let call = calls.get_mut(&call_id).ok_or(CallError::CallNotFound)?;
        if call.is_ended() {
            return Err(CallError::CallEnded);
        }
        if call.is_participant(user_id) {
            return Ok(());
        }
        if call.call_type == CallType::Direct && call.participants.len() >= 2 {
            return Err(CallError::CallInProgress);
        }
        call.participants.push(user_id);
        call.status = CallStatus::Active;
        Ok(())
    }

    async fn leave_call(&self, call_id: CallId, user_id: UserId) -> CallResult<()> {
        let mut calls = self.calls.lock();
        let call = calls.get_mut(&call_id).ok_or(CallError::CallNotFound)?;
        call.participants.retain(|id| *id != user_id);
        if call.call_type == CallType::Direct || call.participants.is_empty() {
            call.status = CallStatus::Ended;
        }
        Ok(())
    }

    async fn decline_call(&self, call_id: CallId, _user_id: UserId) -> CallResult<()> {
        let mut calls = self.calls.lock();
        let call = calls.get_mut(&call_id).ok_or(CallError::CallNotFound)?;
        if call.call_type == CallType::Direct {
            call.status = CallStatus::Ended;
        }
        Ok(())
    }

    async fn send_signal(
        &self,
        call_id: CallId,
        from_user_id: UserId,
        to_user_id: UserId,
        kind: SignalKind,
        payload: serde_json::Value,
    ) -> CallResult<()> {
        self.signals
            .lock()
            .push(Signal::new(call_id, from_user_id, to_user_id, kind, payload));
        Ok(())
    }

    async fn signals(&self, call_id: CallId, user_id: UserId) -> CallResult<Vec<Signal>> {
        if self.failing_signal_polls.load(Ordering::SeqCst) > 0 {
            self.failing_signal_polls.fetch_sub(1, Ordering::SeqCst);
            return Err(CallError::Transport("mailbox poll failed".into()));
        }
        Ok(self
            .signals
            .lock()
            .iter()
            .filter(|signal| signal.call_id == call_id && signal.to_user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_signal(&self, signal_id: SignalId) -> CallResult<()> {
        self.signals.lock().retain(|signal| signal.id != signal_id);
        Ok(())
    }

    async fn active_call(&self, conversation_id: ConversationId) -> CallResult<Option<CallView>> {
        Ok(self
            .calls
            .lock()
            .values()
            .find(|call| call.conversation_id == conversation_id && !call.is_ended())
            .map(|call| self.view(call)))
    }

    async fn call_by_id(&self, call_id: CallId) -> CallResult<Option<CallView>> {
        Ok(self.calls.lock().get(&call_id).map(|call| self.view(call)))
    }

    async fn incoming_calls(&self, user_id: UserId) -> CallResult<Vec<CallView>> {
        let conversations = self.conversations.lock();
        let member_of: Vec<ConversationId> = conversations
            .iter()
            .filter(|(_, (_, participants))| participants.contains(&user_id))
            .map(|(id, _)| *id)
            .collect();
        Ok(self
            .calls
            .lock()
            .values()
            .filter(|call| {
                call.status == CallStatus::Ringing
                    && member_of.contains(&call.conversation_id)
                    && !call.is_participant(user_id)
            })
            .map(|call| self.view(call))
            .collect())
    }
}

/// Scripted peer connection; records every call made against it.
pub struct FakePeerConnection {
    pub peer_id: UserId,
    events: mpsc::UnboundedSender<(UserId, PeerEvent)>,
    pub remote_descriptions: Mutex<Vec<SessionDescription>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub offers_created: AtomicUsize,
    pub answers_created: AtomicUsize,
    pub restarts: AtomicUsize,
    pub tracks_added: AtomicUsize,
    pub closed: AtomicBool,
    state: Mutex<ConnectionState>,
}

impl FakePeerConnection {
    fn new(peer_id: UserId, events: mpsc::UnboundedSender<(UserId, PeerEvent)>) -> Self {
        Self {
            peer_id,
            events,
            remote_descriptions: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            offers_created: AtomicUsize::new(0),
            answers_created: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
            tracks_added: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            state: Mutex::new(ConnectionState::New),
        }
    }

    /// Push an event at the orchestrator as the platform would.
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send((self.peer_id, event));
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
        self.emit(PeerEvent::StateChanged(state));
    }
}

#[async_trait]
impl PeerConnectionApi for FakePeerConnection {
    async fn create_offer(&self) -> CallResult<SessionDescription> {
        self.offers_created.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::offer(format!("offer-for-{}", self.peer_id)))
    }

    async fn create_answer(&self) -> CallResult<SessionDescription> {
        self.answers_created.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::answer(format!(
            "answer-for-{}",
            self.peer_id
        )))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> CallResult<()> {
        self.remote_descriptions.lock().push(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> CallResult<()> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn restart_ice(&self) -> CallResult<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_local_tracks(&self, _media: Arc<dyn LocalMedia>) -> CallResult<()> {
        self.tracks_added.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakePeerFactory {
    created: Mutex<Vec<Arc<FakePeerConnection>>>,
}

impl FakePeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<Arc<FakePeerConnection>> {
        self.created.lock().clone()
    }

    pub fn conn_for(&self, peer_id: UserId) -> Option<Arc<FakePeerConnection>> {
        self.created
            .lock()
            .iter()
            .find(|conn| conn.peer_id == peer_id)
            .cloned()
    }
}

impl PeerConnectionFactory for FakePeerFactory {
    fn create(
        &self,
        peer_id: UserId,
        events: mpsc::UnboundedSender<(UserId, PeerEvent)>,
    ) -> Arc<dyn PeerConnectionApi> {
        let conn = Arc::new(FakePeerConnection::new(peer_id, events));
        self.created.lock().push(conn.clone());
        conn
    }
}

pub struct FakeMedia {
    has_video: bool,
    audio_enabled: AtomicBool,
    video_enabled: AtomicBool,
    pub stopped: AtomicBool,
}

impl FakeMedia {
    fn new(has_video: bool) -> Self {
        Self {
            has_video,
            audio_enabled: AtomicBool::new(true),
            video_enabled: AtomicBool::new(has_video),
            stopped: AtomicBool::new(false),
        }
    }
}

impl LocalMedia for FakeMedia {
    fn has_video(&self) -> bool {
        self.has_video
    }

    fn audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::SeqCst)
    }

    fn video_enabled(&self) -> bool {
        self.video_enabled.load(Ordering::SeqCst)
    }

    fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::SeqCst);
    }

    fn set_video_enabled(&self, enabled: bool) {
        self.video_enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

pub struct FakeRemoteStream {
    id: String,
}

impl FakeRemoteStream {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { id: id.into() })
    }
}

impl RemoteMedia for FakeRemoteStream {
    fn stream_id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Copy)]
pub enum DeviceMode {
    Available,
    PermissionDenied,
    NoHardware,
}

pub struct FakeDevices {
    mode: Mutex<DeviceMode>,
    acquired: Mutex<Vec<Arc<FakeMedia>>>,
}

impl FakeDevices {
    pub fn new(mode: DeviceMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            acquired: Mutex::new(Vec::new()),
        }
    }

    pub fn acquired(&self) -> Vec<Arc<FakeMedia>> {
        self.acquired.lock().clone()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn acquire(&self, video: bool) -> CallResult<Arc<dyn LocalMedia>> {
        match *self.mode.lock() {
            DeviceMode::Available => {
                let media = Arc::new(FakeMedia::new(video));
                self.acquired.lock().push(media.clone());
                Ok(media)
            }
            DeviceMode::PermissionDenied => Err(CallError::MediaAccessDenied(
                "user denied capture permission".into(),
            )),
            DeviceMode::NoHardware => Err(CallError::MediaDeviceNotFound(
                "no capture device present".into(),
            )),
        }
    }
}
