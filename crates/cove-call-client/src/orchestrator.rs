//! Per-call negotiation orchestrator.
//!
//! Owns one [`PeerLink`] per remote participant, created lazily the
//! first time that peer must be contacted or is heard from. Local media
//! is acquired once per call and shared by reference across all links;
//! a failure on one peer never takes down the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cove_call_core::{CallError, CallId, CallResult, Signal, SignalKind, UserId};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::rpc::SignalingApi;
use crate::rtc::{
    ConnectionState, IceCandidate, LocalMedia, MediaDevices, PeerConnectionApi,
    PeerConnectionFactory, PeerEvent, RemoteMedia, SessionDescription,
};

/// Where one peer link stands in its negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Negotiating,
    Connected,
    Failed,
}

struct PeerLink {
    conn: Arc<dyn PeerConnectionApi>,
    state: NegotiationState,
    /// The peer's stream, once the platform delivers its tracks.
    remote_media: Option<Arc<dyn RemoteMedia>>,
    /// Candidates arriving before the remote description are parked
    /// here and flushed once it lands.
    pending_candidates: Vec<IceCandidate>,
    have_remote_description: bool,
    restart_attempted: bool,
}

impl PeerLink {
    fn new(conn: Arc<dyn PeerConnectionApi>) -> Self {
        Self {
            conn,
            state: NegotiationState::Idle,
            remote_media: None,
            pending_candidates: Vec::new(),
            have_remote_description: false,
            restart_attempted: false,
        }
    }
}

struct Inner {
    call_id: CallId,
    local_user: UserId,
    want_video: bool,
    signaling: Arc<dyn SignalingApi>,
    factory: Arc<dyn PeerConnectionFactory>,
    devices: Arc<dyn MediaDevices>,
    links: Mutex<HashMap<UserId, PeerLink>>,
    local_media: Mutex<Option<Arc<dyn LocalMedia>>>,
    events_tx: mpsc::UnboundedSender<(UserId, PeerEvent)>,
    pump: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

pub struct CallOrchestrator {
    inner: Arc<Inner>,
}

impl CallOrchestrator {
    pub fn new(
        call_id: CallId,
        local_user: UserId,
        want_video: bool,
        signaling: Arc<dyn SignalingApi>,
        factory: Arc<dyn PeerConnectionFactory>,
        devices: Arc<dyn MediaDevices>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            call_id,
            local_user,
            want_video,
            signaling,
            factory,
            devices,
            links: Mutex::new(HashMap::new()),
            local_media: Mutex::new(None),
            events_tx,
            pump: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        let pump = tokio::spawn(Inner::run_pump(inner.clone(), events_rx));
        *inner.pump.lock() = Some(pump);
        Self { inner }
    }

    /// Acquire local media and, for the initiator only, open an offer
    /// toward each current participant. Peers joining later are offered
    /// nothing by already-connected members; they reach us by offering.
    pub async fn start(&self, is_initiator: bool, participants: &[UserId]) -> CallResult<()> {
        self.inner.ensure_media().await?;
        if !is_initiator {
            return Ok(());
        }
        for peer_id in participants {
            if *peer_id == self.inner.local_user {
                continue;
            }
            if let Err(err) = self.inner.offer_to(*peer_id).await {
                // One bad peer must not sink the rest of a group call.
                warn!(peer = %peer_id, error = %err, "offer failed");
                self.inner.set_link_state(*peer_id, NegotiationState::Failed);
            }
        }
        Ok(())
    }

    /// Drain the mailbox once: apply every pending signal to its peer
    /// link, then acknowledge it so the next poll does not replay it.
    /// Malformed or failing signals are logged and skipped, never
    /// fatal.
    pub async fn pump_mailbox(&self) -> CallResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let signals = self
            .inner
            .signaling
            .signals(self.inner.call_id, self.inner.local_user)
            .await?;
        for signal in signals {
            match self.inner.apply_signal(&signal).await {
                Ok(()) => {}
                Err(CallError::SignalDecodeError(reason)) => {
                    warn!(
                        signal = %signal.id,
                        from = %signal.from_user_id,
                        %reason,
                        "dropping malformed signal"
                    );
                }
                Err(err) => {
                    warn!(
                        signal = %signal.id,
                        from = %signal.from_user_id,
                        error = %err,
                        "signal handling failed for peer"
                    );
                }
            }
            if let Err(err) = self.inner.signaling.delete_signal(signal.id).await {
                warn!(signal = %signal.id, error = %err, "failed to ack signal");
            }
        }
        Ok(())
    }

    /// Flip the shared audio tracks; affects every peer link at once
    /// and never renegotiates. Returns whether the call is now muted.
    pub fn toggle_mute(&self) -> bool {
        let Some(media) = self.inner.local_media.lock().clone() else {
            return false;
        };
        let enabled = !media.audio_enabled();
        media.set_audio_enabled(enabled);
        !enabled
    }

    /// Flip the shared video tracks. Returns whether video is now on;
    /// always false for an audio-only call.
    pub fn toggle_video(&self) -> bool {
        let Some(media) = self.inner.local_media.lock().clone() else {
            return false;
        };
        if !media.has_video() {
            return false;
        }
        let enabled = !media.video_enabled();
        media.set_video_enabled(enabled);
        enabled
    }

    /// True once any peer link has reached `Connected`.
    pub fn is_connected(&self) -> bool {
        self.inner
            .links
            .lock()
            .values()
            .any(|link| link.state == NegotiationState::Connected)
    }

    pub fn peer_states(&self) -> Vec<(UserId, NegotiationState)> {
        self.inner
            .links
            .lock()
            .iter()
            .map(|(peer_id, link)| (*peer_id, link.state))
            .collect()
    }

    /// The peer's media stream, once its tracks have arrived.
    pub fn remote_stream(&self, peer_id: UserId) -> Option<Arc<dyn RemoteMedia>> {
        self.inner
            .links
            .lock()
            .get(&peer_id)
            .and_then(|link| link.remote_media.clone())
    }

    /// Every remote stream the call has received, keyed by peer.
    pub fn remote_streams(&self) -> Vec<(UserId, Arc<dyn RemoteMedia>)> {
        self.inner
            .links
            .lock()
            .iter()
            .filter_map(|(peer_id, link)| {
                link.remote_media.clone().map(|stream| (*peer_id, stream))
            })
            .collect()
    }

    /// Stop local media, close every peer link and drop all transient
    /// state. Required on every exit path; safe to call repeatedly.
    pub async fn cleanup(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }
        if let Some(media) = self.inner.local_media.lock().take() {
            media.stop();
        }
        let conns: Vec<_> = self
            .inner
            .links
            .lock()
            .drain()
            .map(|(_, link)| link.conn)
            .collect();
        for conn in conns {
            conn.close().await;
        }
        debug!(call = %self.inner.call_id, "orchestrator cleaned up");
    }
}

impl Drop for CallOrchestrator {
    fn drop(&mut self) {
        // Best-effort teardown when cleanup() was never awaited: media
        // must not leak past the orchestrator under any exit path.
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }
        if let Some(media) = self.inner.local_media.lock().take() {
            media.stop();
        }
        self.inner.links.lock().clear();
    }
}

impl Inner {
    /// Run `f` against the peer's link, creating it on demand. This is
    /// the only place links are born.
    fn with_link<R>(&self, peer_id: UserId, f: impl FnOnce(&mut PeerLink) -> R) -> R {
        let mut links = self.links.lock();
        let link = links.entry(peer_id).or_insert_with(|| {
            debug!(peer = %peer_id, "creating peer link");
            PeerLink::new(self.factory.create(peer_id, self.events_tx.clone()))
        });
        f(link)
    }

    fn set_link_state(&self, peer_id: UserId, state: NegotiationState) {
        if let Some(link) = self.links.lock().get_mut(&peer_id) {
            link.state = state;
        }
    }

    /// Local media is acquired once per call and shared by every link.
    async fn ensure_media(&self) -> CallResult<Arc<dyn LocalMedia>> {
        if let Some(media) = self.local_media.lock().clone() {
            return Ok(media);
        }
        let acquired = self.devices.acquire(self.want_video).await?;
        let mut slot = self.local_media.lock();
        match slot.as_ref() {
            // Lost a race with a concurrent acquire; release the spare.
            Some(existing) => {
                acquired.stop();
                Ok(existing.clone())
            }
            None => {
                *slot = Some(acquired.clone());
                Ok(acquired)
            }
        }
    }

    async fn offer_to(&self, peer_id: UserId) -> CallResult<()> {
        let conn = self.with_link(peer_id, |link| {
            link.state = NegotiationState::Negotiating;
            link.conn.clone()
        });
        let media = self.ensure_media().await?;
        conn.add_local_tracks(media).await?;
        let offer = conn.create_offer().await?;
        self.relay(peer_id, SignalKind::Offer, &offer).await
    }

    async fn apply_signal(&self, signal: &Signal) -> CallResult<()> {
        match signal.kind {
            SignalKind::Offer => {
                let offer: SessionDescription = decode(&signal.payload)?;
                self.handle_offer(signal.from_user_id, offer).await
            }
            SignalKind::Answer => {
                let answer: SessionDescription = decode(&signal.payload)?;
                self.apply_remote_description(signal.from_user_id, answer)
                    .await
            }
            SignalKind::IceCandidate => {
                let candidate: IceCandidate = decode(&signal.payload)?;
                self.handle_candidate(signal.from_user_id, candidate).await
            }
        }
    }

    /// Offers may come from peers we have never heard of (a member we
    /// did not know joined); a fresh link is created for them.
    async fn handle_offer(&self, from: UserId, offer: SessionDescription) -> CallResult<()> {
        let conn = self.with_link(from, |link| {
            link.state = NegotiationState::Negotiating;
            link.conn.clone()
        });
        let media = self.ensure_media().await?;
        conn.add_local_tracks(media).await?;
        self.apply_remote_description(from, offer).await?;
        let answer = conn.create_answer().await?;
        self.relay(from, SignalKind::Answer, &answer).await
    }

    async fn apply_remote_description(
        &self,
        peer_id: UserId,
        description: SessionDescription,
    ) -> CallResult<()> {
        let conn = self.with_link(peer_id, |link| link.conn.clone());
        conn.set_remote_description(description).await?;
        let (conn, parked) = {
            let mut links = self.links.lock();
            let Some(link) = links.get_mut(&peer_id) else {
                return Ok(());
            };
            link.have_remote_description = true;
            (link.conn.clone(), std::mem::take(&mut link.pending_candidates))
        };
        for candidate in parked {
            if let Err(err) = conn.add_ice_candidate(candidate).await {
                warn!(peer = %peer_id, error = %err, "buffered candidate rejected");
            }
        }
        Ok(())
    }

    /// Candidates are unordered relative to offer/answer; anything that
    /// beats the remote description is parked on the link.
    async fn handle_candidate(&self, from: UserId, candidate: IceCandidate) -> CallResult<()> {
        let conn = {
            let mut links = self.links.lock();
            let link = links.entry(from).or_insert_with(|| {
                debug!(peer = %from, "creating peer link");
                PeerLink::new(self.factory.create(from, self.events_tx.clone()))
            });
            if !link.have_remote_description {
                link.pending_candidates.push(candidate);
                return Ok(());
            }
            link.conn.clone()
        };
        conn.add_ice_candidate(candidate).await
    }

    async fn relay(
        &self,
        to_user_id: UserId,
        kind: SignalKind,
        payload: &impl Serialize,
    ) -> CallResult<()> {
        let payload =
            serde_json::to_value(payload).map_err(|err| CallError::Transport(err.to_string()))?;
        self.signaling
            .send_signal(self.call_id, self.local_user, to_user_id, kind, payload)
            .await
    }

    async fn run_pump(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<(UserId, PeerEvent)>) {
        while let Some((peer_id, event)) = events.recv().await {
            match event {
                PeerEvent::IceCandidate(candidate) => {
                    if let Err(err) = self
                        .relay(peer_id, SignalKind::IceCandidate, &candidate)
                        .await
                    {
                        warn!(peer = %peer_id, error = %err, "failed to relay ice candidate");
                    }
                }
                PeerEvent::RemoteTrack(stream) => {
                    debug!(peer = %peer_id, stream = %stream.stream_id(), "remote media attached");
                    let mut links = self.links.lock();
                    if let Some(link) = links.get_mut(&peer_id) {
                        link.remote_media = Some(stream);
                    }
                }
                PeerEvent::StateChanged(state) => self.on_state_change(peer_id, state).await,
            }
        }
    }

    async fn on_state_change(&self, peer_id: UserId, state: ConnectionState) {
        match state {
            ConnectionState::Connected => {
                let mut links = self.links.lock();
                if let Some(link) = links.get_mut(&peer_id) {
                    link.state = NegotiationState::Connected;
                    link.restart_attempted = false;
                }
            }
            ConnectionState::Failed => {
                // One ICE restart per failure streak; a second failure
                // parks the link in Failed without touching its slot or
                // any other peer.
                let retry = {
                    let mut links = self.links.lock();
                    match links.get_mut(&peer_id) {
                        Some(link) if !link.restart_attempted => {
                            link.restart_attempted = true;
                            link.state = NegotiationState::Negotiating;
                            Some(link.conn.clone())
                        }
                        Some(link) => {
                            link.state = NegotiationState::Failed;
                            None
                        }
                        None => None,
                    }
                };
                match retry {
                    Some(conn) => {
                        warn!(peer = %peer_id, "peer connection failed, attempting ice restart");
                        if let Err(err) = conn.restart_ice().await {
                            warn!(peer = %peer_id, error = %err, "ice restart failed");
                            self.set_link_state(peer_id, NegotiationState::Failed);
                        }
                    }
                    None => {
                        warn!(
                            peer = %peer_id,
                            "peer negotiation failed after retry; other peers stay up"
                        );
                    }
                }
            }
            ConnectionState::Disconnected => {
                debug!(peer = %peer_id, "peer connection disconnected");
            }
            _ => {}
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(payload: &serde_json::Value) -> CallResult<T> {
    serde_json::from_value(payload.clone())
        .map_err(|err| CallError::SignalDecodeError(err.to_string()))
}
